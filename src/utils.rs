//! Python-boundary conversion helpers (feature `python-bindings`).
#[cfg(feature = "python-bindings")]
use chrono::NaiveDate;

#[cfg(feature = "python-bindings")]
use pyo3::{
    exceptions::{PyTypeError, PyValueError},
    prelude::*,
    types::{PyAny, PyDict},
};

#[cfg(feature = "python-bindings")]
use numpy::{
    IntoPyArray,    // Vec → PyArray
    PyArrayMethods, // .readonly()
    PyReadonlyArray1,
};

#[cfg(feature = "python-bindings")]
use crate::panel::Panel;

/// Accept a contiguous float64 ndarray, anything with `.to_numpy()`
/// (pandas), or a plain sequence of floats.
#[cfg(feature = "python-bindings")]
#[inline]
pub fn extract_f64_array<'py>(
    py: Python<'py>, raw_data: &Bound<'py, PyAny>,
) -> PyResult<PyReadonlyArray1<'py, f64>> {
    if let Ok(arr_ro) = raw_data.extract::<PyReadonlyArray1<f64>>() {
        if arr_ro.as_slice().is_ok() {
            return Ok(arr_ro);
        }
    }

    if let Ok(obj) = raw_data.call_method("to_numpy", (false,), None) {
        if let Ok(series_ro) = obj.extract::<PyReadonlyArray1<f64>>() {
            if series_ro.as_slice().is_ok() {
                return Ok(series_ro);
            }
        }
    }

    let vec: Vec<f64> = raw_data.extract().map_err(|_| {
        PyTypeError::new_err("expected a 1-D numpy.ndarray, pandas.Series, or sequence of float64")
    })?;
    Ok(vec.into_pyarray(py).readonly())
}

/// Parse ISO `YYYY-MM-DD` strings.
#[cfg(feature = "python-bindings")]
pub fn extract_dates(raw: &[String]) -> PyResult<Vec<NaiveDate>> {
    raw.iter()
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| PyValueError::new_err(format!("invalid date '{s}': {e}")))
        })
        .collect()
}

/// Build a [`Panel`] from ISO dates and a `{unit: values}` mapping; `NaN`
/// marks a missing cell.
#[cfg(feature = "python-bindings")]
pub fn extract_panel<'py>(
    py: Python<'py>, dates: &[String], columns: &Bound<'py, PyDict>,
) -> PyResult<Panel> {
    let dates = extract_dates(dates)?;
    let mut cols = Vec::with_capacity(columns.len());
    for (key, value) in columns.iter() {
        let unit: String = key.extract()?;
        let arr = extract_f64_array(py, &value)?;
        let slice = arr
            .as_slice()
            .map_err(|_| PyValueError::new_err(format!("column '{unit}' is not contiguous")))?;
        cols.push((unit, slice.to_vec()));
    }
    Ok(Panel::from_columns(dates, cols)?)
}
