//! Response/control design matrices and pre-period standardization.
//!
//! The filter runs on z-scored data: each series is centered and scaled with
//! moments computed on the pre-period only, and post-period controls reuse
//! those same constants. Missing response values stay `NaN` (the filter skips
//! them); missing control values are rejected.
use chrono::NaiveDate;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::{
    counterfactual::errors::{EstimatorError, EstimatorResult},
    panel::Panel,
};

/// Affine map `z = (v - mean) / scale` fitted on pre-period values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    pub mean: f64,
    pub scale: f64,
}

impl Standardizer {
    /// The identity map, used when standardization is switched off.
    pub fn identity() -> Self {
        Standardizer { mean: 0.0, scale: 1.0 }
    }

    /// Sample mean and standard deviation of the non-`NaN` entries.
    ///
    /// A zero, non-finite or undefined deviation (constant series, single
    /// value) is replaced by 1 so the map stays invertible.
    pub fn fit(values: ArrayView1<'_, f64>) -> Self {
        let observed: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        let n = observed.len();
        if n == 0 {
            return Standardizer::identity();
        }
        let mean = observed.iter().sum::<f64>() / n as f64;
        let scale = if n > 1 {
            let ss: f64 = observed.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (n - 1) as f64).sqrt()
        } else {
            0.0
        };
        let scale = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };
        Standardizer { mean, scale }
    }

    #[inline]
    pub fn transform(&self, v: f64) -> f64 {
        (v - self.mean) / self.scale
    }

    #[inline]
    pub fn inverse(&self, z: f64) -> f64 {
        z * self.scale + self.mean
    }

    /// Map a standard deviation back to original units.
    #[inline]
    pub fn inverse_sd(&self, sd: f64) -> f64 {
        sd * self.scale
    }
}

/// Standardization constants for the response and each control, in control
/// order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaling {
    pub response: Standardizer,
    pub controls: Vec<Standardizer>,
}

/// Pre-period data in filter units.
#[derive(Debug, Clone, PartialEq)]
pub struct PreDesign {
    pub dates: Vec<NaiveDate>,
    /// Response per row; `NaN` where the treatment value is missing.
    pub response: Array1<f64>,
    /// `rows × controls` predictor matrix, fully observed.
    pub controls: Array2<f64>,
    pub scaling: Scaling,
}

impl PreDesign {
    /// Rows with an observed response.
    pub fn observed_rows(&self) -> usize {
        self.response.iter().filter(|v| !v.is_nan()).count()
    }
}

/// Build the standardized pre-period design.
///
/// Errors
/// ------
/// - `EstimatorError::Panel(UnknownUnit)` for a unit not in `pre`.
/// - `EstimatorError::MissingPredictor` for the first missing control cell.
pub fn build_pre_design<S: AsRef<str>>(
    pre: &Panel, treatment: &str, controls: &[S], standardize: bool,
) -> EstimatorResult<PreDesign> {
    let y_raw = pre.column(treatment)?;
    let response_scaler =
        if standardize { Standardizer::fit(y_raw) } else { Standardizer::identity() };

    let mut scalers = Vec::with_capacity(controls.len());
    for unit in controls {
        let col = pre.column(unit.as_ref())?;
        scalers.push(if standardize { Standardizer::fit(col) } else { Standardizer::identity() });
    }

    let x = control_matrix(pre, controls, &scalers)?;
    let response = y_raw.mapv(|v| if v.is_nan() { f64::NAN } else { response_scaler.transform(v) });
    Ok(PreDesign {
        dates: pre.dates().to_vec(),
        response,
        controls: x,
        scaling: Scaling { response: response_scaler, controls: scalers },
    })
}

/// Standardized control matrix for `panel` using already-fitted scalers.
///
/// Only control columns are read.
///
/// Errors
/// ------
/// - `EstimatorError::Panel(UnknownUnit)` for a unit not in `panel`.
/// - `EstimatorError::MissingPredictor` for the first missing cell.
pub fn control_matrix<S: AsRef<str>>(
    panel: &Panel, controls: &[S], scalers: &[Standardizer],
) -> EstimatorResult<Array2<f64>> {
    let mut x = Array2::zeros((panel.n_rows(), controls.len()));
    for (j, (unit, scaler)) in controls.iter().zip(scalers).enumerate() {
        let col = panel.column(unit.as_ref())?;
        for (i, &v) in col.iter().enumerate() {
            if v.is_nan() {
                return Err(EstimatorError::MissingPredictor {
                    unit: unit.as_ref().to_string(),
                    date: panel.dates()[i],
                });
            }
            x[[i, j]] = scaler.transform(v);
        }
    }
    Ok(x)
}
