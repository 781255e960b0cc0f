//! rust_causal_impact — counterfactual impact estimation for interventions on
//! monthly panels, with optional Python bindings.
//!
//! Purpose
//! -------
//! Estimate the effect of a one-off intervention (e.g. a stadium opening) on a
//! treatment unit by forecasting what it would have done without the
//! intervention from a set of unaffected control units, then comparing that
//! counterfactual with what was observed.
//!
//! Key behaviors
//! -------------
//! - [`panel`]: align raw per-unit series on a shared monthly index and split
//!   it into pre- and post-intervention periods.
//! - [`counterfactual`]: fit a structural time-series model (local level or
//!   local linear trend plus ridge-regularized regression on controls) with a
//!   Kalman filter and forecast the post-period.
//! - [`impact`]: point, cumulative, average, and relative effects with
//!   intervals, a tail probability, and a significance flag.
//! - [`analysis`]: configuration-driven end-to-end runs, robustness batches
//!   over candidate intervention dates, and growth tables.
//! - [`optimization`]: L-BFGS maximum-likelihood machinery used to estimate
//!   the structural variances.
//!
//! Invariants & assumptions
//! ------------------------
//! - The core is deterministic and holds no process-wide state; every
//!   operation is a function of its explicit inputs and options.
//! - Model parameters are learned from pre-period rows only; forecasts never
//!   read post-period treatment values.
//!
//! Conventions
//! -----------
//! - Errors are module-specific enums with `Display` and
//!   `std::error::Error`, converted to `PyErr` (`ValueError`) at the PyO3
//!   boundary.
//! - Logging goes through `tracing`; the library installs no subscriber.
//!
//! Downstream usage
//! ----------------
//! - Rust callers use [`analysis::run_analysis`] or the individual stages.
//! - With `python-bindings`, the `_rust_causal_impact` extension exposes a
//!   `CausalImpact` class that runs one configured analysis.
//!
//! Testing notes
//! -------------
//! - Unit tests live next to each module; `tests/` holds end-to-end scenarios
//!   on synthetic panels.

pub mod analysis;
pub mod counterfactual;
pub mod impact;
pub mod optimization;
pub mod panel;
pub mod utils;

#[cfg(feature = "python-bindings")]
use pyo3::{exceptions::PyValueError, prelude::*, types::PyDict};

#[cfg(feature = "python-bindings")]
use crate::{
    analysis::{run_analysis, AnalysisConfig, AnalysisReport},
    utils::extract_panel,
};

/// CausalImpact — Python-facing wrapper around one configured analysis.
///
/// Purpose
/// -------
/// Run [`run_analysis`] from Python inputs and expose the headline numbers
/// and the per-date paths as properties.
///
/// Parameters
/// ----------
/// Constructed from Python via `CausalImpact(dates, columns, config)`:
/// - `dates`: list of ISO `YYYY-MM-DD` strings, sorted ascending.
/// - `columns`: `dict[str, array-like]` of unit values (`NaN` = missing).
/// - `config`: JSON string in the [`AnalysisConfig`] format.
///
/// Notes
/// -----
/// - Rust callers should use [`run_analysis`] directly.
#[cfg(feature = "python-bindings")]
#[pyclass(module = "rust_causal_impact.analysis")]
pub struct CausalImpact {
    inner: AnalysisReport,
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl CausalImpact {
    #[new]
    #[pyo3(text_signature = "(dates, columns, config, /)")]
    pub fn new<'py>(
        py: Python<'py>, dates: Vec<String>, columns: &Bound<'py, PyDict>, config: &str,
    ) -> PyResult<Self> {
        let panel = extract_panel(py, &dates, columns)?;
        let config = AnalysisConfig::from_json_str(config)?;
        let inner = py.allow_threads(|| run_analysis(&panel, &config))?;
        Ok(CausalImpact { inner })
    }

    #[getter]
    pub fn dates(&self) -> Vec<String> {
        self.inner.predictions.dates.iter().map(|d| d.to_string()).collect()
    }

    #[getter]
    pub fn predicted_mean(&self) -> Vec<f64> {
        self.inner.predictions.mean.clone()
    }

    #[getter]
    pub fn predicted_sd(&self) -> Vec<f64> {
        self.inner.predictions.sd.clone()
    }

    #[getter]
    pub fn point_effects(&self) -> Vec<f64> {
        self.inner.impact.points.iter().map(|p| p.effect).collect()
    }

    #[getter]
    pub fn cumulative_effect(&self) -> f64 {
        self.inner.impact.cumulative.effect
    }

    #[getter]
    pub fn cumulative_interval(&self) -> (f64, f64) {
        let i = self.inner.impact.cumulative.effect_interval;
        (i.lower, i.upper)
    }

    #[getter]
    pub fn relative_effect(&self) -> Option<f64> {
        self.inner.impact.relative.as_ref().map(|r| r.percent)
    }

    #[getter]
    pub fn p_value(&self) -> f64 {
        self.inner.impact.p_value
    }

    #[getter]
    pub fn significant(&self) -> bool {
        self.inner.impact.significant
    }

    /// Text summary table.
    pub fn summary(&self) -> String {
        self.inner.impact.to_string()
    }

    /// Full report as JSON.
    pub fn to_json(&self) -> PyResult<String> {
        serde_json::to_string(&self.inner).map_err(|e| PyValueError::new_err(e.to_string()))
    }
}

/// _rust_causal_impact — PyO3 module initializer.
///
/// Registers the `analysis` submodule and makes it importable via the dotted
/// path `rust_causal_impact.analysis`.
#[cfg(feature = "python-bindings")]
#[pymodule]
fn _rust_causal_impact<'py>(py: Python<'py>, m: &Bound<'py, PyModule>) -> PyResult<()> {
    let analysis_mod = PyModule::new(py, "analysis")?;
    analysis_mod.add_class::<CausalImpact>()?;
    m.add_submodule(&analysis_mod)?;

    // Manually add the submodule into sys.modules to allow for dot notation.
    py.import("sys")?.getattr("modules")?.set_item("rust_causal_impact.analysis", analysis_mod)?;
    Ok(())
}
