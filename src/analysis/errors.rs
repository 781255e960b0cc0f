//! Errors for the end-to-end analysis driver.
//!
//! [`AnalysisError`] wraps the error of whichever stage failed (panel
//! preparation, estimation, summary, optimizer configuration) and adds
//! configuration validation.
use crate::{
    counterfactual::errors::EstimatorError, impact::errors::SummaryError,
    optimization::errors::OptError, panel::errors::PanelError,
};

#[cfg(feature = "python-bindings")]
use pyo3::{exceptions::PyValueError, PyErr};

/// Result alias for analysis operations.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Configuration is malformed or inconsistent.
    InvalidConfig { reason: String },

    // ---- Wrapped stage errors ----
    Panel(PanelError),
    Estimator(EstimatorError),
    Summary(SummaryError),
    Optimization(OptError),
}

impl std::error::Error for AnalysisError {}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisError::InvalidConfig { reason } => write!(f, "Invalid configuration: {reason}"),

            // ---- Wrapped stage errors ----
            AnalysisError::Panel(err) => write!(f, "{err}"),
            AnalysisError::Estimator(err) => write!(f, "{err}"),
            AnalysisError::Summary(err) => write!(f, "{err}"),
            AnalysisError::Optimization(err) => write!(f, "Optimizer configuration: {err}"),
        }
    }
}

impl From<PanelError> for AnalysisError {
    fn from(err: PanelError) -> Self {
        AnalysisError::Panel(err)
    }
}

impl From<EstimatorError> for AnalysisError {
    fn from(err: EstimatorError) -> Self {
        match err {
            EstimatorError::Panel(inner) => AnalysisError::Panel(inner),
            other => AnalysisError::Estimator(other),
        }
    }
}

impl From<SummaryError> for AnalysisError {
    fn from(err: SummaryError) -> Self {
        match err {
            SummaryError::Panel(inner) => AnalysisError::Panel(inner),
            other => AnalysisError::Summary(other),
        }
    }
}

impl From<OptError> for AnalysisError {
    fn from(err: OptError) -> Self {
        AnalysisError::Optimization(err)
    }
}

impl From<serde_json::Error> for AnalysisError {
    fn from(err: serde_json::Error) -> Self {
        AnalysisError::InvalidConfig { reason: err.to_string() }
    }
}

#[cfg(feature = "python-bindings")]
impl std::convert::From<AnalysisError> for PyErr {
    fn from(err: AnalysisError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}
