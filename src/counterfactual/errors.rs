//! Errors for fitting and forecasting the counterfactual model.
//!
//! [`EstimatorError`] covers option validation, design problems (too few
//! pre-period rows, missing predictor values), numerical breakdown of the
//! Kalman recursions, and wrapped panel/optimizer errors. It converts into
//! [`OptError`] so the log-likelihood can surface filter failures to the
//! optimizer, and into `PyErr` at the PyO3 boundary.
use chrono::NaiveDate;

use crate::{optimization::errors::OptError, panel::errors::PanelError};

#[cfg(feature = "python-bindings")]
use pyo3::{exceptions::PyValueError, PyErr};

/// Result alias for estimator operations that may produce [`EstimatorError`].
pub type EstimatorResult<T> = Result<T, EstimatorError>;

#[derive(Debug, Clone, PartialEq)]
pub enum EstimatorError {
    // ---- Design ----
    /// Fewer usable pre-period rows than `predictors + 2`.
    UnderdeterminedModel { observations: usize, predictors: usize },

    /// No control unit was supplied.
    NoControls,

    /// A control value needed for fitting or prediction is missing.
    MissingPredictor { unit: String, date: NaiveDate },

    /// The post-period panel does not start after the fitted pre-period.
    PostPeriodOverlap { last_pre: NaiveDate, first_post: NaiveDate },

    // ---- Options ----
    /// Ridge strength must be finite and > 0.
    InvalidRidge { value: f64 },

    /// A variance option must be finite and > 0.
    InvalidVariance { name: &'static str, value: f64 },

    // ---- Numerics ----
    /// A Kalman recursion or forecast produced a non-positive or non-finite
    /// variance, or the likelihood could not be evaluated anywhere.
    NumericalInstability { reason: String },

    // ---- Wrapped ----
    /// Panel lookup failed (unknown unit, empty slice, ...).
    Panel(PanelError),

    /// The optimizer rejected its configuration.
    Optimization(OptError),
}

impl std::error::Error for EstimatorError {}

impl std::fmt::Display for EstimatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- Design ----
            EstimatorError::UnderdeterminedModel { observations, predictors } => write!(
                f,
                "Underdetermined model: {observations} pre-period observations for \
                 {predictors} predictors (need at least {})",
                predictors + 2
            ),
            EstimatorError::NoControls => write!(f, "At least one control unit is required"),
            EstimatorError::MissingPredictor { unit, date } => {
                write!(f, "Missing control value for unit '{unit}' at {date}")
            }
            EstimatorError::PostPeriodOverlap { last_pre, first_post } => write!(
                f,
                "Post-period starts at {first_post}, not after the last pre-period date {last_pre}"
            ),

            // ---- Options ----
            EstimatorError::InvalidRidge { value } => {
                write!(f, "Invalid ridge strength {value}: must be finite and > 0")
            }
            EstimatorError::InvalidVariance { name, value } => {
                write!(f, "Invalid variance {name} = {value}: must be finite and > 0")
            }

            // ---- Numerics ----
            EstimatorError::NumericalInstability { reason } => {
                write!(f, "Numerical instability: {reason}")
            }

            // ---- Wrapped ----
            EstimatorError::Panel(err) => write!(f, "{err}"),
            EstimatorError::Optimization(err) => write!(f, "Optimizer error: {err}"),
        }
    }
}

impl From<PanelError> for EstimatorError {
    fn from(err: PanelError) -> Self {
        EstimatorError::Panel(err)
    }
}

impl From<OptError> for EstimatorError {
    fn from(err: OptError) -> Self {
        EstimatorError::Optimization(err)
    }
}

impl From<EstimatorError> for OptError {
    fn from(err: EstimatorError) -> Self {
        match err {
            EstimatorError::Optimization(inner) => inner,
            other => OptError::ModelEvaluation { text: other.to_string() },
        }
    }
}

#[cfg(feature = "python-bindings")]
impl std::convert::From<EstimatorError> for PyErr {
    fn from(err: EstimatorError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}
