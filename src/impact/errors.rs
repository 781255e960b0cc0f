//! Errors for turning predictions and observations into effect summaries.
use chrono::NaiveDate;

use crate::panel::errors::PanelError;

#[cfg(feature = "python-bindings")]
use pyo3::{exceptions::PyValueError, PyErr};

/// Result alias for summarizer operations.
pub type ImpactResult<T> = Result<T, SummaryError>;

#[derive(Debug, Clone, PartialEq)]
pub enum SummaryError {
    // ---- Inputs ----
    /// Confidence level must lie strictly between 0 and 1.
    InvalidConfidenceLevel { value: f64 },

    /// No post-period rows to summarize.
    EmptyPostPeriod,

    /// Prediction vectors disagree in length with each other or the panel.
    LengthMismatch { dates: usize, means: usize, sds: usize, panel_rows: usize },

    /// Prediction date differs from the post-period panel at `index`.
    DateMismatch { index: usize, expected: NaiveDate, found: NaiveDate },

    /// The treatment value is missing on a post-period date.
    MissingObservation { date: NaiveDate },

    /// A predictive standard deviation is non-finite or not > 0.
    DegenerateVariance { date: NaiveDate, sd: f64 },

    /// Joint aggregation needs a finite, positive sd of the summed forecast.
    JointVarianceUnavailable { sum_sd: Option<f64> },

    // ---- Backend ----
    /// The normal distribution could not be built or inverted.
    Distribution { text: String },

    /// Panel lookup failed.
    Panel(PanelError),
}

impl std::error::Error for SummaryError {}

impl std::fmt::Display for SummaryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- Inputs ----
            SummaryError::InvalidConfidenceLevel { value } => {
                write!(f, "Invalid confidence level {value}: must be in (0, 1)")
            }
            SummaryError::EmptyPostPeriod => write!(f, "Post-period has no rows to summarize"),
            SummaryError::LengthMismatch { dates, means, sds, panel_rows } => write!(
                f,
                "Prediction length mismatch: {dates} dates, {means} means, {sds} sds for \
                 {panel_rows} post-period rows"
            ),
            SummaryError::DateMismatch { index, expected, found } => write!(
                f,
                "Prediction date mismatch at row {index}: expected {expected}, found {found}"
            ),
            SummaryError::MissingObservation { date } => {
                write!(f, "Missing treatment observation at {date}")
            }
            SummaryError::DegenerateVariance { date, sd } => {
                write!(f, "Degenerate predictive sd {sd} at {date}: must be finite and > 0")
            }
            SummaryError::JointVarianceUnavailable { sum_sd: Some(sd) } => {
                write!(f, "Degenerate sd of the summed forecast {sd}: must be finite and > 0")
            }
            SummaryError::JointVarianceUnavailable { sum_sd: None } => {
                write!(f, "Joint aggregation requested but the prediction has no summed sd")
            }

            // ---- Backend ----
            SummaryError::Distribution { text } => write!(f, "Normal distribution error: {text}"),
            SummaryError::Panel(err) => write!(f, "{err}"),
        }
    }
}

impl From<PanelError> for SummaryError {
    fn from(err: PanelError) -> Self {
        SummaryError::Panel(err)
    }
}

#[cfg(feature = "python-bindings")]
impl std::convert::From<SummaryError> for PyErr {
    fn from(err: SummaryError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}
