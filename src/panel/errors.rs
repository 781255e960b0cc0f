//! Errors for panel alignment and pre/post partitioning.
//!
//! This module defines [`PanelError`], the error type returned by every
//! constructor and transform in [`crate::panel`], and [`InterventionIssue`],
//! the structured reason attached to [`PanelError::InvalidIntervention`].
//!
//! ## Conventions
//! - Row indices are **0-based** positions in the panel's date index.
//! - Dates are reported as `chrono::NaiveDate` so messages print ISO-8601.
//! - Missing cells (`None` in raw input, `NaN` in a [`Panel`](crate::panel::Panel))
//!   are never errors by themselves; only `±∞` is rejected as non-finite.
use chrono::NaiveDate;

#[cfg(feature = "python-bindings")]
use pyo3::{exceptions::PyValueError, PyErr};

/// Result alias for panel operations that may produce [`PanelError`].
pub type PanelResult<T> = Result<T, PanelError>;

/// Why an intervention date cannot split a panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterventionIssue {
    /// Intervention precedes the first date of the panel.
    BeforeFirstDate { first: NaiveDate },

    /// Intervention is later than the last date of the panel.
    AfterLastDate { last: NaiveDate },

    /// Fewer pre-period rows than the configured minimum.
    PrePeriodTooShort { rows: usize, required: usize },

    /// Fewer post-period rows than the configured minimum.
    PostPeriodTooShort { rows: usize, required: usize },
}

/// Unified error type for panel construction, alignment and partitioning.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelError {
    // ---- Data sufficiency ----
    /// A required unit has no usable observations after alignment.
    DataInsufficient { unit: String, reason: &'static str },

    /// Alignment left no control unit with data.
    NoControlUnits,

    /// Panel has no rows or no columns.
    EmptyPanel,

    // ---- Structure ----
    /// Value matrix does not match the date index and unit list.
    ShapeMismatch { expected: (usize, usize), found: (usize, usize) },

    /// Date index is not strictly increasing at `index`.
    UnsortedDates { index: usize, previous: NaiveDate, current: NaiveDate },

    /// The same date appears twice for one unit.
    DuplicateDate { unit: String, date: NaiveDate },

    /// The same unit name appears twice.
    DuplicateUnit { unit: String },

    /// A requested unit is not a column of the panel.
    UnknownUnit { unit: String },

    /// A value is `±∞`.
    NonFiniteValue { unit: String, date: NaiveDate, value: f64 },

    /// A requested date is not part of the index.
    DateNotFound { date: NaiveDate },

    // ---- Intervention / windows ----
    /// Intervention date cannot split the panel into usable periods.
    InvalidIntervention { intervention: NaiveDate, issue: InterventionIssue },

    /// Study windows are not ordered `pre_start ≤ pre_end < post_start ≤ post_end`.
    InvalidWindows { reason: &'static str },

    /// Minimum period length must be at least one row.
    InvalidMinimumLength { name: &'static str, value: usize },

    // ---- Rebasing ----
    /// Base value for an index rebase is missing or zero.
    InvalidBaseValue { unit: String, date: NaiveDate, value: f64 },
}

impl std::error::Error for PanelError {}

impl std::fmt::Display for InterventionIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterventionIssue::BeforeFirstDate { first } => {
                write!(f, "it precedes the first panel date {first}")
            }
            InterventionIssue::AfterLastDate { last } => {
                write!(f, "it is after the last panel date {last}")
            }
            InterventionIssue::PrePeriodTooShort { rows, required } => {
                write!(f, "pre-period has {rows} rows, at least {required} required")
            }
            InterventionIssue::PostPeriodTooShort { rows, required } => {
                write!(f, "post-period has {rows} rows, at least {required} required")
            }
        }
    }
}

impl std::fmt::Display for PanelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- Data sufficiency ----
            PanelError::DataInsufficient { unit, reason } => {
                write!(f, "Insufficient data for unit '{unit}': {reason}")
            }
            PanelError::NoControlUnits => {
                write!(f, "No control unit has observations after alignment")
            }
            PanelError::EmptyPanel => write!(f, "Panel has no rows or no columns"),

            // ---- Structure ----
            PanelError::ShapeMismatch { expected, found } => {
                write!(f, "Panel shape mismatch: expected {expected:?}, found {found:?}")
            }
            PanelError::UnsortedDates { index, previous, current } => {
                write!(
                    f,
                    "Dates must be strictly increasing: {current} at row {index} follows {previous}"
                )
            }
            PanelError::DuplicateDate { unit, date } => {
                write!(f, "Duplicate date {date} for unit '{unit}'")
            }
            PanelError::DuplicateUnit { unit } => write!(f, "Duplicate unit '{unit}'"),
            PanelError::UnknownUnit { unit } => write!(f, "Unknown unit '{unit}'"),
            PanelError::NonFiniteValue { unit, date, value } => {
                write!(f, "Non-finite value {value} for unit '{unit}' at {date}")
            }
            PanelError::DateNotFound { date } => write!(f, "Date {date} is not in the panel"),

            // ---- Intervention / windows ----
            PanelError::InvalidIntervention { intervention, issue } => {
                write!(f, "Invalid intervention date {intervention}: {issue}")
            }
            PanelError::InvalidWindows { reason } => write!(f, "Invalid study windows: {reason}"),
            PanelError::InvalidMinimumLength { name, value } => {
                write!(f, "Invalid minimum length {name} = {value}: must be at least 1")
            }

            // ---- Rebasing ----
            PanelError::InvalidBaseValue { unit, date, value } => {
                write!(f, "Cannot rebase unit '{unit}' at {date}: base value {value} is unusable")
            }
        }
    }
}

#[cfg(feature = "python-bindings")]
impl std::convert::From<PanelError> for PyErr {
    fn from(err: PanelError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // Display output for the intervention variants, which callers surface
    // verbatim in reports.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // The intervention message names both the date and the structured issue.
    //
    // Given
    // -----
    // - An intervention after the last panel date.
    //
    // Expect
    // ------
    // - Both dates appear in the rendered message.
    fn invalid_intervention_display_names_both_dates() {
        let intervention = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        let last = NaiveDate::from_ymd_opt(2019, 12, 1).unwrap();
        let err = PanelError::InvalidIntervention {
            intervention,
            issue: InterventionIssue::AfterLastDate { last },
        };

        let msg = err.to_string();

        assert!(msg.contains("2030-01-01"));
        assert!(msg.contains("2019-12-01"));
    }

    #[test]
    // Purpose
    // -------
    // Short pre-periods report both the observed and the required count.
    //
    // Given
    // -----
    // - `PrePeriodTooShort { rows: 3, required: 12 }`.
    //
    // Expect
    // ------
    // - "3" and "12" appear in the message.
    fn pre_period_too_short_display_reports_counts() {
        let issue = InterventionIssue::PrePeriodTooShort { rows: 3, required: 12 };

        let msg = issue.to_string();

        assert!(msg.contains("3 rows"));
        assert!(msg.contains("12 required"));
    }
}
