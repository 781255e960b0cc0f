//! Raw per-unit series as delivered by a data source.
//!
//! A [`RawSeries`] is the unaligned input to [`align`](crate::panel::align):
//! one unit name plus its `(date, value)` observations in any order. Missing
//! observations are explicit `None`s (a source reporting "-" or an empty cell).
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One `(date, value)` observation; `value == None` marks a missing cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

impl Observation {
    pub fn new(date: NaiveDate, value: Option<f64>) -> Self {
        Observation { date, value }
    }

    /// `true` when a value is present and not `NaN`.
    pub fn is_observed(&self) -> bool {
        matches!(self.value, Some(v) if !v.is_nan())
    }
}

/// Unaligned observations for a single unit (metro area, zip code, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSeries {
    pub unit: String,
    pub observations: Vec<Observation>,
}

impl RawSeries {
    pub fn new(unit: impl Into<String>, observations: Vec<Observation>) -> Self {
        RawSeries { unit: unit.into(), observations }
    }

    /// Build a fully observed series from `(date, value)` pairs.
    pub fn from_pairs(
        unit: impl Into<String>, pairs: impl IntoIterator<Item = (NaiveDate, f64)>,
    ) -> Self {
        let observations = pairs.into_iter().map(|(d, v)| Observation::new(d, Some(v))).collect();
        RawSeries { unit: unit.into(), observations }
    }

    /// Number of observations carrying a usable value.
    pub fn observed_count(&self) -> usize {
        self.observations.iter().filter(|o| o.is_observed()).count()
    }
}
