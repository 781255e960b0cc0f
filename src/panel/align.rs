//! Alignment of raw per-unit series onto a shared date index.
//!
//! Purpose
//! -------
//! Turn a heterogeneous set of [`RawSeries`] (different start dates, gaps,
//! month-start vs month-end stamps) into a single [`Panel`] with the treatment
//! unit in column 0 and the surviving controls after it.
//!
//! Key behaviors
//! -------------
//! - Optionally snaps every date to the first day of its month so sources that
//!   stamp month-end and month-start line up.
//! - Builds the shared index as the union or the intersection of unit dates
//!   ([`DatePolicy`]).
//! - Applies an explicit [`MissingPolicy`]: drop incomplete rows, or keep them
//!   as `NaN` for the caller to inspect. Values are never interpolated.
//! - Drops control units with no observed value and logs each drop at `warn`.
//!
//! Invariants & assumptions
//! ------------------------
//! - Unit names are unique across the input; dates are unique per unit after
//!   normalization.
//! - The output always has the treatment column and at least one control.
//!
//! Testing notes
//! -------------
//! - Unit tests cover both date policies, both missing policies, month
//!   normalization, and every data-insufficiency path.
use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::panel::{
    errors::{PanelError, PanelResult},
    frame::Panel,
    series::RawSeries,
};

/// How the shared date index is built from per-unit dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DatePolicy {
    /// Every date seen in any unit; absent cells become missing.
    #[default]
    Union,
    /// Only dates where every unit has an observed value.
    Intersection,
}

/// What to do with rows that still contain a missing cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MissingPolicy {
    /// Remove the row entirely.
    #[default]
    DropIncompleteRows,
    /// Keep the row with `NaN` cells; see [`Panel::incomplete_rows`].
    Flag,
}

/// Options for [`align`].
///
/// Fields
/// ------
/// - `treatment_unit`: name of the unit placed in column 0.
/// - `date_policy`: index construction, defaults to [`DatePolicy::Union`].
/// - `missing_policy`: defaults to [`MissingPolicy::DropIncompleteRows`].
/// - `normalize_to_month_start`: snap dates to day 1, defaults to `true`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignOptions {
    pub treatment_unit: String,
    pub date_policy: DatePolicy,
    pub missing_policy: MissingPolicy,
    pub normalize_to_month_start: bool,
}

impl AlignOptions {
    pub fn new(treatment_unit: impl Into<String>) -> Self {
        AlignOptions {
            treatment_unit: treatment_unit.into(),
            date_policy: DatePolicy::default(),
            missing_policy: MissingPolicy::default(),
            normalize_to_month_start: true,
        }
    }

    pub fn with_date_policy(mut self, policy: DatePolicy) -> Self {
        self.date_policy = policy;
        self
    }

    pub fn with_missing_policy(mut self, policy: MissingPolicy) -> Self {
        self.missing_policy = policy;
        self
    }

    pub fn with_month_normalization(mut self, normalize: bool) -> Self {
        self.normalize_to_month_start = normalize;
        self
    }
}

/// Align raw series into a [`Panel`].
///
/// Parameters
/// ----------
/// - `series`: `&[RawSeries]`
///   Treatment and control series in any order; controls keep their relative
///   order in the output.
/// - `opts`: `&AlignOptions`
///
/// Returns
/// -------
/// `PanelResult<Panel>` with columns `[treatment, controls...]`.
///
/// Errors
/// ------
/// - `PanelError::DuplicateUnit` / `PanelError::UnknownUnit` (treatment absent).
/// - `PanelError::DuplicateDate` for a repeated date within a unit.
/// - `PanelError::NonFiniteValue` for `±∞` input.
/// - `PanelError::DataInsufficient` when the treatment has no observed value or
///   no row survives alignment.
/// - `PanelError::NoControlUnits` when every control is empty.
pub fn align(series: &[RawSeries], opts: &AlignOptions) -> PanelResult<Panel> {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for s in series {
        if !seen.insert(s.unit.as_str()) {
            return Err(PanelError::DuplicateUnit { unit: s.unit.clone() });
        }
    }

    let treatment = series
        .iter()
        .find(|s| s.unit == opts.treatment_unit)
        .ok_or_else(|| PanelError::UnknownUnit { unit: opts.treatment_unit.clone() })?;
    if treatment.observed_count() == 0 {
        return Err(PanelError::DataInsufficient {
            unit: treatment.unit.clone(),
            reason: "treatment series has no observed values",
        });
    }

    let mut columns: Vec<(String, BTreeMap<NaiveDate, f64>)> = Vec::with_capacity(series.len());
    columns.push((treatment.unit.clone(), to_cells(treatment, opts.normalize_to_month_start)?));
    for s in series.iter().filter(|s| s.unit != opts.treatment_unit) {
        if s.observed_count() == 0 {
            warn!(unit = %s.unit, "dropping control unit without observed values");
            continue;
        }
        columns.push((s.unit.clone(), to_cells(s, opts.normalize_to_month_start)?));
    }
    if columns.len() < 2 {
        return Err(PanelError::NoControlUnits);
    }

    let dates: Vec<NaiveDate> = match opts.date_policy {
        DatePolicy::Union => {
            columns.iter().flat_map(|(_, cells)| cells.keys().copied()).collect::<BTreeSet<_>>()
        }
        DatePolicy::Intersection => {
            let (_, first) = &columns[0];
            first
                .iter()
                .filter(|(_, v)| !v.is_nan())
                .map(|(d, _)| *d)
                .filter(|d| {
                    columns[1..].iter().all(|(_, cells)| cells.get(d).is_some_and(|v| !v.is_nan()))
                })
                .collect::<BTreeSet<_>>()
        }
    }
    .into_iter()
    .collect();

    if dates.is_empty() {
        return Err(PanelError::DataInsufficient {
            unit: treatment.unit.clone(),
            reason: "no dates survive alignment",
        });
    }

    let mut values = Array2::from_elem((dates.len(), columns.len()), f64::NAN);
    for (j, (_, cells)) in columns.iter().enumerate() {
        for (i, date) in dates.iter().enumerate() {
            if let Some(&v) = cells.get(date) {
                values[[i, j]] = v;
            }
        }
    }
    let units = columns.into_iter().map(|(u, _)| u).collect();
    let panel = Panel::new(dates, units, values)?;

    let panel = match opts.missing_policy {
        MissingPolicy::Flag => panel,
        MissingPolicy::DropIncompleteRows => {
            panel.drop_incomplete_rows().map_err(|_| PanelError::DataInsufficient {
                unit: treatment.unit.clone(),
                reason: "every aligned row has a missing value",
            })?
        }
    };

    debug!(
        rows = panel.n_rows(),
        units = panel.n_units(),
        first = %panel.first_date(),
        last = %panel.last_date(),
        "aligned panel"
    );
    Ok(panel)
}

/// Snap `date` to the first day of its month.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
}

fn to_cells(series: &RawSeries, normalize: bool) -> PanelResult<BTreeMap<NaiveDate, f64>> {
    let mut cells = BTreeMap::new();
    for obs in &series.observations {
        let date = if normalize { month_start(obs.date) } else { obs.date };
        let value = obs.value.unwrap_or(f64::NAN);
        if value.is_infinite() {
            return Err(PanelError::NonFiniteValue { unit: series.unit.clone(), date, value });
        }
        if cells.insert(date, value).is_some() {
            return Err(PanelError::DuplicateDate { unit: series.unit.clone(), date });
        }
    }
    Ok(cells)
}
