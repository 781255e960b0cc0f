//! Descriptive growth table: unit values at anchor dates and the percentage
//! change between consecutive anchors.
use chrono::NaiveDate;
use serde::Serialize;

use crate::panel::{Panel, PanelError, PanelResult};

/// One unit's row of a [`GrowthTable`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthRow {
    pub unit: String,
    /// Value at each anchor; `None` where missing.
    pub values: Vec<Option<f64>>,
    /// `%` change from anchor `i` to `i + 1`; `None` if either value is
    /// missing or the earlier one is 0.
    pub changes: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthTable {
    pub anchors: Vec<NaiveDate>,
    pub rows: Vec<GrowthRow>,
}

/// Build a [`GrowthTable`] for every unit of `panel`.
///
/// Errors
/// ------
/// - `PanelError::InvalidWindows` when `anchors` is empty or not strictly
///   increasing.
/// - `PanelError::DateNotFound` for an anchor that is not a panel date.
pub fn growth_table(panel: &Panel, anchors: &[NaiveDate]) -> PanelResult<GrowthTable> {
    if anchors.is_empty() {
        return Err(PanelError::InvalidWindows { reason: "growth table needs at least one anchor" });
    }
    if anchors.windows(2).any(|w| w[0] >= w[1]) {
        return Err(PanelError::InvalidWindows {
            reason: "growth anchors must be strictly increasing",
        });
    }

    let mut rows = Vec::with_capacity(panel.n_units());
    for unit in panel.units() {
        let values = anchors
            .iter()
            .map(|&d| panel.value_at(unit, d))
            .collect::<PanelResult<Vec<_>>>()?;
        let changes = values
            .windows(2)
            .map(|w| match (w[0], w[1]) {
                (Some(a), Some(b)) if a != 0.0 => Some((b - a) / a * 100.0),
                _ => None,
            })
            .collect();
        rows.push(GrowthRow { unit: unit.clone(), values, changes });
    }
    Ok(GrowthTable { anchors: anchors.to_vec(), rows })
}
