//! Aligned multi-unit panel over a shared monthly date index.
//!
//! Purpose
//! -------
//! Provide the validated container every later stage reads from: one strictly
//! increasing date index, one named column per unit, and a dense value matrix
//! in which `NaN` marks a missing cell.
//!
//! Key behaviors
//! -------------
//! - [`Panel::new`] enforces shape, ordering, uniqueness and finiteness.
//! - Column/row views (`column`, `select_units`, `slice_dates`) never copy more
//!   than the requested sub-panel.
//! - Missing-data helpers (`incomplete_rows`, `drop_incomplete_rows`) make
//!   missingness explicit instead of filling it.
//! - [`Panel::indexed_to`] rebases every column to 100 at a base date for
//!   trend comparisons across units of very different size.
//!
//! Invariants & assumptions
//! ------------------------
//! - `values.nrows() == dates.len()` and `values.ncols() == units.len()`.
//! - Dates are strictly increasing; units are unique.
//! - Every cell is finite or `NaN`; `±∞` never enters a panel.
//! - A panel is never empty (at least one row and one column).
//!
//! Conventions
//! -----------
//! - Rows are dates, columns are units; row indices are 0-based.
//! - After [`align`](crate::panel::align) the treatment unit is column 0, but
//!   [`Panel`] itself does not assign roles to columns. Callers name units.
//!
//! Testing notes
//! -------------
//! - Unit tests cover construction failures, sub-panel selection, missing-row
//!   handling and rebasing.
use std::ops::Range;

use chrono::NaiveDate;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::panel::errors::{PanelError, PanelResult};

/// `Panel` — validated date × unit matrix.
///
/// Fields
/// ------
/// - `dates`: `Vec<NaiveDate>`
///   Strictly increasing row index.
/// - `units`: `Vec<String>`
///   Unique column names.
/// - `values`: `Array2<f64>`
///   `dates.len() × units.len()` matrix; `NaN` = missing.
///
/// Performance
/// -----------
/// - Construction is O(rows × cols); lookups by date use binary search.
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    dates: Vec<NaiveDate>,
    units: Vec<String>,
    values: Array2<f64>,
}

impl Panel {
    /// Construct a validated [`Panel`].
    ///
    /// Errors
    /// ------
    /// - `PanelError::EmptyPanel` when there are no dates or no units.
    /// - `PanelError::ShapeMismatch` when `values` does not match the index.
    /// - `PanelError::UnsortedDates` at the first non-increasing date.
    /// - `PanelError::DuplicateUnit` for a repeated unit name.
    /// - `PanelError::NonFiniteValue` for the first `±∞` cell.
    pub fn new(
        dates: Vec<NaiveDate>, units: Vec<String>, values: Array2<f64>,
    ) -> PanelResult<Self> {
        if dates.is_empty() || units.is_empty() {
            return Err(PanelError::EmptyPanel);
        }
        if values.dim() != (dates.len(), units.len()) {
            return Err(PanelError::ShapeMismatch {
                expected: (dates.len(), units.len()),
                found: values.dim(),
            });
        }
        for (index, pair) in dates.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(PanelError::UnsortedDates {
                    index: index + 1,
                    previous: pair[0],
                    current: pair[1],
                });
            }
        }
        for (i, unit) in units.iter().enumerate() {
            if units[..i].contains(unit) {
                return Err(PanelError::DuplicateUnit { unit: unit.clone() });
            }
        }
        for ((row, col), &value) in values.indexed_iter() {
            if value.is_infinite() {
                return Err(PanelError::NonFiniteValue {
                    unit: units[col].clone(),
                    date: dates[row],
                    value,
                });
            }
        }
        Ok(Panel { dates, units, values })
    }

    /// Build a panel from named columns that share `dates`.
    pub fn from_columns(
        dates: Vec<NaiveDate>, columns: Vec<(String, Vec<f64>)>,
    ) -> PanelResult<Self> {
        let n_rows = dates.len();
        let n_cols = columns.len();
        let mut values = Array2::from_elem((n_rows, n_cols), f64::NAN);
        let mut units = Vec::with_capacity(n_cols);
        for (j, (unit, col)) in columns.into_iter().enumerate() {
            if col.len() != n_rows {
                return Err(PanelError::ShapeMismatch {
                    expected: (n_rows, n_cols),
                    found: (col.len(), n_cols),
                });
            }
            values.column_mut(j).assign(&Array1::from(col));
            units.push(unit);
        }
        Panel::new(dates, units, values)
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn units(&self) -> &[String] {
        &self.units
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn n_rows(&self) -> usize {
        self.dates.len()
    }

    pub fn n_units(&self) -> usize {
        self.units.len()
    }

    pub fn first_date(&self) -> NaiveDate {
        self.dates[0]
    }

    pub fn last_date(&self) -> NaiveDate {
        self.dates[self.dates.len() - 1]
    }

    /// Column position of `unit`.
    ///
    /// Errors
    /// ------
    /// - `PanelError::UnknownUnit` when `unit` is not a column.
    pub fn unit_index(&self, unit: &str) -> PanelResult<usize> {
        self.units
            .iter()
            .position(|u| u == unit)
            .ok_or_else(|| PanelError::UnknownUnit { unit: unit.to_string() })
    }

    /// Row position of `date`, if present.
    pub fn row_of(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    /// Index of the first row whose date is `>= date` (may equal `n_rows`).
    pub fn lower_bound(&self, date: NaiveDate) -> usize {
        self.dates.partition_point(|d| *d < date)
    }

    /// View of one unit's values over all dates.
    pub fn column(&self, unit: &str) -> PanelResult<ArrayView1<'_, f64>> {
        let j = self.unit_index(unit)?;
        Ok(self.values.column(j))
    }

    /// Value of `unit` at `date`; `Ok(None)` for a missing cell.
    ///
    /// Errors
    /// ------
    /// - `PanelError::UnknownUnit` / `PanelError::DateNotFound`.
    pub fn value_at(&self, unit: &str, date: NaiveDate) -> PanelResult<Option<f64>> {
        let j = self.unit_index(unit)?;
        let i = self.row_of(date).ok_or(PanelError::DateNotFound { date })?;
        let v = self.values[[i, j]];
        Ok(if v.is_nan() { None } else { Some(v) })
    }

    /// Sub-panel with the given units, in the given order.
    pub fn select_units<S: AsRef<str>>(&self, units: &[S]) -> PanelResult<Panel> {
        let mut indices = Vec::with_capacity(units.len());
        for unit in units {
            indices.push(self.unit_index(unit.as_ref())?);
        }
        let names = indices.iter().map(|&j| self.units[j].clone()).collect();
        Panel::new(self.dates.clone(), names, self.values.select(Axis(1), &indices))
    }

    /// Contiguous row range as a new panel.
    ///
    /// Callers guarantee `rows` is within bounds; an empty range yields
    /// `PanelError::EmptyPanel`.
    pub(crate) fn slice_rows(&self, rows: Range<usize>) -> PanelResult<Panel> {
        let dates = self.dates[rows.clone()].to_vec();
        let values = self.values.slice(s![rows, ..]).to_owned();
        Panel::new(dates, self.units.clone(), values)
    }

    /// Rows with `start <= date <= end`.
    ///
    /// Errors
    /// ------
    /// - `PanelError::EmptyPanel` when no date falls in the window.
    pub fn slice_dates(&self, start: NaiveDate, end: NaiveDate) -> PanelResult<Panel> {
        let lo = self.lower_bound(start);
        let hi = self.dates.partition_point(|d| *d <= end);
        if lo >= hi {
            return Err(PanelError::EmptyPanel);
        }
        self.slice_rows(lo..hi)
    }

    /// Row indices with at least one missing cell.
    pub fn incomplete_rows(&self) -> Vec<usize> {
        self.values
            .axis_iter(Axis(0))
            .enumerate()
            .filter(|(_, row)| row.iter().any(|v| v.is_nan()))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn has_missing(&self) -> bool {
        self.values.iter().any(|v| v.is_nan())
    }

    /// Copy of the panel without rows that contain a missing cell.
    ///
    /// Errors
    /// ------
    /// - `PanelError::EmptyPanel` when every row is incomplete.
    pub fn drop_incomplete_rows(&self) -> PanelResult<Panel> {
        let keep: Vec<usize> = (0..self.n_rows())
            .filter(|&i| self.values.row(i).iter().all(|v| !v.is_nan()))
            .collect();
        if keep.len() == self.n_rows() {
            return Ok(self.clone());
        }
        if keep.is_empty() {
            return Err(PanelError::EmptyPanel);
        }
        let dates = keep.iter().map(|&i| self.dates[i]).collect();
        Panel::new(dates, self.units.clone(), self.values.select(Axis(0), &keep))
    }

    /// Rebase every column to 100 at `base`.
    ///
    /// Errors
    /// ------
    /// - `PanelError::DateNotFound` when `base` is not a row.
    /// - `PanelError::InvalidBaseValue` when a base cell is missing or zero.
    pub fn indexed_to(&self, base: NaiveDate) -> PanelResult<Panel> {
        let i = self.row_of(base).ok_or(PanelError::DateNotFound { date: base })?;
        let mut values = self.values.clone();
        for (j, mut col) in values.axis_iter_mut(Axis(1)).enumerate() {
            let b = col[i];
            if b.is_nan() || b == 0.0 {
                return Err(PanelError::InvalidBaseValue {
                    unit: self.units[j].clone(),
                    date: base,
                    value: b,
                });
            }
            col.mapv_inplace(|v| v / b * 100.0);
        }
        Panel::new(self.dates.clone(), self.units.clone(), values)
    }
}
