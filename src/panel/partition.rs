//! Pre/post partitioning of a panel around an intervention date.
//!
//! Purpose
//! -------
//! Split an aligned [`Panel`] into the pre-period used for fitting and the
//! post-period used for prediction and effect measurement.
//!
//! Key behaviors
//! -------------
//! - [`partition`] splits at a single date: pre = `date < intervention`,
//!   post = `date >= intervention`.
//! - [`partition_windows`] first restricts the panel to explicit study windows
//!   and drops any gap rows between `pre_end` and `post_start`.
//! - Both enforce minimum period lengths from [`PartitionOptions`].
//!
//! Invariants & assumptions
//! ------------------------
//! - For [`partition`], `pre ∪ post` equals the input rows exactly, with no
//!   duplicates and order preserved.
//! - Neither side of a successful partition is empty.
use chrono::NaiveDate;

use crate::panel::{
    errors::{InterventionIssue, PanelError, PanelResult},
    frame::Panel,
};

/// Default minimum number of pre-period rows.
pub const DEFAULT_MIN_PRE_ROWS: usize = 12;

/// Default minimum number of post-period rows.
pub const DEFAULT_MIN_POST_ROWS: usize = 1;

/// Minimum period lengths for a usable split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionOptions {
    pub min_pre_rows: usize,
    pub min_post_rows: usize,
}

impl PartitionOptions {
    /// Errors
    /// ------
    /// - `PanelError::InvalidMinimumLength` when either minimum is zero.
    pub fn new(min_pre_rows: usize, min_post_rows: usize) -> PanelResult<Self> {
        if min_pre_rows == 0 {
            return Err(PanelError::InvalidMinimumLength { name: "min_pre_rows", value: 0 });
        }
        if min_post_rows == 0 {
            return Err(PanelError::InvalidMinimumLength { name: "min_post_rows", value: 0 });
        }
        Ok(PartitionOptions { min_pre_rows, min_post_rows })
    }
}

impl Default for PartitionOptions {
    fn default() -> Self {
        PartitionOptions {
            min_pre_rows: DEFAULT_MIN_PRE_ROWS,
            min_post_rows: DEFAULT_MIN_POST_ROWS,
        }
    }
}

/// Explicit study windows `[pre_start, pre_end]` and `[post_start, post_end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StudyWindows {
    pub pre_start: NaiveDate,
    pub pre_end: NaiveDate,
    pub post_start: NaiveDate,
    pub post_end: NaiveDate,
}

impl StudyWindows {
    /// Errors
    /// ------
    /// - `PanelError::InvalidWindows` unless
    ///   `pre_start <= pre_end < post_start <= post_end`.
    pub fn new(
        pre_start: NaiveDate, pre_end: NaiveDate, post_start: NaiveDate, post_end: NaiveDate,
    ) -> PanelResult<Self> {
        if pre_start > pre_end {
            return Err(PanelError::InvalidWindows { reason: "pre_start is after pre_end" });
        }
        if pre_end >= post_start {
            return Err(PanelError::InvalidWindows { reason: "pre_end must precede post_start" });
        }
        if post_start > post_end {
            return Err(PanelError::InvalidWindows { reason: "post_start is after post_end" });
        }
        Ok(StudyWindows { pre_start, pre_end, post_start, post_end })
    }
}

/// A panel split into pre- and post-intervention rows.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionedPanel {
    pub pre: Panel,
    pub post: Panel,
    pub intervention: NaiveDate,
}

/// Split `panel` at `intervention`.
///
/// Parameters
/// ----------
/// - `panel`: `&Panel`
/// - `intervention`: `NaiveDate`
///   First post-period date (need not be a panel date).
/// - `opts`: `&PartitionOptions`
///
/// Errors
/// ------
/// - `PanelError::InvalidIntervention` when the date is outside
///   `[first_date, last_date]` or a side is shorter than its minimum.
pub fn partition(
    panel: &Panel, intervention: NaiveDate, opts: &PartitionOptions,
) -> PanelResult<PartitionedPanel> {
    check_in_range(panel, intervention)?;
    let split = panel.lower_bound(intervention);
    split_at(panel, split, panel.n_rows(), intervention, opts)
}

/// Restrict `panel` to `windows` and split at `windows.post_start`.
///
/// Rows between `pre_end` and `post_start` are dropped; they belong to
/// neither period.
///
/// Errors
/// ------
/// - Same as [`partition`], evaluated on the windowed rows.
pub fn partition_windows(
    panel: &Panel, windows: &StudyWindows, opts: &PartitionOptions,
) -> PanelResult<PartitionedPanel> {
    check_in_range(panel, windows.post_start)?;
    let pre_lo = panel.lower_bound(windows.pre_start);
    let pre_hi = panel.dates().partition_point(|d| *d <= windows.pre_end);
    let post_lo = panel.lower_bound(windows.post_start);
    let post_hi = panel.dates().partition_point(|d| *d <= windows.post_end);

    let pre_rows = pre_hi.saturating_sub(pre_lo);
    let post_rows = post_hi.saturating_sub(post_lo);
    check_lengths(pre_rows, post_rows, windows.post_start, opts)?;

    Ok(PartitionedPanel {
        pre: panel.slice_rows(pre_lo..pre_hi)?,
        post: panel.slice_rows(post_lo..post_hi)?,
        intervention: windows.post_start,
    })
}

fn check_in_range(panel: &Panel, intervention: NaiveDate) -> PanelResult<()> {
    if intervention < panel.first_date() {
        return Err(PanelError::InvalidIntervention {
            intervention,
            issue: InterventionIssue::BeforeFirstDate { first: panel.first_date() },
        });
    }
    if intervention > panel.last_date() {
        return Err(PanelError::InvalidIntervention {
            intervention,
            issue: InterventionIssue::AfterLastDate { last: panel.last_date() },
        });
    }
    Ok(())
}

fn check_lengths(
    pre_rows: usize, post_rows: usize, intervention: NaiveDate, opts: &PartitionOptions,
) -> PanelResult<()> {
    if pre_rows < opts.min_pre_rows.max(1) {
        return Err(PanelError::InvalidIntervention {
            intervention,
            issue: InterventionIssue::PrePeriodTooShort {
                rows: pre_rows,
                required: opts.min_pre_rows.max(1),
            },
        });
    }
    if post_rows < opts.min_post_rows.max(1) {
        return Err(PanelError::InvalidIntervention {
            intervention,
            issue: InterventionIssue::PostPeriodTooShort {
                rows: post_rows,
                required: opts.min_post_rows.max(1),
            },
        });
    }
    Ok(())
}

fn split_at(
    panel: &Panel, split: usize, end: usize, intervention: NaiveDate, opts: &PartitionOptions,
) -> PanelResult<PartitionedPanel> {
    check_lengths(split, end - split, intervention, opts)?;
    Ok(PartitionedPanel {
        pre: panel.slice_rows(0..split)?,
        post: panel.slice_rows(split..end)?,
        intervention,
    })
}
