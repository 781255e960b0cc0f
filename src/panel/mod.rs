//! panel — aligned treatment/control panels and pre/post partitioning.
//!
//! Purpose
//! -------
//! Own everything between raw per-unit observations and the matrices the
//! counterfactual estimator consumes: alignment onto a shared monthly index,
//! explicit missing-data policy, study windows, and the split at an
//! intervention date.
//!
//! Key behaviors
//! -------------
//! - [`align`] builds a [`Panel`] from [`RawSeries`] with the treatment unit
//!   in column 0.
//! - [`partition`] / [`partition_windows`] split a panel into pre- and
//!   post-period sub-panels with minimum-length checks.
//! - [`Panel`] carries small descriptive helpers (`indexed_to`, `value_at`,
//!   `slice_dates`) used by reporting code.
//!
//! Invariants & assumptions
//! ------------------------
//! - Panels are immutable once built; every transform returns a new panel.
//! - Missing values are `NaN` inside a panel and are never filled in.
//!
//! Downstream usage
//! ----------------
//! - `counterfactual::fit` reads the pre-period panel; `FittedModel::predict`
//!   reads only control columns of the post-period panel.
//! - `impact::summarize` reads the treatment column of the post-period panel.
//!
//! Testing notes
//! -------------
//! - Unit tests live next to each submodule; `partition` additionally carries
//!   a property test for the ordered-cover invariant.

pub mod align;
pub mod errors;
pub mod frame;
pub mod partition;
pub mod series;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::align::{align, month_start, AlignOptions, DatePolicy, MissingPolicy};
pub use self::errors::{InterventionIssue, PanelError, PanelResult};
pub use self::frame::Panel;
pub use self::partition::{
    partition, partition_windows, PartitionOptions, PartitionedPanel, StudyWindows,
};
pub use self::series::{Observation, RawSeries};

// ---- Optional convenience prelude for downstream crates -------------------

pub mod prelude {
    pub use super::{
        align, partition, partition_windows, AlignOptions, DatePolicy, InterventionIssue,
        MissingPolicy, Observation, Panel, PanelError, PanelResult, PartitionOptions,
        PartitionedPanel, RawSeries, StudyWindows,
    };
}
