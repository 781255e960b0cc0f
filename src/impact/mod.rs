//! impact — effect estimates from observed values and a counterfactual path.
//!
//! Purpose
//! -------
//! Reduce a post-period panel and a [`PredictionPath`](crate::counterfactual::PredictionPath)
//! to point, cumulative, average, and relative effects with intervals, a
//! tail probability, and a significance flag.
//!
//! Key behaviors
//! -------------
//! - [`summarize`] / [`summarize_with`] validate date alignment and
//!   observation completeness, then compute effects at a caller-chosen
//!   confidence level and [`VarianceAggregation`].
//! - [`ImpactEstimate`] is `Serialize` and implements `Display` as a
//!   two-column text table.
//!
//! Conventions
//! -----------
//! - Intervals are normal approximations `± z·sd` with
//!   `z = Φ⁻¹(1 − α/2)`.

pub mod errors;
pub mod summary;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::errors::{ImpactResult, SummaryError};
pub use self::summary::{
    critical_value, summarize, summarize_with, EffectSummary, ImpactEstimate, Interval, PointEffect,
    RelativeEffect, VarianceAggregation, DEFAULT_CONFIDENCE_LEVEL,
};

// ---- Optional convenience prelude for downstream crates -------------------

pub mod prelude {
    pub use super::{
        summarize, summarize_with, ImpactEstimate, ImpactResult, Interval, SummaryError,
        VarianceAggregation,
    };
}
