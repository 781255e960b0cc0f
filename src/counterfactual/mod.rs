//! counterfactual — structural time-series estimate of the untreated path.
//!
//! Purpose
//! -------
//! Estimate what the treatment unit would have done without the intervention:
//! fit a local-level (or local-linear-trend) model with a ridge-regularized
//! regression on control units over the pre-period, then forecast the
//! post-period from post-period controls alone.
//!
//! Key behaviors
//! -------------
//! - [`fit`] standardizes, estimates structural variances by maximum
//!   likelihood (or takes them fixed), and runs the Kalman filter.
//! - [`FittedModel::predict`] returns a [`PredictionPath`] of means and
//!   predictive standard deviations that include coefficient, trend, and
//!   observation uncertainty.
//!
//! Invariants & assumptions
//! ------------------------
//! - Coefficients and variances are learned from pre-period rows only.
//! - Forecasts read control columns only.
//! - Everything is deterministic; no random numbers are drawn.
//!
//! Conventions
//! -----------
//! - Internal computation is in standardized units; every public output is
//!   in original units except [`FittedModel::variances`].
//!
//! Testing notes
//! -------------
//! - `state_space` tests the recursions with fixed variances; `likelihood`
//!   the parameter maps; `model` the public operations end to end.

pub mod design;
pub mod errors;
pub mod likelihood;
pub mod model;
pub mod options;
pub mod state_space;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::design::{Scaling, Standardizer};
pub use self::errors::{EstimatorError, EstimatorResult};
pub use self::model::{fit, FittedModel, PredictionPath};
pub use self::options::{
    EstimatorOptions, Hyperparameters, StructuralVariances, TrendKind, DEFAULT_DIFFUSE_VARIANCE,
    DEFAULT_RIDGE, DEFAULT_VARIANCE_FLOOR,
};

// ---- Optional convenience prelude for downstream crates -------------------

pub mod prelude {
    pub use super::{
        fit, EstimatorError, EstimatorOptions, EstimatorResult, FittedModel, Hyperparameters,
        PredictionPath, StructuralVariances, TrendKind,
    };
}
