//! Counterfactual estimator options.
//!
//! Purpose
//! -------
//! Collect the knobs of the structural time-series counterfactual in one
//! validated struct: trend component, ridge strength on the regression
//! coefficients, standardization, diffuse prior scale, variance floor, and
//! whether the structural variances are estimated or fixed.
//!
//! Invariants & assumptions
//! ------------------------
//! - `ridge`, `diffuse_variance` and `variance_floor` are finite and > 0 once
//!   [`EstimatorOptions::new`] has accepted them.
//! - Fixed [`StructuralVariances`] are expressed in the (possibly
//!   standardized) units the filter runs in.
//!
//! Conventions
//! -----------
//! - `ridge = λ` sets the coefficient prior `β ~ N(0, λ⁻¹ I)`. With
//!   standardization on (default) this is a scale-free shrinkage.
//! - Variances in the model are `variance_floor + softplus(θ)` during
//!   estimation, so estimates never fall below the floor.
//!
//! Testing notes
//! -------------
//! - Unit tests cover validation of each numeric field and the defaults.
use serde::{Deserialize, Serialize};

use crate::{
    counterfactual::errors::{EstimatorError, EstimatorResult},
    optimization::MLEOptions,
};

/// Default ridge strength (prior precision of standardized coefficients).
pub const DEFAULT_RIDGE: f64 = 1e-2;

/// Default prior variance for diffuse trend states.
pub const DEFAULT_DIFFUSE_VARIANCE: f64 = 1e6;

/// Default lower bound for every estimated variance.
pub const DEFAULT_VARIANCE_FLOOR: f64 = 1e-6;

/// Trend component of the structural model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrendKind {
    /// Random-walk level `μ_{t+1} = μ_t + η_t`.
    #[default]
    LocalLevel,
    /// Level plus random-walk slope `δ`.
    LocalLinearTrend,
}

impl TrendKind {
    /// Number of trend states (level, optional slope).
    pub fn n_states(self) -> usize {
        match self {
            TrendKind::LocalLevel => 1,
            TrendKind::LocalLinearTrend => 2,
        }
    }

    /// Leading observations whose likelihood contribution is dominated by the
    /// diffuse prior and therefore skipped.
    pub fn diffuse_steps(self) -> usize {
        self.n_states()
    }
}

/// Noise variances of the structural model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructuralVariances {
    /// `σ²_obs`, observation noise.
    pub observation: f64,
    /// `σ²_level`, level innovation.
    pub level: f64,
    /// `σ²_slope`, slope innovation (ignored for [`TrendKind::LocalLevel`]).
    pub slope: f64,
}

impl StructuralVariances {
    /// Errors
    /// ------
    /// - `EstimatorError::InvalidVariance` for a non-finite or non-positive value.
    pub fn new(observation: f64, level: f64, slope: f64) -> EstimatorResult<Self> {
        for (name, value) in [("observation", observation), ("level", level), ("slope", slope)] {
            check_positive(name, value)?;
        }
        Ok(StructuralVariances { observation, level, slope })
    }

    /// Drop the slope variance when `trend` has no slope state.
    pub fn for_trend(self, trend: TrendKind) -> Self {
        match trend {
            TrendKind::LocalLevel => StructuralVariances { slope: 0.0, ..self },
            TrendKind::LocalLinearTrend => self,
        }
    }
}

/// How the structural variances are obtained.
#[derive(Debug, Clone, PartialEq)]
pub enum Hyperparameters {
    /// Maximize the pre-period prediction-error likelihood with L-BFGS.
    MaximumLikelihood(MLEOptions),
    /// Use the given variances as-is.
    Fixed(StructuralVariances),
}

/// `EstimatorOptions` — configuration for [`fit`](crate::counterfactual::fit).
///
/// Fields
/// ------
/// - `trend`: [`TrendKind`], default local level.
/// - `ridge`: coefficient prior precision, default `1e-2`.
/// - `standardize`: z-score response and controls with pre-period moments,
///   default `true`.
/// - `diffuse_variance`: prior variance of trend states, default `1e6`.
/// - `variance_floor`: lower bound for estimated variances, default `1e-6`.
/// - `hyperparameters`: [`Hyperparameters`], default maximum likelihood with
///   [`MLEOptions::default`].
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorOptions {
    pub trend: TrendKind,
    pub ridge: f64,
    pub standardize: bool,
    pub diffuse_variance: f64,
    pub variance_floor: f64,
    pub hyperparameters: Hyperparameters,
}

impl EstimatorOptions {
    /// Build validated options.
    ///
    /// Errors
    /// ------
    /// - `EstimatorError::InvalidRidge` when `ridge` is not finite and > 0.
    /// - `EstimatorError::InvalidVariance` for `diffuse_variance` or
    ///   `variance_floor`.
    pub fn new(
        trend: TrendKind, ridge: f64, standardize: bool, diffuse_variance: f64,
        variance_floor: f64, hyperparameters: Hyperparameters,
    ) -> EstimatorResult<Self> {
        let opts = EstimatorOptions {
            trend,
            ridge,
            standardize,
            diffuse_variance,
            variance_floor,
            hyperparameters,
        };
        opts.validate()?;
        Ok(opts)
    }

    /// Re-check the numeric fields (they are public and may have been edited
    /// after construction).
    pub fn validate(&self) -> EstimatorResult<()> {
        if !self.ridge.is_finite() || self.ridge <= 0.0 {
            return Err(EstimatorError::InvalidRidge { value: self.ridge });
        }
        check_positive("diffuse_variance", self.diffuse_variance)?;
        check_positive("variance_floor", self.variance_floor)?;
        if let Hyperparameters::Fixed(v) = &self.hyperparameters {
            StructuralVariances::new(v.observation, v.level, v.slope)?;
        }
        Ok(())
    }

    /// Default options with a different trend component.
    pub fn with_trend(trend: TrendKind) -> Self {
        EstimatorOptions { trend, ..EstimatorOptions::default() }
    }
}

impl Default for EstimatorOptions {
    fn default() -> Self {
        EstimatorOptions {
            trend: TrendKind::LocalLevel,
            ridge: DEFAULT_RIDGE,
            standardize: true,
            diffuse_variance: DEFAULT_DIFFUSE_VARIANCE,
            variance_floor: DEFAULT_VARIANCE_FLOOR,
            hyperparameters: Hyperparameters::MaximumLikelihood(MLEOptions::default()),
        }
    }
}

fn check_positive(name: &'static str, value: f64) -> EstimatorResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(EstimatorError::InvalidVariance { name, value });
    }
    Ok(())
}
