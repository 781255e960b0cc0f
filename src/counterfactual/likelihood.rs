//! Prediction-error log-likelihood of the structural model over the
//! pre-period, as an L-BFGS problem.
//!
//! Purpose
//! -------
//! Estimate the structural variances by maximum likelihood: a coarse
//! deterministic grid picks the starting point (and is the fallback), then
//! [`StructuralLikelihood`] is handed to
//! [`minimize_lbfgs`](crate::optimization::minimize_lbfgs) as an argmin cost
//! `-ℓ(θ)` with a finite-difference gradient.
//!
//! Conventions
//! -----------
//! - `θ = [θ_obs, θ_level, (θ_slope)]`, `σ² = floor + softplus(θ)`.
//! - Grid values are multiples of the sample variance of the pre-period
//!   response in filter units (1 when standardized), spanning "mostly noise"
//!   to "mostly trend" whatever the scale of the data.
//! - For the local level model the slope variance is reported as 0.
//!
//! Testing notes
//! -------------
//! - Unit tests cover the θ ↔ variance maps, input checks, the grid (scale
//!   equivariance, total failure), gradient direction, and that L-BFGS never
//!   ends below its grid start.
use std::cell::RefCell;

use argmin::core::{CostFunction, Error, Gradient};
use finitediff::FiniteDiff;
use ndarray::{Array1, Array2};

use crate::{
    counterfactual::{
        errors::{EstimatorError, EstimatorResult},
        options::{StructuralVariances, TrendKind},
        state_space::{kalman_filter, FilterOutput, StateSpaceModel},
    },
    optimization::{
        minimize_lbfgs,
        numerical_stability::{safe_softplus, safe_softplus_inv},
        MLEOptions, OptError, OptResult, OptimOutcome, Theta,
    },
};

const GRID_OBSERVATION: [f64; 3] = [0.01, 0.1, 0.5];
const GRID_LEVEL: [f64; 3] = [0.001, 0.01, 0.1];
const GRID_SLOPE: [f64; 2] = [1e-4, 1e-3];

/// Everything the likelihood needs, in filter units.
#[derive(Debug, Clone, PartialEq)]
pub struct LikelihoodData {
    /// Pre-period response, `NaN` = missing.
    pub response: Array1<f64>,
    /// Pre-period controls.
    pub controls: Array2<f64>,
    /// Transitions before each pre-period row.
    pub steps: Vec<usize>,
    pub trend: TrendKind,
    pub ridge: f64,
    pub diffuse_variance: f64,
    pub variance_floor: f64,
    /// Prior mean of the level (first observed response).
    pub level0: f64,
}

impl LikelihoodData {
    /// Length of `θ` for this trend.
    pub fn n_params(&self) -> usize {
        1 + self.trend.n_states()
    }

    /// Map `θ` to variances via `floor + softplus(θ)`.
    pub fn variances(&self, theta: &Theta) -> StructuralVariances {
        let floor = self.variance_floor;
        StructuralVariances {
            observation: floor + safe_softplus(theta[0]),
            level: floor + safe_softplus(theta[1]),
            slope: match self.trend {
                TrendKind::LocalLinearTrend => floor + safe_softplus(theta[2]),
                TrendKind::LocalLevel => 0.0,
            },
        }
    }

    /// Inverse of [`variances`](Self::variances), clamped just above the floor.
    pub fn theta(&self, v: &StructuralVariances) -> Theta {
        let pre = |x: f64| safe_softplus_inv((x - self.variance_floor).max(1e-12));
        let mut theta = vec![pre(v.observation), pre(v.level)];
        if self.trend == TrendKind::LocalLinearTrend {
            theta.push(pre(v.slope));
        }
        Array1::from(theta)
    }

    /// Sample variance of the observed response; 1 when it is undefined or 0.
    pub fn grid_scale(&self) -> f64 {
        let observed: Vec<f64> = self.response.iter().copied().filter(|v| !v.is_nan()).collect();
        if observed.len() < 2 {
            return 1.0;
        }
        let n = observed.len() as f64;
        let mean = observed.iter().sum::<f64>() / n;
        let var = observed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        if var.is_finite() && var > 0.0 {
            var
        } else {
            1.0
        }
    }

    pub fn model(&self, v: &StructuralVariances) -> StateSpaceModel {
        StateSpaceModel::new(
            self.trend,
            self.controls.ncols(),
            v,
            self.ridge,
            self.diffuse_variance,
            self.level0,
        )
    }

    /// Run the filter at fixed variances.
    pub fn filter(&self, v: &StructuralVariances) -> EstimatorResult<FilterOutput> {
        kalman_filter(
            &self.model(v),
            self.response.view(),
            self.controls.view(),
            &self.steps,
            self.trend.diffuse_steps(),
        )
    }
}

/// Gaussian prediction-error likelihood of the structural model, exposed to
/// argmin as the cost `-ℓ(θ)`.
#[derive(Debug, Clone, Copy)]
pub struct StructuralLikelihood<'a> {
    data: &'a LikelihoodData,
}

impl<'a> StructuralLikelihood<'a> {
    pub fn new(data: &'a LikelihoodData) -> Self {
        StructuralLikelihood { data }
    }

    /// Errors
    /// ------
    /// - `OptError::ThetaLengthMismatch` for the wrong number of parameters.
    /// - `OptError::InvalidThetaInput` for a non-finite entry.
    pub fn check(&self, theta: &Theta) -> OptResult<()> {
        let expected = self.data.n_params();
        if theta.len() != expected {
            return Err(OptError::ThetaLengthMismatch { expected, actual: theta.len() });
        }
        if let Some((index, &value)) = theta.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(OptError::InvalidThetaInput { index, value });
        }
        Ok(())
    }

    /// `ℓ(θ)`.
    ///
    /// Errors
    /// ------
    /// - [`check`](Self::check) failures.
    /// - `OptError::ModelEvaluation` when the filter fails at `θ`.
    /// - `OptError::NonFiniteCost` for a non-finite likelihood.
    pub fn value(&self, theta: &Theta) -> OptResult<f64> {
        self.check(theta)?;
        let loglik = self.data.filter(&self.data.variances(theta))?.loglik;
        if !loglik.is_finite() {
            return Err(OptError::NonFiniteCost { value: loglik });
        }
        Ok(loglik)
    }
}

impl CostFunction for StructuralLikelihood<'_> {
    type Param = Theta;
    type Output = f64;

    fn cost(&self, theta: &Theta) -> Result<f64, Error> {
        Ok(-self.value(theta)?)
    }
}

impl Gradient for StructuralLikelihood<'_> {
    type Param = Theta;
    type Gradient = Theta;

    /// Central differences of the cost; forward differences when a central
    /// step hits a failing or non-finite evaluation.
    fn gradient(&self, theta: &Theta) -> Result<Theta, Error> {
        let failure: RefCell<Option<OptError>> = RefCell::new(None);
        let cost = |t: &Theta| match self.value(t) {
            Ok(ll) => -ll,
            Err(err) => {
                failure.borrow_mut().get_or_insert(err);
                f64::NAN
            }
        };

        let central = theta.central_diff(&cost);
        if failure.borrow().is_none() && central.iter().all(|g| g.is_finite()) {
            return Ok(central);
        }

        failure.replace(None);
        let forward = theta.forward_diff(&cost);
        if let Some(err) = failure.take() {
            return Err(err.into());
        }
        if let Some((index, &value)) = forward.iter().enumerate().find(|(_, g)| !g.is_finite()) {
            let reason = "finite-difference gradient is not finite";
            return Err(OptError::InvalidGradient { index, value, reason }.into());
        }
        Ok(forward)
    }
}

/// Maximize `ℓ(θ)` from `theta0` with L-BFGS.
///
/// Errors
/// ------
/// - `OptError` from the input check or the optimizer run.
pub fn maximize_likelihood(
    data: &LikelihoodData, theta0: Theta, opts: &MLEOptions,
) -> OptResult<OptimOutcome> {
    let objective = StructuralLikelihood::new(data);
    objective.check(&theta0)?;
    minimize_lbfgs(objective, theta0, opts)
}

/// Evaluate the starting grid and return the best `(variances, loglik)`.
///
/// Errors
/// ------
/// - `EstimatorError::NumericalInstability` when no grid point yields a
///   finite log-likelihood.
pub fn best_grid_point(data: &LikelihoodData) -> EstimatorResult<(StructuralVariances, f64)> {
    let scale = data.grid_scale();
    let floor = data.variance_floor;
    let slopes: &[f64] = match data.trend {
        TrendKind::LocalLinearTrend => &GRID_SLOPE,
        TrendKind::LocalLevel => &[0.0],
    };

    let mut best: Option<(StructuralVariances, f64)> = None;
    for &observation in &GRID_OBSERVATION {
        for &level in &GRID_LEVEL {
            for &slope in slopes {
                let v = StructuralVariances {
                    observation: (observation * scale).max(floor),
                    level: (level * scale).max(floor),
                    slope: if slope > 0.0 { (slope * scale).max(floor) } else { 0.0 },
                };
                let Ok(out) = data.filter(&v) else { continue };
                if !out.loglik.is_finite() {
                    continue;
                }
                if best.as_ref().map_or(true, |(_, ll)| out.loglik > *ll) {
                    best = Some((v, out.loglik));
                }
            }
        }
    }

    best.ok_or_else(|| EstimatorError::NumericalInstability {
        reason: "log-likelihood is not finite at any starting value".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn data(trend: TrendKind) -> LikelihoodData {
        let n = 24;
        let controls = Array2::from_shape_fn((n, 1), |(t, _)| (t as f64 * 0.4).sin());
        let response = Array1::from_shape_fn(n, |t| {
            0.8 * controls[[t, 0]] + 0.1 * (t as f64 * 1.7).cos() + 0.02 * t as f64
        });
        LikelihoodData {
            response,
            controls,
            steps: vec![1; n],
            trend,
            ridge: 1e-2,
            diffuse_variance: 1e6,
            variance_floor: 1e-6,
            level0: 0.0,
        }
    }

    #[test]
    // Purpose
    // -------
    // `theta` inverts `variances` for values above the floor.
    //
    // Given
    // -----
    // - Local linear trend data and variances (0.3, 0.02, 0.001).
    //
    // Expect
    // ------
    // - Round trip reproduces each variance; θ has length 3.
    fn theta_and_variances_are_inverse_maps() {
        let d = data(TrendKind::LocalLinearTrend);
        let v = StructuralVariances { observation: 0.3, level: 0.02, slope: 0.001 };

        let theta = d.theta(&v);
        let back = d.variances(&theta);

        assert_eq!(theta.len(), 3);
        assert_relative_eq!(back.observation, 0.3, max_relative = 1e-10);
        assert_relative_eq!(back.level, 0.02, max_relative = 1e-10);
        assert_relative_eq!(back.slope, 0.001, max_relative = 1e-10);
    }

    #[test]
    // Purpose
    // -------
    // Without a slope state there is no slope variance to report.
    //
    // Given
    // -----
    // - Local level data, θ = (0, 0), and its best grid point.
    //
    // Expect
    // ------
    // - `slope == 0` in both, while the other variances are above the floor.
    fn local_level_reports_zero_slope_variance() {
        let d = data(TrendKind::LocalLevel);

        let v = d.variances(&array![0.0, 0.0]);
        let (grid, _) = best_grid_point(&d).unwrap();

        assert_eq!(v.slope, 0.0);
        assert_eq!(grid.slope, 0.0);
        assert!(v.observation > d.variance_floor && grid.level >= d.variance_floor);
    }

    #[test]
    // Purpose
    // -------
    // Wrong lengths and non-finite entries are rejected before filtering.
    //
    // Given
    // -----
    // - Local level data (2 params), θ of length 3 and θ with a NaN.
    //
    // Expect
    // ------
    // - `ThetaLengthMismatch` then `InvalidThetaInput { index: 1 }`; the
    //   optimizer entry point applies the same check.
    fn check_validates_theta() {
        let d = data(TrendKind::LocalLevel);
        let objective = StructuralLikelihood::new(&d);

        let wrong_len = objective.check(&array![0.0, 0.0, 0.0]);
        let nan = objective.value(&array![0.0, f64::NAN]);
        let via_optimizer =
            maximize_likelihood(&d, array![0.0, 0.0, 0.0], &MLEOptions::default());

        assert_eq!(wrong_len, Err(OptError::ThetaLengthMismatch { expected: 2, actual: 3 }));
        assert!(matches!(nan, Err(OptError::InvalidThetaInput { index: 1, .. })));
        assert_eq!(
            via_optimizer.unwrap_err(),
            OptError::ThetaLengthMismatch { expected: 2, actual: 3 }
        );
    }

    #[test]
    // Purpose
    // -------
    // The grid returns its best finite point and the likelihood agrees with
    // a direct evaluation at those variances.
    //
    // Given
    // -----
    // - Local level data.
    //
    // Expect
    // ------
    // - A finite log-likelihood equal to `value(theta(best))` up to the
    //   softplus round trip.
    fn grid_point_matches_likelihood_value() {
        let d = data(TrendKind::LocalLevel);

        let (best, ll) = best_grid_point(&d).unwrap();
        let via_theta = StructuralLikelihood::new(&d).value(&d.theta(&best)).unwrap();

        assert!(ll.is_finite());
        assert_relative_eq!(ll, via_theta, max_relative = 1e-8);
    }

    #[test]
    // Purpose
    // -------
    // The grid follows the scale of the data, so unstandardized series with
    // large values start from a sensible noise/trend split.
    //
    // Given
    // -----
    // - The same data with response and controls multiplied by 5000; a
    //   prior wide enough to stay diffuse at both scales.
    //
    // Expect
    // ------
    // - Grid scale grows by 5000²; the chosen variances, divided by the
    //   grid scale, are the same at both scales, and the observation
    //   variance is far above the floor.
    fn grid_scales_with_response_variance() {
        let mut base = data(TrendKind::LocalLevel);
        base.diffuse_variance = 1e12;
        let mut scaled = base.clone();
        scaled.response *= 5000.0;
        scaled.controls *= 5000.0;

        let (b, _) = best_grid_point(&base).unwrap();
        let (s, _) = best_grid_point(&scaled).unwrap();

        assert_relative_eq!(scaled.grid_scale(), base.grid_scale() * 2.5e7, max_relative = 1e-9);
        assert_relative_eq!(
            s.observation / scaled.grid_scale(),
            b.observation / base.grid_scale(),
            max_relative = 1e-9
        );
        assert_relative_eq!(
            s.level / scaled.grid_scale(),
            b.level / base.grid_scale(),
            max_relative = 1e-9
        );
        assert!(s.observation > 1.0);
    }

    #[test]
    // Purpose
    // -------
    // Controls so large that every predictive variance overflows leave no
    // usable starting point.
    //
    // Given
    // -----
    // - Controls of magnitude 1e300.
    //
    // Expect
    // ------
    // - `NumericalInstability`.
    fn grid_fails_when_filter_overflows() {
        let mut d = data(TrendKind::LocalLevel);
        d.controls.mapv_inplace(|x| 1e300 * (1.0 + x.abs()));

        let err = best_grid_point(&d).unwrap_err();

        assert!(matches!(err, EstimatorError::NumericalInstability { .. }));
    }

    #[test]
    // Purpose
    // -------
    // The finite-difference gradient of the cost points uphill.
    //
    // Given
    // -----
    // - Local linear trend data at θ = (0, -3, -5).
    //
    // Expect
    // ------
    // - A finite gradient; a small step against it lowers the cost.
    fn gradient_is_a_descent_direction() {
        let d = data(TrendKind::LocalLinearTrend);
        let objective = StructuralLikelihood::new(&d);
        let theta = array![0.0, -3.0, -5.0];

        let g = objective.gradient(&theta).unwrap();
        let step = &theta - &(&g * (1e-3 / g.dot(&g).sqrt()));

        assert!(g.iter().all(|v| v.is_finite()));
        assert!(objective.cost(&step).unwrap() < objective.cost(&theta).unwrap());
    }

    #[test]
    // Purpose
    // -------
    // L-BFGS from the best grid point ends at least as high as it started.
    //
    // Given
    // -----
    // - Local level data, default options.
    //
    // Expect
    // ------
    // - `value ≥ grid log-likelihood` and a finite θ̂ of length 2.
    fn maximize_improves_on_grid_start() {
        let d = data(TrendKind::LocalLevel);
        let (grid, grid_ll) = best_grid_point(&d).unwrap();

        let out = maximize_likelihood(&d, d.theta(&grid), &MLEOptions::default()).unwrap();

        assert_eq!(out.theta_hat.len(), 2);
        assert!(out.value >= grid_ll - 1e-8);
    }
}
