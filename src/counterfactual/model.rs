//! Fit the structural counterfactual on the pre-period and forecast the
//! post-period.
//!
//! Purpose
//! -------
//! Provide the estimator's two public operations: [`fit`], which learns the
//! relationship between the treatment unit and its controls from pre-period
//! rows only, and [`FittedModel::predict`], which produces one
//! `(mean, sd)` pair per post-period date from the post-period controls.
//!
//! Key behaviors
//! -------------
//! - Data are standardized with pre-period moments (optional), filtered with
//!   the Kalman recursion in [`state_space`](super::state_space), and mapped
//!   back to original units on output.
//! - Structural variances are either fixed or estimated by maximum likelihood
//!   (coarse grid start, L-BFGS refinement, grid fallback on optimizer
//!   failure).
//! - `predict` reads only control columns; the treatment column of the
//!   post-period panel is never touched.
//!
//! Invariants & assumptions
//! ------------------------
//! - At least `controls + 2` observed pre-period responses.
//! - Post-period dates are strictly after the last pre-period date.
//! - Controls are fully observed in both periods.
//!
//! Downstream usage
//! ----------------
//! - [`PredictionPath`] feeds [`summarize`](crate::impact::summarize).
//!
//! Testing notes
//! -------------
//! - Unit tests cover the underdetermined guard, post-period overlap, leakage
//!   (corrupted treatment values in the post panel), determinism, and
//!   recovery of a known linear relation.
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    counterfactual::{
        design::{build_pre_design, control_matrix, Scaling},
        errors::{EstimatorError, EstimatorResult},
        likelihood::{best_grid_point, maximize_likelihood, LikelihoodData},
        options::{EstimatorOptions, Hyperparameters, StructuralVariances, TrendKind},
        state_space::{forecast, steps_for, FilterState, StateSpaceModel},
    },
    optimization::{MLEOptions, OptimOutcome},
    panel::Panel,
};

/// Counterfactual forecast in original units, one entry per date.
///
/// `sum_sd` is the sd of the summed forecast over all dates, accounting for
/// the correlation between dates. It is set by
/// [`predict`](FittedModel::predict) and absent for one-step in-sample paths.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionPath {
    pub dates: Vec<NaiveDate>,
    pub mean: Vec<f64>,
    pub sd: Vec<f64>,
    pub sum_sd: Option<f64>,
}

impl PredictionPath {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// A structural model fitted on pre-period rows.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedModel {
    treatment: String,
    controls: Vec<String>,
    trend: TrendKind,
    variances: StructuralVariances,
    model: StateSpaceModel,
    final_state: FilterState,
    last_pre_date: NaiveDate,
    scaling: Scaling,
    loglik: f64,
    in_sample: PredictionPath,
    optimization: Option<OptimOutcome>,
}

/// Fit the counterfactual model on the pre-period panel.
///
/// Parameters
/// ----------
/// - `pre`: pre-period rows (see [`partition`](crate::panel::partition)).
/// - `treatment`: unit whose counterfactual is estimated.
/// - `controls`: predictor units, in the order coefficients are reported.
/// - `opts`: [`EstimatorOptions`].
///
/// Returns
/// -------
/// A [`FittedModel`] holding the filtered state at the last pre-period row.
///
/// Errors
/// ------
/// - `EstimatorError::NoControls` for an empty control list.
/// - `EstimatorError::UnderdeterminedModel` when observed pre-period
///   responses are fewer than `controls + 2`.
/// - `EstimatorError::MissingPredictor` for a missing control value.
/// - `EstimatorError::NumericalInstability` from the filter or the grid.
/// - Option validation errors and wrapped panel lookups.
pub fn fit<S: AsRef<str>>(
    pre: &Panel, treatment: &str, controls: &[S], opts: &EstimatorOptions,
) -> EstimatorResult<FittedModel> {
    opts.validate()?;
    if controls.is_empty() {
        return Err(EstimatorError::NoControls);
    }

    let design = build_pre_design(pre, treatment, controls, opts.standardize)?;
    let k = controls.len();
    let observations = design.observed_rows();
    if observations < k + 2 {
        return Err(EstimatorError::UnderdeterminedModel { observations, predictors: k });
    }

    let level0 = design.response.iter().copied().find(|v| !v.is_nan()).unwrap_or(0.0);
    let data = LikelihoodData {
        steps: steps_for(&design.dates, None),
        response: design.response,
        controls: design.controls,
        trend: opts.trend,
        ridge: opts.ridge,
        diffuse_variance: opts.diffuse_variance,
        variance_floor: opts.variance_floor,
        level0,
    };

    let (variances, optimization) = match &opts.hyperparameters {
        Hyperparameters::Fixed(v) => (v.for_trend(opts.trend), None),
        Hyperparameters::MaximumLikelihood(mle) => estimate_variances(&data, mle)?,
    };

    let filtered = data.filter(&variances)?;
    let scaling = design.scaling;
    let in_sample = PredictionPath {
        dates: design.dates,
        mean: filtered.one_step_means.iter().map(|&m| scaling.response.inverse(m)).collect(),
        sd: filtered
            .one_step_variances
            .iter()
            .map(|&v| scaling.response.inverse_sd(v.sqrt()))
            .collect(),
        sum_sd: None,
    };

    debug!(
        treatment,
        controls = k,
        observations,
        sigma2_obs = variances.observation,
        sigma2_level = variances.level,
        sigma2_slope = variances.slope,
        loglik = filtered.loglik,
        "counterfactual model fitted"
    );

    Ok(FittedModel {
        treatment: treatment.to_string(),
        controls: controls.iter().map(|c| c.as_ref().to_string()).collect(),
        trend: opts.trend,
        variances,
        model: data.model(&variances),
        final_state: filtered.last,
        last_pre_date: pre.last_date(),
        scaling,
        loglik: filtered.loglik,
        in_sample,
        optimization,
    })
}

/// Grid start, then L-BFGS; keep whichever of the two has the higher
/// log-likelihood.
fn estimate_variances(
    data: &LikelihoodData, mle: &MLEOptions,
) -> EstimatorResult<(StructuralVariances, Option<OptimOutcome>)> {
    let (grid, grid_ll) = best_grid_point(data)?;
    match maximize_likelihood(data, data.theta(&grid), mle) {
        Ok(out) if out.value >= grid_ll => {
            debug!(
                status = %out.status,
                iterations = out.iterations,
                loglik = out.value,
                "variance estimation converged"
            );
            Ok((data.variances(&out.theta_hat), Some(out)))
        }
        Ok(out) => {
            debug!(optimum = out.value, grid = grid_ll, "keeping grid start over optimizer result");
            Ok((grid, Some(out)))
        }
        Err(err) => {
            warn!(error = %err, "variance optimizer failed; using best starting value");
            Ok((grid, None))
        }
    }
}

impl FittedModel {
    /// Forecast the counterfactual over `post`.
    ///
    /// Each date's mean is `zᵀ m` and its sd `sqrt(zᵀ P z + σ²_obs)`, where
    /// `(m, P)` is the last filtered pre-period state propagated one step per
    /// calendar month. `P` includes the coefficients' posterior covariance, so
    /// controls far from their pre-period range widen the sd. Predictions
    /// never condition on post-period responses.
    ///
    /// Errors
    /// ------
    /// - `EstimatorError::PostPeriodOverlap` if `post` starts on or before the
    ///   last pre-period date.
    /// - `EstimatorError::MissingPredictor` for a missing control value.
    /// - `EstimatorError::NumericalInstability` for a degenerate forecast
    ///   variance.
    pub fn predict(&self, post: &Panel) -> EstimatorResult<PredictionPath> {
        let first_post = post.first_date();
        if first_post <= self.last_pre_date {
            return Err(EstimatorError::PostPeriodOverlap {
                last_pre: self.last_pre_date,
                first_post,
            });
        }

        let x = control_matrix(post, &self.controls, &self.scaling.controls)?;
        let steps = steps_for(post.dates(), Some(self.last_pre_date));
        let out = forecast(&self.model, &self.final_state, x.view(), &steps)?;

        let response = self.scaling.response;
        Ok(PredictionPath {
            dates: post.dates().to_vec(),
            mean: out.means.into_iter().map(|m| response.inverse(m)).collect(),
            sd: out.variances.into_iter().map(|v| response.inverse_sd(v.sqrt())).collect(),
            sum_sd: Some(response.inverse_sd(out.sum_variance.sqrt())),
        })
    }

    /// Regression coefficients at the end of the pre-period in original
    /// units, one per control in fit order.
    pub fn coefficients(&self) -> Vec<(String, f64)> {
        let offset = self.trend.n_states();
        let y_scale = self.scaling.response.scale;
        self.controls
            .iter()
            .zip(&self.scaling.controls)
            .enumerate()
            .map(|(j, (unit, x))| {
                (unit.clone(), self.final_state.mean[offset + j] * y_scale / x.scale)
            })
            .collect()
    }

    /// Posterior sd of each coefficient in original units.
    pub fn coefficient_sds(&self) -> Vec<f64> {
        let offset = self.trend.n_states();
        let y_scale = self.scaling.response.scale;
        self.scaling
            .controls
            .iter()
            .enumerate()
            .map(|(j, x)| {
                let var = self.final_state.cov[(offset + j, offset + j)].max(0.0);
                var.sqrt() * y_scale / x.scale
            })
            .collect()
    }

    /// One-step-ahead pre-period predictions in original units.
    pub fn in_sample(&self) -> &PredictionPath {
        &self.in_sample
    }

    pub fn treatment(&self) -> &str {
        &self.treatment
    }

    pub fn controls(&self) -> &[String] {
        &self.controls
    }

    pub fn trend(&self) -> TrendKind {
        self.trend
    }

    /// Structural variances in filter units.
    pub fn variances(&self) -> StructuralVariances {
        self.variances
    }

    pub fn loglik(&self) -> f64 {
        self.loglik
    }

    pub fn last_pre_date(&self) -> NaiveDate {
        self.last_pre_date
    }

    /// Optimizer outcome when the variances were estimated and the optimizer
    /// ran to completion.
    pub fn optimization(&self) -> Option<&OptimOutcome> {
        self.optimization.as_ref()
    }
}
