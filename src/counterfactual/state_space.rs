//! Structural time-series model in explicit state-space form, its Kalman
//! forward filter, and the predict-only forecast used for counterfactuals.
//!
//! Purpose
//! -------
//! Express "trend + regression on contemporaneous controls" as a
//! linear-Gaussian state-space model with a time-varying observation vector,
//! and provide the two recursions everything else is built on: a forward
//! filter over the pre-period (with the prediction-error log-likelihood) and
//! a forecast over the post-period that never looks at the response.
//!
//! Key behaviors
//! -------------
//! - State `a_t = [μ_t, (δ_t), β_1..β_k]`; observation vector
//!   `z_t = [1, (0), x_t]`; transition `T` is the identity except
//!   `T[0,1] = 1` for the local linear trend.
//! - `Q = diag(σ²_level, (σ²_slope), 0..0)`; coefficients are static states
//!   with prior `N(0, λ⁻¹ I)` (ridge), trend states get a diffuse prior.
//! - Missing responses (`NaN`) skip the update; the prediction step still
//!   runs, so gaps widen the state uncertainty.
//! - Calendar gaps between rows are bridged by repeated prediction steps
//!   (one per month).
//! - Covariance updates use the Joseph form and are re-symmetrized.
//!
//! Invariants & assumptions
//! ------------------------
//! - Predictor rows passed to the filter and to [`forecast`] are finite.
//! - Innovation and forecast variances must be finite and > 0; otherwise the
//!   recursion stops with `EstimatorError::NumericalInstability`.
//!
//! Conventions
//! -----------
//! - All quantities are in filter units (standardized when the estimator
//!   standardizes); callers map back to original units.
//! - `steps[i]` is the number of transitions applied before row `i`; for the
//!   filter `steps[0]` is ignored because the prior already describes row 0.
//!
//! Testing notes
//! -------------
//! - Unit tests check level tracking, coefficient recovery, likelihood term
//!   counting with missing responses, monotone forecast variance, and the
//!   summed-forecast variance against its expansion over noise sources.
use chrono::{Datelike, NaiveDate};
use nalgebra::{DMatrix, DVector};
use ndarray::{ArrayView1, ArrayView2};

use crate::counterfactual::{
    errors::{EstimatorError, EstimatorResult},
    options::{StructuralVariances, TrendKind},
};

/// Natural log of `2π`.
const LN_2PI: f64 = 1.837_877_066_409_345_3;

/// Time-invariant part of the structural model.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSpaceModel {
    pub trend: TrendKind,
    pub n_controls: usize,
    /// `T`, `n_state × n_state`.
    pub transition: DMatrix<f64>,
    /// `Q`, `n_state × n_state`.
    pub state_noise: DMatrix<f64>,
    /// `H = σ²_obs`.
    pub obs_variance: f64,
    /// Prior mean of the state before the first row.
    pub m0: DVector<f64>,
    /// Prior covariance of the state before the first row.
    pub p0: DMatrix<f64>,
}

/// Filtered state mean and covariance at a given row.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterState {
    pub mean: DVector<f64>,
    pub cov: DMatrix<f64>,
}

/// Result of [`kalman_filter`].
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutput {
    /// Prediction-error log-likelihood over the non-diffuse observed rows.
    pub loglik: f64,
    /// Number of observations contributing to `loglik`.
    pub n_loglik_terms: usize,
    /// One-step-ahead predicted response per row.
    pub one_step_means: Vec<f64>,
    /// One-step-ahead predictive variance per row.
    pub one_step_variances: Vec<f64>,
    /// Filtered state after the last row.
    pub last: FilterState,
}

impl StateSpaceModel {
    /// Assemble `T`, `Q`, `H` and the prior.
    ///
    /// Parameters
    /// ----------
    /// - `trend`: level only or level + slope.
    /// - `n_controls`: number of regression coefficients `k`.
    /// - `variances`: structural noise variances (filter units).
    /// - `ridge`: coefficient prior precision `λ > 0`.
    /// - `diffuse_variance`: prior variance of trend states.
    /// - `level0`: prior mean of the level.
    pub fn new(
        trend: TrendKind, n_controls: usize, variances: &StructuralVariances, ridge: f64,
        diffuse_variance: f64, level0: f64,
    ) -> Self {
        let n_trend = trend.n_states();
        let n = n_trend + n_controls;

        let mut transition = DMatrix::<f64>::identity(n, n);
        let mut state_noise = DMatrix::<f64>::zeros(n, n);
        let mut p0 = DMatrix::<f64>::zeros(n, n);
        let mut m0 = DVector::<f64>::zeros(n);

        m0[0] = level0;
        state_noise[(0, 0)] = variances.level;
        p0[(0, 0)] = diffuse_variance;
        if trend == TrendKind::LocalLinearTrend {
            transition[(0, 1)] = 1.0;
            state_noise[(1, 1)] = variances.slope;
            p0[(1, 1)] = diffuse_variance;
        }
        for j in n_trend..n {
            p0[(j, j)] = 1.0 / ridge;
        }

        StateSpaceModel {
            trend,
            n_controls,
            transition,
            state_noise,
            obs_variance: variances.observation,
            m0,
            p0,
        }
    }

    pub fn n_state(&self) -> usize {
        self.transition.nrows()
    }

    /// `z_t = [1, (0), x_t]`.
    pub fn observation_vector(&self, x_row: ArrayView1<'_, f64>) -> DVector<f64> {
        let n_trend = self.trend.n_states();
        let mut z = DVector::<f64>::zeros(self.n_state());
        z[0] = 1.0;
        for (j, &x) in x_row.iter().enumerate() {
            z[n_trend + j] = x;
        }
        z
    }

    /// `(m, P) ← (T m, T P Tᵀ + Q)`.
    fn predict_step(&self, m: &DVector<f64>, p: &DMatrix<f64>) -> (DVector<f64>, DMatrix<f64>) {
        let m_next = &self.transition * m;
        let p_next = &self.transition * p * self.transition.transpose() + &self.state_noise;
        (m_next, symmetrize(&p_next))
    }
}

/// Forward Kalman filter over `rows` with prediction-error log-likelihood.
///
/// Parameters
/// ----------
/// - `model`: [`StateSpaceModel`].
/// - `response`: `rows` responses, `NaN` = missing.
/// - `controls`: `rows × k` finite predictors.
/// - `steps`: transitions before each row (see module conventions).
/// - `skip`: number of leading observed rows excluded from the likelihood.
///
/// Errors
/// ------
/// - `EstimatorError::NumericalInstability` when an innovation variance is
///   non-positive or non-finite, or when the state turns non-finite.
pub fn kalman_filter(
    model: &StateSpaceModel, response: ArrayView1<'_, f64>, controls: ArrayView2<'_, f64>,
    steps: &[usize], skip: usize,
) -> EstimatorResult<FilterOutput> {
    let n_rows = response.len();
    let n = model.n_state();
    let identity = DMatrix::<f64>::identity(n, n);

    let mut m = model.m0.clone();
    let mut p = model.p0.clone();
    let mut loglik = 0.0;
    let mut n_terms = 0usize;
    let mut n_observed = 0usize;
    let mut one_step_means = Vec::with_capacity(n_rows);
    let mut one_step_variances = Vec::with_capacity(n_rows);

    for t in 0..n_rows {
        if t > 0 {
            for _ in 0..steps.get(t).copied().unwrap_or(1).max(1) {
                (m, p) = model.predict_step(&m, &p);
            }
        }

        let z = model.observation_vector(controls.row(t));
        let pz = &p * &z;
        let y_hat = z.dot(&m);
        let f = z.dot(&pz) + model.obs_variance;
        if !f.is_finite() || f <= 0.0 {
            return Err(EstimatorError::NumericalInstability {
                reason: format!("innovation variance {f} at row {t}"),
            });
        }
        one_step_means.push(y_hat);
        one_step_variances.push(f);

        let y = response[t];
        if y.is_nan() {
            continue;
        }
        let v = y - y_hat;
        if n_observed >= skip {
            loglik += -0.5 * (LN_2PI + f.ln() + v * v / f);
            n_terms += 1;
        }
        n_observed += 1;

        // Joseph form: P = (I - K zᵀ) P (I - K zᵀ)ᵀ + K H Kᵀ
        let k = &pz / f;
        m += &k * v;
        let i_kz = &identity - &k * z.transpose();
        let p_filt = &i_kz * &p * i_kz.transpose() + (&k * k.transpose()) * model.obs_variance;
        p = symmetrize(&p_filt);
    }

    if m.iter().any(|v| !v.is_finite()) || p.iter().any(|v| !v.is_finite()) {
        return Err(EstimatorError::NumericalInstability {
            reason: "filtered state is not finite".to_string(),
        });
    }

    Ok(FilterOutput {
        loglik,
        n_loglik_terms: n_terms,
        one_step_means,
        one_step_variances,
        last: FilterState { mean: m, cov: p },
    })
}

/// Result of [`forecast`], in filter units.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastOutput {
    /// `zᵀ m` per row.
    pub means: Vec<f64>,
    /// `zᵀ P z + H` per row.
    pub variances: Vec<f64>,
    /// Variance of the sum of all forecast errors, including the covariance
    /// between rows that share state uncertainty.
    pub sum_variance: f64,
}

/// Predict-only recursion from a filtered state.
///
/// For each row, `steps[i]` transitions are applied (at least one), then the
/// response mean `zᵀ m` and variance `zᵀ P z + H` are read off. No update is
/// performed, so the result depends only on `start` and `controls`.
///
/// Forecast errors of rows `s < t` share the state error at `s`, so
/// `Cov(e_s, e_t) = z_tᵀ T^(n_t - n_s) P_s z_s`. The running vector
/// `c = Σ_{s<t} T^(n_t - n_s) P_s z_s` is carried through the transitions to
/// accumulate `Var(Σ e_t) = Σ var_t + 2 Σ_t z_tᵀ c_t` in one pass.
///
/// Errors
/// ------
/// - `EstimatorError::NumericalInstability` for a non-positive or non-finite
///   forecast variance (per row or of the sum).
pub fn forecast(
    model: &StateSpaceModel, start: &FilterState, controls: ArrayView2<'_, f64>,
    steps: &[usize],
) -> EstimatorResult<ForecastOutput> {
    let n_rows = controls.nrows();
    let mut m = start.mean.clone();
    let mut p = start.cov.clone();
    let mut cross = DVector::<f64>::zeros(model.n_state());
    let mut means = Vec::with_capacity(n_rows);
    let mut variances = Vec::with_capacity(n_rows);
    let mut sum_variance = 0.0;

    for t in 0..n_rows {
        for _ in 0..steps.get(t).copied().unwrap_or(1).max(1) {
            (m, p) = model.predict_step(&m, &p);
            cross = &model.transition * &cross;
        }
        let z = model.observation_vector(controls.row(t));
        let pz = &p * &z;
        let mean = z.dot(&m);
        let var = z.dot(&pz) + model.obs_variance;
        if !mean.is_finite() || !var.is_finite() || var <= 0.0 {
            return Err(EstimatorError::NumericalInstability {
                reason: format!("forecast variance {var} at post-period row {t}"),
            });
        }
        sum_variance += var + 2.0 * z.dot(&cross);
        cross += pz;
        means.push(mean);
        variances.push(var);
    }

    if n_rows > 0 && (!sum_variance.is_finite() || sum_variance <= 0.0) {
        return Err(EstimatorError::NumericalInstability {
            reason: format!("variance of the summed forecast {sum_variance}"),
        });
    }
    Ok(ForecastOutput { means, variances, sum_variance })
}

/// Calendar months from `from` to `to` (at least 1).
pub fn month_steps(from: NaiveDate, to: NaiveDate) -> usize {
    let a = from.year() as i64 * 12 + from.month0() as i64;
    let b = to.year() as i64 * 12 + to.month0() as i64;
    (b - a).max(1) as usize
}

/// Transitions before each row of `dates`, counted from `origin` for row 0
/// (or 0 when there is no origin).
pub fn steps_for(dates: &[NaiveDate], origin: Option<NaiveDate>) -> Vec<usize> {
    let mut steps = Vec::with_capacity(dates.len());
    let mut prev = origin;
    for &d in dates {
        steps.push(prev.map_or(0, |p| month_steps(p, d)));
        prev = Some(d);
    }
    steps
}

#[inline]
fn symmetrize(p: &DMatrix<f64>) -> DMatrix<f64> {
    0.5 * (p + p.transpose())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array2};

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // Filter and forecast recursions on small synthetic inputs with fixed
    // variances. Variance estimation is covered in `likelihood`.
    // -------------------------------------------------------------------------

    fn variances(obs: f64, level: f64) -> StructuralVariances {
        StructuralVariances { observation: obs, level, slope: 1e-6 }
    }

    #[test]
    // Purpose
    // -------
    // The level tracks a constant response and coefficients recover a known
    // linear relation.
    //
    // Given
    // -----
    // - 40 rows of y = 3 + 2 x with a deterministic, non-constant x and tiny
    //   noise variances.
    //
    // Expect
    // ------
    // - Filtered level ≈ 3 and β ≈ 2.
    fn filter_recovers_level_and_coefficient() {
        let x = Array2::from_shape_fn((40, 1), |(t, _)| (t as f64 * 0.7).sin() + 0.05 * t as f64);
        let y = Array1::from_shape_fn(40, |t| 3.0 + 2.0 * x[[t, 0]]);
        let v = variances(1e-6, 1e-8);
        let model = StateSpaceModel::new(TrendKind::LocalLevel, 1, &v, 1e-2, 1e6, 0.0);

        let out = kalman_filter(&model, y.view(), x.view(), &vec![1; 40], 1).unwrap();

        assert_abs_diff_eq!(out.last.mean[0], 3.0, epsilon = 1e-2);
        assert_abs_diff_eq!(out.last.mean[1], 2.0, epsilon = 1e-2);
        assert_eq!(out.n_loglik_terms, 39);
        assert!(out.loglik.is_finite());
    }

    #[test]
    // Purpose
    // -------
    // Missing responses are skipped in the likelihood but still advance the
    // state, widening the next predictive variance.
    //
    // Given
    // -----
    // - 10 rows, row 5 missing; same data fully observed.
    //
    // Expect
    // ------
    // - One fewer likelihood term; larger one-step variance at row 6.
    fn missing_response_skips_update() {
        let x = Array2::from_shape_fn((10, 1), |(t, _)| t as f64);
        let full = Array1::from_shape_fn(10, |t| 1.0 + 0.5 * t as f64);
        let mut gappy = full.clone();
        gappy[5] = f64::NAN;
        let v = variances(0.1, 0.1);
        let model = StateSpaceModel::new(TrendKind::LocalLevel, 1, &v, 1e-2, 1e6, 0.0);

        let a = kalman_filter(&model, full.view(), x.view(), &vec![1; 10], 1).unwrap();
        let b = kalman_filter(&model, gappy.view(), x.view(), &vec![1; 10], 1).unwrap();

        assert_eq!(a.n_loglik_terms, 9);
        assert_eq!(b.n_loglik_terms, 8);
        assert!(b.one_step_variances[6] > a.one_step_variances[6]);
    }

    #[test]
    // Purpose
    // -------
    // Forecast variance grows with the horizon under a random-walk level.
    //
    // Given
    // -----
    // - A filtered local-level state, 6 forecast rows with constant x.
    //
    // Expect
    // ------
    // - Strictly increasing variances, all above `H`.
    fn forecast_variance_increases_with_horizon() {
        let x = Array2::from_elem((20, 1), 1.0);
        let y = Array1::from_shape_fn(20, |t| (t as f64 * 0.3).cos());
        let v = variances(0.05, 0.02);
        let model = StateSpaceModel::new(TrendKind::LocalLevel, 1, &v, 1.0, 1e6, 0.0);
        let fitted = kalman_filter(&model, y.view(), x.view(), &vec![1; 20], 1).unwrap();

        let post_x = Array2::from_elem((6, 1), 1.0);
        let out = forecast(&model, &fitted.last, post_x.view(), &[1; 6]).unwrap();

        assert_eq!(out.means.len(), 6);
        assert!(out.variances.windows(2).all(|w| w[1] > w[0]));
        assert!(out.variances.iter().all(|&v| v > 0.05));
        assert!(out.sum_variance > out.variances.iter().sum::<f64>());
    }

    #[test]
    // Purpose
    // -------
    // Local linear trend extrapolates a straight line.
    //
    // Given
    // -----
    // - y = 2 + 0.5 t for 30 rows, x ≡ 0, tiny variances.
    //
    // Expect
    // ------
    // - First forecast ≈ 2 + 0.5·30 = 17.
    fn local_linear_trend_extrapolates_slope() {
        let x = Array2::zeros((30, 1));
        let y = Array1::from_shape_fn(30, |t| 2.0 + 0.5 * t as f64);
        let v = StructuralVariances { observation: 1e-6, level: 1e-8, slope: 1e-8 };
        let model = StateSpaceModel::new(TrendKind::LocalLinearTrend, 1, &v, 1e-2, 1e6, 0.0);
        let fitted = kalman_filter(&model, y.view(), x.view(), &vec![1; 30], 2).unwrap();

        let post_x = Array2::zeros((1, 1));
        let out = forecast(&model, &fitted.last, post_x.view(), &[1]).unwrap();

        assert_abs_diff_eq!(out.means[0], 17.0, epsilon = 1e-3);
        assert_abs_diff_eq!(out.sum_variance, out.variances[0], epsilon = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // The summed-forecast variance equals the variance of the sum written out
    // from its independent sources: the starting state error, each
    // transition's noise, and each row's observation noise.
    //
    // Given
    // -----
    // - Local linear trend with one control, a correlated starting
    //   covariance, rows after 1, 2 and 1 transitions.
    //
    // Expect
    // ------
    // - `sum_variance = wᵀ P₀ w + Σ_j u_jᵀ Q u_j + n H`, where `w` and `u_j`
    //   collect the rows' loadings on each source.
    fn sum_variance_matches_expansion_over_noise_sources() {
        let v = StructuralVariances { observation: 0.3, level: 0.2, slope: 0.05 };
        let model = StateSpaceModel::new(TrendKind::LocalLinearTrend, 1, &v, 1.0, 1e6, 0.0);
        let start = FilterState {
            mean: DVector::from_vec(vec![1.0, 0.1, 0.5]),
            cov: DMatrix::from_row_slice(3, 3, &[0.5, 0.1, 0.05, 0.1, 0.2, 0.0, 0.05, 0.0, 0.3]),
        };
        let x = Array2::from_shape_vec((3, 1), vec![1.0, -2.0, 0.5]).unwrap();
        let steps = [1, 2, 1];

        let out = forecast(&model, &start, x.view(), &steps).unwrap();

        // Row t sits after n_t transitions; transition j adds noise η_j.
        let power = |k: usize| {
            (0..k).fold(DMatrix::<f64>::identity(3, 3), |a, _| &model.transition * a)
        };
        let reached: Vec<usize> = steps
            .iter()
            .scan(0, |n, s| {
                *n += s;
                Some(*n)
            })
            .collect();
        let z: Vec<DVector<f64>> = (0..3).map(|t| model.observation_vector(x.row(t))).collect();
        let mut w = DVector::<f64>::zeros(3);
        for (zt, &n) in z.iter().zip(&reached) {
            w += power(n).transpose() * zt;
        }
        let mut expected = w.dot(&(&start.cov * &w)) + 3.0 * v.observation;
        for j in 1..=reached[2] {
            let mut u = DVector::<f64>::zeros(3);
            for (zt, &n) in z.iter().zip(&reached).filter(|(_, n)| **n >= j) {
                u += power(n - j).transpose() * zt;
            }
            expected += u.dot(&(&model.state_noise * &u));
        }

        assert_abs_diff_eq!(out.sum_variance, expected, epsilon = 1e-9);
        assert!(out.sum_variance > out.variances.iter().sum::<f64>());
    }

    #[test]
    // Purpose
    // -------
    // Forecast variance carries coefficient uncertainty, so controls far
    // outside the pre-period range widen the interval even when the trend is
    // nearly static.
    //
    // Given
    // -----
    // - 40 pre rows with x in [-1, 1], level variance 1e-10, H = 0.1.
    // - One-step forecasts at x = 0 and at x = 50.
    //
    // Expect
    // ------
    // - The far forecast's variance exceeds H by at least 2500·Var(β)/2 and
    //   is more than 10 times the near one.
    fn forecast_variance_grows_with_control_extrapolation() {
        let x = Array2::from_shape_fn((40, 1), |(t, _)| (t as f64 * 0.5).sin());
        let y = Array1::from_shape_fn(40, |t| 1.0 + 2.0 * x[[t, 0]] + 0.2 * (t as f64 * 1.9).cos());
        let v = variances(0.1, 1e-10);
        let model = StateSpaceModel::new(TrendKind::LocalLevel, 1, &v, 1e-2, 1e6, 0.0);
        let fitted = kalman_filter(&model, y.view(), x.view(), &vec![1; 40], 1).unwrap();

        let near = forecast(&model, &fitted.last, Array2::zeros((1, 1)).view(), &[1]).unwrap();
        let far_x = Array2::from_elem((1, 1), 50.0);
        let far = forecast(&model, &fitted.last, far_x.view(), &[1]).unwrap();

        let beta_var = fitted.last.cov[(1, 1)];
        assert!(beta_var > 0.0);
        assert!(far.variances[0] - 0.1 > 0.5 * 2500.0 * beta_var);
        assert!(far.variances[0] > 10.0 * near.variances[0]);
    }

    #[test]
    // Purpose
    // -------
    // Calendar gaps translate into multiple transitions.
    //
    // Given
    // -----
    // - Dates Jan, Feb, May 2008 with origin Dec 2007.
    //
    // Expect
    // ------
    // - Steps [1, 1, 3]; no origin gives a leading 0.
    fn steps_count_calendar_months() {
        let d = |y, m| NaiveDate::from_ymd_opt(y, m, 1).unwrap();
        let dates = [d(2008, 1), d(2008, 2), d(2008, 5)];

        assert_eq!(steps_for(&dates, Some(d(2007, 12))), vec![1, 1, 3]);
        assert_eq!(steps_for(&dates, None), vec![0, 1, 3]);
    }
}
