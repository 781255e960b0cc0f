//! Point, cumulative, average, and relative effects from a counterfactual
//! forecast.
//!
//! Purpose
//! -------
//! Compare observed post-period treatment values with the counterfactual
//! [`PredictionPath`] and report effects with normal-approximation intervals
//! at a chosen confidence level.
//!
//! Key behaviors
//! -------------
//! - Point effect `observed − mean`; predicted interval `mean ± z·sd`;
//!   effect interval `observed − (upper, lower)`.
//! - Cumulative sd depends on [`VarianceAggregation`]:
//!   `IndependentSteps` uses `sqrt(Σ sd²)`, which ignores the positive
//!   correlation between forecast errors (shared state and coefficient
//!   uncertainty) and so understates the cumulative interval; `Joint` uses
//!   the path's `sum_sd`, the exact sd of the summed forecast. The choice is
//!   carried in the output.
//! - Relative effect `cumulative / Σ predicted × 100`, `None` when the
//!   predicted sum is 0.
//! - Two-sided tail probability `p = 2(1 − Φ(|cum| / sd_cum))`.
//! - Significant iff the cumulative effect interval excludes 0.
//!
//! Invariants & assumptions
//! ------------------------
//! - Prediction dates equal post-period panel dates, row for row.
//! - Every post-period treatment value is observed.
//! - Every predictive sd is finite and > 0.
//!
//! Testing notes
//! -------------
//! - Unit tests use hand-computable inputs (unit sds, integer effects) and
//!   check nesting of intervals across confidence levels. Coverage of the
//!   two aggregations on simulated data is checked in the integration tests.
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::{
    counterfactual::PredictionPath,
    impact::errors::{ImpactResult, SummaryError},
    panel::Panel,
};

/// Default two-sided confidence level.
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;

/// Closed interval `[lower, upper]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Interval {
    pub lower: f64,
    pub upper: f64,
}

impl Interval {
    /// `center ± half_width`.
    pub fn around(center: f64, half_width: f64) -> Self {
        Interval { lower: center - half_width, upper: center + half_width }
    }

    pub fn contains(&self, x: f64) -> bool {
        self.lower <= x && x <= self.upper
    }

    pub fn excludes_zero(&self) -> bool {
        self.lower > 0.0 || self.upper < 0.0
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    fn scaled(&self, factor: f64) -> Self {
        let (a, b) = (self.lower * factor, self.upper * factor);
        Interval { lower: a.min(b), upper: a.max(b) }
    }
}

/// How per-date predictive variances are combined into the cumulative sd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VarianceAggregation {
    /// `Var(Σ) = Σ Var`, i.e. forecast errors treated as independent.
    #[default]
    IndependentSteps,
    /// `Var(Σ)` including the covariance between dates, read from
    /// [`PredictionPath::sum_sd`].
    Joint,
}

/// Effect on a single post-period date.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointEffect {
    pub date: NaiveDate,
    pub observed: f64,
    pub predicted: f64,
    pub predicted_sd: f64,
    pub predicted_interval: Interval,
    pub effect: f64,
    pub effect_interval: Interval,
}

/// Aggregate over the post-period (sum or per-date average).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectSummary {
    pub observed: f64,
    pub predicted: f64,
    pub predicted_sd: f64,
    pub predicted_interval: Interval,
    pub effect: f64,
    pub effect_interval: Interval,
}

impl EffectSummary {
    fn divided_by(&self, n: f64) -> Self {
        EffectSummary {
            observed: self.observed / n,
            predicted: self.predicted / n,
            predicted_sd: self.predicted_sd / n,
            predicted_interval: self.predicted_interval.scaled(1.0 / n),
            effect: self.effect / n,
            effect_interval: self.effect_interval.scaled(1.0 / n),
        }
    }
}

/// Cumulative effect as a percentage of the predicted sum.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelativeEffect {
    pub percent: f64,
    pub interval: Interval,
}

/// `ImpactEstimate` — full summary of one intervention analysis.
///
/// Fields
/// ------
/// - `points`: one [`PointEffect`] per post-period date, in date order.
/// - `cumulative`: sums over the post-period.
/// - `average`: `cumulative` divided by the number of post-period dates.
/// - `relative`: [`RelativeEffect`], `None` if the predicted sum is 0.
/// - `p_value`: two-sided normal tail probability of the cumulative effect.
/// - `significant`: cumulative effect interval excludes 0.
/// - `variance_aggregation`: how `cumulative.predicted_sd` was formed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactEstimate {
    pub treatment_unit: String,
    pub confidence_level: f64,
    pub z: f64,
    pub points: Vec<PointEffect>,
    pub cumulative: EffectSummary,
    pub average: EffectSummary,
    pub relative: Option<RelativeEffect>,
    pub p_value: f64,
    pub significant: bool,
    pub variance_aggregation: VarianceAggregation,
}

/// Two-sided normal critical value `Φ⁻¹(1 − α/2)` for `level = 1 − α`.
///
/// Errors
/// ------
/// - `SummaryError::InvalidConfidenceLevel` unless `0 < level < 1`.
pub fn critical_value(level: f64) -> ImpactResult<f64> {
    if !level.is_finite() || level <= 0.0 || level >= 1.0 {
        return Err(SummaryError::InvalidConfidenceLevel { value: level });
    }
    let z = standard_normal()?.inverse_cdf(0.5 + 0.5 * level);
    if !z.is_finite() || z <= 0.0 {
        return Err(SummaryError::Distribution { text: format!("invalid quantile {z}") });
    }
    Ok(z)
}

/// Summarize the intervention effect over the post-period, aggregating
/// forecast errors as independent.
///
/// Same as [`summarize_with`] with [`VarianceAggregation::IndependentSteps`].
pub fn summarize(
    post: &Panel, treatment: &str, predictions: &PredictionPath, confidence_level: f64,
) -> ImpactResult<ImpactEstimate> {
    summarize_with(
        post,
        treatment,
        predictions,
        confidence_level,
        VarianceAggregation::IndependentSteps,
    )
}

/// Summarize the intervention effect over the post-period.
///
/// Parameters
/// ----------
/// - `post`: post-period panel (only `treatment`'s column is read).
/// - `treatment`: treatment unit name.
/// - `predictions`: counterfactual path over the same dates.
/// - `confidence_level`: two-sided level in `(0, 1)`, typically 0.95.
/// - `aggregation`: how the cumulative sd is formed.
///
/// Errors
/// ------
/// - `SummaryError::InvalidConfidenceLevel`, `EmptyPostPeriod`,
///   `LengthMismatch`, `DateMismatch`, `MissingObservation`,
///   `DegenerateVariance` per the module invariants.
/// - `SummaryError::JointVarianceUnavailable` for `Joint` when the path has
///   no usable `sum_sd`.
/// - `SummaryError::Panel` if `treatment` is not in `post`.
pub fn summarize_with(
    post: &Panel, treatment: &str, predictions: &PredictionPath, confidence_level: f64,
    aggregation: VarianceAggregation,
) -> ImpactResult<ImpactEstimate> {
    let z = critical_value(confidence_level)?;
    if predictions.is_empty() {
        return Err(SummaryError::EmptyPostPeriod);
    }
    let n = post.n_rows();
    if predictions.len() != n || predictions.mean.len() != n || predictions.sd.len() != n {
        return Err(SummaryError::LengthMismatch {
            dates: predictions.dates.len(),
            means: predictions.mean.len(),
            sds: predictions.sd.len(),
            panel_rows: n,
        });
    }
    let observed = post.column(treatment)?;

    let mut points = Vec::with_capacity(n);
    let mut variance_sum = 0.0;
    for (index, (&expected, &found)) in post.dates().iter().zip(&predictions.dates).enumerate() {
        if expected != found {
            return Err(SummaryError::DateMismatch { index, expected, found });
        }
        let y = observed[index];
        if y.is_nan() {
            return Err(SummaryError::MissingObservation { date: expected });
        }
        let (mean, sd) = (predictions.mean[index], predictions.sd[index]);
        if !sd.is_finite() || sd <= 0.0 {
            return Err(SummaryError::DegenerateVariance { date: expected, sd });
        }
        variance_sum += sd * sd;

        let predicted_interval = Interval::around(mean, z * sd);
        points.push(PointEffect {
            date: expected,
            observed: y,
            predicted: mean,
            predicted_sd: sd,
            predicted_interval,
            effect: y - mean,
            effect_interval: Interval {
                lower: y - predicted_interval.upper,
                upper: y - predicted_interval.lower,
            },
        });
    }

    let observed_sum: f64 = points.iter().map(|p| p.observed).sum();
    let predicted_sum: f64 = points.iter().map(|p| p.predicted).sum();
    let cumulative_sd = match aggregation {
        VarianceAggregation::IndependentSteps => variance_sum.sqrt(),
        VarianceAggregation::Joint => match predictions.sum_sd {
            Some(sd) if sd.is_finite() && sd > 0.0 => sd,
            sum_sd => return Err(SummaryError::JointVarianceUnavailable { sum_sd }),
        },
    };
    let cumulative_effect = observed_sum - predicted_sum;
    let cumulative = EffectSummary {
        observed: observed_sum,
        predicted: predicted_sum,
        predicted_sd: cumulative_sd,
        predicted_interval: Interval::around(predicted_sum, z * cumulative_sd),
        effect: cumulative_effect,
        effect_interval: Interval::around(cumulative_effect, z * cumulative_sd),
    };
    let average = cumulative.divided_by(n as f64);

    let relative = (predicted_sum != 0.0).then(|| RelativeEffect {
        percent: cumulative_effect / predicted_sum * 100.0,
        interval: cumulative.effect_interval.scaled(100.0 / predicted_sum),
    });

    let p_value = 2.0 * (1.0 - standard_normal()?.cdf(cumulative_effect.abs() / cumulative_sd));
    let significant = cumulative.effect_interval.excludes_zero();

    Ok(ImpactEstimate {
        treatment_unit: treatment.to_string(),
        confidence_level,
        z,
        points,
        cumulative,
        average,
        relative,
        p_value: p_value.clamp(0.0, 1.0),
        significant,
        variance_aggregation: aggregation,
    })
}

fn standard_normal() -> ImpactResult<Normal> {
    Normal::new(0.0, 1.0).map_err(|e| SummaryError::Distribution { text: e.to_string() })
}

impl fmt::Display for ImpactEstimate {
    /// Two-column text summary (average, cumulative) in the usual
    /// CausalImpact layout.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pct = self.confidence_level * 100.0;
        let (a, c) = (&self.average, &self.cumulative);
        let iv = |i: &Interval| format!("[{:.2}, {:.2}]", i.lower, i.upper);

        writeln!(f, "Posterior inference for '{}'", self.treatment_unit)?;
        writeln!(f, "{:<28}{:>24}{:>24}", "", "Average", "Cumulative")?;
        writeln!(f, "{:<28}{:>24.2}{:>24.2}", "Actual", a.observed, c.observed)?;
        writeln!(f, "{:<28}{:>24.2}{:>24.2}", "Prediction (s.d.)", a.predicted, c.predicted)?;
        writeln!(f, "{:<28}{:>24.2}{:>24.2}", "", a.predicted_sd, c.predicted_sd)?;
        writeln!(
            f,
            "{:<28}{:>24}{:>24}",
            format!("{pct:.0}% CI"),
            iv(&a.predicted_interval),
            iv(&c.predicted_interval)
        )?;
        writeln!(f, "{:<28}{:>24.2}{:>24.2}", "Absolute effect", a.effect, c.effect)?;
        writeln!(
            f,
            "{:<28}{:>24}{:>24}",
            format!("{pct:.0}% CI"),
            iv(&a.effect_interval),
            iv(&c.effect_interval)
        )?;
        match &self.relative {
            Some(r) => {
                writeln!(f, "{:<28}{:>23.2}%{:>23.2}%", "Relative effect", r.percent, r.percent)?;
                writeln!(
                    f,
                    "{:<28}{:>24}{:>24}",
                    format!("{pct:.0}% CI"),
                    iv(&r.interval),
                    iv(&r.interval)
                )?;
            }
            None => writeln!(f, "{:<28}{:>24}{:>24}", "Relative effect", "n/a", "n/a")?,
        }
        writeln!(f)?;
        writeln!(f, "Tail-area probability p: {:.4}", self.p_value)?;
        let aggregation = match self.variance_aggregation {
            VarianceAggregation::IndependentSteps => "as independent",
            VarianceAggregation::Joint => "jointly",
        };
        write!(
            f,
            "Cumulative effect is {}significant at the {pct:.0}% level \
             (forecast errors aggregated {aggregation})",
            if self.significant { "" } else { "not " }
        )
    }
}
