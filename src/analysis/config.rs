//! Analysis configuration: study windows, units, confidence level, and model
//! settings in one deserializable struct.
//!
//! Purpose
//! -------
//! Describe a single intervention analysis declaratively so it can be loaded
//! from JSON, validated once, and turned into the option structs each stage
//! consumes ([`StudyWindows`], [`PartitionOptions`], [`EstimatorOptions`]).
//!
//! Key behaviors
//! -------------
//! - Field names are camelCase on the wire (`preStart`, `controlUnits`,
//!   `confidenceLevel`, `minPrePeriodLength`, ...); dates are ISO
//!   `YYYY-MM-DD` strings.
//! - Omitted window bounds default to the panel: `preStart` = first date,
//!   `preEnd` = the day before `postStart`, `postEnd` = last date.
//! - The intervention date is `postStart`; choosing between candidate dates
//!   is left to the caller (see [`run_robustness`](super::run_robustness)).
//! - `varianceAggregation` selects how the cumulative interval combines
//!   forecast errors: `"independentSteps"` (default) or `"joint"`.
//!
//! Invariants & assumptions
//! ------------------------
//! - After [`AnalysisConfig::validate`]: a non-empty treatment unit, at least
//!   one control, no duplicates among units, `0 < confidenceLevel < 1`, and
//!   minimum lengths ≥ 1.
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    analysis::errors::{AnalysisError, AnalysisResult},
    counterfactual::{EstimatorOptions, Hyperparameters, TrendKind, DEFAULT_RIDGE},
    impact::{VarianceAggregation, DEFAULT_CONFIDENCE_LEVEL},
    optimization::{LineSearcher, MLEOptions, Tolerances},
    panel::{
        errors::PanelError,
        partition::{DEFAULT_MIN_POST_ROWS, DEFAULT_MIN_PRE_ROWS},
        Panel, PartitionOptions, StudyWindows,
    },
};

/// Model section of [`AnalysisConfig`].
///
/// Fields
/// ------
/// - `trend`: `"localLevel"` (default) or `"localLinearTrend"`.
/// - `ridge`: coefficient prior precision, default `1e-2`.
/// - `standardize`: default `true`.
/// - `maxIter`: optimizer iteration cap (default from [`MLEOptions`]).
/// - `lineSearch`: `"MoreThuente"` or `"HagerZhang"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelConfig {
    pub trend: TrendKind,
    pub ridge: f64,
    pub standardize: bool,
    pub max_iter: Option<usize>,
    pub line_search: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            trend: TrendKind::LocalLevel,
            ridge: DEFAULT_RIDGE,
            standardize: true,
            max_iter: None,
            line_search: None,
        }
    }
}

impl ModelConfig {
    /// Build validated [`EstimatorOptions`] with maximum-likelihood variances.
    ///
    /// Errors
    /// ------
    /// - `AnalysisError::Optimization` for an invalid `maxIter` or line search.
    /// - `AnalysisError::Estimator` for an invalid ridge.
    pub fn estimator_options(&self) -> AnalysisResult<EstimatorOptions> {
        let mut mle = MLEOptions::default();
        if let Some(max_iter) = self.max_iter {
            mle.tols = Tolerances::new(mle.tols.tol_grad, mle.tols.tol_cost, Some(max_iter))?;
        }
        if let Some(name) = &self.line_search {
            mle.line_searcher = name.parse::<LineSearcher>()?;
        }
        let base = EstimatorOptions::default();
        Ok(EstimatorOptions::new(
            self.trend,
            self.ridge,
            self.standardize,
            base.diffuse_variance,
            base.variance_floor,
            Hyperparameters::MaximumLikelihood(mle),
        )?)
    }
}

/// `AnalysisConfig` — one intervention analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisConfig {
    pub treatment_unit: String,
    pub control_units: Vec<String>,
    #[serde(default)]
    pub pre_start: Option<NaiveDate>,
    #[serde(default)]
    pub pre_end: Option<NaiveDate>,
    pub post_start: NaiveDate,
    #[serde(default)]
    pub post_end: Option<NaiveDate>,
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
    #[serde(default = "default_min_pre")]
    pub min_pre_period_length: usize,
    #[serde(default = "default_min_post")]
    pub min_post_period_length: usize,
    #[serde(default)]
    pub variance_aggregation: VarianceAggregation,
    #[serde(default)]
    pub model: ModelConfig,
}

fn default_confidence_level() -> f64 {
    DEFAULT_CONFIDENCE_LEVEL
}

fn default_min_pre() -> usize {
    DEFAULT_MIN_PRE_ROWS
}

fn default_min_post() -> usize {
    DEFAULT_MIN_POST_ROWS
}

impl AnalysisConfig {
    /// Config with default windows, level, minimum lengths and model.
    pub fn new(
        treatment_unit: impl Into<String>, control_units: Vec<String>, post_start: NaiveDate,
    ) -> Self {
        AnalysisConfig {
            treatment_unit: treatment_unit.into(),
            control_units,
            pre_start: None,
            pre_end: None,
            post_start,
            post_end: None,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            min_pre_period_length: DEFAULT_MIN_PRE_ROWS,
            min_post_period_length: DEFAULT_MIN_POST_ROWS,
            variance_aggregation: VarianceAggregation::default(),
            model: ModelConfig::default(),
        }
    }

    /// Parse and validate a JSON document.
    ///
    /// Errors
    /// ------
    /// - `AnalysisError::InvalidConfig` for malformed JSON or a failed
    ///   [`validate`](Self::validate).
    pub fn from_json_str(json: &str) -> AnalysisResult<Self> {
        let config: AnalysisConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Errors
    /// ------
    /// - `AnalysisError::InvalidConfig` naming the first violated rule.
    pub fn validate(&self) -> AnalysisResult<()> {
        let invalid = |reason: String| Err(AnalysisError::InvalidConfig { reason });
        if self.treatment_unit.trim().is_empty() {
            return invalid("treatmentUnit is empty".to_string());
        }
        if self.control_units.is_empty() {
            return invalid("controlUnits must name at least one unit".to_string());
        }
        for (i, unit) in self.control_units.iter().enumerate() {
            if *unit == self.treatment_unit {
                return invalid(format!("control unit '{unit}' is the treatment unit"));
            }
            if self.control_units[..i].contains(unit) {
                return invalid(format!("control unit '{unit}' is listed twice"));
            }
        }
        let level = self.confidence_level;
        if !level.is_finite() || level <= 0.0 || level >= 1.0 {
            return invalid(format!("confidenceLevel {level} must be in (0, 1)"));
        }
        if self.min_pre_period_length == 0 || self.min_post_period_length == 0 {
            return invalid("minimum period lengths must be at least 1".to_string());
        }
        Ok(())
    }

    /// Resolve the study windows against `panel`.
    ///
    /// Errors
    /// ------
    /// - `AnalysisError::Panel(InvalidWindows)` for inconsistent explicit
    ///   bounds.
    pub fn windows(&self, panel: &Panel) -> AnalysisResult<StudyWindows> {
        let pre_end = match self.pre_end {
            Some(d) => d,
            None => self.post_start.pred_opt().ok_or(PanelError::InvalidWindows {
                reason: "postStart has no preceding day",
            })?,
        };
        let pre_start = self.pre_start.unwrap_or_else(|| panel.first_date().min(pre_end));
        // Keep post_end >= post_start so an out-of-range postStart is reported
        // as an invalid intervention by the partition step.
        let post_end = self.post_end.unwrap_or_else(|| panel.last_date().max(self.post_start));
        Ok(StudyWindows::new(pre_start, pre_end, self.post_start, post_end)?)
    }

    pub fn partition_options(&self) -> AnalysisResult<PartitionOptions> {
        Ok(PartitionOptions::new(self.min_pre_period_length, self.min_post_period_length)?)
    }

    /// Same analysis with a different intervention date. An explicit
    /// `preEnd` is kept only if it still precedes the new date.
    pub fn with_post_start(&self, post_start: NaiveDate) -> Self {
        AnalysisConfig {
            post_start,
            pre_end: self.pre_end.filter(|&d| d < post_start),
            ..self.clone()
        }
    }

    /// Treatment followed by controls, the column order used for analysis.
    pub fn units(&self) -> Vec<String> {
        std::iter::once(self.treatment_unit.clone())
            .chain(self.control_units.iter().cloned())
            .collect()
    }
}
