//! End-to-end analysis: prepare the panel, fit, predict, summarize.
//!
//! Purpose
//! -------
//! Chain the library stages for one intervention date ([`run_analysis`]) and
//! for a batch of candidate dates ([`run_robustness`]), returning
//! serializable reports.
//!
//! Key behaviors
//! -------------
//! - The panel is narrowed to the treatment and control units, rows with a
//!   missing cell are dropped, and the remaining rows are windowed and
//!   partitioned before fitting.
//! - Each robustness run is independent; runs execute in parallel on the
//!   rayon pool and every run records its own `Result`, so one failure never
//!   aborts its siblings. Output order follows the candidate order.
//!
//! Downstream usage
//! ----------------
//! - Python bindings wrap [`run_analysis`]; reports serialize with `serde`.
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{ser::SerializeStruct, Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::{
    analysis::{
        config::AnalysisConfig,
        errors::{AnalysisError, AnalysisResult},
    },
    counterfactual::{fit, PredictionPath, StructuralVariances, TrendKind},
    impact::{summarize_with, ImpactEstimate},
    panel::{partition_windows, Panel, PanelError},
};

/// Posterior summary of one regression coefficient, original units.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Coefficient {
    pub unit: String,
    pub estimate: f64,
    pub sd: f64,
}

/// Fit diagnostics attached to every report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDiagnostics {
    pub trend: TrendKind,
    /// Structural variances in the units the filter ran in.
    pub variances: StructuralVariances,
    pub loglik: f64,
    pub coefficients: Vec<Coefficient>,
    pub optimizer_status: Option<String>,
    pub optimizer_iterations: Option<usize>,
    pub pre_rows: usize,
    pub post_rows: usize,
    /// Rows removed because a selected unit was missing.
    pub dropped_rows: usize,
}

/// `AnalysisReport` — everything produced by [`run_analysis`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub intervention: NaiveDate,
    pub pre_start: NaiveDate,
    pub pre_end: NaiveDate,
    pub post_start: NaiveDate,
    pub post_end: NaiveDate,
    /// Counterfactual over the post-period.
    pub predictions: PredictionPath,
    /// One-step-ahead fit over the pre-period.
    pub in_sample: PredictionPath,
    pub impact: ImpactEstimate,
    pub diagnostics: ModelDiagnostics,
}

/// One candidate of a robustness batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RobustnessRun {
    pub intervention: NaiveDate,
    pub result: AnalysisResult<AnalysisReport>,
}

impl Serialize for RobustnessRun {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("RobustnessRun", 3)?;
        s.serialize_field("intervention", &self.intervention)?;
        match &self.result {
            Ok(report) => {
                s.serialize_field("report", report)?;
                s.serialize_field("error", &Option::<String>::None)?;
            }
            Err(err) => {
                s.serialize_field("report", &Option::<AnalysisReport>::None)?;
                s.serialize_field("error", &Some(err.to_string()))?;
            }
        }
        s.end()
    }
}

/// Run one intervention analysis on `panel`.
///
/// Parameters
/// ----------
/// - `panel`: aligned panel containing at least the configured units.
/// - `config`: [`AnalysisConfig`].
///
/// Errors
/// ------
/// - `AnalysisError::InvalidConfig` from validation.
/// - `AnalysisError::Panel` for unknown units, no complete rows
///   (`DataInsufficient`), or an unusable intervention date
///   (`InvalidIntervention`).
/// - `AnalysisError::Estimator` / `Summary` from the later stages.
pub fn run_analysis(panel: &Panel, config: &AnalysisConfig) -> AnalysisResult<AnalysisReport> {
    config.validate()?;
    let treatment = config.treatment_unit.as_str();

    let selected = panel.select_units(&config.units())?;
    let complete = selected.drop_incomplete_rows().map_err(|err| match err {
        PanelError::EmptyPanel => PanelError::DataInsufficient {
            unit: treatment.to_string(),
            reason: "no row has all selected units observed",
        },
        other => other,
    })?;
    let dropped_rows = selected.n_rows() - complete.n_rows();
    if dropped_rows > 0 {
        debug!(dropped_rows, "dropped rows with missing values");
    }

    let windows = config.windows(&complete)?;
    let parts = partition_windows(&complete, &windows, &config.partition_options()?)?;
    let opts = config.model.estimator_options()?;

    let model = fit(&parts.pre, treatment, &config.control_units, &opts)?;
    let predictions = model.predict(&parts.post)?;
    let impact = summarize_with(
        &parts.post,
        treatment,
        &predictions,
        config.confidence_level,
        config.variance_aggregation,
    )?;

    let coefficients = model
        .coefficients()
        .into_iter()
        .zip(model.coefficient_sds())
        .map(|((unit, estimate), sd)| Coefficient { unit, estimate, sd })
        .collect();
    let diagnostics = ModelDiagnostics {
        trend: model.trend(),
        variances: model.variances(),
        loglik: model.loglik(),
        coefficients,
        optimizer_status: model.optimization().map(|o| o.status.clone()),
        optimizer_iterations: model.optimization().map(|o| o.iterations),
        pre_rows: parts.pre.n_rows(),
        post_rows: parts.post.n_rows(),
        dropped_rows,
    };

    info!(
        treatment,
        intervention = %parts.intervention,
        cumulative_effect = impact.cumulative.effect,
        p_value = impact.p_value,
        significant = impact.significant,
        "analysis complete"
    );

    Ok(AnalysisReport {
        intervention: parts.intervention,
        pre_start: parts.pre.first_date(),
        pre_end: parts.pre.last_date(),
        post_start: parts.post.first_date(),
        post_end: parts.post.last_date(),
        predictions,
        in_sample: model.in_sample().clone(),
        impact,
        diagnostics,
    })
}

/// Repeat `config` for each candidate intervention date.
///
/// Runs are evaluated in parallel and returned in `candidates` order; a
/// failing run is logged at `warn` and kept as an `Err` in its slot.
pub fn run_robustness(
    panel: &Panel, config: &AnalysisConfig, candidates: &[NaiveDate],
) -> Vec<RobustnessRun> {
    candidates
        .par_iter()
        .map(|&intervention| {
            let result = run_analysis(panel, &config.with_post_start(intervention));
            if let Err(err) = &result {
                warn!(%intervention, error = %err, "robustness run failed");
            }
            RobustnessRun { intervention, result }
        })
        .collect()
}

impl RobustnessRun {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn report(&self) -> Option<&AnalysisReport> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&AnalysisError> {
        self.result.as_ref().err()
    }
}
