//! Integration tests for the intervention-analysis pipeline.
//!
//! Purpose
//! -------
//! - Validate the end-to-end path from raw series or an aligned panel,
//!   through partitioning, structural-model fitting and forecasting, to the
//!   effect summary and serialized report.
//! - Pin the behavioral guarantees a caller relies on: no post-period
//!   leakage, determinism, nested intervals, and the canonical synthetic
//!   scenarios (flat series, level jump, underdetermined fit, out-of-range
//!   intervention).
//!
//! Coverage
//! --------
//! - `panel`: `align`, `partition`, `partition_windows` via `run_analysis`.
//! - `counterfactual`: `fit`, `FittedModel::predict` with estimated variances.
//! - `impact`: `summarize` at several confidence levels; coverage of the
//!   independent and joint cumulative intervals on simulated data.
//! - `analysis`: `AnalysisConfig::from_json_str`, `run_analysis`,
//!   `run_robustness`, `growth_table`.
//!
//! Exclusions
//! ----------
//! - Arithmetic of individual formulas (covered by unit tests).
//! - Python bindings.
use approx::assert_abs_diff_eq;
use chrono::{Months, NaiveDate};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;
use rust_causal_impact::{
    analysis::{growth_table, run_analysis, run_robustness, AnalysisConfig, AnalysisError},
    counterfactual::{
        fit, EstimatorError, EstimatorOptions, Hyperparameters, StructuralVariances, TrendKind,
    },
    impact::{summarize, summarize_with, VarianceAggregation},
    panel::{
        align, partition, AlignOptions, InterventionIssue, Panel, PanelError, PartitionOptions,
        RawSeries,
    },
};

/// Purpose
/// -------
/// First-of-month date `i` months after January 2005.
fn month(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2005, 1, 1).unwrap() + Months::new(i as u32)
}

/// Purpose
/// -------
/// Panel with columns `["t", "c1", "c2"]` over `n` months from `row(i)`.
fn panel(n: usize, row: impl Fn(usize) -> [f64; 3]) -> Panel {
    let rows: Vec<[f64; 3]> = (0..n).map(row).collect();
    let col = |j: usize| rows.iter().map(|r| r[j]).collect::<Vec<f64>>();
    Panel::from_columns(
        (0..n).map(month).collect(),
        vec![("t".into(), col(0)), ("c1".into(), col(1)), ("c2".into(), col(2))],
    )
    .unwrap()
}

/// Purpose
/// -------
/// Treatment driven by two smooth controls plus a small deterministic
/// wiggle, shifted by `effect` from month `start` on.
fn driven_panel(n: usize, start: usize, effect: f64) -> Panel {
    panel(n, |i| {
        let t = i as f64;
        let c1 = 100.0 + 5.0 * (0.5 * t).sin() + 0.2 * t;
        let c2 = 80.0 + 4.0 * (0.3 * t).cos() + 0.1 * t;
        let y = 0.6 * c1 + 0.5 * c2 + 0.3 * (1.9 * t).sin() + if i >= start { effect } else { 0.0 };
        [y, c1, c2]
    })
}

fn config(post_start: usize) -> AnalysisConfig {
    AnalysisConfig::new("t", vec!["c1".into(), "c2".into()], month(post_start))
}

#[test]
// Purpose
// -------
// Scenario A: identical flat series show no effect.
//
// Given
// -----
// - Treatment and both controls constant at 100 for 36 months,
//   intervention at month 24.
//
// Expect
// ------
// - Cumulative effect ≈ 0 and inside its interval; not significant.
fn flat_series_show_no_effect() {
    let p = panel(36, |_| [100.0, 100.0, 100.0]);

    let report = run_analysis(&p, &config(24)).unwrap();

    let cum = &report.impact.cumulative;
    assert_abs_diff_eq!(cum.effect, 0.0, epsilon = 1e-6);
    assert!(cum.effect_interval.contains(0.0));
    assert!(!report.impact.significant);
    assert_eq!(report.diagnostics.pre_rows, 24);
    assert_eq!(report.diagnostics.post_rows, 12);
}

#[test]
// Purpose
// -------
// Scenario B: a level jump in the treatment is recovered at the first
// post-period date.
//
// Given
// -----
// - Controls flat at 80 and 120; treatment flat at 100 then 110 from month 24.
//
// Expect
// ------
// - First point effect ≈ 10 with an interval excluding 0; the cumulative
//   effect is significant.
fn level_jump_is_detected() {
    let p = panel(36, |i| [if i >= 24 { 110.0 } else { 100.0 }, 80.0, 120.0]);

    let report = run_analysis(&p, &config(24)).unwrap();

    let first = &report.impact.points[0];
    assert_eq!(first.date, month(24));
    assert_abs_diff_eq!(first.effect, 10.0, epsilon = 0.5);
    assert!(first.effect_interval.excludes_zero());
    assert!(report.impact.significant);
    assert!(report.impact.p_value < 0.05);
}

#[test]
// Purpose
// -------
// Scenario C: one pre-period row short of `controls + 2` is rejected by the
// estimator, directly and through the driver.
//
// Given
// -----
// - 3 pre rows with 2 controls.
//
// Expect
// ------
// - `UnderdeterminedModel { observations: 3, predictors: 2 }`.
fn underdetermined_pre_period_is_rejected() {
    let p = driven_panel(6, 3, 0.0);
    let parts = partition(&p, month(3), &PartitionOptions::new(1, 1).unwrap()).unwrap();

    let direct = fit(&parts.pre, "t", &["c1", "c2"], &EstimatorOptions::default()).unwrap_err();
    let cfg = AnalysisConfig { min_pre_period_length: 1, ..config(3) };
    let driven = run_analysis(&p, &cfg).unwrap_err();

    let expected = EstimatorError::UnderdeterminedModel { observations: 3, predictors: 2 };
    assert_eq!(direct, expected);
    assert_eq!(driven, AnalysisError::Estimator(expected));
}

#[test]
// Purpose
// -------
// Scenario D: an intervention after the last panel date is invalid.
//
// Given
// -----
// - 24 months of data; intervention at month 30.
//
// Expect
// ------
// - `InvalidIntervention` with `AfterLastDate`, both from `partition` and
//   from `run_analysis`.
fn intervention_after_last_date_is_invalid() {
    let p = driven_panel(24, 12, 0.0);

    let direct = partition(&p, month(30), &PartitionOptions::default()).unwrap_err();
    let driven = run_analysis(&p, &config(30)).unwrap_err();

    assert!(matches!(
        direct,
        PanelError::InvalidIntervention { issue: InterventionIssue::AfterLastDate { .. }, .. }
    ));
    assert!(matches!(
        driven,
        AnalysisError::Panel(PanelError::InvalidIntervention {
            issue: InterventionIssue::AfterLastDate { .. },
            ..
        })
    ));
}

#[test]
// Purpose
// -------
// A sustained shift on a realistic driven series is estimated close to its
// true size and flagged as significant.
//
// Given
// -----
// - 48 months, treatment = 0.6·c1 + 0.5·c2 + wiggle, +8 from month 36.
//
// Expect
// ------
// - Average effect ≈ 8; significant; positive relative effect.
fn sustained_shift_is_estimated() {
    let p = driven_panel(48, 36, 8.0);

    let report = run_analysis(&p, &config(36)).unwrap();

    assert_abs_diff_eq!(report.impact.average.effect, 8.0, epsilon = 2.0);
    assert!(report.impact.significant);
    assert!(report.impact.relative.as_ref().unwrap().percent > 0.0);
    assert_eq!(report.diagnostics.coefficients.len(), 2);
    assert_eq!(report.in_sample.len(), 36);
}

#[test]
// Purpose
// -------
// Predictions never depend on post-period treatment values.
//
// Given
// -----
// - The same panel with post-period treatment values replaced by a
//   reversed, scaled copy.
//
// Expect
// ------
// - Identical prediction paths; different observed effects.
fn post_period_treatment_values_do_not_leak() {
    let clean = driven_panel(40, 30, 0.0);
    let corrupted = panel(40, |i| {
        let v = clean.values();
        let y = if i >= 30 { 3.0 * v[[69 - i, 0]] } else { v[[i, 0]] };
        [y, v[[i, 1]], v[[i, 2]]]
    });

    let a = run_analysis(&clean, &config(30)).unwrap();
    let b = run_analysis(&corrupted, &config(30)).unwrap();

    assert_eq!(a.predictions, b.predictions);
    assert_ne!(a.impact.cumulative.effect, b.impact.cumulative.effect);
}

#[test]
// Purpose
// -------
// Fit + predict is deterministic, and higher confidence nests intervals.
//
// Given
// -----
// - Two independent runs on the same inputs; summaries of one prediction
//   path at 95% and 99%.
//
// Expect
// ------
// - Equal reports; the 99% cumulative interval contains the 95% one.
fn runs_are_deterministic_and_intervals_nest() {
    let p = driven_panel(40, 30, 2.0);
    let first = run_analysis(&p, &config(30)).unwrap();
    let second = run_analysis(&p, &config(30)).unwrap();
    let post = p.slice_dates(month(30), month(39)).unwrap();

    let at95 = summarize(&post, "t", &first.predictions, 0.95).unwrap();
    let at99 = summarize(&post, "t", &first.predictions, 0.99).unwrap();

    assert_eq!(first, second);
    let (i95, i99) = (at95.cumulative.effect_interval, at99.cumulative.effect_interval);
    assert!(i99.lower <= i95.lower && i95.upper <= i99.upper);
}

/// Purpose
/// -------
/// One draw from the local level model with two random-walk controls:
/// `β ~ N(0, I)`, `σ²_obs = 0.5`, `σ²_level = 0.1`, no intervention effect.
fn simulated_panel(rng: &mut StdRng, n: usize) -> Panel {
    let mut normal = || rng.sample::<f64, _>(StandardNormal);
    let beta = [normal(), normal()];
    let (mut level, mut x1, mut x2) = (10.0, 0.0, 0.0);
    let mut rows = Vec::with_capacity(n);
    for i in 0..n {
        if i > 0 {
            level += 0.1f64.sqrt() * normal();
        }
        x1 += normal();
        x2 += normal();
        let y = level + beta[0] * x1 + beta[1] * x2 + 0.5f64.sqrt() * normal();
        rows.push([y, x1, x2]);
    }
    panel(n, |i| rows[i])
}

#[test]
// Purpose
// -------
// The joint cumulative interval has its nominal coverage when the model is
// correctly specified, while aggregating forecast errors as independent
// undercovers.
//
// Given
// -----
// - 400 simulated panels (48 pre, 12 post months, no effect) fitted with
//   the generating variances fixed, ridge 1 (the coefficient prior) and no
//   standardization; 95% level.
//
// Expect
// ------
// - Joint coverage of the zero cumulative effect in [0.90, 0.99].
// - Independent coverage below 0.80.
fn joint_cumulative_interval_has_nominal_coverage() {
    let mut rng = StdRng::seed_from_u64(20_090_601);
    let opts = EstimatorOptions {
        ridge: 1.0,
        standardize: false,
        hyperparameters: Hyperparameters::Fixed(StructuralVariances::new(0.5, 0.1, 0.1).unwrap()),
        ..EstimatorOptions::default()
    };
    let reps = 400;
    let (mut joint_hits, mut independent_hits) = (0usize, 0usize);

    for _ in 0..reps {
        let p = simulated_panel(&mut rng, 60);
        let parts = partition(&p, month(48), &PartitionOptions::default()).unwrap();
        let model = fit(&parts.pre, "t", &["c1", "c2"], &opts).unwrap();
        let path = model.predict(&parts.post).unwrap();

        let joint =
            summarize_with(&parts.post, "t", &path, 0.95, VarianceAggregation::Joint).unwrap();
        let independent = summarize(&parts.post, "t", &path, 0.95).unwrap();
        joint_hits += usize::from(joint.cumulative.effect_interval.contains(0.0));
        independent_hits += usize::from(independent.cumulative.effect_interval.contains(0.0));
    }

    let joint_coverage = joint_hits as f64 / reps as f64;
    let independent_coverage = independent_hits as f64 / reps as f64;
    assert!((0.90..=0.99).contains(&joint_coverage), "joint coverage {joint_coverage}");
    assert!(independent_coverage < 0.80, "independent coverage {independent_coverage}");
}

#[test]
// Purpose
// -------
// A robustness batch keeps candidate order and isolates failures.
//
// Given
// -----
// - Candidates month 30, month 36, month 60 (after the panel ends).
//
// Expect
// ------
// - Three runs in order; the first two succeed, the last carries an
//   `InvalidIntervention` error; the batch serializes to JSON.
fn robustness_batch_isolates_failures() {
    let p = driven_panel(48, 36, 8.0);
    let candidates = [month(30), month(36), month(60)];

    let runs = run_robustness(&p, &config(36), &candidates);

    assert_eq!(runs.iter().map(|r| r.intervention).collect::<Vec<_>>(), candidates);
    assert!(runs[0].is_ok() && runs[1].is_ok());
    assert!(matches!(
        runs[2].error(),
        Some(AnalysisError::Panel(PanelError::InvalidIntervention { .. }))
    ));
    let json = serde_json::to_value(&runs).unwrap();
    assert!(json[2]["report"].is_null());
    assert!(json[2]["error"].as_str().unwrap().contains("Invalid intervention"));
}

#[test]
// Purpose
// -------
// Raw series → aligned panel → JSON-configured analysis → JSON report.
//
// Given
// -----
// - Three raw series with mid-month dates; the treatment misses one month.
// - A JSON config with explicit windows and a local linear trend.
//
// Expect
// ------
// - Alignment snaps to month starts and drops the incomplete row; the
//   report honors the windows and serializes with camelCase keys.
fn raw_series_and_json_config_end_to_end() {
    let source = driven_panel(48, 36, 5.0);
    let raw: Vec<RawSeries> = ["t", "c1", "c2"]
        .iter()
        .enumerate()
        .map(|(j, unit)| {
            RawSeries::from_pairs(
                *unit,
                (0..48)
                    .filter(|&i| !(j == 0 && i == 10))
                    .map(|i| (month(i) + chrono::Days::new(14), source.values()[[i, j]])),
            )
        })
        .collect();
    let json = r#"{
        "treatmentUnit": "t",
        "controlUnits": ["c1", "c2"],
        "preStart": "2005-01-01",
        "preEnd": "2007-11-01",
        "postStart": "2008-01-01",
        "postEnd": "2008-12-01",
        "confidenceLevel": 0.9,
        "minPrePeriodLength": 12,
        "model": { "trend": "localLinearTrend", "maxIter": 200 }
    }"#;

    let aligned = align(&raw, &AlignOptions::new("t")).unwrap();
    let cfg = AnalysisConfig::from_json_str(json).unwrap();
    let report = run_analysis(&aligned, &cfg).unwrap();
    let out = serde_json::to_value(&report).unwrap();

    assert_eq!(aligned.n_rows(), 47);
    assert_eq!(aligned.first_date(), month(0));
    assert_eq!(report.pre_end, month(34));
    assert_eq!(report.post_start, month(36));
    assert_eq!(report.diagnostics.trend, TrendKind::LocalLinearTrend);
    assert_eq!(report.diagnostics.pre_rows, 34);
    assert_eq!(out["impact"]["confidenceLevel"], 0.9);
    assert!(out["impact"]["cumulative"]["effectInterval"]["lower"].is_number());
}

#[test]
// Purpose
// -------
// Growth tables and indexed views work on an analysis panel.
//
// Given
// -----
// - The flat/jump panel of scenario B; anchors at months 0, 23, 35.
//
// Expect
// ------
// - Treatment +0% then +10%; indexing to month 0 puts every unit at 100.
fn growth_table_and_indexing() {
    let p = panel(36, |i| [if i >= 24 { 110.0 } else { 100.0 }, 80.0, 120.0]);

    let table = growth_table(&p, &[month(0), month(23), month(35)]).unwrap();
    let indexed = p.indexed_to(month(0)).unwrap();

    assert_eq!(table.rows[0].unit, "t");
    assert_abs_diff_eq!(table.rows[0].changes[0].unwrap(), 0.0);
    assert_abs_diff_eq!(table.rows[0].changes[1].unwrap(), 10.0, epsilon = 1e-12);
    assert!(indexed.values().row(0).iter().all(|&v| (v - 100.0).abs() < 1e-12));
}
