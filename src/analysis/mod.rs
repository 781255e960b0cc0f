//! analysis — configuration-driven intervention studies.
//!
//! Purpose
//! -------
//! Tie the panel, counterfactual, and impact stages together behind a single
//! [`AnalysisConfig`], and provide the batch and descriptive helpers an
//! intervention study typically reports alongside the main estimate.
//!
//! Key behaviors
//! -------------
//! - [`run_analysis`]: one configured analysis → [`AnalysisReport`].
//! - [`run_robustness`]: the same analysis at several candidate intervention
//!   dates (e.g. approval vs. opening), evaluated in parallel.
//! - [`growth_table`]: unit values and % changes between anchor dates.
//!
//! Conventions
//! -----------
//! - Configuration and reports use camelCase field names when serialized.

pub mod config;
pub mod errors;
pub mod growth;
pub mod run;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::config::{AnalysisConfig, ModelConfig};
pub use self::errors::{AnalysisError, AnalysisResult};
pub use self::growth::{growth_table, GrowthRow, GrowthTable};
pub use self::run::{
    run_analysis, run_robustness, AnalysisReport, Coefficient, ModelDiagnostics, RobustnessRun,
};

// ---- Optional convenience prelude for downstream crates -------------------

pub mod prelude {
    pub use super::{
        growth_table, run_analysis, run_robustness, AnalysisConfig, AnalysisError,
        AnalysisReport, AnalysisResult, RobustnessRun,
    };
}
