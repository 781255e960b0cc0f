//! Optimizer configuration for variance estimation.
//!
//! [`MLEOptions`] bundles the L-BFGS stopping rules, line search and history
//! size. Numeric fields are checked when built through [`Tolerances::new`] /
//! [`MLEOptions::new`]; the `Default` values are valid by construction.
use std::str::FromStr;

use crate::optimization::errors::{OptError, OptResult};

/// Default L-BFGS history size.
pub const DEFAULT_LBFGS_MEM: usize = 7;

/// Line search used inside L-BFGS. Parses case-insensitively from
/// `"MoreThuente"` / `"HagerZhang"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSearcher {
    MoreThuente,
    HagerZhang,
}

impl FromStr for LineSearcher {
    type Err = OptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "morethuente" => Ok(LineSearcher::MoreThuente),
            "hagerzhang" => Ok(LineSearcher::HagerZhang),
            _ => Err(OptError::InvalidLineSearch {
                name: s.to_string(),
                reason: "expected 'MoreThuente' or 'HagerZhang'",
            }),
        }
    }
}

/// Stopping rules. At least one must be set.
///
/// - `tol_grad`: gradient-norm threshold.
/// - `tol_cost`: threshold on the change in `-ℓ`.
/// - `max_iter`: iteration cap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    pub tol_grad: Option<f64>,
    pub tol_cost: Option<f64>,
    pub max_iter: Option<usize>,
}

impl Tolerances {
    /// Errors
    /// ------
    /// - `OptError::NoTolerancesProvided` when all three are `None`.
    /// - `OptError::InvalidTolGrad` / `InvalidTolCost` for a non-finite or
    ///   non-positive tolerance.
    /// - `OptError::InvalidMaxIter` for `max_iter == 0`.
    pub fn new(
        tol_grad: Option<f64>, tol_cost: Option<f64>, max_iter: Option<usize>,
    ) -> OptResult<Self> {
        if tol_grad.is_none() && tol_cost.is_none() && max_iter.is_none() {
            return Err(OptError::NoTolerancesProvided);
        }
        if let Some(tol) = tol_grad.filter(|t| !positive_finite(*t)) {
            return Err(OptError::InvalidTolGrad { tol, reason: "must be finite and > 0" });
        }
        if let Some(tol) = tol_cost.filter(|t| !positive_finite(*t)) {
            return Err(OptError::InvalidTolCost { tol, reason: "must be finite and > 0" });
        }
        if max_iter == Some(0) {
            return Err(OptError::InvalidMaxIter { max_iter: 0, reason: "must be at least 1" });
        }
        Ok(Tolerances { tol_grad, tol_cost, max_iter })
    }
}

/// `MLEOptions` — settings for one L-BFGS run.
///
/// Defaults: `tol_grad = 1e-6`, no cost tolerance, `max_iter = 300`,
/// More–Thuente line search, quiet, history [`DEFAULT_LBFGS_MEM`].
#[derive(Debug, Clone, PartialEq)]
pub struct MLEOptions {
    pub tols: Tolerances,
    pub line_searcher: LineSearcher,
    /// Emit `tracing` debug events for the start point and the final state.
    pub verbose: bool,
    pub lbfgs_mem: Option<usize>,
}

impl MLEOptions {
    /// Errors
    /// ------
    /// - `OptError::InvalidLBFGSMem` for `lbfgs_mem == Some(0)`.
    pub fn new(
        tols: Tolerances, line_searcher: LineSearcher, verbose: bool, lbfgs_mem: Option<usize>,
    ) -> OptResult<Self> {
        if lbfgs_mem == Some(0) {
            return Err(OptError::InvalidLBFGSMem { mem: 0, reason: "must be at least 1" });
        }
        Ok(MLEOptions { tols, line_searcher, verbose, lbfgs_mem })
    }

    pub fn memory(&self) -> usize {
        self.lbfgs_mem.unwrap_or(DEFAULT_LBFGS_MEM)
    }
}

impl Default for MLEOptions {
    fn default() -> Self {
        MLEOptions {
            tols: Tolerances { tol_grad: Some(1e-6), tol_cost: None, max_iter: Some(300) },
            line_searcher: LineSearcher::MoreThuente,
            verbose: false,
            lbfgs_mem: None,
        }
    }
}

#[inline]
fn positive_finite(x: f64) -> bool {
    x.is_finite() && x > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    // Purpose
    // -------
    // Stopping rules must exist and be positive.
    //
    // Given
    // -----
    // - All-`None`, a negative gradient tolerance, an infinite cost
    //   tolerance, `max_iter = 0`.
    //
    // Expect
    // ------
    // - The matching `OptError` variant for each.
    fn tolerances_reject_missing_or_invalid_rules() {
        assert_eq!(Tolerances::new(None, None, None), Err(OptError::NoTolerancesProvided));
        assert!(matches!(
            Tolerances::new(Some(-1.0), None, None),
            Err(OptError::InvalidTolGrad { .. })
        ));
        assert!(matches!(
            Tolerances::new(None, Some(f64::INFINITY), None),
            Err(OptError::InvalidTolCost { .. })
        ));
        assert!(matches!(
            Tolerances::new(None, None, Some(0)),
            Err(OptError::InvalidMaxIter { .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // Line-search names parse case-insensitively; zero history is rejected.
    //
    // Given
    // -----
    // - "hagerzhang", "MORETHUENTE", "bisection"; `lbfgs_mem = Some(0)`.
    //
    // Expect
    // ------
    // - Two successes, `InvalidLineSearch`, `InvalidLBFGSMem`; the default
    //   history is 7.
    fn line_search_parsing_and_memory() {
        assert_eq!("hagerzhang".parse::<LineSearcher>(), Ok(LineSearcher::HagerZhang));
        assert_eq!("MORETHUENTE".parse::<LineSearcher>(), Ok(LineSearcher::MoreThuente));
        assert!(matches!(
            "bisection".parse::<LineSearcher>(),
            Err(OptError::InvalidLineSearch { .. })
        ));

        let tols = MLEOptions::default().tols;
        assert!(matches!(
            MLEOptions::new(tols, LineSearcher::MoreThuente, false, Some(0)),
            Err(OptError::InvalidLBFGSMem { .. })
        ));
        assert_eq!(MLEOptions::default().memory(), DEFAULT_LBFGS_MEM);
    }
}
