//! optimization — L-BFGS machinery for estimating structural variances.
//!
//! Purpose
//! -------
//! Run argmin's L-BFGS on an unconstrained parameter vector and report the
//! result in log-likelihood terms. The counterfactual estimator is the only
//! client: it optimizes the Kalman-filter prediction-error likelihood over
//! the softplus pre-images of its noise variances.
//!
//! Key behaviors
//! -------------
//! - [`minimize_lbfgs`]: build L-BFGS with the configured line search and
//!   stopping rules, run it on any argmin `CostFunction + Gradient`, and
//!   return an [`OptimOutcome`].
//! - [`MLEOptions`] / [`Tolerances`] / [`LineSearcher`]: validated settings.
//! - [`numerical_stability`]: the softplus maps that keep variances positive.
//!
//! Conventions
//! -----------
//! - Problems expose the cost `c(θ) = -ℓ(θ)`; [`OptimOutcome::value`] is
//!   `ℓ(θ̂)`.
//! - Every failure surfaces as [`OptError`]; argmin's boxed errors are
//!   unpacked in `errors`, including `OptError`s a problem raised itself.
//! - No I/O; progress goes to `tracing` debug events when
//!   `MLEOptions::verbose` is set.
//!
//! Testing notes
//! -------------
//! - Runner and option validation are tested here on a quadratic bowl; the
//!   structural likelihood and its finite-difference gradient are tested in
//!   `counterfactual::likelihood`.

pub mod errors;
pub mod lbfgs;
pub mod numerical_stability;
pub mod options;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::errors::{OptError, OptResult};
pub use self::lbfgs::{minimize_lbfgs, OptimOutcome, Theta};
pub use self::options::{LineSearcher, MLEOptions, Tolerances, DEFAULT_LBFGS_MEM};

// ---- Optional convenience prelude for downstream crates -------------------

pub mod prelude {
    pub use super::numerical_stability::prelude::*;
    pub use super::{minimize_lbfgs, LineSearcher, MLEOptions, OptError, OptResult, Tolerances};
}
