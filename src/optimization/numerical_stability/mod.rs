//! numerical_stability — overflow-safe transforms for positive parameters.
//!
//! Purpose
//! -------
//! Map unconstrained optimizer coordinates onto strictly positive model
//! quantities (variances) and back, without overflow for large inputs or
//! cancellation for small ones.
//!
//! Key behaviors
//! -------------
//! - [`safe_softplus`] maps ℝ → (0, ∞).
//! - [`safe_softplus_inv`] maps (0, ∞) → ℝ and inverts `safe_softplus`.
//!
//! Invariants & assumptions
//! ------------------------
//! - Inputs are finite `f64`; `safe_softplus_inv` additionally expects `x > 0`.
//!
//! Downstream usage
//! ----------------
//! - `counterfactual::likelihood` parameterizes each structural variance as
//!   `floor + safe_softplus(θ_i)` and seeds θ from starting variances with
//!   `safe_softplus_inv`.
//!
//! Testing notes
//! -------------
//! - Unit tests in [`transformations`] compare against naïve formulas on a
//!   safe grid and check round trips in the tails.

pub mod transformations;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::transformations::{safe_softplus, safe_softplus_inv};

// ---- Optional convenience prelude for downstream crates -------------------

pub mod prelude {
    pub use super::transformations::{safe_softplus, safe_softplus_inv};
}
