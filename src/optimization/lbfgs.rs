//! L-BFGS runner over an `argmin` problem in unconstrained `θ`.
//!
//! The problem supplies the cost `c(θ) = -ℓ(θ)` and its gradient through
//! argmin's `CostFunction` / `Gradient` traits; this module builds the solver
//! from [`MLEOptions`], runs it, and reports the result in log-likelihood
//! terms as an [`OptimOutcome`].
use std::collections::HashMap;

use argmin::{
    core::{CostFunction, Executor, Gradient, State, TerminationStatus},
    solver::{
        linesearch::{HagerZhangLineSearch, MoreThuenteLineSearch},
        quasinewton::LBFGS,
    },
};
use argmin_math::ArgminL2Norm;
use ndarray::Array1;
use tracing::debug;

use crate::optimization::{
    errors::{OptError, OptResult},
    options::{LineSearcher, MLEOptions, Tolerances},
};

/// Unconstrained parameter vector (and gradient).
pub type Theta = Array1<f64>;

/// Result of [`minimize_lbfgs`], expressed for the log-likelihood.
///
/// - `value`: best `ℓ(θ̂)` (not the cost).
/// - `converged`: the solver stopped on one of its own criteria rather than
///   the iteration cap.
/// - `fn_evals`: argmin's counters (`cost_count`, `gradient_count`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct OptimOutcome {
    pub theta_hat: Theta,
    pub value: f64,
    pub converged: bool,
    pub status: String,
    pub iterations: usize,
    pub fn_evals: HashMap<String, u64>,
    pub grad_norm: Option<f64>,
}

/// Minimize `problem`'s cost from `theta0` with L-BFGS.
///
/// Errors
/// ------
/// - `OptError` from the solver configuration or from argmin at run time
///   (including errors the problem raised inside `cost`/`gradient`).
/// - `OptError::MissingThetaHat` / `InvalidThetaHat` / `NonFiniteCost` when
///   the best point is absent or not finite.
pub fn minimize_lbfgs<P>(problem: P, theta0: Theta, opts: &MLEOptions) -> OptResult<OptimOutcome>
where
    P: CostFunction<Param = Theta, Output = f64> + Gradient<Param = Theta, Gradient = Theta>,
{
    if opts.verbose {
        let ll0 = -problem.cost(&theta0)?;
        debug!(loglik = ll0, theta0 = ?theta0.to_vec(), "l-bfgs starting point");
    }
    match opts.line_searcher {
        LineSearcher::MoreThuente => {
            let line_search = MoreThuenteLineSearch::<Theta, Theta, f64>::new();
            let solver = LBFGS::new(line_search, opts.memory());
            run(problem, with_tolerances(solver, &opts.tols)?, theta0, opts)
        }
        LineSearcher::HagerZhang => {
            let line_search = HagerZhangLineSearch::<Theta, Theta, f64>::new();
            let solver = LBFGS::new(line_search, opts.memory());
            run(problem, with_tolerances(solver, &opts.tols)?, theta0, opts)
        }
    }
}

fn with_tolerances<L>(
    mut solver: LBFGS<L, Theta, Theta, f64>, tols: &Tolerances,
) -> OptResult<LBFGS<L, Theta, Theta, f64>> {
    if let Some(tol) = tols.tol_grad {
        solver = solver.with_tolerance_grad(tol)?;
    }
    if let Some(tol) = tols.tol_cost {
        solver = solver.with_tolerance_cost(tol)?;
    }
    Ok(solver)
}

fn run<P, S>(problem: P, solver: S, theta0: Theta, opts: &MLEOptions) -> OptResult<OptimOutcome>
where
    S: argmin::core::Solver<P, argmin::core::IterState<Theta, Theta, (), (), (), f64>>
        + Send
        + 'static,
{
    let mut executor = Executor::new(problem, solver).configure(|state| state.param(theta0));
    if let Some(max_iter) = opts.tols.max_iter {
        executor = executor.configure(|state| state.max_iters(max_iter as u64));
    }

    let mut state = executor.run()?.state().clone();
    let termination = state.get_termination_status().clone();
    let best_cost = state.get_best_cost();
    if opts.verbose {
        debug!(iterations = state.get_iter(), status = ?termination, best_cost, "l-bfgs finished");
    }

    let theta_hat = state.take_best_param().ok_or(OptError::MissingThetaHat)?;
    if let Some((index, &value)) = theta_hat.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(OptError::InvalidThetaHat { index, value, reason: "estimate is not finite" });
    }
    if !best_cost.is_finite() {
        return Err(OptError::NonFiniteCost { value: best_cost });
    }
    let converged = !matches!(
        termination,
        TerminationStatus::NotTerminated
            | TerminationStatus::Terminated(argmin::core::TerminationReason::MaxItersReached)
    );
    Ok(OptimOutcome {
        theta_hat,
        value: -best_cost,
        converged,
        status: format!("{termination:?}"),
        iterations: state.get_iter() as usize,
        fn_evals: state.get_func_counts().clone(),
        grad_norm: state.take_gradient().map(|g| g.l2_norm()),
    })
}
