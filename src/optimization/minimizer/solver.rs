//! minimizer::solver — L-BFGS construction and execution on top of `argmin`.
//!
//! [`lbfgs`] turns a line search plus [`MinimizeOptions`] into a configured
//! solver; [`run_lbfgs`] seeds it with a starting image vector, applies the
//! iteration cap and converts the final `argmin` state into an
//! [`OptimOutcome`]. The initial parameter and the cap are runtime concerns
//! and are never baked into the solver itself.
use argmin::{
    core::{Executor, IterState, Solver, State},
    solver::quasinewton::LBFGS,
};
use tracing::debug;

use crate::optimization::{
    errors::OptResult,
    minimizer::{
        adapter::ArgMinAdapter,
        traits::{MinimizeOptions, Objective, OptimOutcome},
        types::{Cost, DEFAULT_LBFGS_MEM, Grad, Theta},
    },
};

/// Solver state shared by every L-BFGS variant in this crate.
pub type LbfgsState = IterState<Theta, Grad, (), (), (), Cost>;

/// Build an L-BFGS solver around `line_search`.
///
/// The history size comes from `opts.lbfgs_mem` (default
/// [`DEFAULT_LBFGS_MEM`]). Absent tolerances leave `argmin`'s defaults.
///
/// # Errors
/// Any tolerance `argmin` refuses, as an
/// [`OptError`](crate::optimization::errors::OptError).
pub fn lbfgs<L>(line_search: L, opts: &MinimizeOptions) -> OptResult<LBFGS<L, Theta, Grad, Cost>> {
    let mut solver = LBFGS::new(line_search, opts.lbfgs_mem.unwrap_or(DEFAULT_LBFGS_MEM));
    if let Some(tol) = opts.tols.tol_grad {
        solver = solver.with_tolerance_grad(tol)?;
    }
    if let Some(tol) = opts.tols.tol_cost {
        solver = solver.with_tolerance_cost(tol)?;
    }
    Ok(solver)
}

/// Execute `solver` on `problem` starting from `theta0`.
///
/// With `opts.verbose`, the starting cost is logged at debug level and, when
/// built with `obs_slog`, a terminal observer reports every iteration.
///
/// # Errors
/// - Errors raised by the objective inside cost/gradient callbacks, with
///   their original variant.
/// - Line-search and solver failures.
/// - [`OptError::MissingThetaHat`](crate::optimization::errors::OptError::MissingThetaHat)
///   or non-finite results when the final state is unusable.
pub fn run_lbfgs<'a, F, S>(
    theta0: Theta, opts: &MinimizeOptions, problem: ArgMinAdapter<'a, F>, solver: S,
) -> OptResult<OptimOutcome>
where
    F: Objective,
    S: Solver<ArgMinAdapter<'a, F>, LbfgsState> + 'static,
{
    if opts.verbose {
        let start = problem.f.value(&theta0)?;
        debug!(cost = start, dim = theta0.len(), "starting L-BFGS");
    }

    let executor = Executor::new(problem, solver).configure(|state| {
        let state = state.param(theta0);
        match opts.tols.max_iter {
            Some(cap) => state.max_iters(cap as u64),
            None => state,
        }
    });
    #[cfg(feature = "obs_slog")]
    let executor = if opts.verbose {
        executor.add_observer(
            argmin_observer_slog::SlogLogger::term_noblock(),
            argmin::core::observers::ObserverMode::Always,
        )
    } else {
        executor
    };

    let mut last = executor.run()?.state().clone();
    let gradient = last.take_gradient();
    OptimOutcome::new(
        last.take_best_param(),
        last.get_best_cost(),
        last.get_termination_status().clone(),
        last.get_iter(),
        last.get_func_counts().clone(),
        gradient,
    )
}
