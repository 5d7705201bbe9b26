//! [`minimize`]: the one call the transfer driver makes per round.
use crate::optimization::{
    errors::OptResult,
    minimizer::{
        OptimOutcome, Theta,
        adapter::ArgMinAdapter,
        solver::{lbfgs, run_lbfgs},
        traits::{LineSearcher, MinimizeOptions, Objective},
        types::{HagerZhangLS, MoreThuenteLS},
    },
};

/// Minimize `c(θ)` from `theta0` with L-BFGS and the configured line search.
///
/// `f.check(theta0)` runs first, so a malformed starting vector never reaches
/// the solver.
///
/// # Errors
/// Whatever `check` rejects, tolerances `argmin` refuses, and every failure
/// raised while the solver runs (objective errors keep their variant).
///
/// # Example
/// ```no_run
/// use ndarray::array;
/// use rust_style_transfer::optimization::{
///     errors::OptResult,
///     minimizer::{minimize, Cost, MinimizeOptions, Objective, Theta},
/// };
///
/// struct Bowl;
/// impl Objective for Bowl {
///     fn value(&self, theta: &Theta) -> OptResult<Cost> {
///         Ok(theta.dot(theta))
///     }
///     fn check(&self, _: &Theta) -> OptResult<()> {
///         Ok(())
///     }
/// }
///
/// let out = minimize(&Bowl, array![0.1, -0.2, 0.3], &MinimizeOptions::default())?;
/// println!("θ̂ = {:?}", out.theta_hat);
/// # Ok::<(), rust_style_transfer::optimization::errors::OptError>(())
/// ```
pub fn minimize<F: Objective>(
    f: &F, theta0: Theta, opts: &MinimizeOptions,
) -> OptResult<OptimOutcome> {
    f.check(&theta0)?;
    let problem = ArgMinAdapter::new(f);
    match opts.line_searcher {
        LineSearcher::MoreThuente => {
            run_lbfgs(theta0, opts, problem, lbfgs(MoreThuenteLS::new(), opts)?)
        }
        LineSearcher::HagerZhang => {
            run_lbfgs(theta0, opts, problem, lbfgs(HagerZhangLS::new(), opts)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::{
        errors::OptError,
        minimizer::{Cost, Grad, Tolerances},
    };
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - A full L-BFGS solve on a convex quadratic with an analytic gradient.
    // - Early rejection by `Objective::check`.
    // -------------------------------------------------------------------------

    /// `c(θ) = Σ (θ_i − i)²`, minimum at `θ = [0, 1, 2, ...]`.
    struct ShiftedBowl;

    impl Objective for ShiftedBowl {
        fn value(&self, theta: &Theta) -> OptResult<Cost> {
            Ok(theta.iter().enumerate().map(|(i, &t)| (t - i as f64).powi(2)).sum())
        }
        fn check(&self, theta: &Theta) -> OptResult<()> {
            if theta.is_empty() {
                return Err(OptError::ModelFailure { text: "empty parameter vector".into() });
            }
            Ok(())
        }
        fn gradient(&self, theta: &Theta) -> OptResult<Grad> {
            Ok(Grad::from_iter(theta.iter().enumerate().map(|(i, &t)| 2.0 * (t - i as f64))))
        }
    }

    #[test]
    // Purpose
    // -------
    // Ensure `minimize` drives a convex quadratic to its minimum.
    //
    // Given
    // -----
    // - `ShiftedBowl` from `θ₀ = [5, -3, 10]`, More–Thuente, 50 iterations.
    //
    // Expect
    // ------
    // - `θ̂ ≈ [0, 1, 2]` and `c(θ̂) ≈ 0`.
    fn minimize_solves_convex_quadratic() {
        // Arrange
        let tols = Tolerances::new(Some(1e-10), None, Some(50)).expect("valid tolerances");
        let opts = MinimizeOptions::new(tols, LineSearcher::MoreThuente, false, None)
            .expect("valid options");

        // Act
        let out = minimize(&ShiftedBowl, array![5.0, -3.0, 10.0], &opts)
            .expect("quadratic should be solved");

        // Assert
        assert_abs_diff_eq!(out.theta_hat[0], 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(out.theta_hat[1], 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(out.theta_hat[2], 2.0, epsilon = 1e-5);
        assert!(out.value < 1e-8);
    }

    #[test]
    fn minimize_runs_check_before_solving() {
        let result = minimize(&ShiftedBowl, Theta::zeros(0), &MinimizeOptions::default());
        assert!(matches!(result, Err(OptError::ModelFailure { .. })));
    }
}
