//! Adapter that exposes a user `Objective` as an `argmin` problem.
//!
//! Argmin calls `cost` and `gradient` as two separate methods and does not
//! promise that every `gradient(θ)` is preceded by `cost(θ)` for the same
//! point (L-BFGS asks for the gradient of the line-search winner, which is
//! not always the last point costed). Objectives that produce the gradient as
//! a side effect of `value` report this through
//! [`Objective::gradient_ready`]; when it returns `false` the adapter issues
//! the missing `value` call itself before asking for the gradient. If no
//! analytic gradient exists, we finite-difference the cost closure.
use std::cell::RefCell;

use crate::optimization::{
    errors::OptError,
    minimizer::{
        finite_diff::run_fd_diff,
        traits::Objective,
        types::{Cost, Grad, Theta},
        validation::{validate_grad, validate_value},
    },
};
use argmin::core::{CostFunction, Error, Gradient};
use finitediff::FiniteDiff;

/// Bridges a user `Objective` to `argmin`'s `CostFunction` and `Gradient`.
#[derive(Debug, Clone)]
pub struct ArgMinAdapter<'a, F: Objective> {
    pub f: &'a F,
}

impl<'a, F: Objective> CostFunction for ArgMinAdapter<'a, F> {
    type Param = Theta;
    type Output = Cost;

    /// Evaluate the cost `c(θ)`.
    ///
    /// # Errors
    /// - Propagates any `OptError` from the user's `value` via `?`.
    /// - `NonFiniteCost` if the value is `NaN` or infinite.
    fn cost(&self, theta: &Self::Param) -> Result<Self::Output, Error> {
        let output = self.f.value(theta)?;
        validate_value(output)?;
        Ok(output)
    }
}

impl<'a, F: Objective> Gradient for ArgMinAdapter<'a, F> {
    type Param = Theta;
    type Gradient = Grad;

    /// Evaluate the gradient of the cost at `θ`.
    ///
    /// Behavior:
    /// - If the objective is not primed for `θ`, call `value(θ)` first.
    /// - If the objective implements `gradient`, validate and return it.
    /// - Otherwise compute a finite-difference gradient of the cost: central
    ///   differences first, falling back to forward differences when the
    ///   central pass hit an error or produced a non-finite entry.
    ///
    /// # Errors
    /// - Propagates user errors from `value`/`gradient` (other than
    ///   `GradientNotImplemented`).
    /// - Returns validation errors if the gradient has wrong dimension or
    ///   non-finite entries.
    fn gradient(&self, theta: &Self::Param) -> Result<Self::Gradient, Error> {
        let dim = theta.len();
        if !self.f.gradient_ready(theta) {
            self.cost(theta)?;
        }
        match self.f.gradient(theta) {
            Ok(g) => {
                validate_grad(&g, dim)?;
                Ok(g)
            }
            Err(OptError::GradientNotImplemented) => {
                let closure_err: RefCell<Option<Error>> = RefCell::new(None);
                let cost_func = |theta: &Theta| -> f64 {
                    match self.cost(theta) {
                        Ok(val) => val,
                        Err(e) => {
                            let mut slot = closure_err.borrow_mut();
                            if slot.is_none() {
                                *slot = Some(e);
                            }
                            f64::NAN
                        }
                    }
                };
                let fd_grad = theta.central_diff(&cost_func);
                if closure_err.borrow().is_none() && validate_grad(&fd_grad, dim).is_ok() {
                    return Ok(fd_grad);
                }
                Ok(run_fd_diff(theta, &cost_func, &closure_err)?)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl<'a, F: Objective> ArgMinAdapter<'a, F> {
    /// Construct a new adapter over a user `Objective`.
    pub fn new(f: &'a F) -> Self {
        Self { f }
    }
}
