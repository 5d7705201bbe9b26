//! Numerical gradients.
//!
//! [`run_fd_diff`] is the adapter's forward-difference fallback for
//! objectives without `gradient`. [`central_gradient`] differentiates a
//! fallible closure and is what the loss and extractor tests check their
//! analytic backward passes against. Both surface the first error the
//! closure raised rather than a NaN-filled gradient.
use crate::optimization::{
    errors::{OptError, OptResult},
    minimizer::{Grad, Theta, validation::validate_grad},
};
use argmin::core::Error;
use finitediff::FiniteDiff;
use std::cell::RefCell;

/// Forward differences of `func` at `theta`.
///
/// `func` reports failures by storing them in `closure_err` and returning
/// NaN; the slot is cleared on entry and checked afterwards.
pub fn run_fd_diff<G: Fn(&Theta) -> f64>(
    theta: &Theta, func: &G, closure_err: &RefCell<Option<Error>>,
) -> OptResult<Grad> {
    closure_err.replace(None);
    let fd_grad = theta.forward_diff(func);
    let dim = theta.len();
    if let Some(err) = closure_err.take() {
        return Err(err.into());
    }
    validate_grad(&fd_grad, dim)?;
    Ok(fd_grad)
}

/// central_gradient — central-difference gradient of a fallible objective.
///
/// Wraps `func` so that the first error it returns is captured and surfaced
/// after differencing; the resulting gradient is validated.
///
/// Errors
/// ------
/// - The first error returned by `func`.
/// - Validation errors from [`validate_grad`].
pub fn central_gradient<G>(theta: &Theta, func: G) -> OptResult<Grad>
where
    G: Fn(&Theta) -> OptResult<f64>,
{
    let closure_err: RefCell<Option<OptError>> = RefCell::new(None);
    let wrapped = |x: &Theta| -> f64 {
        match func(x) {
            Ok(v) => v,
            Err(e) => {
                let mut slot = closure_err.borrow_mut();
                if slot.is_none() {
                    *slot = Some(e);
                }
                f64::NAN
            }
        }
    };
    let fd_grad = theta.central_diff(&wrapped);
    if let Some(err) = closure_err.take() {
        return Err(err);
    }
    validate_grad(&fd_grad, theta.len())?;
    Ok(fd_grad)
}
