//! Validation helpers for the minimizer.
//!
//! - Tolerances: [`verify_tol_grad`] and [`verify_tol_cost`] accept `None` or
//!   a finite, strictly positive value.
//! - Vectors: [`validate_grad`] and [`validate_theta_hat`] enforce length and
//!   finiteness, reporting the first offending entry.
//! - Scalars: [`validate_value`] rejects non-finite costs.
use crate::optimization::{
    errors::{OptError, OptResult},
    minimizer::{Grad, Theta},
};

/// Index and value of the first NaN/±inf entry, if any.
pub fn first_non_finite(values: &Theta) -> Option<(usize, f64)> {
    values.iter().copied().enumerate().find(|(_, v)| !v.is_finite())
}

fn tolerance_problem(tol: f64) -> Option<&'static str> {
    if !tol.is_finite() {
        Some("Tolerance must be finite.")
    } else if tol <= 0.0 {
        Some("Tolerance must be positive.")
    } else {
        None
    }
}

/// # Errors
/// [`OptError::InvalidTolGrad`] if the tolerance is non-finite or `<= 0`.
pub fn verify_tol_grad(tol: Option<f64>) -> OptResult<()> {
    match tol.and_then(|t| tolerance_problem(t).map(|reason| (t, reason))) {
        Some((tol, reason)) => Err(OptError::InvalidTolGrad { tol, reason }),
        None => Ok(()),
    }
}

/// # Errors
/// [`OptError::InvalidTolCost`] if the tolerance is non-finite or `<= 0`.
pub fn verify_tol_cost(tol: Option<f64>) -> OptResult<()> {
    match tol.and_then(|t| tolerance_problem(t).map(|reason| (t, reason))) {
        Some((tol, reason)) => Err(OptError::InvalidTolCost { tol, reason }),
        None => Ok(()),
    }
}

/// Require `grad.len() == dim` and finite entries.
///
/// # Errors
/// - [`OptError::GradientDimMismatch`] on a length mismatch.
/// - [`OptError::InvalidGradient`] naming the first non-finite entry.
pub fn validate_grad(grad: &Grad, dim: usize) -> OptResult<()> {
    if grad.len() != dim {
        return Err(OptError::GradientDimMismatch { expected: dim, found: grad.len() });
    }
    match first_non_finite(grad) {
        Some((index, value)) => Err(OptError::InvalidGradient {
            index,
            value,
            reason: "Gradient elements must be finite.",
        }),
        None => Ok(()),
    }
}

/// Unwrap the solver's best point, requiring finite entries.
///
/// # Errors
/// - [`OptError::MissingThetaHat`] if the solver reported no best point.
/// - [`OptError::InvalidThetaHat`] naming the first non-finite entry.
pub fn validate_theta_hat(theta_hat: Option<Theta>) -> OptResult<Theta> {
    let theta = theta_hat.ok_or(OptError::MissingThetaHat)?;
    if let Some((index, value)) = first_non_finite(&theta) {
        return Err(OptError::InvalidThetaHat {
            index,
            value,
            reason: "Best point entries must be finite.",
        });
    }
    Ok(theta)
}

/// # Errors
/// [`OptError::NonFiniteCost`] if `value` is NaN or infinite.
pub fn validate_value(value: f64) -> OptResult<()> {
    if value.is_finite() { Ok(()) } else { Err(OptError::NonFiniteCost { value }) }
}
