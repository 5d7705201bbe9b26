//! transfer::gram — Gram statistics of activation tensors.
//!
//! Purpose
//! -------
//! Summarize an `(H, W, C)` activation tensor by the `C × C` matrix of
//! channel-pair inner products over all spatial positions, and provide the
//! vector-Jacobian product needed to push a loss gradient on the Gram matrix
//! back onto the activations.
//!
//! Conventions
//! -----------
//! - `G[i, j] = Σ_{h,w} A[h, w, i] · A[h, w, j]`. No normalization is applied
//!   here; the style loss owns every scaling factor.
//! - Internally the activation is viewed as the row-major `(H·W, C)` feature
//!   matrix `F`, so that `G = Fᵀ F`.
use crate::transfer::errors::{TransferError, TransferResult};
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, ArrayViewD, Ix3};

/// Gram matrix of an `(H, W, C)` activation.
///
/// # Errors
/// - [`TransferError::ShapeMismatch`] if the activation cannot be viewed as
///   its `(H·W, C)` feature matrix.
pub fn gram_matrix(activation: ArrayView3<'_, f64>) -> TransferResult<Array2<f64>> {
    let features = feature_matrix(activation)?;
    let gram = features.t().dot(&features);
    // Blocked GEMM may round G[i, j] and G[j, i] differently.
    Ok((&gram + &gram.t()) * 0.5)
}

/// Gram matrix of a dynamically ranked tensor.
///
/// # Errors
/// - [`TransferError::InvalidRank`] if `activation` is not rank 3.
pub fn gram_matrix_dyn(activation: ArrayViewD<'_, f64>) -> TransferResult<Array2<f64>> {
    let rank = activation.ndim();
    let view = activation
        .into_dimensionality::<Ix3>()
        .map_err(|_| TransferError::InvalidRank { expected: 3, found: rank })?;
    gram_matrix(view)
}

/// Pull a gradient `U = ∂L/∂G` back onto the activation.
///
/// Since `G = Fᵀ F`, `∂L/∂F = F (U + Uᵀ)`; the result is reshaped to the
/// activation's `(H, W, C)` layout.
///
/// # Errors
/// - [`TransferError::ShapeMismatch`] if `upstream` is not `C × C`.
pub fn gram_backward(
    activation: ArrayView3<'_, f64>, upstream: ArrayView2<'_, f64>,
) -> TransferResult<Array3<f64>> {
    let (h, w, c) = activation.dim();
    if upstream.dim() != (c, c) {
        return Err(TransferError::ShapeMismatch {
            what: "Gram gradient",
            expected: vec![c, c],
            found: upstream.shape().to_vec(),
        });
    }
    let features = feature_matrix(activation)?;
    let grad = features.dot(&(&upstream + &upstream.t()));
    grad.into_shape((h, w, c)).map_err(|_| TransferError::ShapeMismatch {
        what: "Gram activation gradient",
        expected: vec![h, w, c],
        found: vec![h * w, c],
    })
}

fn feature_matrix(activation: ArrayView3<'_, f64>) -> TransferResult<Array2<f64>> {
    let (h, w, c) = activation.dim();
    activation.as_standard_layout().into_owned().into_shape((h * w, c)).map_err(|_| {
        TransferError::ShapeMismatch {
            what: "Gram feature matrix",
            expected: vec![h * w, c],
            found: vec![h, w, c],
        }
    })
}
