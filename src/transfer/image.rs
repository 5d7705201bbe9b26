//! transfer::image — normalized image tensors and the stacked role batch.
//!
//! Purpose
//! -------
//! Represent the three images of a style-transfer run (content, style,
//! generated) as `(H, W, 3)` `f64` tensors in the feature extractor's
//! normalization, and provide the exact reshapes between an image tensor,
//! the flat optimizer vector, and the `(3, H, W, 3)` batch the extractor
//! consumes.
//!
//! Invariants & assumptions
//! ------------------------
//! - Every [`ImageTensor`] has exactly [`CHANNELS`] channels.
//! - Flattening is row-major over `(h, w, c)`; [`ImageTensor::from_flat`]
//!   is its exact inverse.
//! - Batches are always ordered by [`BatchRole`]: content at 0, style at 1,
//!   generated at 2. Loss code selects slices through the role, never
//!   through bare indices.
use crate::{
    optimization::minimizer::Theta,
    transfer::errors::{TransferError, TransferResult},
};
use ndarray::{Array3, Array4, ArrayView3, Axis};

/// Colour channels per pixel.
pub const CHANNELS: usize = 3;

/// Position of each image role inside the stacked extractor batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchRole {
    Content,
    Style,
    Generated,
}

impl BatchRole {
    /// All roles in batch order.
    pub const ALL: [BatchRole; 3] = [BatchRole::Content, BatchRole::Style, BatchRole::Generated];

    /// Batch index of this role.
    pub fn index(self) -> usize {
        match self {
            BatchRole::Content => 0,
            BatchRole::Style => 1,
            BatchRole::Generated => 2,
        }
    }
}

/// An `(H, W, 3)` image in the extractor's normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Array3<f64>,
}

impl ImageTensor {
    /// Wrap an `(H, W, 3)` array.
    ///
    /// # Errors
    /// - [`TransferError::ShapeMismatch`] if the channel axis is not 3 or a
    ///   spatial axis is empty.
    pub fn new(data: Array3<f64>) -> TransferResult<Self> {
        let (h, w, c) = data.dim();
        if c != CHANNELS || h == 0 || w == 0 {
            return Err(TransferError::ShapeMismatch {
                what: "image tensor",
                expected: vec![h.max(1), w.max(1), CHANNELS],
                found: vec![h, w, c],
            });
        }
        Ok(Self { data })
    }

    /// Image filled with one normalized colour.
    pub fn filled(height: usize, width: usize, pixel: [f64; CHANNELS]) -> TransferResult<Self> {
        Self::new(Array3::from_shape_fn((height, width, CHANNELS), |(_, _, c)| pixel[c]))
    }

    /// `(height, width)` of the image.
    pub fn dims(&self) -> (usize, usize) {
        let (h, w, _) = self.data.dim();
        (h, w)
    }

    /// Number of scalars in the image (`H·W·3`).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn view(&self) -> ArrayView3<'_, f64> {
        self.data.view()
    }

    pub fn into_inner(self) -> Array3<f64> {
        self.data
    }

    /// Flatten into the optimizer's parameter vector (row-major copy).
    pub fn flatten(&self) -> Theta {
        self.data.iter().copied().collect()
    }

    /// Rebuild an image of `dims` from a flat parameter vector.
    ///
    /// # Errors
    /// - [`TransferError::ParamLengthMismatch`] if `theta.len() != H·W·3`.
    pub fn from_flat(theta: &Theta, dims: (usize, usize)) -> TransferResult<Self> {
        let (h, w) = dims;
        let expected = h * w * CHANNELS;
        if theta.len() != expected {
            return Err(TransferError::ParamLengthMismatch { expected, found: theta.len() });
        }
        let data = Array3::from_shape_vec((h, w, CHANNELS), theta.iter().copied().collect())
            .map_err(|_| TransferError::ParamLengthMismatch { expected, found: theta.len() })?;
        Self::new(data)
    }

    /// Require `other` to have the same spatial size.
    ///
    /// # Errors
    /// - [`TransferError::ShapeMismatch`] naming `what`.
    pub fn ensure_same_dims(&self, other: &ImageTensor, what: &'static str) -> TransferResult<()> {
        if self.data.dim() != other.data.dim() {
            return Err(TransferError::ShapeMismatch {
                what,
                expected: self.data.shape().to_vec(),
                found: other.data.shape().to_vec(),
            });
        }
        Ok(())
    }
}

/// Stack content, style and generated images into the `(3, H, W, 3)` batch.
///
/// # Errors
/// - [`TransferError::ShapeMismatch`] if the three images differ in size.
pub fn stack_batch(
    content: &ImageTensor, style: &ImageTensor, generated: &ImageTensor,
) -> TransferResult<Array4<f64>> {
    content.ensure_same_dims(style, "style image")?;
    content.ensure_same_dims(generated, "generated image")?;
    let (h, w) = content.dims();
    let mut batch = Array4::zeros((BatchRole::ALL.len(), h, w, CHANNELS));
    for (role, image) in BatchRole::ALL.into_iter().zip([content, style, generated]) {
        batch.index_axis_mut(Axis(0), role.index()).assign(&image.data);
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    #[test]
    // Purpose
    // -------
    // Ensure flatten/from_flat is an exact bijection.
    //
    // Given
    // -----
    // - A 2x3 image with distinct values per entry.
    //
    // Expect
    // ------
    // - `from_flat(flatten(x)) == x` bit for bit.
    fn flatten_round_trip_is_exact() {
        // Arrange
        let data = Array3::from_shape_fn((2, 3, 3), |(h, w, c)| {
            (h * 100 + w * 10 + c) as f64 * 0.1 - 3.7
        });
        let image = ImageTensor::new(data).expect("valid image");

        // Act
        let flat = image.flatten();
        let back = ImageTensor::from_flat(&flat, image.dims()).expect("length matches");

        // Assert
        assert_eq!(flat.len(), 18);
        assert_eq!(back, image);
    }

    #[test]
    fn from_flat_rejects_wrong_length() {
        let theta = Array1::zeros(10);
        assert_eq!(
            ImageTensor::from_flat(&theta, (2, 2)),
            Err(TransferError::ParamLengthMismatch { expected: 12, found: 10 })
        );
    }

    #[test]
    fn new_rejects_non_rgb_tensors() {
        assert!(matches!(
            ImageTensor::new(Array3::zeros((2, 2, 4))),
            Err(TransferError::ShapeMismatch { .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // Verify batch order and the size check in `stack_batch`.
    //
    // Given
    // -----
    // - Content filled with 1, style with 2, generated with 3 (all 2x2).
    // - A 3x2 generated image for the failure case.
    //
    // Expect
    // ------
    // - Slice 0/1/2 hold 1/2/3 respectively.
    // - Mismatched sizes are rejected.
    fn stack_batch_orders_roles_and_checks_sizes() {
        // Arrange
        let content = ImageTensor::filled(2, 2, [1.0; 3]).expect("valid");
        let style = ImageTensor::filled(2, 2, [2.0; 3]).expect("valid");
        let generated = ImageTensor::filled(2, 2, [3.0; 3]).expect("valid");
        let wrong = ImageTensor::filled(3, 2, [3.0; 3]).expect("valid");

        // Act
        let batch = stack_batch(&content, &style, &generated).expect("same sizes");

        // Assert
        for role in BatchRole::ALL {
            let expected = (role.index() + 1) as f64;
            assert!(batch.index_axis(Axis(0), role.index()).iter().all(|&v| v == expected));
        }
        assert!(matches!(
            stack_batch(&content, &style, &wrong),
            Err(TransferError::ShapeMismatch { what: "generated image", .. })
        ));
    }
}
