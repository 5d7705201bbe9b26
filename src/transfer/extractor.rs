//! transfer::extractor — frozen, differentiable feature extractors.
//!
//! Purpose
//! -------
//! Define the capability interface the loss relies on: a frozen network
//! mapping a stacked image batch to named intermediate activations, together
//! with its vector-Jacobian product. A concrete, seeded convolutional
//! extractor lets the engine run end to end without an external model file.
//!
//! Key behaviors
//! -------------
//! - [`FeatureExtractor::forward`] maps a `(N, H, W, 3)` batch to an
//!   [`ActivationBundle`] of `(N, h, w, C)` tensors keyed by layer name.
//! - [`FeatureExtractor::backward`] takes per-layer upstream gradients (any
//!   subset of layers; missing layers contribute zero) and returns the
//!   gradient with respect to the input batch.
//! - [`ConvFeatureExtractor`] is a VGG-shaped stack: blocks of 3×3
//!   same-padded convolutions with ReLU, separated by 2×2 average pooling
//!   (ceil mode). Layers are named `block{b}_conv{k}` and report the
//!   post-ReLU activation.
//!
//! Invariants & assumptions
//! ------------------------
//! - Extractors are immutable after construction; `forward` and `backward`
//!   are pure functions of their inputs.
//! - Layer names are stable across calls and unique.
//! - Weights of [`ConvFeatureExtractor`] are drawn once from a `StdRng`
//!   seeded by [`ConvExtractorConfig::seed`]; the same seed yields the same
//!   network.
//!
//! Conventions
//! -----------
//! - Convolutions are evaluated via im2col: each image becomes an
//!   `(h·w, 9·C_in)` patch matrix multiplied by a `(9·C_in, C_out)` kernel.
//!   Patch columns are ordered `(ky, kx, c_in)`.
//! - Pooling windows at odd edges average only the cells that exist.
use std::collections::BTreeMap;

use crate::transfer::{
    errors::{TransferError, TransferResult},
    image::{BatchRole, CHANNELS},
};
use ndarray::{Array1, Array2, Array3, Array4, ArrayView3, Axis, s};
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Named activations produced by one forward pass over a stacked batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivationBundle {
    layers: BTreeMap<String, Array4<f64>>,
}

impl ActivationBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, activation: Array4<f64>) {
        self.layers.insert(name.into(), activation);
    }

    pub fn get(&self, name: &str) -> Option<&Array4<f64>> {
        self.layers.get(name)
    }

    /// Batched activation of `name`.
    ///
    /// # Errors
    /// - [`TransferError::MissingActivation`] if the layer is absent.
    pub fn layer(&self, name: &str) -> TransferResult<&Array4<f64>> {
        self.layers
            .get(name)
            .ok_or_else(|| TransferError::MissingActivation { name: name.to_string() })
    }

    /// Activation of `name` for one image role.
    ///
    /// # Errors
    /// - [`TransferError::MissingActivation`] if the layer is absent.
    /// - [`TransferError::BatchSizeMismatch`] if the batch axis is too short
    ///   for the role.
    pub fn role(&self, name: &str, role: BatchRole) -> TransferResult<ArrayView3<'_, f64>> {
        let layer = self.layer(name)?;
        let n = layer.len_of(Axis(0));
        if role.index() >= n {
            return Err(TransferError::BatchSizeMismatch { expected: BatchRole::ALL.len(), found: n });
        }
        Ok(layer.index_axis(Axis(0), role.index()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Array4<f64>)> {
        self.layers.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// Frozen differentiable network consumed by the loss.
pub trait FeatureExtractor {
    /// Names of every layer `forward` reports, in network order.
    fn layer_names(&self) -> Vec<String>;

    /// Activations of every named layer for each image of `batch`.
    fn forward(&self, batch: &Array4<f64>) -> TransferResult<ActivationBundle>;

    /// Gradient with respect to `batch` of `Σ_layers ⟨upstream[layer], activation[layer]⟩`.
    ///
    /// Layers absent from `upstream` contribute nothing.
    fn backward(
        &self, batch: &Array4<f64>, upstream: &ActivationBundle,
    ) -> TransferResult<Array4<f64>>;

    /// Whether `forward` reports an activation named `name`.
    fn has_layer(&self, name: &str) -> bool {
        self.layer_names().iter().any(|l| l == name)
    }
}

/// One block of the convolutional extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvBlockSpec {
    /// Number of conv+ReLU layers in the block.
    pub convs: usize,
    /// Output channels of every conv in the block.
    pub channels: usize,
}

/// Architecture and seed of a [`ConvFeatureExtractor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvExtractorConfig {
    pub blocks: Vec<ConvBlockSpec>,
    pub seed: u64,
}

impl Default for ConvExtractorConfig {
    /// Five VGG-like blocks with conv counts `[1, 1, 2, 2, 2]`, so that the
    /// classic `block{1..5}_conv1` style layers and `block5_conv2` content
    /// layer exist.
    fn default() -> Self {
        let blocks = [(1, 16), (1, 32), (2, 32), (2, 64), (2, 64)]
            .into_iter()
            .map(|(convs, channels)| ConvBlockSpec { convs, channels })
            .collect();
        Self { blocks, seed: 1618 }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ConvLayer {
    name: String,
    /// `(9·C_in, C_out)` im2col kernel.
    kernel: Array2<f64>,
    bias: Array1<f64>,
}

#[derive(Debug, Clone, PartialEq)]
enum Stage {
    Conv(ConvLayer),
    Pool,
}

/// Per-stage values kept from a forward pass for the backward sweep.
enum Tape<'a> {
    Conv { layer: &'a ConvLayer, pre_activation: Array2<f64>, dims: (usize, usize) },
    Pool { input_dims: (usize, usize, usize) },
}

/// Seeded VGG-shaped convolutional feature extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvFeatureExtractor {
    stages: Vec<Stage>,
}

impl ConvFeatureExtractor {
    /// Build the network described by `config`.
    ///
    /// Kernels are He-uniform (`±sqrt(6 / fan_in)`), biases zero.
    ///
    /// # Errors
    /// - [`TransferError::InvalidExtractorConfig`] for an empty block list or
    ///   a block with zero convs or zero channels.
    pub fn new(config: &ConvExtractorConfig) -> TransferResult<Self> {
        if config.blocks.is_empty() {
            return Err(TransferError::InvalidExtractorConfig {
                reason: "at least one block is required",
            });
        }
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut stages = Vec::new();
        let mut in_channels = CHANNELS;
        for (b, block) in config.blocks.iter().enumerate() {
            if block.convs == 0 || block.channels == 0 {
                return Err(TransferError::InvalidExtractorConfig {
                    reason: "blocks need at least one conv and one channel",
                });
            }
            if b > 0 {
                stages.push(Stage::Pool);
            }
            for k in 0..block.convs {
                let fan_in = 9 * in_channels;
                let limit = (6.0 / fan_in as f64).sqrt();
                let kernel = Array2::from_shape_simple_fn((fan_in, block.channels), || {
                    rng.gen_range(-limit..limit)
                });
                stages.push(Stage::Conv(ConvLayer {
                    name: format!("block{}_conv{}", b + 1, k + 1),
                    kernel,
                    bias: Array1::zeros(block.channels),
                }));
                in_channels = block.channels;
            }
        }
        Ok(Self { stages })
    }

    fn check_batch(batch: &Array4<f64>) -> TransferResult<()> {
        let (n, h, w, c) = batch.dim();
        if c != CHANNELS || h == 0 || w == 0 {
            return Err(TransferError::ShapeMismatch {
                what: "extractor input batch",
                expected: vec![n, h.max(1), w.max(1), CHANNELS],
                found: vec![n, h, w, c],
            });
        }
        Ok(())
    }

    /// Run one image through the network, returning the named activations
    /// and, when `record` is set, the tape for [`Self::backward_single`].
    fn forward_single(
        &self, image: ArrayView3<'_, f64>, record: bool,
    ) -> TransferResult<(Vec<(String, Array3<f64>)>, Vec<Tape<'_>>)> {
        let mut x = image.to_owned();
        let mut outputs = Vec::new();
        let mut tape = Vec::new();
        for stage in &self.stages {
            match stage {
                Stage::Conv(layer) => {
                    let (h, w, _) = x.dim();
                    let pre = im2col(x.view()).dot(&layer.kernel) + &layer.bias;
                    x = reshape_hwc(pre.mapv(|v| v.max(0.0)), h, w)?;
                    outputs.push((layer.name.clone(), x.clone()));
                    if record {
                        tape.push(Tape::Conv { layer, pre_activation: pre, dims: (h, w) });
                    }
                }
                Stage::Pool => {
                    let input_dims = x.dim();
                    x = avg_pool(x.view());
                    if record {
                        tape.push(Tape::Pool { input_dims });
                    }
                }
            }
        }
        Ok((outputs, tape))
    }

    fn backward_single(
        &self, image: ArrayView3<'_, f64>, upstream: &ActivationBundle, index: usize,
    ) -> TransferResult<Array3<f64>> {
        let (_, tape) = self.forward_single(image, true)?;
        let mut grad: Option<Array3<f64>> = None;
        for record in tape.into_iter().rev() {
            match record {
                Tape::Conv { layer, mut pre_activation, dims: (h, w) } => {
                    let c_out = layer.kernel.ncols();
                    let mut g = grad.take().unwrap_or_else(|| Array3::zeros((h, w, c_out)));
                    if let Some(up) = upstream.get(&layer.name) {
                        let slice = up.index_axis(Axis(0), index);
                        if slice.dim() != g.dim() {
                            return Err(TransferError::ShapeMismatch {
                                what: "upstream activation gradient",
                                expected: g.shape().to_vec(),
                                found: slice.shape().to_vec(),
                            });
                        }
                        g += &slice;
                    }
                    // ReLU mask, reusing the pre-activation buffer.
                    pre_activation.zip_mut_with(&flatten_hwc(g)?, |z, &gv| {
                        *z = if *z > 0.0 { gv } else { 0.0 };
                    });
                    let g_patches = pre_activation.dot(&layer.kernel.t());
                    grad = Some(col2im(&g_patches, h, w, layer.kernel.nrows() / 9));
                }
                Tape::Pool { input_dims } => {
                    if let Some(g) = grad.take() {
                        grad = Some(avg_pool_backward(g.view(), input_dims));
                    }
                }
            }
        }
        Ok(grad.unwrap_or_else(|| Array3::zeros(image.raw_dim())))
    }
}

impl FeatureExtractor for ConvFeatureExtractor {
    fn layer_names(&self) -> Vec<String> {
        self.stages
            .iter()
            .filter_map(|s| match s {
                Stage::Conv(layer) => Some(layer.name.clone()),
                Stage::Pool => None,
            })
            .collect()
    }

    fn forward(&self, batch: &Array4<f64>) -> TransferResult<ActivationBundle> {
        Self::check_batch(batch)?;
        let n = batch.len_of(Axis(0));
        let mut per_layer: BTreeMap<String, Vec<Array3<f64>>> = BTreeMap::new();
        for image in batch.axis_iter(Axis(0)) {
            let (outputs, _) = self.forward_single(image, false)?;
            for (name, act) in outputs {
                per_layer.entry(name).or_default().push(act);
            }
        }
        let mut bundle = ActivationBundle::new();
        for (name, acts) in per_layer {
            let (h, w, c) = acts[0].dim();
            let mut stacked = Array4::zeros((n, h, w, c));
            for (i, act) in acts.into_iter().enumerate() {
                stacked.index_axis_mut(Axis(0), i).assign(&act);
            }
            bundle.insert(name, stacked);
        }
        Ok(bundle)
    }

    fn backward(
        &self, batch: &Array4<f64>, upstream: &ActivationBundle,
    ) -> TransferResult<Array4<f64>> {
        Self::check_batch(batch)?;
        let n = batch.len_of(Axis(0));
        if let Some((_, up)) = upstream.iter().find(|(_, up)| up.len_of(Axis(0)) != n) {
            return Err(TransferError::BatchSizeMismatch { expected: n, found: up.len_of(Axis(0)) });
        }
        let mut grad = Array4::zeros(batch.raw_dim());
        for (i, image) in batch.axis_iter(Axis(0)).enumerate() {
            let touched = upstream.iter().any(|(_, up)| {
                up.index_axis(Axis(0), i).iter().any(|&v| v != 0.0)
            });
            if !touched {
                continue;
            }
            let g = self.backward_single(image, upstream, i)?;
            grad.index_axis_mut(Axis(0), i).assign(&g);
        }
        Ok(grad)
    }
}

// ---- Helper Methods ----

/// `(h, w, c)` image → `(h·w, 9·c)` zero-padded 3×3 patch matrix.
fn im2col(input: ArrayView3<'_, f64>) -> Array2<f64> {
    let (h, w, c) = input.dim();
    let mut cols = Array2::zeros((h * w, 9 * c));
    for y in 0..h {
        for x in 0..w {
            let row = y * w + x;
            for ky in 0..3 {
                let Some(iy) = (y + ky).checked_sub(1).filter(|&iy| iy < h) else { continue };
                for kx in 0..3 {
                    let Some(ix) = (x + kx).checked_sub(1).filter(|&ix| ix < w) else {
                        continue;
                    };
                    let base = (ky * 3 + kx) * c;
                    cols.slice_mut(s![row, base..base + c]).assign(&input.slice(s![iy, ix, ..]));
                }
            }
        }
    }
    cols
}

/// Adjoint of [`im2col`]: scatter-add patch gradients back onto the image.
fn col2im(cols: &Array2<f64>, h: usize, w: usize, c: usize) -> Array3<f64> {
    let mut out = Array3::zeros((h, w, c));
    for y in 0..h {
        for x in 0..w {
            let row = y * w + x;
            for ky in 0..3 {
                let Some(iy) = (y + ky).checked_sub(1).filter(|&iy| iy < h) else { continue };
                for kx in 0..3 {
                    let Some(ix) = (x + kx).checked_sub(1).filter(|&ix| ix < w) else {
                        continue;
                    };
                    let base = (ky * 3 + kx) * c;
                    let mut cell = out.slice_mut(s![iy, ix, ..]);
                    cell += &cols.slice(s![row, base..base + c]);
                }
            }
        }
    }
    out
}

/// `(H·W, C)` rows back to an `(H, W, C)` map.
fn reshape_hwc(flat: Array2<f64>, h: usize, w: usize) -> TransferResult<Array3<f64>> {
    let (rows, c) = flat.dim();
    flat.as_standard_layout().into_owned().into_shape((h, w, c)).map_err(|_| {
        TransferError::ShapeMismatch {
            what: "convolution output",
            expected: vec![h * w, c],
            found: vec![rows, c],
        }
    })
}

fn flatten_hwc(t: Array3<f64>) -> TransferResult<Array2<f64>> {
    let (h, w, c) = t.dim();
    t.as_standard_layout().into_owned().into_shape((h * w, c)).map_err(|_| {
        TransferError::ShapeMismatch {
            what: "activation gradient",
            expected: vec![h * w, c],
            found: vec![h, w, c],
        }
    })
}

/// 2×2 stride-2 average pooling, ceil mode.
fn avg_pool(input: ArrayView3<'_, f64>) -> Array3<f64> {
    let (h, w, c) = input.dim();
    let (oh, ow) = (h.div_ceil(2), w.div_ceil(2));
    let mut out = Array3::zeros((oh, ow, c));
    for oy in 0..oh {
        for ox in 0..ow {
            let window = input.slice(s![2 * oy..(2 * oy + 2).min(h), 2 * ox..(2 * ox + 2).min(w), ..]);
            let count = (window.len() / c) as f64;
            let mean = window.sum_axis(Axis(0)).sum_axis(Axis(0)) / count;
            out.slice_mut(s![oy, ox, ..]).assign(&mean);
        }
    }
    out
}

fn avg_pool_backward(
    grad_out: ArrayView3<'_, f64>, input_dims: (usize, usize, usize),
) -> Array3<f64> {
    let (h, w, c) = input_dims;
    let (oh, ow, _) = grad_out.dim();
    let mut grad_in = Array3::zeros((h, w, c));
    for oy in 0..oh {
        for ox in 0..ow {
            let (y0, y1) = (2 * oy, (2 * oy + 2).min(h));
            let (x0, x1) = (2 * ox, (2 * ox + 2).min(w));
            let count = ((y1 - y0) * (x1 - x0)) as f64;
            let share = grad_out.slice(s![oy, ox, ..]).mapv(|g| g / count);
            for y in y0..y1 {
                for x in x0..x1 {
                    let mut cell = grad_in.slice_mut(s![y, x, ..]);
                    cell += &share;
                }
            }
        }
    }
    grad_in
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::{
        errors::{OptError, OptResult},
        minimizer::{Theta, finite_diff::central_gradient},
    };
    use approx::assert_abs_diff_eq;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Layer naming, output shapes and determinism of `ConvFeatureExtractor`.
    // - Agreement of `backward` with finite differences of the forward pass.
    // - Configuration and input validation.
    // -------------------------------------------------------------------------

    fn tiny_config() -> ConvExtractorConfig {
        ConvExtractorConfig {
            blocks: vec![
                ConvBlockSpec { convs: 1, channels: 3 },
                ConvBlockSpec { convs: 2, channels: 2 },
            ],
            seed: 7,
        }
    }

    fn ramp_batch(n: usize, h: usize, w: usize) -> Array4<f64> {
        Array4::from_shape_fn((n, h, w, CHANNELS), |(b, y, x, c)| {
            ((b * 31 + y * 7 + x * 3 + c * 11) as f64 * 0.53).sin() * 40.0 + 5.0
        })
    }

    #[test]
    // Purpose
    // -------
    // Verify layer names and activation shapes, including ceil-mode pooling.
    //
    // Given
    // -----
    // - Default architecture and a batch of three 8x8 images.
    //
    // Expect
    // ------
    // - `block1_conv1` is 8x8x16, `block4_conv1` is 1x1x64 (8→4→2→1) and
    //   `block5_conv2` is 1x1x64 (pooling a 1x1 map keeps it 1x1).
    // - The batch axis is preserved.
    fn default_extractor_names_and_shapes() {
        // Arrange
        let net = ConvFeatureExtractor::new(&ConvExtractorConfig::default()).expect("valid");
        let batch = ramp_batch(3, 8, 8);

        // Act
        let bundle = net.forward(&batch).expect("forward should succeed");

        // Assert
        let names = net.layer_names();
        assert_eq!(names.first().map(String::as_str), Some("block1_conv1"));
        assert!(names.iter().any(|n| n == "block5_conv2"));
        assert_eq!(bundle.len(), names.len());
        assert_eq!(bundle.layer("block1_conv1").expect("present").dim(), (3, 8, 8, 16));
        assert_eq!(bundle.layer("block4_conv1").expect("present").dim(), (3, 1, 1, 64));
        assert_eq!(bundle.layer("block5_conv2").expect("present").dim(), (3, 1, 1, 64));
    }

    #[test]
    fn same_seed_gives_same_network() {
        let a = ConvFeatureExtractor::new(&tiny_config()).expect("valid");
        let b = ConvFeatureExtractor::new(&tiny_config()).expect("valid");
        let mut other = tiny_config();
        other.seed = 8;
        let c = ConvFeatureExtractor::new(&other).expect("valid");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    // Purpose
    // -------
    // Cross-check the vector-Jacobian product with finite differences.
    //
    // Given
    // -----
    // - The tiny two-block network and a single 3x3 image.
    // - Upstream weights on `block1_conv1` and `block2_conv2`.
    //
    // Expect
    // ------
    // - `backward` matches the central-difference gradient of
    //   `Σ ⟨upstream, activation⟩` within 1e-4.
    fn backward_matches_finite_differences() {
        // Arrange
        let net = ConvFeatureExtractor::new(&tiny_config()).expect("valid");
        let batch = ramp_batch(1, 3, 3);
        let fwd = net.forward(&batch).expect("forward");
        let mut upstream = ActivationBundle::new();
        for name in ["block1_conv1", "block2_conv2"] {
            let act = fwd.layer(name).expect("present");
            let weights = Array4::from_shape_fn(act.raw_dim(), |(_, y, x, c)| {
                1.0 + 0.25 * (y + 2 * x + 3 * c) as f64
            });
            upstream.insert(name, weights);
        }
        let dims = batch.raw_dim();
        let theta: Theta = batch.iter().copied().collect();
        let scalar = |x: &Theta| -> OptResult<f64> {
            let b = Array4::from_shape_vec(dims.clone(), x.to_vec()).expect("shape");
            let acts = net.forward(&b).map_err(OptError::from)?;
            let mut total = 0.0;
            for (name, up) in upstream.iter() {
                total += (acts.layer(name).expect("present") * up).sum();
            }
            Ok(total)
        };

        // Act
        let analytic = net.backward(&batch, &upstream).expect("backward");
        let numeric = central_gradient(&theta, scalar).expect("FD should succeed");

        // Assert
        for (a, n) in analytic.iter().zip(numeric.iter()) {
            assert_abs_diff_eq!(*a, *n, epsilon = 1e-4);
        }
    }

    #[test]
    fn backward_skips_images_without_upstream_gradient() {
        let net = ConvFeatureExtractor::new(&tiny_config()).expect("valid");
        let batch = ramp_batch(3, 4, 4);
        let fwd = net.forward(&batch).expect("forward");
        let mut up = Array4::zeros(fwd.layer("block1_conv1").expect("present").raw_dim());
        up.index_axis_mut(Axis(0), 2).fill(1.0);
        let mut upstream = ActivationBundle::new();
        upstream.insert("block1_conv1", up);

        let grad = net.backward(&batch, &upstream).expect("backward");

        assert!(grad.index_axis(Axis(0), 0).iter().all(|&v| v == 0.0));
        assert!(grad.index_axis(Axis(0), 1).iter().all(|&v| v == 0.0));
        assert!(grad.index_axis(Axis(0), 2).iter().any(|&v| v != 0.0));
    }

    #[test]
    fn avg_pool_backward_is_adjoint_of_pool() {
        let input = Array3::from_shape_fn((3, 5, 2), |(y, x, c)| (y * 5 + x + c) as f64);
        let out_grad = Array3::from_shape_fn((2, 3, 2), |(y, x, c)| 1.0 + (y + x + c) as f64);
        let lhs = (&avg_pool(input.view()) * &out_grad).sum();
        let rhs = (&input * &avg_pool_backward(out_grad.view(), input.dim())).sum();
        assert_abs_diff_eq!(lhs, rhs, epsilon = 1e-9);
    }

    #[test]
    fn rejects_empty_architecture_and_non_rgb_input() {
        let empty = ConvExtractorConfig { blocks: vec![], seed: 0 };
        assert!(matches!(
            ConvFeatureExtractor::new(&empty),
            Err(TransferError::InvalidExtractorConfig { .. })
        ));
        let net = ConvFeatureExtractor::new(&tiny_config()).expect("valid");
        let gray = Array4::zeros((3, 4, 4, 1));
        assert!(matches!(net.forward(&gray), Err(TransferError::ShapeMismatch { .. })));
    }

    #[test]
    fn has_layer_matches_reported_names() {
        let net = ConvFeatureExtractor::new(&tiny_config()).expect("valid");
        for name in net.layer_names() {
            assert!(net.has_layer(&name));
        }
        assert!(!net.has_layer("block9_conv1"));
        assert!(!net.has_layer(""));
    }

    #[test]
    // Purpose
    // -------
    // Row/map conversions must refuse inconsistent sizes instead of
    // producing a zero tensor.
    //
    // Given
    // -----
    // - A 6x2 row matrix reshaped to 2x2 positions.
    // - A 2x3x2 map flattened and restored.
    //
    // Expect
    // ------
    // - `ShapeMismatch` for the 6-row case.
    // - The 2x3x2 map survives flatten then reshape unchanged.
    fn hwc_conversions_reject_inconsistent_sizes() {
        // Arrange
        let rows = Array2::from_shape_fn((6, 2), |(r, c)| (r * 2 + c) as f64);
        let map = Array3::from_shape_fn((2, 3, 2), |(y, x, c)| (y * 6 + x * 2 + c) as f64 + 0.5);

        // Act
        let bad = reshape_hwc(rows, 2, 2);
        let restored = flatten_hwc(map.clone()).and_then(|flat| reshape_hwc(flat, 2, 3));

        // Assert
        assert!(matches!(bad, Err(TransferError::ShapeMismatch { .. })));
        assert_eq!(restored.expect("consistent sizes"), map);
    }

    #[test]
    fn bundle_role_selects_batch_slice() {
        let mut bundle = ActivationBundle::new();
        let act = Array4::from_shape_fn((3, 1, 1, 1), |(b, _, _, _)| b as f64);
        bundle.insert("l", act);
        assert_eq!(bundle.role("l", BatchRole::Style).expect("present")[[0, 0, 0]], 1.0);
        assert!(matches!(
            bundle.role("missing", BatchRole::Content),
            Err(TransferError::MissingActivation { .. })
        ));
    }
}
