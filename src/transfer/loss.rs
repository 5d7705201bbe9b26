//! transfer::loss — composite content/style/total-variation loss.
//!
//! Purpose
//! -------
//! Turn the activations of the stacked `(content, style, generated)` batch
//! into one scalar to minimize, together with the partial derivatives the
//! evaluator needs to form the gradient with respect to the generated image.
//!
//! Key behaviors
//! -------------
//! - Content term: `Σ (A_gen − A_content)²` at the content layer.
//! - Style term, per layer: `Σ (G_gen − G_style)² / (4 · C² · (H·W)²)` where
//!   `C` is the layer's channel count and `H·W` its spatial size. Layers are
//!   combined according to
//!   [`StyleReduction`](crate::transfer::options::StyleReduction).
//! - Total-variation term on the generated image:
//!   `Σ_{h,w,c} (a + b)^p` with `a = (x[h,w] − x[h+1,w])²`,
//!   `b = (x[h,w] − x[h,w+1])²`, each difference taken as zero where the
//!   neighbour falls outside the image, and `p` the configured exponent.
//! - Composite: `w_c·L_c + Σ_l s·L_s(l) + w_tv·L_tv`, with `s` from
//!   [`StyleReduction::layer_scale`](crate::transfer::options::StyleReduction::layer_scale).
//!
//! Invariants & assumptions
//! ------------------------
//! - All configured layers exist in the extractor; [`LossAssembler::new`]
//!   rejects unknown names before any optimization starts.
//! - Every term is computed on the activation bundle of one joint forward
//!   pass; content and style slices are read through [`BatchRole`].
//! - Terms with zero weight are skipped entirely (value 0, no gradient).
//! - A non-finite term value is reported as
//!   [`TransferError::NonFiniteLoss`] naming the term.
use crate::transfer::{
    errors::{TransferError, TransferResult},
    extractor::{ActivationBundle, FeatureExtractor},
    gram::{gram_backward, gram_matrix},
    image::{BatchRole, ImageTensor, stack_batch},
    options::LossOptions,
};
use ndarray::{Array2, Array3, Array4, ArrayView3, Axis};

/// Weighted contribution of each loss term.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LossBreakdown {
    pub content: f64,
    pub style: f64,
    pub total_variation: f64,
}

impl LossBreakdown {
    /// Composite loss.
    pub fn total(&self) -> f64 {
        self.content + self.style + self.total_variation
    }
}

/// Loss value plus its partial derivatives.
///
/// - `activation_grads`: `∂L/∂A` per layer, batch-shaped like the forward
///   pass; only the generated slice is non-zero.
/// - `image_grad`: direct `∂L/∂x` of the generated image (total variation).
#[derive(Debug, Clone, PartialEq)]
pub struct LossTerms {
    pub breakdown: LossBreakdown,
    pub activation_grads: ActivationBundle,
    pub image_grad: Array3<f64>,
}

/// Content loss and its gradient with respect to the generated activation.
///
/// # Errors
/// - [`TransferError::ShapeMismatch`] if the activations differ in shape.
pub fn content_loss(
    generated: ArrayView3<'_, f64>, target: ArrayView3<'_, f64>,
) -> TransferResult<(f64, Array3<f64>)> {
    if generated.dim() != target.dim() {
        return Err(TransferError::ShapeMismatch {
            what: "content activation",
            expected: target.shape().to_vec(),
            found: generated.shape().to_vec(),
        });
    }
    let diff = &generated - &target;
    let value = diff.iter().map(|d| d * d).sum();
    Ok((value, diff * 2.0))
}

/// Style loss of one layer and its gradient with respect to the generated
/// activation.
///
/// `style_gram` is the Gram matrix of the style image at the same layer.
///
/// # Errors
/// - [`TransferError::ShapeMismatch`] if `style_gram` is not `C × C`.
pub fn style_layer_loss(
    generated: ArrayView3<'_, f64>, style_gram: &Array2<f64>,
) -> TransferResult<(f64, Array3<f64>)> {
    let (h, w, c) = generated.dim();
    if style_gram.dim() != (c, c) {
        return Err(TransferError::ShapeMismatch {
            what: "style Gram matrix",
            expected: vec![c, c],
            found: style_gram.shape().to_vec(),
        });
    }
    let channels = c as f64;
    let positions = (h * w) as f64;
    let norm = 4.0 * channels * channels * positions * positions;
    let diff = gram_matrix(generated)? - style_gram;
    let value = diff.iter().map(|d| d * d).sum::<f64>() / norm;
    let upstream = diff * (2.0 / norm);
    Ok((value, gram_backward(generated, upstream.view())?))
}

/// Total variation of an `(H, W, C)` image and its gradient.
///
/// Every position contributes `(a + b)^exponent` per channel; differences
/// whose neighbour lies outside the image count as zero, so a discontinuity
/// anywhere in the image is seen.
pub fn total_variation_loss(image: ArrayView3<'_, f64>, exponent: f64) -> (f64, Array3<f64>) {
    let (h, w, c) = image.dim();
    let mut value = 0.0;
    let mut grad = Array3::zeros((h, w, c));
    for y in 0..h {
        for x in 0..w {
            for k in 0..c {
                let here = image[[y, x, k]];
                let dv = if y + 1 < h { here - image[[y + 1, x, k]] } else { 0.0 };
                let dh = if x + 1 < w { here - image[[y, x + 1, k]] } else { 0.0 };
                let t = dv * dv + dh * dh;
                if t == 0.0 {
                    continue;
                }
                value += t.powf(exponent);
                let coef = exponent * t.powf(exponent - 1.0) * 2.0;
                grad[[y, x, k]] += coef * (dv + dh);
                if y + 1 < h {
                    grad[[y + 1, x, k]] -= coef * dv;
                }
                if x + 1 < w {
                    grad[[y, x + 1, k]] -= coef * dh;
                }
            }
        }
    }
    (value, grad)
}

fn ensure_finite(term: &'static str, value: f64) -> TransferResult<f64> {
    if value.is_finite() { Ok(value) } else { Err(TransferError::NonFiniteLoss { term, value }) }
}

/// Builds the composite loss for a fixed configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LossAssembler {
    options: LossOptions,
}

impl LossAssembler {
    /// Validate `options` against the layers `extractor` produces.
    ///
    /// # Errors
    /// - [`TransferError::UnknownLayer`] for the first content or style layer
    ///   the extractor does not report.
    pub fn new<E: FeatureExtractor + ?Sized>(
        options: LossOptions, extractor: &E,
    ) -> TransferResult<Self> {
        let requested =
            std::iter::once(&options.content_layer).chain(options.style_layers.iter());
        for name in requested {
            if !extractor.has_layer(name) {
                return Err(TransferError::UnknownLayer { name: name.clone() });
            }
        }
        Ok(Self { options })
    }

    pub fn options(&self) -> &LossOptions {
        &self.options
    }

    /// Loss terms from one joint forward pass.
    ///
    /// `activations` holds every configured layer with the batch axis ordered
    /// by [`BatchRole`]; `generated` is the generated image in the same
    /// normalization the extractor saw.
    ///
    /// # Errors
    /// - [`TransferError::MissingActivation`] / [`TransferError::BatchSizeMismatch`]
    ///   for a malformed bundle.
    /// - [`TransferError::ShapeMismatch`] if content and generated activations
    ///   disagree.
    /// - [`TransferError::NonFiniteLoss`] naming the first non-finite term.
    pub fn compute_loss(
        &self, activations: &ActivationBundle, generated: &ImageTensor,
    ) -> TransferResult<LossTerms> {
        let opts = &self.options;
        let weights = opts.weights;
        let mut breakdown = LossBreakdown::default();
        let mut activation_grads = ActivationBundle::new();

        if weights.content > 0.0 {
            let name = &opts.content_layer;
            let (value, grad) = content_loss(
                activations.role(name, BatchRole::Generated)?,
                activations.role(name, BatchRole::Content)?,
            )?;
            breakdown.content = ensure_finite("content", weights.content * value)?;
            accumulate(&mut activation_grads, activations.layer(name)?, name, grad * weights.content);
        }

        if weights.style > 0.0 {
            let scale = opts.style_reduction.layer_scale(weights.style, opts.style_layers.len());
            let mut style_total = 0.0;
            for name in &opts.style_layers {
                let style_gram = gram_matrix(activations.role(name, BatchRole::Style)?)?;
                let (value, grad) =
                    style_layer_loss(activations.role(name, BatchRole::Generated)?, &style_gram)?;
                style_total += scale * value;
                accumulate(&mut activation_grads, activations.layer(name)?, name, grad * scale);
            }
            breakdown.style = ensure_finite("style", style_total)?;
        }

        let image_grad = if weights.total_variation > 0.0 {
            let (value, grad) = total_variation_loss(generated.view(), opts.tv_exponent);
            breakdown.total_variation =
                ensure_finite("total-variation", weights.total_variation * value)?;
            grad * weights.total_variation
        } else {
            Array3::zeros(generated.view().raw_dim())
        };

        ensure_finite("composite", breakdown.total())?;
        Ok(LossTerms { breakdown, activation_grads, image_grad })
    }

    /// Composite loss of `generated` and its full gradient.
    ///
    /// Runs one joint forward pass over the stacked batch, assembles the
    /// terms, and pulls the activation gradients back through `extractor`.
    pub fn loss_and_gradient<E: FeatureExtractor + ?Sized>(
        &self, extractor: &E, content: &ImageTensor, style: &ImageTensor, generated: &ImageTensor,
    ) -> TransferResult<(LossBreakdown, Array3<f64>)> {
        let batch = stack_batch(content, style, generated)?;
        let activations = extractor.forward(&batch)?;
        let terms = self.compute_loss(&activations, generated)?;
        let mut gradient = terms.image_grad;
        if !terms.activation_grads.is_empty() {
            let input_grad = extractor.backward(&batch, &terms.activation_grads)?;
            gradient += &input_grad.index_axis(Axis(0), BatchRole::Generated.index());
        }
        Ok((terms.breakdown, gradient))
    }
}

/// Add `grad` to the generated slice of the batch-shaped gradient for `name`.
fn accumulate(
    bundle: &mut ActivationBundle, like: &Array4<f64>, name: &str, grad: Array3<f64>,
) {
    let mut full = bundle.get(name).cloned().unwrap_or_else(|| Array4::zeros(like.raw_dim()));
    let mut slot = full.index_axis_mut(Axis(0), BatchRole::Generated.index());
    slot += &grad;
    bundle.insert(name, full);
}
