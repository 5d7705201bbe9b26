//! transfer::options — validated configuration for loss assembly and runs.
//!
//! Purpose
//! -------
//! Collect every user-tunable knob of a style-transfer run into small,
//! validated structs: the loss weights, the layer selection and reductions
//! used by the loss, the initialization of the generated image, and the
//! outer/inner iteration budget.
//!
//! Key behaviors
//! -------------
//! - Constructors (`new`) validate eagerly and return
//!   [`TransferError`] variants describing the offending field.
//! - `Default` impls reproduce the classic configuration: content weight 100,
//!   style weight 1, total-variation weight 1 with exponent 1.25, style layers
//!   `block1_conv1 … block5_conv1`, content layer `block5_conv2`, 10 rounds of
//!   at most 20 L-BFGS iterations, generated image initialized from content.
//!
//! Invariants & assumptions
//! ------------------------
//! - Whether the configured layers exist is a property of the feature
//!   extractor; it is checked by
//!   [`LossAssembler::new`](crate::transfer::loss::LossAssembler::new), not
//!   here.
//! - Seeds are explicit fields, never process-global state.
use std::str::FromStr;

use crate::{
    optimization::minimizer::MinimizeOptions,
    transfer::errors::{TransferError, TransferResult},
};

/// Default content layer.
pub const DEFAULT_CONTENT_LAYER: &str = "block5_conv2";

/// Default style layers.
pub const DEFAULT_STYLE_LAYERS: [&str; 5] =
    ["block1_conv1", "block2_conv1", "block3_conv1", "block4_conv1", "block5_conv1"];

/// Default exponent applied to the per-pixel total-variation term.
pub const DEFAULT_TV_EXPONENT: f64 = 1.25;

/// Default number of outer rounds.
pub const DEFAULT_ROUNDS: usize = 10;

/// Weights of the three loss terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossWeights {
    pub content: f64,
    pub style: f64,
    pub total_variation: f64,
}

impl LossWeights {
    /// # Errors
    /// - [`TransferError::InvalidWeight`] if any weight is negative or
    ///   non-finite.
    pub fn new(content: f64, style: f64, total_variation: f64) -> TransferResult<Self> {
        for (term, value) in
            [("content", content), ("style", style), ("total-variation", total_variation)]
        {
            if !value.is_finite() || value < 0.0 {
                return Err(TransferError::InvalidWeight { term, value });
            }
        }
        Ok(Self { content, style, total_variation })
    }
}

impl Default for LossWeights {
    fn default() -> Self {
        Self { content: 100.0, style: 1.0, total_variation: 1.0 }
    }
}

/// How per-layer style losses are combined.
///
/// - `Average`: each layer contributes `style_weight / n_layers · L_l`.
/// - `Sum`: each layer contributes `style_weight · L_l`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StyleReduction {
    #[default]
    Average,
    Sum,
}

impl StyleReduction {
    /// Multiplier applied to every per-layer style loss.
    pub fn layer_scale(self, style_weight: f64, n_layers: usize) -> f64 {
        match self {
            StyleReduction::Average => style_weight / n_layers.max(1) as f64,
            StyleReduction::Sum => style_weight,
        }
    }
}

impl FromStr for StyleReduction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "average" | "mean" => Ok(StyleReduction::Average),
            "sum" => Ok(StyleReduction::Sum),
            other => Err(format!("unknown style reduction '{other}' (expected 'average' or 'sum')")),
        }
    }
}

/// Layer selection, weights and shape parameters of the composite loss.
#[derive(Debug, Clone, PartialEq)]
pub struct LossOptions {
    pub content_layer: String,
    pub style_layers: Vec<String>,
    pub weights: LossWeights,
    pub style_reduction: StyleReduction,
    pub tv_exponent: f64,
}

impl LossOptions {
    /// # Errors
    /// - [`TransferError::EmptyStyleLayers`] if `style_layers` is empty.
    /// - [`TransferError::DuplicateStyleLayer`] if a name repeats.
    /// - [`TransferError::InvalidTvExponent`] unless `tv_exponent` is finite
    ///   and `>= 1`.
    pub fn new(
        content_layer: impl Into<String>, style_layers: Vec<String>, weights: LossWeights,
        style_reduction: StyleReduction, tv_exponent: f64,
    ) -> TransferResult<Self> {
        if style_layers.is_empty() {
            return Err(TransferError::EmptyStyleLayers);
        }
        for (i, name) in style_layers.iter().enumerate() {
            if style_layers[..i].contains(name) {
                return Err(TransferError::DuplicateStyleLayer { name: name.clone() });
            }
        }
        if !tv_exponent.is_finite() || tv_exponent < 1.0 {
            return Err(TransferError::InvalidTvExponent { value: tv_exponent });
        }
        Ok(Self {
            content_layer: content_layer.into(),
            style_layers,
            weights,
            style_reduction,
            tv_exponent,
        })
    }
}

impl Default for LossOptions {
    fn default() -> Self {
        Self {
            content_layer: DEFAULT_CONTENT_LAYER.to_string(),
            style_layers: DEFAULT_STYLE_LAYERS.iter().map(|s| s.to_string()).collect(),
            weights: LossWeights::default(),
            style_reduction: StyleReduction::Average,
            tv_exponent: DEFAULT_TV_EXPONENT,
        }
    }
}

/// Starting point of the generated image.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum GeneratedInit {
    /// Copy of the content image.
    #[default]
    Content,
    /// Copy of the style image.
    Style,
    /// Content image plus uniform noise in `[-amplitude, amplitude]` drawn
    /// from a `StdRng` seeded with `seed`.
    Noise { seed: u64, amplitude: f64 },
}

impl GeneratedInit {
    /// # Errors
    /// - [`TransferError::InvalidNoiseAmplitude`] for a negative or
    ///   non-finite noise amplitude.
    pub fn validate(&self) -> TransferResult<()> {
        if let GeneratedInit::Noise { amplitude, .. } = *self {
            if !amplitude.is_finite() || amplitude < 0.0 {
                return Err(TransferError::InvalidNoiseAmplitude { value: amplitude });
            }
        }
        Ok(())
    }
}

/// Full configuration of a transfer run.
///
/// The inner-iteration cap of each round is `minimize.tols.max_iter`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferOptions {
    pub loss: LossOptions,
    pub rounds: usize,
    pub minimize: MinimizeOptions,
    pub init: GeneratedInit,
}

impl TransferOptions {
    /// # Errors
    /// - [`TransferError::InvalidRounds`] if `rounds == 0`.
    /// - [`TransferError::InvalidNoiseAmplitude`] from [`GeneratedInit::validate`].
    pub fn new(
        loss: LossOptions, rounds: usize, minimize: MinimizeOptions, init: GeneratedInit,
    ) -> TransferResult<Self> {
        if rounds == 0 {
            return Err(TransferError::InvalidRounds { rounds });
        }
        init.validate()?;
        Ok(Self { loss, rounds, minimize, init })
    }
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            loss: LossOptions::default(),
            rounds: DEFAULT_ROUNDS,
            minimize: MinimizeOptions::default(),
            init: GeneratedInit::Content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_classic_configuration() {
        let opts = TransferOptions::default();
        assert_eq!(opts.loss.weights, LossWeights { content: 100.0, style: 1.0, total_variation: 1.0 });
        assert_eq!(opts.loss.content_layer, "block5_conv2");
        assert_eq!(opts.loss.style_layers.len(), 5);
        assert_eq!(opts.rounds, 10);
        assert_eq!(opts.minimize.tols.max_iter, Some(20));
        assert_eq!(opts.init, GeneratedInit::Content);
    }

    #[test]
    // Purpose
    // -------
    // Ensure invalid weights are rejected with the offending term named.
    //
    // Given
    // -----
    // - A negative style weight and a NaN total-variation weight.
    //
    // Expect
    // ------
    // - `InvalidWeight { term: "style" }` and
    //   `InvalidWeight { term: "total-variation" }` respectively.
    fn loss_weights_reject_negative_and_nan() {
        assert!(matches!(
            LossWeights::new(1.0, -0.5, 1.0),
            Err(TransferError::InvalidWeight { term: "style", .. })
        ));
        assert!(matches!(
            LossWeights::new(1.0, 1.0, f64::NAN),
            Err(TransferError::InvalidWeight { term: "total-variation", .. })
        ));
        assert!(LossWeights::new(0.0, 0.0, 0.0).is_ok());
    }

    #[test]
    fn loss_options_validate_layers_and_exponent() {
        let w = LossWeights::default();
        assert_eq!(
            LossOptions::new("c", vec![], w, StyleReduction::Average, 1.25),
            Err(TransferError::EmptyStyleLayers)
        );
        assert_eq!(
            LossOptions::new("c", vec!["a".into(), "a".into()], w, StyleReduction::Sum, 1.25),
            Err(TransferError::DuplicateStyleLayer { name: "a".into() })
        );
        assert!(matches!(
            LossOptions::new("c", vec!["a".into()], w, StyleReduction::Sum, 0.5),
            Err(TransferError::InvalidTvExponent { .. })
        ));
    }

    #[test]
    fn style_reduction_scales_and_parses() {
        assert_eq!(StyleReduction::Average.layer_scale(2.0, 4), 0.5);
        assert_eq!(StyleReduction::Sum.layer_scale(2.0, 4), 2.0);
        assert_eq!("SUM".parse::<StyleReduction>(), Ok(StyleReduction::Sum));
        assert!("median".parse::<StyleReduction>().is_err());
    }

    #[test]
    fn transfer_options_reject_zero_rounds_and_bad_noise() {
        let loss = LossOptions::default();
        let min = MinimizeOptions::default();
        assert_eq!(
            TransferOptions::new(loss.clone(), 0, min.clone(), GeneratedInit::Content),
            Err(TransferError::InvalidRounds { rounds: 0 })
        );
        assert!(matches!(
            TransferOptions::new(loss, 2, min, GeneratedInit::Noise { seed: 1, amplitude: -1.0 }),
            Err(TransferError::InvalidNoiseAmplitude { .. })
        ));
    }
}
