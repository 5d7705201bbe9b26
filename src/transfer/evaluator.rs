//! transfer::evaluator — cached loss/gradient entry points for the optimizer.
//!
//! Purpose
//! -------
//! Expose the composite loss of a generated image, seen as a flat parameter
//! vector, through the optimizer's [`Objective`] interface while running
//! exactly one joint forward+backward pass per `value` call.
//!
//! Key behaviors
//! -------------
//! - [`Evaluator::evaluate`] returns `{loss, breakdown, gradient}` in one
//!   value and touches no cache.
//! - [`Objective::value`] evaluates, then stores the gradient in a cache
//!   entry keyed by a fresh version tag and an exact copy of the vector.
//! - [`Objective::gradient`] only answers for the vector most recently passed
//!   to `value`:
//!   - before any `value` call it fails with [`OptError::GradientBeforeValue`];
//!   - for any other vector it fails with [`OptError::StaleGradient`].
//!
//! Invariants & assumptions
//! ------------------------
//! - Vector identity is bitwise equality of every entry; no tolerance.
//! - Each `value` call bumps the tag and drops the old cache entry before
//!   evaluating; a failed evaluation leaves no entry behind, so `gradient`
//!   then reports [`OptError::StaleGradient`] for every vector.
//! - Losses and gradients are checked for finiteness after every evaluation.
use std::cell::{Cell, RefCell};

use crate::{
    optimization::{
        errors::{OptError, OptResult},
        minimizer::{Cost, Grad, Objective, Theta},
    },
    transfer::{
        errors::{TransferError, TransferResult},
        extractor::FeatureExtractor,
        image::ImageTensor,
        loss::{LossAssembler, LossBreakdown},
    },
};
use tracing::trace;

/// Result of one joint evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub loss: f64,
    pub breakdown: LossBreakdown,
    pub gradient: Grad,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    tag: u64,
    theta: Theta,
    evaluation: Evaluation,
}

impl CacheEntry {
    fn matches(&self, theta: &Theta) -> bool {
        self.theta.len() == theta.len()
            && self.theta.iter().zip(theta.iter()).all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

/// Loss/gradient oracle over the flattened generated image.
pub struct Evaluator<'a, E: FeatureExtractor + ?Sized> {
    extractor: &'a E,
    assembler: &'a LossAssembler,
    content: &'a ImageTensor,
    style: &'a ImageTensor,
    cache: RefCell<Option<CacheEntry>>,
    next_tag: Cell<u64>,
    passes: Cell<u64>,
}

impl<'a, E: FeatureExtractor + ?Sized> Evaluator<'a, E> {
    /// # Errors
    /// - [`TransferError::ShapeMismatch`] if content and style differ in size.
    pub fn new(
        extractor: &'a E, assembler: &'a LossAssembler, content: &'a ImageTensor,
        style: &'a ImageTensor,
    ) -> TransferResult<Self> {
        content.ensure_same_dims(style, "style image")?;
        Ok(Self {
            extractor,
            assembler,
            content,
            style,
            cache: RefCell::new(None),
            next_tag: Cell::new(0),
            passes: Cell::new(0),
        })
    }

    /// Number of parameters (`H·W·3`).
    pub fn dim(&self) -> usize {
        self.content.len()
    }

    /// Number of joint forward+backward passes run so far.
    pub fn passes(&self) -> u64 {
        self.passes.get()
    }

    /// Version tag of the current cache entry, if any.
    pub fn cached_tag(&self) -> Option<u64> {
        self.cache.borrow().as_ref().map(|e| e.tag)
    }

    /// Loss, breakdown and gradient at `theta` from one joint pass.
    ///
    /// # Errors
    /// - [`TransferError::ParamLengthMismatch`] for a wrongly sized vector.
    /// - [`TransferError::NonFiniteLoss`] / [`TransferError::NonFiniteGradient`]
    ///   if the evaluation produced NaN/±inf.
    /// - Any extractor or loss-assembly error.
    pub fn evaluate(&self, theta: &Theta) -> TransferResult<Evaluation> {
        let generated = ImageTensor::from_flat(theta, self.content.dims())?;
        let (breakdown, grad) = self.assembler.loss_and_gradient(
            self.extractor,
            self.content,
            self.style,
            &generated,
        )?;
        self.passes.set(self.passes.get() + 1);
        let loss = breakdown.total();
        if !loss.is_finite() {
            return Err(TransferError::NonFiniteLoss { term: "composite", value: loss });
        }
        let gradient: Grad = grad.iter().copied().collect();
        if let Some((index, &value)) = gradient.iter().enumerate().find(|(_, g)| !g.is_finite()) {
            return Err(TransferError::NonFiniteGradient { index, value });
        }
        trace!(
            pass = self.passes.get(),
            loss,
            content = breakdown.content,
            style = breakdown.style,
            total_variation = breakdown.total_variation,
            "evaluated generated image"
        );
        Ok(Evaluation { loss, breakdown, gradient })
    }

    /// Cached evaluation for `theta` if it is the last valued vector,
    /// otherwise a fresh (uncached) evaluation.
    pub fn evaluation_at(&self, theta: &Theta) -> TransferResult<Evaluation> {
        if let Some(entry) = self.cache.borrow().as_ref().filter(|e| e.matches(theta)) {
            return Ok(entry.evaluation.clone());
        }
        self.evaluate(theta)
    }
}

impl<'a, E: FeatureExtractor + ?Sized> Objective for Evaluator<'a, E> {
    fn value(&self, theta: &Theta) -> OptResult<Cost> {
        let tag = self.next_tag.get();
        self.next_tag.set(tag + 1);
        // A failed evaluation must not leave the previous vector answerable.
        self.cache.replace(None);
        let evaluation = self.evaluate(theta)?;
        let loss = evaluation.loss;
        self.cache.replace(Some(CacheEntry { tag, theta: theta.clone(), evaluation }));
        Ok(loss)
    }

    fn check(&self, theta: &Theta) -> OptResult<()> {
        if theta.len() != self.dim() {
            return Err(TransferError::ParamLengthMismatch {
                expected: self.dim(),
                found: theta.len(),
            }
            .into());
        }
        if let Some((index, &value)) = theta.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(OptError::ModelFailure {
                text: format!("Generated image entry {index} is not finite: {value}"),
            });
        }
        Ok(())
    }

    fn gradient(&self, theta: &Theta) -> OptResult<Grad> {
        match self.cache.borrow().as_ref() {
            None if self.next_tag.get() == 0 => Err(OptError::GradientBeforeValue),
            None => Err(OptError::StaleGradient { cached_tag: self.next_tag.get() - 1 }),
            Some(entry) if entry.matches(theta) => Ok(entry.evaluation.gradient.clone()),
            Some(entry) => Err(OptError::StaleGradient { cached_tag: entry.tag }),
        }
    }

    fn gradient_ready(&self, theta: &Theta) -> bool {
        self.cache.borrow().as_ref().is_some_and(|e| e.matches(theta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::{
        extractor::{ConvBlockSpec, ConvExtractorConfig, ConvFeatureExtractor},
        options::{LossOptions, LossWeights, StyleReduction},
    };
    use ndarray::Array3;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - The value-then-gradient contract and its two failure modes.
    // - Agreement of the cached gradient with the combined `evaluate` result.
    // - One joint pass per `value` call, none per `gradient` call.
    // - Length checks in `Objective::check`.
    // -------------------------------------------------------------------------

    struct Fixture {
        net: ConvFeatureExtractor,
        assembler: LossAssembler,
        content: ImageTensor,
        style: ImageTensor,
    }

    fn fixture() -> Fixture {
        let net = ConvFeatureExtractor::new(&ConvExtractorConfig {
            blocks: vec![
                ConvBlockSpec { convs: 1, channels: 4 },
                ConvBlockSpec { convs: 1, channels: 4 },
            ],
            seed: 3,
        })
        .expect("valid config");
        let options = LossOptions::new(
            "block2_conv1",
            vec!["block1_conv1".into(), "block2_conv1".into()],
            LossWeights::new(1.0, 1.0, 1.0).expect("valid"),
            StyleReduction::Average,
            1.25,
        )
        .expect("valid options");
        let assembler = LossAssembler::new(options, &net).expect("layers exist");
        let content = ImageTensor::new(Array3::from_shape_fn((4, 4, 3), |(i, j, k)| {
            (i * 4 + j) as f64 - 8.0 + k as f64
        }))
        .expect("valid");
        let style = ImageTensor::filled(4, 4, [30.0, -10.0, 5.0]).expect("valid");
        Fixture { net, assembler, content, style }
    }

    fn evaluator(f: &Fixture) -> Evaluator<'_, ConvFeatureExtractor> {
        Evaluator::new(&f.net, &f.assembler, &f.content, &f.style).expect("same sizes")
    }

    #[test]
    // Purpose
    // -------
    // Ensure `value(v)` followed by `gradient(v)` returns the gradient of the
    // same joint pass, without another pass.
    //
    // Given
    // -----
    // - A fresh evaluator and v = flattened content image.
    //
    // Expect
    // ------
    // - `gradient(v)` equals `evaluate(v).gradient`.
    // - Exactly one pass is attributed to `value` and none to `gradient`.
    fn gradient_after_value_returns_joint_gradient() {
        // Arrange
        let f = fixture();
        let ev = evaluator(&f);
        let v = f.content.flatten();

        // Act
        let loss = ev.value(&v).expect("evaluates");
        let passes_after_value = ev.passes();
        let grad = ev.gradient(&v).expect("cached");
        let passes_after_gradient = ev.passes();
        let direct = ev.evaluate(&v).expect("evaluates");

        // Assert
        assert_eq!(passes_after_value, 1);
        assert_eq!(passes_after_gradient, 1);
        assert_eq!(loss, direct.loss);
        assert_eq!(grad, direct.gradient);
        assert!(ev.gradient_ready(&v));
    }

    #[test]
    fn gradient_before_any_value_fails() {
        let f = fixture();
        let ev = evaluator(&f);
        assert_eq!(ev.gradient(&f.content.flatten()), Err(OptError::GradientBeforeValue));
    }

    #[test]
    // Purpose
    // -------
    // Ensure a gradient request for a vector other than the last valued one
    // fails and reports the cached version tag.
    //
    // Given
    // -----
    // - `value(v1)`, `value(v2)` (tags 0 and 1), then `gradient(v1)`.
    //
    // Expect
    // ------
    // - `StaleGradient { cached_tag: 1 }`.
    // - A one-ulp change of an entry also counts as a different vector.
    fn gradient_on_different_vector_fails_loudly() {
        // Arrange
        let f = fixture();
        let ev = evaluator(&f);
        let v1 = f.content.flatten();
        let mut v2 = v1.clone();
        v2[0] += 1.0;

        // Act
        ev.value(&v1).expect("evaluates");
        ev.value(&v2).expect("evaluates");
        let stale = ev.gradient(&v1);
        let mut nudged = v2.clone();
        nudged[5] = f64::from_bits(nudged[5].to_bits() + 1);

        // Assert
        assert_eq!(stale, Err(OptError::StaleGradient { cached_tag: 1 }));
        assert_eq!(ev.cached_tag(), Some(1));
        assert!(matches!(ev.gradient(&nudged), Err(OptError::StaleGradient { .. })));
        assert!(!ev.gradient_ready(&v1));
    }

    #[test]
    // Purpose
    // -------
    // A `value` call that fails must still retire the previously cached
    // vector, so its gradient can no longer be served.
    //
    // Given
    // -----
    // - `value(v1)` succeeds; `value(v2)` with one entry at 1e300 overflows.
    //
    // Expect
    // ------
    // - `value(v2)` reports a non-finite cost.
    // - `gradient(v1)` is `StaleGradient { cached_tag: 1 }` and no cache entry
    //   remains.
    fn failed_value_invalidates_previous_cache_entry() {
        // Arrange
        let f = fixture();
        let ev = evaluator(&f);
        let v1 = f.content.flatten();
        let mut v2 = v1.clone();
        v2[0] = 1e300;

        // Act
        ev.value(&v1).expect("evaluates");
        let failed = ev.value(&v2);
        let stale = ev.gradient(&v1);

        // Assert
        assert!(matches!(failed, Err(OptError::NonFiniteCost { .. })));
        assert_eq!(stale, Err(OptError::StaleGradient { cached_tag: 1 }));
        assert_eq!(ev.cached_tag(), None);
        assert!(!ev.gradient_ready(&v1));
    }

    #[test]
    fn overflowing_image_is_a_non_finite_loss() {
        let f = fixture();
        let ev = evaluator(&f);
        let mut v = f.content.flatten();
        v[0] = 1e300;
        assert!(matches!(ev.evaluate(&v), Err(TransferError::NonFiniteLoss { .. })));
    }

    #[test]
    fn check_rejects_wrong_length_and_non_finite_entries() {
        let f = fixture();
        let ev = evaluator(&f);
        let short = Theta::zeros(ev.dim() - 1);
        assert!(matches!(ev.check(&short), Err(OptError::ModelFailure { .. })));
        let mut bad = f.content.flatten();
        bad[2] = f64::NAN;
        assert!(matches!(ev.check(&bad), Err(OptError::ModelFailure { .. })));
        assert_eq!(ev.check(&f.content.flatten()), Ok(()));
    }

    #[test]
    fn evaluation_at_reuses_cache_only_for_last_vector() {
        let f = fixture();
        let ev = evaluator(&f);
        let v = f.content.flatten();
        ev.value(&v).expect("evaluates");
        let before = ev.passes();
        ev.evaluation_at(&v).expect("cached");
        assert_eq!(ev.passes(), before);
        let mut w = v.clone();
        w[1] -= 2.0;
        ev.evaluation_at(&w).expect("fresh");
        assert_eq!(ev.passes(), before + 1);
    }
}
