//! transfer — neural style transfer on top of the L-BFGS minimizer.
//!
//! Purpose
//! -------
//! Synthesize an image that keeps the spatial structure of a content image
//! while adopting the texture and colour statistics of a style image. The
//! generated image is the optimization variable; the objective is a weighted
//! sum of a content term, a Gram-based style term and a total-variation term
//! computed on the activations of a frozen feature extractor.
//!
//! Key behaviors
//! -------------
//! - [`image`]: normalized `(H, W, 3)` tensors, flattening, and the stacked
//!   `(content, style, generated)` batch.
//! - [`codec`]: decoding, resizing, VGG mean-centering and the inverse.
//! - [`extractor`]: the [`FeatureExtractor`](extractor::FeatureExtractor)
//!   capability and a seeded convolutional implementation.
//! - [`gram`] and [`loss`]: Gram statistics and the composite loss with its
//!   gradient.
//! - [`evaluator`]: the cached value/gradient oracle the optimizer calls.
//! - [`driver`]: bounded outer rounds, persistence and reporting.
//!
//! Data flow
//! ---------
//! codec → (content, style, generated) → extractor (joint forward) → Gram +
//! activations → loss → evaluator → minimizer ⇄ driver → codec (save).

pub mod codec;
pub mod driver;
pub mod errors;
pub mod evaluator;
pub mod extractor;
pub mod gram;
pub mod image;
pub mod loss;
pub mod options;

pub mod prelude {
    pub use super::driver::{
        FileSink, ImageSink, MemorySink, RoundReport, TransferDriver, TransferOutcome,
        TransferState,
    };
    pub use super::errors::{TransferError, TransferResult};
    pub use super::evaluator::{Evaluation, Evaluator};
    pub use super::extractor::{
        ActivationBundle, ConvBlockSpec, ConvExtractorConfig, ConvFeatureExtractor,
        FeatureExtractor,
    };
    pub use super::image::{BatchRole, ImageTensor};
    pub use super::loss::{LossAssembler, LossBreakdown};
    pub use super::options::{
        GeneratedInit, LossOptions, LossWeights, StyleReduction, TransferOptions,
    };
}
