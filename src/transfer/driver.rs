//! transfer::driver — outer-round loop around the L-BFGS minimizer.
//!
//! Purpose
//! -------
//! Own the generated image across a fixed number of rounds. Each round lends
//! the current image (as a flat vector) to a bounded L-BFGS run over a fresh
//! [`Evaluator`], takes back the best point, deprocesses it and hands the
//! 8-bit image to an [`ImageSink`].
//!
//! Key behaviors
//! -------------
//! - State machine: `Initialized → RoundInProgress(i) → RoundComplete(i) → …
//!   → Finished`. Rounds are strictly sequential and there is no early stop.
//! - Configuration (layer names, image sizes, weights) is validated in
//!   [`TransferDriver::new`], before any optimization.
//! - Every round emits a `tracing` `info!` event with its loss and breakdown
//!   and returns a [`RoundReport`].
//! - A failing round (evaluator contract violation, non-finite values,
//!   optimizer or sink error) aborts the run with that error.
use std::path::{Path, PathBuf};

use crate::{
    optimization::minimizer::{FnEvalMap, minimize},
    transfer::{
        codec,
        errors::{TransferError, TransferResult},
        evaluator::Evaluator,
        extractor::FeatureExtractor,
        image::ImageTensor,
        loss::{LossAssembler, LossBreakdown},
        options::{GeneratedInit, TransferOptions},
    },
};
use image::RgbImage;
use ndarray::Array3;
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{debug, info};

/// Lifecycle of a transfer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Initialized,
    /// Round `i` (0-based) is being optimized.
    RoundInProgress(usize),
    /// Round `i` finished and its image was persisted.
    RoundComplete(usize),
    Finished,
}

/// Destination of the image produced after each round.
pub trait ImageSink {
    fn persist(&mut self, round: usize, image: &RgbImage) -> TransferResult<()>;
}

/// Writes every round's image to one fixed path, overwriting it.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ImageSink for FileSink {
    fn persist(&mut self, round: usize, image: &RgbImage) -> TransferResult<()> {
        codec::save(image, &self.path)?;
        info!(round = round + 1, path = %self.path.display(), "saved intermediate image");
        Ok(())
    }
}

/// Keeps every round's image in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub frames: Vec<RgbImage>,
}

impl ImageSink for MemorySink {
    fn persist(&mut self, _round: usize, image: &RgbImage) -> TransferResult<()> {
        self.frames.push(image.clone());
        Ok(())
    }
}

/// Summary of one optimization round.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundReport {
    /// 0-based round index.
    pub round: usize,
    /// Best composite loss reached in the round.
    pub loss: f64,
    pub breakdown: LossBreakdown,
    pub iterations: usize,
    pub status: String,
    pub converged: bool,
    pub fn_evals: FnEvalMap,
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferOutcome {
    /// Loss breakdown of the initial generated image.
    pub initial: LossBreakdown,
    pub rounds: Vec<RoundReport>,
    /// Final generated image in extractor normalization.
    pub generated: ImageTensor,
    /// Final deprocessed image.
    pub image: RgbImage,
}

impl TransferOutcome {
    pub fn final_loss(&self) -> f64 {
        self.rounds.last().map_or(self.initial.total(), |r| r.loss)
    }
}

/// Drives a style-transfer run.
pub struct TransferDriver<'a, E: FeatureExtractor + ?Sized> {
    extractor: &'a E,
    options: TransferOptions,
    assembler: LossAssembler,
    content: ImageTensor,
    style: ImageTensor,
    generated: ImageTensor,
    state: TransferState,
}

impl<'a, E: FeatureExtractor + ?Sized> TransferDriver<'a, E> {
    /// Validate the configuration and build the initial generated image.
    ///
    /// # Errors
    /// - [`TransferError::UnknownLayer`] for a layer the extractor lacks.
    /// - [`TransferError::ShapeMismatch`] if content and style differ in size.
    /// - [`TransferError::InvalidRounds`] / [`TransferError::InvalidNoiseAmplitude`]
    ///   for invalid run options.
    pub fn new(
        extractor: &'a E, options: TransferOptions, content: ImageTensor, style: ImageTensor,
    ) -> TransferResult<Self> {
        if options.rounds == 0 {
            return Err(TransferError::InvalidRounds { rounds: 0 });
        }
        options.init.validate()?;
        content.ensure_same_dims(&style, "style image")?;
        let assembler = LossAssembler::new(options.loss.clone(), extractor)?;
        let generated = initial_image(&options.init, &content, &style)?;
        Ok(Self {
            extractor,
            options,
            assembler,
            content,
            style,
            generated,
            state: TransferState::Initialized,
        })
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn generated(&self) -> &ImageTensor {
        &self.generated
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    fn evaluator(&self) -> TransferResult<Evaluator<'_, E>> {
        Evaluator::new(self.extractor, &self.assembler, &self.content, &self.style)
    }

    /// Loss breakdown of the current generated image.
    pub fn current_loss(&self) -> TransferResult<LossBreakdown> {
        Ok(self.evaluator()?.evaluate(&self.generated.flatten())?.breakdown)
    }

    /// Run the next round and persist its image.
    ///
    /// # Errors
    /// - [`TransferError::InvalidRounds`] if all rounds already ran.
    /// - Any evaluator, optimizer, codec or sink error; the state is left at
    ///   `RoundInProgress(i)`.
    pub fn run_round(&mut self, sink: &mut dyn ImageSink) -> TransferResult<RoundReport> {
        let round = match self.state {
            TransferState::Initialized => 0,
            TransferState::RoundComplete(i) if i + 1 < self.options.rounds => i + 1,
            _ => return Err(TransferError::InvalidRounds { rounds: self.options.rounds }),
        };
        self.state = TransferState::RoundInProgress(round);

        let theta0 = self.generated.flatten();
        let (outcome, breakdown, passes) = {
            let evaluator = self.evaluator()?;
            let outcome = minimize(&evaluator, theta0, &self.options.minimize)?;
            let breakdown = evaluator.evaluation_at(&outcome.theta_hat)?.breakdown;
            (outcome, breakdown, evaluator.passes())
        };
        debug!(round = round + 1, passes, fn_evals = ?outcome.fn_evals, "round evaluations");

        self.generated = ImageTensor::from_flat(&outcome.theta_hat, self.generated.dims())?;
        let image = codec::denormalize_and_clip(&self.generated)?;
        sink.persist(round, &image)?;

        info!(
            round = round + 1,
            rounds = self.options.rounds,
            loss = outcome.value,
            content = breakdown.content,
            style = breakdown.style,
            total_variation = breakdown.total_variation,
            iterations = outcome.iterations,
            status = %outcome.status,
            "round complete"
        );
        self.state = TransferState::RoundComplete(round);
        Ok(RoundReport {
            round,
            loss: outcome.value,
            breakdown,
            iterations: outcome.iterations,
            status: outcome.status,
            converged: outcome.converged,
            fn_evals: outcome.fn_evals,
        })
    }

    /// Run every remaining round, then finish.
    pub fn run(mut self, sink: &mut dyn ImageSink) -> TransferResult<TransferOutcome> {
        let initial = self.current_loss()?;
        info!(loss = initial.total(), rounds = self.options.rounds, "starting style transfer");
        let mut rounds = Vec::with_capacity(self.options.rounds);
        while !matches!(self.state, TransferState::RoundComplete(i) if i + 1 >= self.options.rounds)
        {
            rounds.push(self.run_round(sink)?);
        }
        self.state = TransferState::Finished;
        let image = codec::denormalize_and_clip(&self.generated)?;
        Ok(TransferOutcome { initial, rounds, generated: self.generated, image })
    }
}

fn initial_image(
    init: &GeneratedInit, content: &ImageTensor, style: &ImageTensor,
) -> TransferResult<ImageTensor> {
    match *init {
        GeneratedInit::Content => Ok(content.clone()),
        GeneratedInit::Style => Ok(style.clone()),
        GeneratedInit::Noise { seed, amplitude } => {
            let mut rng = StdRng::seed_from_u64(seed);
            let base = content.view();
            let noisy = Array3::from_shape_fn(base.raw_dim(), |idx| {
                let jitter = if amplitude > 0.0 { rng.gen_range(-amplitude..=amplitude) } else { 0.0 };
                base[idx] + jitter
            });
            ImageTensor::new(noisy)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::extractor::{ConvBlockSpec, ConvExtractorConfig, ConvFeatureExtractor};
    use crate::transfer::options::{LossOptions, LossWeights, StyleReduction};
    use crate::optimization::{
        errors::OptError,
        minimizer::{MinimizeOptions, Tolerances},
    };

    fn tiny_net() -> ConvFeatureExtractor {
        ConvFeatureExtractor::new(&ConvExtractorConfig {
            blocks: vec![
                ConvBlockSpec { convs: 1, channels: 4 },
                ConvBlockSpec { convs: 1, channels: 4 },
            ],
            seed: 5,
        })
        .expect("valid config")
    }

    fn tiny_options(rounds: usize, init: GeneratedInit) -> TransferOptions {
        let loss = LossOptions::new(
            "block2_conv1",
            vec!["block1_conv1".into(), "block2_conv1".into()],
            LossWeights::new(1.0, 10.0, 0.01).expect("valid"),
            StyleReduction::Average,
            1.25,
        )
        .expect("valid");
        let tols = Tolerances::new(None, None, Some(3)).expect("valid");
        let minimize = MinimizeOptions { tols, ..MinimizeOptions::default() };
        TransferOptions::new(loss, rounds, minimize, init).expect("valid")
    }

    #[test]
    // Purpose
    // -------
    // Walk the state machine through a two-round run.
    //
    // Given
    // -----
    // - 4x4 content/style, 2 rounds, at most 3 inner iterations.
    //
    // Expect
    // ------
    // - States Initialized → RoundComplete(0) → RoundComplete(1).
    // - A third round is refused.
    // - One frame per round reaches the sink.
    fn state_machine_advances_round_by_round() {
        // Arrange
        let net = tiny_net();
        let content = ImageTensor::filled(4, 4, [20.0, -30.0, 40.0]).expect("valid");
        let style = ImageTensor::filled(4, 4, [-60.0, 10.0, -5.0]).expect("valid");
        let mut driver =
            TransferDriver::new(&net, tiny_options(2, GeneratedInit::Content), content, style)
                .expect("valid configuration");
        let mut sink = MemorySink::default();

        // Act / Assert
        assert_eq!(driver.state(), TransferState::Initialized);
        let first = driver.run_round(&mut sink).expect("round 1");
        assert_eq!(driver.state(), TransferState::RoundComplete(0));
        let second = driver.run_round(&mut sink).expect("round 2");
        assert_eq!(driver.state(), TransferState::RoundComplete(1));
        assert!(matches!(driver.run_round(&mut sink), Err(TransferError::InvalidRounds { .. })));
        assert_eq!((first.round, second.round), (0, 1));
        assert!(second.loss <= first.loss);
        assert_eq!(sink.frames.len(), 2);
    }

    #[test]
    // Purpose
    // -------
    // A round whose loss overflows must abort before anything is persisted.
    //
    // Given
    // -----
    // - Content with one entry at 1e300, generated image initialized from it.
    //
    // Expect
    // ------
    // - `run_round` fails with the optimizer's non-finite cost error.
    // - The sink receives no frame; the driver stays in `RoundInProgress(0)`.
    fn non_finite_loss_aborts_round_without_saving() {
        // Arrange
        let net = tiny_net();
        let mut pixels = Array3::from_elem((4, 4, 3), 10.0);
        pixels[[0, 0, 0]] = 1e300;
        let content = ImageTensor::new(pixels).expect("valid");
        let style = ImageTensor::filled(4, 4, [-60.0, 10.0, -5.0]).expect("valid");
        let mut driver =
            TransferDriver::new(&net, tiny_options(2, GeneratedInit::Content), content, style)
                .expect("valid configuration");
        let mut sink = MemorySink::default();

        // Act
        let result = driver.run_round(&mut sink);

        // Assert
        assert!(matches!(
            result,
            Err(TransferError::Optimization(OptError::NonFiniteCost { .. }))
        ));
        assert!(sink.frames.is_empty());
        assert_eq!(driver.state(), TransferState::RoundInProgress(0));
    }

    #[test]
    fn mismatched_image_sizes_are_rejected_up_front() {
        let net = tiny_net();
        let content = ImageTensor::filled(4, 4, [0.0; 3]).expect("valid");
        let style = ImageTensor::filled(4, 5, [0.0; 3]).expect("valid");
        assert!(matches!(
            TransferDriver::new(&net, tiny_options(1, GeneratedInit::Content), content, style),
            Err(TransferError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn noise_init_is_seeded_and_bounded() {
        let content = ImageTensor::filled(3, 3, [1.0, 2.0, 3.0]).expect("valid");
        let init = GeneratedInit::Noise { seed: 42, amplitude: 0.5 };
        let a = initial_image(&init, &content, &content).expect("valid");
        let b = initial_image(&init, &content, &content).expect("valid");
        assert_eq!(a, b);
        assert_ne!(a, content);
        for (x, c) in a.view().iter().zip(content.view().iter()) {
            assert!((x - c).abs() <= 0.5);
        }
    }

    #[test]
    fn file_sink_overwrites_single_path() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut sink = FileSink::new(dir.path().join("output.png"));
        let a = RgbImage::from_pixel(2, 2, image::Rgb([1, 2, 3]));
        let b = RgbImage::from_pixel(2, 2, image::Rgb([9, 8, 7]));
        sink.persist(0, &a).expect("write");
        sink.persist(1, &b).expect("overwrite");
        assert_eq!(codec::load(sink.path()).expect("decodes"), b);
        assert_eq!(std::fs::read_dir(dir.path()).expect("list").count(), 1);
    }
}
