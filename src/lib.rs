//! rust_style_transfer — neural style transfer with an L-BFGS optimizer and
//! optional Python bindings.
//!
//! Purpose
//! -------
//! Serve as the crate root for Rust callers and as the PyO3 bridge that
//! exposes the transfer engine to Python via the `_rust_style_transfer`
//! extension module.
//!
//! Key behaviors
//! -------------
//! - Re-export the core Rust modules (`optimization` and `transfer`) as the
//!   public crate surface.
//! - With the `python-bindings` feature, define the `StyleTransfer`
//!   `#[pyclass]` and the `#[pymodule]` initializer.
//!
//! Invariants & assumptions
//! ------------------------
//! - All numerical work lives in the inner modules; this file performs only
//!   FFI glue, argument conversion and error mapping.
//! - The engine is single-threaded and synchronous; a Python call to
//!   `StyleTransfer.run` holds the GIL until every round has finished.
//!
//! Downstream usage
//! ----------------
//! - Rust callers build a [`TransferDriver`](transfer::driver::TransferDriver)
//!   from [`TransferOptions`](transfer::options::TransferOptions), two
//!   normalized images from [`transfer::codec`] and a
//!   [`FeatureExtractor`](transfer::extractor::FeatureExtractor).
//! - The `style_transfer` binary wires the same pieces to a CLI.
//!
//! Testing notes
//! -------------
//! - Unit tests live next to each module; `tests/integration_transfer_pipeline.rs`
//!   runs complete transfers on small synthetic images.

pub mod optimization;
pub mod transfer;
pub mod utils;

#[cfg(feature = "python-bindings")]
use numpy::PyArray3;

#[cfg(feature = "python-bindings")]
use pyo3::{exceptions::PyValueError, prelude::*};

#[cfg(feature = "python-bindings")]
use crate::{
    transfer::{
        codec,
        driver::{FileSink, TransferDriver, TransferOutcome},
        extractor::{ConvExtractorConfig, ConvFeatureExtractor},
        options::{DEFAULT_ROUNDS, DEFAULT_TV_EXPONENT, TransferOptions},
    },
    utils::{LossArgs, RunArgs, build_transfer_options, rgb_to_pyarray},
};

/// StyleTransfer — Python-facing wrapper around [`TransferDriver`].
///
/// Purpose
/// -------
/// Configure a style-transfer run from keyword arguments, execute it on image
/// files and expose the per-round losses and the final image.
///
/// Parameters
/// ----------
/// Constructed from Python via `StyleTransfer(content_weight=100.0, ...)`:
/// - `content_weight`, `style_weight`, `tv_weight`: `f64`
///   Non-negative loss weights.
/// - `content_layer`: `Option<&str>`, `style_layers`: `Option<Vec<String>>`
///   Layer selection; defaults to `block5_conv2` and `block{1..5}_conv1`.
/// - `rounds`, `max_iter`: `usize`
///   Outer rounds and the per-round L-BFGS iteration cap.
/// - `line_searcher`, `lbfgs_mem`, `tv_exponent`, `style_reduction`
///   Optimizer and loss shape knobs.
/// - `init`, `noise_seed`, `noise_amplitude`
///   Initialization of the generated image (`"content"`, `"style"` or
///   `"noise"`).
/// - `extractor_seed`: `u64`
///   Seed of the built-in convolutional feature extractor.
///
/// Fields
/// ------
/// - `options`: validated [`TransferOptions`].
/// - `outcome`: result of the last `run`, if any.
#[cfg(feature = "python-bindings")]
#[pyclass(module = "rust_style_transfer", unsendable)]
pub struct StyleTransfer {
    options: TransferOptions,
    extractor_seed: u64,
    outcome: Option<TransferOutcome>,
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl StyleTransfer {
    #[new]
    #[pyo3(
        signature = (
            content_weight = 100.0,
            style_weight = 1.0,
            tv_weight = 1.0,
            content_layer = None,
            style_layers = None,
            rounds = DEFAULT_ROUNDS,
            max_iter = 20,
            line_searcher = None,
            lbfgs_mem = None,
            tv_exponent = DEFAULT_TV_EXPONENT,
            style_reduction = None,
            init = None,
            noise_seed = 0,
            noise_amplitude = 0.0,
            extractor_seed = 1618,
        ),
        text_signature = "(content_weight=100.0, style_weight=1.0, tv_weight=1.0, \
                          content_layer=None, style_layers=None, rounds=10, max_iter=20, \
                          line_searcher=None, lbfgs_mem=None, tv_exponent=1.25, \
                          style_reduction=None, init=None, noise_seed=0, \
                          noise_amplitude=0.0, extractor_seed=1618)"
    )]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        content_weight: f64, style_weight: f64, tv_weight: f64, content_layer: Option<&str>,
        style_layers: Option<Vec<String>>, rounds: usize, max_iter: usize,
        line_searcher: Option<&str>, lbfgs_mem: Option<usize>, tv_exponent: f64,
        style_reduction: Option<&str>, init: Option<&str>, noise_seed: u64,
        noise_amplitude: f64, extractor_seed: u64,
    ) -> PyResult<Self> {
        let options = build_transfer_options(
            LossArgs {
                content_weight,
                style_weight,
                tv_weight,
                content_layer,
                style_layers,
                style_reduction,
                tv_exponent,
            },
            RunArgs { rounds, max_iter, line_searcher, lbfgs_mem, init, noise_seed, noise_amplitude },
        )?;
        Ok(StyleTransfer { options, extractor_seed, outcome: None })
    }

    /// Run the transfer, overwriting `output_path` after every round.
    ///
    /// The style image is resized to `style_height × style_width` (default:
    /// the content size); both sizes must agree.
    #[pyo3(signature = (content_path, style_path, output_path, height = 500, width = 500, style_height = None, style_width = None))]
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &mut self, content_path: &str, style_path: &str, output_path: &str, height: u32,
        width: u32, style_height: Option<u32>, style_width: Option<u32>,
    ) -> PyResult<()> {
        let extractor = ConvFeatureExtractor::new(&ConvExtractorConfig {
            seed: self.extractor_seed,
            ..ConvExtractorConfig::default()
        })?;
        let content = codec::load_normalized(content_path, height, width)?;
        let style = codec::load_normalized(
            style_path,
            style_height.unwrap_or(height),
            style_width.unwrap_or(width),
        )?;
        let driver = TransferDriver::new(&extractor, self.options.clone(), content, style)?;
        let mut sink = FileSink::new(output_path);
        self.outcome = Some(driver.run(&mut sink)?);
        Ok(())
    }

    /// Loss after each completed round of the last run.
    #[getter]
    pub fn round_losses(&self) -> Vec<f64> {
        self.outcome.as_ref().map_or_else(Vec::new, |o| o.rounds.iter().map(|r| r.loss).collect())
    }

    /// Loss of the initial generated image of the last run.
    #[getter]
    pub fn initial_loss(&self) -> Option<f64> {
        self.outcome.as_ref().map(|o| o.initial.total())
    }

    /// Final image of the last run as a `(height, width, 3)` `uint8` array.
    pub fn image<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray3<u8>>> {
        let outcome = self
            .outcome
            .as_ref()
            .ok_or_else(|| PyValueError::new_err("run() has not completed yet"))?;
        rgb_to_pyarray(py, &outcome.image)
    }
}

/// _rust_style_transfer — PyO3 module initializer for the Python extension.
///
/// Registers [`StyleTransfer`]. Invoked by Python when importing the compiled
/// extension.
#[cfg(feature = "python-bindings")]
#[pymodule]
fn _rust_style_transfer<'py>(_py: Python<'py>, m: &Bound<'py, PyModule>) -> PyResult<()> {
    m.add_class::<StyleTransfer>()?;
    Ok(())
}
