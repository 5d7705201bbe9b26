//! Errors for the style-transfer engine (configuration checks, tensor shape
//! invariants, numeric failures, codec I/O and optimizer failures).
//!
//! ## Conventions
//! - Configuration problems (unknown layers, mismatched image sizes, invalid
//!   weights) are detected before the first optimizer round and are fatal.
//! - Non-finite losses or gradients are reported with the offending value and
//!   never handed to the optimizer.
//! - Optimizer/backend errors are wrapped unchanged in
//!   [`TransferError::Optimization`] so evaluator contract violations stay
//!   distinguishable from solver failures.
use crate::optimization::errors::OptError;

#[cfg(feature = "python-bindings")]
use pyo3::{PyErr, exceptions::PyValueError};

/// Crate-wide result alias for transfer operations.
pub type TransferResult<T> = Result<T, TransferError>;

/// Unified error type for style transfer.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferError {
    // ---- Configuration ----
    /// A requested layer is not produced by the feature extractor.
    UnknownLayer { name: String },

    /// At least one style layer is required.
    EmptyStyleLayers,

    /// A style layer was listed twice.
    DuplicateStyleLayer { name: String },

    /// Loss weights must be finite and non-negative.
    InvalidWeight { term: &'static str, value: f64 },

    /// The total-variation exponent must be finite and >= 1.
    InvalidTvExponent { value: f64 },

    /// The number of outer rounds must be positive.
    InvalidRounds { rounds: usize },

    /// Working image sizes must be positive.
    InvalidImageSize { height: u32, width: u32 },

    /// Noise initialization amplitude must be finite and non-negative.
    InvalidNoiseAmplitude { value: f64 },

    /// Feature-extractor architecture is malformed.
    InvalidExtractorConfig { reason: &'static str },

    // ---- Tensor shapes ----
    /// Two tensors that must agree in shape do not.
    ShapeMismatch { what: &'static str, expected: Vec<usize>, found: Vec<usize> },

    /// A tensor has the wrong number of axes.
    InvalidRank { expected: usize, found: usize },

    /// Flat parameter vector length does not match the image shape.
    ParamLengthMismatch { expected: usize, found: usize },

    /// Stacked batch does not hold exactly the three image roles.
    BatchSizeMismatch { expected: usize, found: usize },

    /// An activation bundle lacks a layer the loss needs.
    MissingActivation { name: String },

    // ---- Numeric ----
    /// Loss evaluated to NaN/±inf.
    NonFiniteLoss { term: &'static str, value: f64 },

    /// Gradient contains NaN/±inf.
    NonFiniteGradient { index: usize, value: f64 },

    // ---- Codec ----
    /// Image could not be opened or decoded.
    ImageLoad { path: String, reason: String },

    /// Image could not be encoded or written.
    ImageSave { path: String, reason: String },

    /// Raw pixel buffer does not match the requested dimensions.
    ImageBuffer { height: u32, width: u32 },

    // ---- Optimizer ----
    /// Failure inside the minimizer (including evaluator contract violations).
    Optimization(OptError),
}

impl std::error::Error for TransferError {}

impl std::fmt::Display for TransferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- Configuration ----
            TransferError::UnknownLayer { name } => {
                write!(f, "Layer '{name}' is not produced by the feature extractor")
            }
            TransferError::EmptyStyleLayers => {
                write!(f, "At least one style layer must be configured")
            }
            TransferError::DuplicateStyleLayer { name } => {
                write!(f, "Style layer '{name}' is listed more than once")
            }
            TransferError::InvalidWeight { term, value } => {
                write!(f, "{term} weight must be finite and >= 0; got: {value}")
            }
            TransferError::InvalidTvExponent { value } => {
                write!(f, "Total-variation exponent must be finite and >= 1; got: {value}")
            }
            TransferError::InvalidRounds { rounds } => {
                write!(f, "Number of transfer rounds must be > 0; got: {rounds}")
            }
            TransferError::InvalidImageSize { height, width } => {
                write!(f, "Image size must be positive; got: {height}x{width}")
            }
            TransferError::InvalidNoiseAmplitude { value } => {
                write!(f, "Noise amplitude must be finite and >= 0; got: {value}")
            }
            TransferError::InvalidExtractorConfig { reason } => {
                write!(f, "Invalid feature extractor configuration: {reason}")
            }

            // ---- Tensor shapes ----
            TransferError::ShapeMismatch { what, expected, found } => {
                write!(f, "Shape mismatch for {what}: expected {expected:?}, found {found:?}")
            }
            TransferError::InvalidRank { expected, found } => {
                write!(f, "Tensor rank mismatch: expected {expected} axes, found {found}")
            }
            TransferError::ParamLengthMismatch { expected, found } => {
                write!(f, "Parameter vector length mismatch: expected {expected}, found {found}")
            }
            TransferError::BatchSizeMismatch { expected, found } => {
                write!(f, "Batch size mismatch: expected {expected} images, found {found}")
            }
            TransferError::MissingActivation { name } => {
                write!(f, "Activation bundle is missing layer '{name}'")
            }

            // ---- Numeric ----
            TransferError::NonFiniteLoss { term, value } => {
                write!(f, "Non-finite {term} loss: {value}")
            }
            TransferError::NonFiniteGradient { index, value } => {
                write!(f, "Non-finite gradient entry at index {index}: {value}")
            }

            // ---- Codec ----
            TransferError::ImageLoad { path, reason } => {
                write!(f, "Failed to load image '{path}': {reason}")
            }
            TransferError::ImageSave { path, reason } => {
                write!(f, "Failed to save image '{path}': {reason}")
            }
            TransferError::ImageBuffer { height, width } => {
                write!(f, "Pixel buffer does not match a {height}x{width} RGB image")
            }

            // ---- Optimizer ----
            TransferError::Optimization(err) => {
                write!(f, "Optimizer failed: {err}")
            }
        }
    }
}

impl From<OptError> for TransferError {
    fn from(err: OptError) -> Self {
        TransferError::Optimization(err)
    }
}

/// Route transfer failures raised inside the objective through the
/// optimizer's error surface.
///
/// Non-finite values map onto the optimizer's own variants so that the
/// minimizer treats them exactly like any other invalid cost/gradient;
/// everything else is carried as [`OptError::ModelFailure`].
impl From<TransferError> for OptError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Optimization(inner) => inner,
            TransferError::NonFiniteLoss { value, .. } => OptError::NonFiniteCost { value },
            TransferError::NonFiniteGradient { index, value } => OptError::InvalidGradient {
                index,
                value,
                reason: "Gradient elements must be finite.",
            },
            other => OptError::ModelFailure { text: other.to_string() },
        }
    }
}

/// Convert a [`TransferError`] into a Python `ValueError` with the error message.
#[cfg(feature = "python-bindings")]
impl From<TransferError> for PyErr {
    fn from(err: TransferError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}
