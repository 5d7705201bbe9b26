#[cfg(feature = "python-bindings")]
use ndarray::Array3;

#[cfg(feature = "python-bindings")]
use pyo3::{exceptions::PyValueError, prelude::*};

#[cfg(feature = "python-bindings")]
use crate::{
    optimization::minimizer::{LineSearcher, MinimizeOptions, Tolerances},
    transfer::{
        errors::TransferError,
        options::{
            DEFAULT_CONTENT_LAYER, DEFAULT_STYLE_LAYERS, GeneratedInit, LossOptions, LossWeights,
            StyleReduction, TransferOptions,
        },
    },
};

#[cfg(feature = "python-bindings")]
use image::RgbImage;

#[cfg(feature = "python-bindings")]
use numpy::{
    IntoPyArray, // Array3 → PyArray3
    PyArray3,
};

/// Loss-related keyword arguments of the Python `StyleTransfer` constructor.
#[cfg(feature = "python-bindings")]
pub struct LossArgs<'a> {
    pub content_weight: f64,
    pub style_weight: f64,
    pub tv_weight: f64,
    pub content_layer: Option<&'a str>,
    pub style_layers: Option<Vec<String>>,
    pub style_reduction: Option<&'a str>,
    pub tv_exponent: f64,
}

/// Run-related keyword arguments of the Python `StyleTransfer` constructor.
#[cfg(feature = "python-bindings")]
pub struct RunArgs<'a> {
    pub rounds: usize,
    pub max_iter: usize,
    pub line_searcher: Option<&'a str>,
    pub lbfgs_mem: Option<usize>,
    pub init: Option<&'a str>,
    pub noise_seed: u64,
    pub noise_amplitude: f64,
}

#[cfg(feature = "python-bindings")]
pub fn build_transfer_options(loss: LossArgs<'_>, run: RunArgs<'_>) -> PyResult<TransferOptions> {
    let weights = LossWeights::new(loss.content_weight, loss.style_weight, loss.tv_weight)?;
    let style_reduction = match loss.style_reduction {
        Some(name) => name.parse::<StyleReduction>().map_err(PyValueError::new_err)?,
        None => StyleReduction::Average,
    };
    let style_layers = loss
        .style_layers
        .unwrap_or_else(|| DEFAULT_STYLE_LAYERS.iter().map(|s| s.to_string()).collect());
    let loss_opts = LossOptions::new(
        loss.content_layer.unwrap_or(DEFAULT_CONTENT_LAYER),
        style_layers,
        weights,
        style_reduction,
        loss.tv_exponent,
    )?;
    let minimize = extract_minimize_opts(run.max_iter, run.line_searcher, run.lbfgs_mem)?;
    let init = extract_init(run.init, run.noise_seed, run.noise_amplitude)?;
    Ok(TransferOptions::new(loss_opts, run.rounds, minimize, init)?)
}

#[cfg(feature = "python-bindings")]
fn extract_minimize_opts(
    max_iter: usize, line_searcher: Option<&str>, lbfgs_mem: Option<usize>,
) -> PyResult<MinimizeOptions> {
    use std::str::FromStr;

    // OptResult<_> -> TransferError -> PyErr
    let tols = Tolerances::new(None, None, Some(max_iter)).map_err(TransferError::from)?;
    let ls = match line_searcher {
        Some(name) => LineSearcher::from_str(name).map_err(TransferError::from)?,
        None => LineSearcher::MoreThuente,
    };
    let opts = MinimizeOptions::new(tols, ls, false, lbfgs_mem).map_err(TransferError::from)?;
    Ok(opts)
}

#[cfg(feature = "python-bindings")]
fn extract_init(init: Option<&str>, seed: u64, amplitude: f64) -> PyResult<GeneratedInit> {
    match init.map(str::to_lowercase).as_deref() {
        None | Some("content") => Ok(GeneratedInit::Content),
        Some("style") => Ok(GeneratedInit::Style),
        Some("noise") => Ok(GeneratedInit::Noise { seed, amplitude }),
        Some(other) => Err(PyValueError::new_err(format!(
            "init must be one of 'content', 'style' or 'noise'; got '{other}'"
        ))),
    }
}

/// Copy an RGB image into a `(height, width, 3)` `uint8` numpy array.
#[cfg(feature = "python-bindings")]
pub fn rgb_to_pyarray<'py>(py: Python<'py>, image: &RgbImage) -> PyResult<Bound<'py, PyArray3<u8>>> {
    let (width, height) = image.dimensions();
    let data = Array3::from_shape_vec((height as usize, width as usize, 3), image.as_raw().clone())
        .map_err(|e| PyValueError::new_err(e.to_string()))?;
    Ok(data.into_pyarray(py))
}
