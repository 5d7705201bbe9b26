//! transfer::codec — image decoding/encoding and VGG-style normalization.
//!
//! Purpose
//! -------
//! Bridge between 8-bit RGB images on disk and the `f64` tensors the feature
//! extractor consumes. Uses the `image` crate for I/O and resampling.
//!
//! Conventions
//! -----------
//! - Normalized tensors are in BGR channel order with the per-channel
//!   ImageNet mean [`VGG_MEAN_BGR`] subtracted.
//! - [`denormalize_and_clip`] adds the mean back, reorders to RGB, clamps to
//!   `[0, 255]` and rounds to the nearest integer.
//! - Resizing uses Lanczos3 and is skipped when the image already has the
//!   requested size.
use std::path::Path;

use crate::transfer::{
    errors::{TransferError, TransferResult},
    image::{CHANNELS, ImageTensor},
};
use image::{RgbImage, imageops};
use ndarray::Array3;

/// ImageNet channel means in BGR order.
pub const VGG_MEAN_BGR: [f64; CHANNELS] = [103.939, 116.779, 123.68];

/// Decode the image at `path` as 8-bit RGB.
///
/// # Errors
/// - [`TransferError::ImageLoad`] if the file cannot be opened or decoded.
pub fn load(path: impl AsRef<Path>) -> TransferResult<RgbImage> {
    let path = path.as_ref();
    let decoded = image::open(path).map_err(|e| TransferError::ImageLoad {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(decoded.to_rgb8())
}

/// Resize `raw` to `height × width` and convert it to a normalized tensor.
///
/// # Errors
/// - [`TransferError::InvalidImageSize`] if either target dimension is zero.
pub fn resize_and_normalize(raw: &RgbImage, height: u32, width: u32) -> TransferResult<ImageTensor> {
    if height == 0 || width == 0 {
        return Err(TransferError::InvalidImageSize { height, width });
    }
    let resized;
    let source = if raw.dimensions() == (width, height) {
        raw
    } else {
        resized = imageops::resize(raw, width, height, imageops::FilterType::Lanczos3);
        &resized
    };
    let data = Array3::from_shape_fn((height as usize, width as usize, CHANNELS), |(y, x, c)| {
        let pixel = source.get_pixel(x as u32, y as u32);
        // c indexes BGR; the source pixel is RGB.
        f64::from(pixel[CHANNELS - 1 - c]) - VGG_MEAN_BGR[c]
    });
    ImageTensor::new(data)
}

/// Convert a normalized tensor back to an 8-bit RGB image.
///
/// # Errors
/// - [`TransferError::ImageBuffer`] if the pixel buffer cannot be assembled
///   (dimensions beyond `u32`).
pub fn denormalize_and_clip(tensor: &ImageTensor) -> TransferResult<RgbImage> {
    let (h, w) = tensor.dims();
    let to_u32 = |v: usize| u32::try_from(v).unwrap_or(u32::MAX);
    let (height, width) = (to_u32(h), to_u32(w));
    let view = tensor.view();
    let mut buf = Vec::with_capacity(h * w * CHANNELS);
    for y in 0..h {
        for x in 0..w {
            for rgb in 0..CHANNELS {
                let bgr = CHANNELS - 1 - rgb;
                let value = view[[y, x, bgr]] + VGG_MEAN_BGR[bgr];
                buf.push(value.clamp(0.0, 255.0).round() as u8);
            }
        }
    }
    RgbImage::from_raw(width, height, buf).ok_or(TransferError::ImageBuffer { height, width })
}

/// Encode `raw` to `path`, overwriting any existing file. The format follows
/// the file extension.
///
/// # Errors
/// - [`TransferError::ImageSave`] on encoding or I/O failure.
pub fn save(raw: &RgbImage, path: impl AsRef<Path>) -> TransferResult<()> {
    let path = path.as_ref();
    raw.save(path).map_err(|e| TransferError::ImageSave {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// [`load`] followed by [`resize_and_normalize`].
pub fn load_normalized(path: impl AsRef<Path>, height: u32, width: u32) -> TransferResult<ImageTensor> {
    resize_and_normalize(&load(path)?, height, width)
}
