//! # Image Preprocessing
//!
//! Geometry normalization ([`crop_or_pad`]) and per-channel batch
//! standardization ([`standardize`]) applied ahead of the model.

use crate::estimator::mode::Mode;
use bimm_contracts::assert_shape_contract_periodically;
use burn::prelude::{Backend, Config, Tensor};

/// Default model input resolution (CIFAR).
pub const DEFAULT_TARGET_RESOLUTION: [usize; 2] = [32, 32];

/// Full-scale value of raw pixel intensities.
pub const PIXEL_SCALE: f64 = 255.0;

/// [`ImagePreprocess`] configuration.
#[derive(Config, Debug)]
pub struct ImagePreprocessConfig {
    /// Crop or pad images to this ``[height, width]``; `None` leaves them as-is.
    #[config(default = "Some(DEFAULT_TARGET_RESOLUTION)")]
    pub target_resolution: Option<[usize; 2]>,

    /// Standardize raw pixels in [`Mode::Predict`].
    #[config(default = "true")]
    pub standardize_on_predict: bool,

    /// Divisor applied to raw pixels before standardizing.
    #[config(default = "PIXEL_SCALE")]
    pub pixel_scale: f64,

    /// Added to the standard deviation before dividing.
    #[config(default = "1e-6")]
    pub epsilon: f64,
}

impl ImagePreprocessConfig {
    /// Build the [`ImagePreprocess`] stage.
    pub fn init(&self) -> ImagePreprocess {
        assert!(self.pixel_scale > 0.0, "pixel_scale must be > 0");
        if let Some([height, width]) = self.target_resolution {
            assert!(height > 0 && width > 0, "target_resolution must be non-empty");
        }
        ImagePreprocess {
            target_resolution: self.target_resolution,
            standardize_on_predict: self.standardize_on_predict,
            pixel_scale: self.pixel_scale,
            epsilon: self.epsilon,
        }
    }
}

/// Mode-aware preprocessing stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePreprocess {
    target_resolution: Option<[usize; 2]>,
    standardize_on_predict: bool,
    pixel_scale: f64,
    epsilon: f64,
}

impl Default for ImagePreprocess {
    fn default() -> Self {
        ImagePreprocessConfig::new().init()
    }
}

impl ImagePreprocess {
    /// Preprocess a ``[batch, channels, height, width]`` batch for `mode`.
    ///
    /// Standardization only runs in [`Mode::Predict`]; the training and
    /// evaluation pipelines deliver already-normalized images.
    pub fn apply<B: Backend>(
        &self,
        images: Tensor<B, 4>,
        mode: Mode,
    ) -> Tensor<B, 4> {
        let images = if mode == Mode::Predict && self.standardize_on_predict {
            standardize(images, self.pixel_scale, self.epsilon)
        } else {
            images
        };

        match self.target_resolution {
            Some(target) => crop_or_pad(images, target),
            None => images,
        }
    }
}

/// Split a size change into ``(offset, kept)`` for crop, or ``(before, after)`` for pad.
fn centered(
    size: usize,
    target: usize,
) -> (usize, usize) {
    let delta = size.abs_diff(target);
    (delta / 2, delta - delta / 2)
}

/// Centrally crop, or zero-pad, images to a target resolution.
///
/// Each spatial dimension is handled independently: larger dimensions are
/// cropped about the center, smaller ones are padded with zeros; odd
/// differences put the extra row/column on the bottom/right.
///
/// # Arguments
///
/// - `images`: ``[batch, channels, height, width]``.
/// - `target`: ``[target_height, target_width]``.
///
/// # Returns
///
/// ``[batch, channels, target_height, target_width]``.
pub fn crop_or_pad<B: Backend>(
    images: Tensor<B, 4>,
    target: [usize; 2],
) -> Tensor<B, 4> {
    let [batch, channels, height, width] = images.dims();
    let [target_height, target_width] = target;

    let crop_height = height.min(target_height);
    let crop_width = width.min(target_width);

    let images = if crop_height != height || crop_width != width {
        let (top, _) = centered(height, crop_height);
        let (left, _) = centered(width, crop_width);
        images.slice([
            0..batch,
            0..channels,
            top..top + crop_height,
            left..left + crop_width,
        ])
    } else {
        images
    };

    let images = if crop_height != target_height || crop_width != target_width {
        let (top, bottom) = centered(crop_height, target_height);
        let (left, right) = centered(crop_width, target_width);
        images.pad((left, right, top, bottom), 0.0f32)
    } else {
        images
    };

    assert_shape_contract_periodically!(
        ["batch", "channels", "height", "width"],
        &images,
        &[
            ("batch", batch),
            ("channels", channels),
            ("height", target_height),
            ("width", target_width)
        ]
    );

    images
}

/// Per-channel mean over ``[batch, height, width]``, kept as ``[1, channels, 1, 1]``.
fn channel_mean<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    x.mean_dim(0).mean_dim(2).mean_dim(3)
}

/// Standardize raw pixel intensities with per-channel batch moments.
///
/// ``x = images / pixel_scale``, then ``(x - mean) / (std + epsilon)``
/// where the moments are taken over the batch and spatial dimensions.
pub fn standardize<B: Backend>(
    images: Tensor<B, 4>,
    pixel_scale: f64,
    epsilon: f64,
) -> Tensor<B, 4> {
    let x = images.div_scalar(pixel_scale);

    let mean = channel_mean(x.clone());
    let centered = x - mean;
    let variance = channel_mean(centered.clone().powf_scalar(2.0));

    centered / variance.sqrt().add_scalar(epsilon)
}
