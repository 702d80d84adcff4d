//! Image preprocessing for the removal pipeline
//!
//! Two stages live here: request-level normalization (color mode and size
//! limits) and model-level tensor preparation.

use crate::{models::PreprocessingConfig, types::ImageDimensions};
use image::{imageops::FilterType, DynamicImage, RgbImage};
use ndarray::Array4;

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Normalize the color mode and downsample oversized images
    ///
    /// Returns the image to run inference on together with the dimensions it
    /// had before any resize, so the result can be restored to them later.
    ///
    /// # Arguments
    /// * `image` - Decoded upload
    /// * `max_dimension` - Longest side allowed before downsampling
    #[must_use]
    pub fn preprocess(image: DynamicImage, max_dimension: u32) -> (DynamicImage, ImageDimensions) {
        let original = ImageDimensions::new(image.width(), image.height());
        let image = Self::normalize_color_mode(image);

        if original.longest_side() <= max_dimension || max_dimension == 0 {
            return (image, original);
        }

        let ratio = f64::from(max_dimension) / f64::from(original.longest_side());
        let width = scaled_side(original.width, ratio);
        let height = scaled_side(original.height, ratio);

        tracing::debug!(
            original = %original,
            target = %ImageDimensions::new(width, height),
            "Downsampling large input"
        );

        (image.resize_exact(width, height, FilterType::Lanczos3), original)
    }

    /// Bring any decoded color mode down to 8-bit RGB or RGBA
    ///
    /// 8-bit RGB and RGBA pass through; modes carrying transparency become
    /// RGBA, everything else (gray, gray+alpha, 16-bit, float) becomes RGB.
    #[must_use]
    pub fn normalize_color_mode(image: DynamicImage) -> DynamicImage {
        match image {
            DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => image,
            DynamicImage::ImageRgba16(_) | DynamicImage::ImageRgba32F(_) => {
                DynamicImage::ImageRgba8(image.to_rgba8())
            },
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        }
    }

    /// Convert an RGB image into the model's NCHW input tensor
    ///
    /// The image is resized to the model input with Lanczos3, divided by its
    /// brightest channel value and normalized with the model mean/std.
    #[must_use]
    pub fn to_model_tensor(image: &RgbImage, config: &PreprocessingConfig) -> Array4<f32> {
        let [width, height] = config.target_size;
        let resized = image::imageops::resize(image, width, height, FilterType::Lanczos3);

        let max_value = resized
            .as_raw()
            .iter()
            .copied()
            .max()
            .map_or(1e-6, |v| f32::from(v).max(1e-6));

        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        #[allow(clippy::indexing_slicing)]
        // Safe: tensor dimensions allocated from the resized image size
        for (x, y, pixel) in resized.enumerate_pixels() {
            for channel in 0..3 {
                tensor[[0, channel, y as usize, x as usize]] = (f32::from(pixel[channel])
                    / max_value
                    - config.normalization_mean[channel])
                    / config.normalization_std[channel];
            }
        }

        tensor
    }
}

fn scaled_side(side: u32, ratio: f64) -> u32 {
    ((f64::from(side) * ratio).floor() as u32).max(1)
}
