//! Postprocessing of model predictions and removal results

use crate::{
    error::{BgRemovalError, Result},
    types::ImageDimensions,
};
use image::{imageops::FilterType, DynamicImage, GrayImage};
use ndarray::{ArrayViewD, Axis, Ix2};

/// Sigma of the alpha edge smoothing applied by [`ImagePostprocessor::postprocess`]
pub const EDGE_SMOOTHING_SIGMA: f32 = 0.5;

/// Shared postprocessing utilities
pub struct ImagePostprocessor;

impl ImagePostprocessor {
    /// Restore the original size and optionally smooth the alpha edge
    ///
    /// Color channels are never blurred; only alpha is, and only when the
    /// image carries one.
    #[must_use]
    pub fn postprocess(image: DynamicImage, original: ImageDimensions, refine: bool) -> DynamicImage {
        let image = if (image.width(), image.height()) == (original.width, original.height) {
            image
        } else {
            tracing::debug!(
                from = %ImageDimensions::new(image.width(), image.height()),
                to = %original,
                "Restoring original size"
            );
            image.resize_exact(original.width, original.height, FilterType::Lanczos3)
        };

        if !refine || !image.color().has_alpha() {
            return image;
        }

        let mut rgba = image.into_rgba8();
        let alpha = GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
            image::Luma([rgba.get_pixel(x, y)[3]])
        });
        let smoothed = image::imageops::blur(&alpha, EDGE_SMOOTHING_SIGMA);

        for (pixel, value) in rgba.pixels_mut().zip(smoothed.pixels()) {
            pixel[3] = value[0];
        }

        DynamicImage::ImageRgba8(rgba)
    }

    /// Turn a raw model output into an 8-bit mask of `width` x `height`
    ///
    /// Leading axes are indexed at 0 until a single plane remains (batch 0,
    /// channel 0). The plane is min-max normalized to 0-255 and resized with
    /// Lanczos3.
    ///
    /// # Errors
    /// - Output with fewer than two dimensions or an empty axis
    pub fn mask_from_prediction(
        prediction: ArrayViewD<'_, f32>,
        width: u32,
        height: u32,
    ) -> Result<GrayImage> {
        let mut plane = prediction;
        while plane.ndim() > 2 {
            if plane.len_of(Axis(0)) == 0 {
                return Err(BgRemovalError::inference(format!(
                    "Model output has an empty axis: {:?}",
                    plane.shape()
                )));
            }
            plane = plane.index_axis_move(Axis(0), 0);
        }

        let plane = plane.into_dimensionality::<Ix2>().map_err(|e| {
            BgRemovalError::inference(format!("Expected at least a 2D model output: {e}"))
        })?;
        let (rows, cols) = plane.dim();
        if rows == 0 || cols == 0 {
            return Err(BgRemovalError::inference("Model output plane is empty"));
        }

        let (min, max) = plane
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let range = max - min;

        let pixels: Vec<u8> = plane
            .iter()
            .map(|&v| {
                if range > f32::EPSILON {
                    ((v - min) / range * 255.0) as u8
                } else {
                    0
                }
            })
            .collect();

        let mask = GrayImage::from_raw(cols as u32, rows as u32, pixels)
            .ok_or_else(|| BgRemovalError::internal("Mask buffer size mismatch"))?;

        if (mask.width(), mask.height()) == (width, height) {
            return Ok(mask);
        }
        Ok(image::imageops::resize(&mask, width, height, FilterType::Lanczos3))
    }
}
