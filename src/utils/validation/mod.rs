//! Heuristic validation of background removal results
//!
//! A result is considered plausible when it carries an alpha channel with
//! at least two distinct values and does not make (almost) everything
//! transparent.

use crate::error::{BgRemovalError, Result};
use image::DynamicImage;

/// Alpha values below this count as "removed"
pub const NEAR_TRANSPARENT_ALPHA: u8 = 10;

/// Largest tolerated share of near-transparent pixels
pub const MAX_TRANSPARENT_RATIO: f64 = 0.95;

/// Outcome of inspecting a result image
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValidationVerdict {
    Valid,
    /// The image has no alpha channel at all
    MissingAlpha,
    /// Every pixel shares one alpha value
    UniformAlpha,
    /// Too many pixels ended up (almost) transparent
    OverRemoved { ratio: f64 },
}

impl ValidationVerdict {
    #[must_use]
    pub fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }
}

impl std::fmt::Display for ValidationVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid => write!(f, "valid"),
            Self::MissingAlpha => write!(f, "result has no alpha channel"),
            Self::UniformAlpha => write!(f, "alpha channel is uniform"),
            Self::OverRemoved { ratio } => {
                write!(f, "{:.1}% of pixels are transparent", ratio * 100.0)
            },
        }
    }
}

/// Validator for removal results
pub struct ResultValidator;

impl ResultValidator {
    /// Inspect a result image
    ///
    /// # Errors
    /// - The image has no pixels to inspect
    pub fn inspect(image: &DynamicImage) -> Result<ValidationVerdict> {
        if !image.color().has_alpha() {
            return Ok(ValidationVerdict::MissingAlpha);
        }

        let rgba = image.to_rgba8();
        let total = u64::from(rgba.width()) * u64::from(rgba.height());
        if total == 0 {
            return Err(BgRemovalError::validation_heuristic(
                "cannot inspect an empty image",
            ));
        }

        let mut seen = [false; 256];
        let mut transparent = 0_u64;
        for pixel in rgba.pixels() {
            let alpha = pixel[3];
            seen[usize::from(alpha)] = true;
            if alpha < NEAR_TRANSPARENT_ALPHA {
                transparent += 1;
            }
        }

        if seen.iter().filter(|&&s| s).count() < 2 {
            return Ok(ValidationVerdict::UniformAlpha);
        }

        let ratio = transparent as f64 / total as f64;
        if ratio > MAX_TRANSPARENT_RATIO {
            return Ok(ValidationVerdict::OverRemoved { ratio });
        }

        Ok(ValidationVerdict::Valid)
    }

    /// Whether a result looks like a successful removal
    ///
    /// Never fails: if the image cannot be inspected the result is accepted.
    #[must_use]
    pub fn is_valid(image: &DynamicImage) -> bool {
        match Self::inspect(image) {
            Ok(verdict) => {
                if !verdict.is_valid() {
                    tracing::debug!(%verdict, "Result rejected by validation heuristic");
                }
                verdict.is_valid()
            },
            Err(e) => {
                tracing::warn!("Result validation failed, accepting result: {e}");
                true
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn test_rgb_result_is_invalid() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])));
        assert_eq!(
            ResultValidator::inspect(&image).unwrap(),
            ValidationVerdict::MissingAlpha
        );
        assert!(!ResultValidator::is_valid(&image));
    }

    #[test]
    fn test_uniform_opaque_alpha_is_invalid() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([5, 5, 5, 255])));
        assert_eq!(
            ResultValidator::inspect(&image).unwrap(),
            ValidationVerdict::UniformAlpha
        );
        assert!(!ResultValidator::is_valid(&image));
    }

    #[test]
    fn test_mostly_transparent_is_invalid() {
        // 97 of 100 pixels transparent
        let image = DynamicImage::ImageRgba8(RgbaImage::from_fn(10, 10, |x, y| {
            if y == 0 && x < 3 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        }));
        assert!(matches!(
            ResultValidator::inspect(&image).unwrap(),
            ValidationVerdict::OverRemoved { .. }
        ));
        assert!(!ResultValidator::is_valid(&image));
    }

    #[test]
    fn test_bimodal_alpha_is_valid() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_fn(10, 10, |x, _| {
            Rgba([0, 0, 0, if x < 5 { 0 } else { 255 }])
        }));
        assert!(ResultValidator::is_valid(&image));
    }

    #[test]
    fn test_empty_image_fails_open() {
        let image = DynamicImage::ImageRgba8(RgbaImage::new(0, 0));
        assert!(ResultValidator::inspect(&image).is_err());
        assert!(ResultValidator::is_valid(&image));
    }
}
