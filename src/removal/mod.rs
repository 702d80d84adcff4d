//! The removal primitive: mask prediction, refinement and cutout

pub mod mask;
pub mod matting;

use crate::{error::Result, inference::SegmentationSession, types::MattingOptions};
use image::{DynamicImage, GrayImage, RgbaImage};

pub use mask::post_process_mask;
pub use matting::{alpha_matte, build_trimap};

/// Remove the background of `image` with `session`
///
/// The returned image is always RGBA at the input size.
///
/// # Errors
/// - Mask prediction failures from the session
pub fn remove_background(
    session: &dyn SegmentationSession,
    image: &DynamicImage,
    options: &MattingOptions,
) -> Result<DynamicImage> {
    let rgb = image.to_rgb8();
    let mut mask = session.predict_mask(&rgb)?;

    if options.post_process_mask {
        mask = post_process_mask(&mask);
    }

    let alpha = if options.alpha_matting {
        alpha_matte(&rgb, &mask, options)
    } else {
        mask
    };

    Ok(DynamicImage::ImageRgba8(cutout(image, &alpha)))
}

/// Apply `alpha` to `image`
///
/// Existing transparency is kept by multiplying it with `alpha`. Pixels that
/// end up fully transparent are zeroed.
#[must_use]
pub fn cutout(image: &DynamicImage, alpha: &GrayImage) -> RgbaImage {
    let mut rgba = image.to_rgba8();
    for (pixel, a) in rgba.pixels_mut().zip(alpha.pixels()) {
        let combined = (u16::from(pixel[3]) * u16::from(a[0]) / 255) as u8;
        if combined == 0 {
            pixel.0 = [0, 0, 0, 0];
        } else {
            pixel[3] = combined;
        }
    }
    rgba
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockSession;
    use image::{Luma, Rgb, RgbImage, Rgba};

    #[test]
    fn test_cutout_applies_mask_and_zeroes_transparent() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 1, Rgb([10, 20, 30])));
        let alpha = GrayImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 0 } else { 200 }]));

        let out = cutout(&image, &alpha);
        assert_eq!(out.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
        assert_eq!(out.get_pixel(1, 0), &Rgba([10, 20, 30, 200]));
    }

    #[test]
    fn test_cutout_keeps_existing_transparency() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([1, 2, 3, 128])));
        let alpha = GrayImage::from_pixel(1, 1, Luma([255]));
        assert_eq!(cutout(&image, &alpha).get_pixel(0, 0)[3], 128);
    }

    #[test]
    fn test_remove_background_without_refinement_uses_raw_mask() {
        let session = MockSession::new("u2netp");
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(30, 30, Rgb([200, 100, 50])));
        let options = MattingOptions {
            alpha_matting: false,
            post_process_mask: false,
            ..MattingOptions::default()
        };

        let result = remove_background(&session, &image, &options).unwrap().into_rgba8();
        assert_eq!(result.dimensions(), (30, 30));
        assert_eq!(result.get_pixel(15, 15)[3], 255);
        assert_eq!(result.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
        assert_eq!(session.calls(), 1);
    }

    #[test]
    fn test_remove_background_with_defaults_is_rgba() {
        let session = MockSession::new("isnet-general-use");
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 24, Rgb([9, 9, 9])));

        let result = remove_background(&session, &image, &MattingOptions::default()).unwrap();
        assert!(matches!(result, DynamicImage::ImageRgba8(_)));
        assert_eq!((result.width(), result.height()), (40, 24));
    }
}
