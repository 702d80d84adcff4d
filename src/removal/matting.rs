//! Trimap-based alpha matting
//!
//! Pixels the mask is confident about are fixed to 0 or 255. For the band in
//! between, alpha comes from projecting the pixel colour onto the line
//! between the mean local foreground and background colours.

use super::mask::{IntegralImage, Region};
use crate::types::MattingOptions;
use image::{GrayImage, Luma, RgbImage};

/// Trimap value of the unknown band
pub const TRIMAP_UNKNOWN: u8 = 128;

/// Extra search radius around the eroded band when sampling colours
const SAMPLE_MARGIN: u32 = 10;

/// Squared colour distance below which F and B are treated as equal
const MIN_COLOR_SEPARATION: f64 = 1.0;

/// Build the trimap for `mask`: 255 certain foreground, 0 certain background,
/// [`TRIMAP_UNKNOWN`] elsewhere
#[must_use]
pub fn build_trimap(mask: &GrayImage, options: &MattingOptions) -> GrayImage {
    let (width, height) = mask.dimensions();
    let value = |x, y| mask.get_pixel(x, y)[0];

    let foreground = Region::from_fn(width, height, |x, y| value(x, y) > options.foreground_threshold)
        .erode(options.erode_size, false);
    let background = Region::from_fn(width, height, |x, y| value(x, y) < options.background_threshold)
        .erode(options.erode_size, true);

    GrayImage::from_fn(width, height, |x, y| {
        if background.contains(x, y) {
            Luma([0])
        } else if foreground.contains(x, y) {
            Luma([255])
        } else {
            Luma([TRIMAP_UNKNOWN])
        }
    })
}

/// Estimate a matte for `image` given its soft `mask`
#[must_use]
pub fn alpha_matte(image: &RgbImage, mask: &GrayImage, options: &MattingOptions) -> GrayImage {
    let trimap = build_trimap(mask, options);
    estimate_alpha(image, mask, &trimap, options.erode_size.saturating_add(SAMPLE_MARGIN))
}

/// Fill the unknown band of `trimap` with alpha estimates
///
/// Local means are taken over a `(2 * radius + 1)` square window. When a
/// window holds no foreground or no background sample, or both means are
/// (almost) the same colour, the soft mask value is used. The sampling
/// tables only span [`sample_area`].
#[must_use]
pub fn estimate_alpha(image: &RgbImage, mask: &GrayImage, trimap: &GrayImage, radius: u32) -> GrayImage {
    let Some((left, top, area_width, area_height)) = sample_area(trimap, radius) else {
        return trimap.clone();
    };
    let (width, height) = trimap.dimensions();
    let known = |level: u8| {
        let is_level = |x: u32, y: u32| trimap.get_pixel(x + left, y + top)[0] == level;
        let count = IntegralImage::from_fn(area_width, area_height, |x, y| u32::from(is_level(x, y)));
        let channels = [0, 1, 2].map(|c| {
            IntegralImage::from_fn(area_width, area_height, |x, y| {
                if is_level(x, y) {
                    u32::from(image.get_pixel(x + left, y + top)[c])
                } else {
                    0
                }
            })
        });
        (count, channels)
    };
    let (fg_count, fg_sums) = known(255);
    let (bg_count, bg_sums) = known(0);
    tracing::debug!(
        area = %format!("{area_width}x{area_height}"),
        table_bytes = fg_count.table_bytes() * 8,
        "Matting sample tables built"
    );

    let radius = i64::from(radius);
    let (left, top) = (i64::from(left), i64::from(top));
    let mean = |count: &IntegralImage, sums: &[IntegralImage; 3], x0: i64, y0: i64, x1: i64, y1: i64| {
        let (n, _) = count.window(x0, y0, x1, y1);
        if n == 0 {
            return None;
        }
        let [r, g, b] = sums;
        Some([r, g, b].map(|s| s.window(x0, y0, x1, y1).0 as f64 / n as f64))
    };

    GrayImage::from_fn(width, height, |x, y| {
        let level = trimap.get_pixel(x, y)[0];
        if level != TRIMAP_UNKNOWN {
            return Luma([level]);
        }

        let soft = mask.get_pixel(x, y)[0];
        let (x0, y0) = (i64::from(x) - left - radius, i64::from(y) - top - radius);
        let (x1, y1) = (x0 + 2 * radius + 1, y0 + 2 * radius + 1);

        let (Some(fg), Some(bg)) = (
            mean(&fg_count, &fg_sums, x0, y0, x1, y1),
            mean(&bg_count, &bg_sums, x0, y0, x1, y1),
        ) else {
            return Luma([soft]);
        };

        let pixel = image.get_pixel(x, y);
        let mut along = 0.0;
        let mut separation = 0.0;
        for c in 0..3 {
            let diff = fg[c] - bg[c];
            along += (f64::from(pixel[c]) - bg[c]) * diff;
            separation += diff * diff;
        }

        if separation < MIN_COLOR_SEPARATION {
            return Luma([soft]);
        }

        let alpha = (along / separation).clamp(0.0, 1.0);
        Luma([(alpha * 255.0).round() as u8])
    })
}

/// Rectangle `(x, y, width, height)` holding every window an unknown pixel
/// samples, or `None` when the trimap has no unknown pixels
#[must_use]
pub fn sample_area(trimap: &GrayImage, radius: u32) -> Option<(u32, u32, u32, u32)> {
    let (width, height) = trimap.dimensions();
    let (x0, y0, x1, y1) = trimap
        .enumerate_pixels()
        .filter(|(_, _, p)| p[0] == TRIMAP_UNKNOWN)
        .fold(None, |bounds, (x, y, _)| {
            Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x.min(x0), y.min(y0), x.max(x1), y.max(y1)),
            })
        })?;

    let left = x0.saturating_sub(radius);
    let top = y0.saturating_sub(radius);
    let right = x1.saturating_add(radius).saturating_add(1).min(width);
    let bottom = y1.saturating_add(radius).saturating_add(1).min(height);
    Some((left, top, right - left, bottom - top))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn options(erode_size: u32) -> MattingOptions {
        MattingOptions {
            alpha_matting: true,
            foreground_threshold: 240,
            background_threshold: 10,
            erode_size,
            post_process_mask: false,
        }
    }

    /// Left half white foreground, right half black background, a soft
    /// mask ramp across the middle columns
    fn scene() -> (RgbImage, GrayImage) {
        let image = RgbImage::from_fn(40, 10, |x, _| {
            if x < 20 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let mask = GrayImage::from_fn(40, 10, |x, _| match x {
            0..=15 => Luma([255]),
            16..=23 => Luma([128]),
            _ => Luma([0]),
        });
        (image, mask)
    }

    #[test]
    fn test_trimap_regions() {
        let (_, mask) = scene();
        let trimap = build_trimap(&mask, &options(3));

        assert_eq!(trimap.get_pixel(5, 5)[0], 255);
        assert_eq!(trimap.get_pixel(35, 5)[0], 0);
        assert_eq!(trimap.get_pixel(20, 5)[0], TRIMAP_UNKNOWN);
        // Foreground erosion does not treat the border as set
        assert_eq!(trimap.get_pixel(0, 0)[0], TRIMAP_UNKNOWN);
        // Background erosion does
        assert_eq!(trimap.get_pixel(39, 0)[0], 0);
    }

    #[test]
    fn test_unknown_band_follows_colour() {
        let (image, mask) = scene();
        let matte = alpha_matte(&image, &mask, &options(3));

        assert_eq!(matte.get_pixel(17, 5)[0], 255);
        assert_eq!(matte.get_pixel(22, 5)[0], 0);
        assert_eq!(matte.get_pixel(5, 5)[0], 255);
        assert_eq!(matte.get_pixel(35, 5)[0], 0);
    }

    #[test]
    fn test_falls_back_to_soft_mask_without_samples() {
        let image = RgbImage::from_pixel(6, 6, Rgb([90, 90, 90]));
        let mask = GrayImage::from_pixel(6, 6, Luma([128]));
        let matte = alpha_matte(&image, &mask, &options(2));
        assert!(matte.pixels().all(|p| p[0] == 128));
    }

    #[test]
    fn test_sample_area_spans_band_only() {
        let mut trimap = GrayImage::from_pixel(400, 300, Luma([0]));
        trimap.put_pixel(200, 100, Luma([TRIMAP_UNKNOWN]));
        trimap.put_pixel(203, 102, Luma([TRIMAP_UNKNOWN]));
        assert_eq!(sample_area(&trimap, 5), Some((195, 95, 14, 13)));

        trimap.put_pixel(0, 299, Luma([TRIMAP_UNKNOWN]));
        assert_eq!(sample_area(&trimap, 5), Some((0, 95, 209, 205)));

        assert_eq!(sample_area(&GrayImage::from_pixel(8, 8, Luma([255])), 5), None);
    }

    #[test]
    fn test_matte_in_small_band_of_large_image() {
        let image = RgbImage::from_fn(300, 200, |x, _| {
            if x < 150 {
                Rgb([240, 240, 240])
            } else {
                Rgb([10, 10, 10])
            }
        });
        let mut trimap = GrayImage::from_fn(300, 200, |x, _| if x < 150 { Luma([255]) } else { Luma([0]) });
        trimap.put_pixel(149, 100, Luma([TRIMAP_UNKNOWN]));
        trimap.put_pixel(150, 100, Luma([TRIMAP_UNKNOWN]));
        let mask = GrayImage::from_pixel(300, 200, Luma([128]));

        let matte = estimate_alpha(&image, &mask, &trimap, 4);
        assert_eq!(matte.get_pixel(149, 100)[0], 255);
        assert_eq!(matte.get_pixel(150, 100)[0], 0);
        assert_eq!(matte.get_pixel(0, 0)[0], 255);
        assert_eq!(matte.get_pixel(299, 199)[0], 0);
    }

    #[test]
    fn test_huge_erode_size_does_not_overflow() {
        let image = RgbImage::from_pixel(8, 8, Rgb([40, 40, 40]));
        let mask = GrayImage::from_fn(8, 8, |x, _| if x < 4 { Luma([255]) } else { Luma([0]) });
        let matte = alpha_matte(&image, &mask, &options(u32::MAX));
        assert_eq!(matte.dimensions(), (8, 8));
    }
}
