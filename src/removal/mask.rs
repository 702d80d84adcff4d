//! Binary and grayscale morphology on masks

use image::{GrayImage, Luma};

/// Gaussian sigma used when smoothing a predicted mask
pub const MASK_BLUR_SIGMA: f32 = 2.0;

/// Values below this become background after smoothing
pub const MASK_THRESHOLD: u8 = 127;

/// 3x3 cross structuring element as (dx, dy) offsets
const CROSS: [(i64, i64); 5] = [(0, 0), (-1, 0), (1, 0), (0, -1), (0, 1)];

/// Clean up a predicted mask
///
/// Opening with a 3x3 cross removes speckles, a Gaussian blur (sigma 2)
/// rounds the outline and a threshold at 127 makes it binary again.
#[must_use]
pub fn post_process_mask(mask: &GrayImage) -> GrayImage {
    let opened = morph_cross(&morph_cross(mask, u8::MAX, u8::min), u8::MIN, u8::max);
    let blurred = image::imageops::blur(&opened, MASK_BLUR_SIGMA);
    threshold(&blurred, MASK_THRESHOLD)
}

/// Map values below `level` to 0 and the rest to 255
#[must_use]
pub fn threshold(mask: &GrayImage, level: u8) -> GrayImage {
    let (width, height) = mask.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        Luma([if mask.get_pixel(x, y)[0] < level { 0 } else { 255 }])
    })
}

/// Grayscale erosion or dilation with the cross element; out-of-bounds
/// neighbours are ignored.
fn morph_cross(mask: &GrayImage, init: u8, pick: fn(u8, u8) -> u8) -> GrayImage {
    let (width, height) = mask.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let value = CROSS
            .iter()
            .filter_map(|&(dx, dy)| neighbour(x, y, dx, dy, width, height))
            .map(|(nx, ny)| mask.get_pixel(nx, ny)[0])
            .fold(init, pick);
        Luma([value])
    })
}

fn neighbour(x: u32, y: u32, dx: i64, dy: i64, width: u32, height: u32) -> Option<(u32, u32)> {
    let nx = i64::from(x) + dx;
    let ny = i64::from(y) + dy;
    if nx < 0 || ny < 0 || nx >= i64::from(width) || ny >= i64::from(height) {
        None
    } else {
        Some((nx as u32, ny as u32))
    }
}

/// Boolean pixel region in row-major order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl Region {
    /// Region of pixels for which `predicate` holds
    pub fn from_fn(width: u32, height: u32, predicate: impl Fn(u32, u32) -> bool) -> Self {
        let bits = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| predicate(x, y))
            .collect();
        Self { width, height, bits }
    }

    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.bits
            .get(y as usize * self.width as usize + x as usize)
            .copied()
            .unwrap_or(false)
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    /// Binary erosion with a square element of side `size`
    ///
    /// The element is anchored at `size / 2`, so even sizes reach one pixel
    /// further up/left than down/right. `size == 0` erodes with the 3x3
    /// cross instead. With `border_set` pixels outside the image count as
    /// members of the region, otherwise as non-members.
    #[must_use]
    pub fn erode(&self, size: u32, border_set: bool) -> Self {
        let (width, height) = (self.width, self.height);

        if size == 0 {
            return Self::from_fn(width, height, |x, y| {
                CROSS.iter().all(|&(dx, dy)| match neighbour(x, y, dx, dy, width, height) {
                    Some((nx, ny)) => self.contains(nx, ny),
                    None => border_set,
                })
            });
        }

        let integral = IntegralImage::from_fn(width, height, |x, y| u32::from(self.contains(x, y)));
        let before = i64::from(size / 2);
        let side = i64::from(size);

        Self::from_fn(width, height, |x, y| {
            let x0 = i64::from(x) - before;
            let y0 = i64::from(y) - before;
            let (set, inside) = integral.window(x0, y0, x0 + side, y0 + side);
            if border_set {
                set == inside
            } else {
                side.checked_mul(side) == i64::try_from(inside).ok() && set == inside
            }
        })
    }
}

/// Summed-area table for constant-time window sums
///
/// Entries are `u32` and accumulate with wrapping arithmetic. A window sum
/// is exact whenever the true sum of that window fits in a `u32`, whatever
/// the size of the whole table.
#[derive(Debug, Clone)]
pub(crate) struct IntegralImage {
    width: u32,
    height: u32,
    sums: Vec<u32>,
}

impl IntegralImage {
    pub(crate) fn from_fn(width: u32, height: u32, value: impl Fn(u32, u32) -> u32) -> Self {
        let stride = width as usize + 1;
        let mut sums = vec![0_u32; stride * (height as usize + 1)];

        #[allow(clippy::indexing_slicing)]
        // Safe: every index stays inside the (width + 1) x (height + 1) table
        for y in 0..height as usize {
            let mut row = 0_u32;
            for x in 0..width as usize {
                row = row.wrapping_add(value(x as u32, y as u32));
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1].wrapping_add(row);
            }
        }

        Self { width, height, sums }
    }

    fn at(&self, x: i64, y: i64) -> u32 {
        let stride = self.width as usize + 1;
        self.sums
            .get(y as usize * stride + x as usize)
            .copied()
            .unwrap_or(0)
    }

    /// Sum and pixel count of the window `[x0, x1) x [y0, y1)` clipped to the image
    pub(crate) fn window(&self, x0: i64, y0: i64, x1: i64, y1: i64) -> (u64, u64) {
        let clamp_x = |v: i64| v.clamp(0, i64::from(self.width));
        let clamp_y = |v: i64| v.clamp(0, i64::from(self.height));
        let (x0, x1, y0, y1) = (clamp_x(x0), clamp_x(x1), clamp_y(y0), clamp_y(y1));
        if x1 <= x0 || y1 <= y0 {
            return (0, 0);
        }

        let sum = self
            .at(x1, y1)
            .wrapping_add(self.at(x0, y0))
            .wrapping_sub(self.at(x0, y1))
            .wrapping_sub(self.at(x1, y0));
        (u64::from(sum), ((x1 - x0) * (y1 - y0)) as u64)
    }

    /// Heap size of the table
    pub(crate) fn table_bytes(&self) -> usize {
        std::mem::size_of_val(self.sums.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opening_removes_speckles() {
        let mut mask = GrayImage::from_pixel(20, 20, Luma([0]));
        mask.put_pixel(3, 3, Luma([255]));
        for y in 8..16 {
            for x in 8..16 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }

        let cleaned = post_process_mask(&mask);
        assert_eq!(cleaned.get_pixel(3, 3)[0], 0);
        assert_eq!(cleaned.get_pixel(12, 12)[0], 255);
        assert!(cleaned.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn test_threshold_is_inclusive_at_level() {
        let mask = GrayImage::from_fn(3, 1, |x, _| Luma([[126, 127, 128][x as usize]]));
        let out = threshold(&mask, 127);
        assert_eq!(out.as_raw(), &vec![0, 255, 255]);
    }

    #[test]
    fn test_erode_square_shrinks_region() {
        let region = Region::from_fn(10, 10, |x, y| (2..8).contains(&x) && (2..8).contains(&y));
        let eroded = region.erode(3, false);
        assert!(eroded.contains(3, 3));
        assert!(!eroded.contains(2, 2));
        assert_eq!(eroded.count(), 16);
    }

    #[test]
    fn test_erode_border_handling() {
        let full = Region::from_fn(6, 6, |_, _| true);
        assert_eq!(full.erode(3, true).count(), 36);
        assert_eq!(full.erode(3, false).count(), 16);
    }

    #[test]
    fn test_erode_zero_uses_cross() {
        let region = Region::from_fn(5, 5, |x, y| (1..4).contains(&x) && (1..4).contains(&y));
        let eroded = region.erode(0, false);
        assert_eq!(eroded.count(), 1);
        assert!(eroded.contains(2, 2));
    }

    #[test]
    fn test_integral_window_clips() {
        let integral = IntegralImage::from_fn(4, 4, |_, _| 1);
        assert_eq!(integral.window(0, 0, 4, 4), (16, 16));
        assert_eq!(integral.window(-2, -2, 2, 2), (4, 4));
        assert_eq!(integral.window(5, 5, 8, 8), (0, 0));
    }

    #[test]
    fn test_integral_uses_four_byte_entries() {
        let integral = IntegralImage::from_fn(4, 3, |_, _| 1);
        assert_eq!(integral.table_bytes(), 5 * 4 * 4);
    }

    #[test]
    fn test_integral_window_exact_after_total_wraps() {
        let integral = IntegralImage::from_fn(3, 3, |_, _| 1 << 30);
        assert_eq!(integral.window(0, 0, 1, 1), (1 << 30, 1));
        assert_eq!(integral.window(1, 1, 3, 2), (1 << 31, 2));
        assert_eq!(integral.window(2, 2, 3, 3), (1 << 30, 1));
    }

    #[test]
    fn test_erode_huge_size_empties_region() {
        let region = Region::from_fn(8, 8, |_, _| true);
        assert_eq!(region.erode(u32::MAX, false).count(), 0);
        assert_eq!(region.erode(u32::MAX, true).count(), 64);
    }
}
