//! Color-space conversion and thresholding.
//!
//! HSV follows the 8-bit camera convention: hue in `0..=179` (degrees / 2),
//! saturation and value in `0..=255`. HSV images are carried in `RgbImage`
//! buffers with channels `[H, S, V]`.

use image::{GrayImage, Luma, RgbImage};
use serde::Serialize;

pub const HUE_MAX: u8 = 179;

/// Inclusive lower/upper bounds for an HSV range mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct HsvBounds {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvBounds {
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|c| hsv[c] >= self.lower[c] && hsv[c] <= self.upper[c])
    }
}

pub fn rgb_to_hsv(image: &RgbImage) -> RgbImage {
    let mut out = RgbImage::new(image.width(), image.height());
    for (src, dst) in image.pixels().zip(out.pixels_mut()) {
        dst.0 = hsv_pixel(src.0);
    }
    out
}

fn hsv_pixel([r, g, b]: [u8; 3]) -> [u8; 3] {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = f32::from(max - min);

    let v = max;
    let s = if max == 0 {
        0
    } else {
        (255.0 * delta / f32::from(max)).round() as u8
    };

    if delta == 0.0 {
        return [0, s, v];
    }

    let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
    let mut hue = if max as f32 == r {
        60.0 * (g - b) / delta
    } else if max as f32 == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if hue < 0.0 {
        hue += 360.0;
    }
    let h = (hue / 2.0).round() as u32 % (u32::from(HUE_MAX) + 1);
    [h as u8, s, v]
}

/// 255 where every channel lies within `bounds`, 0 elsewhere.
pub fn in_range(image: &RgbImage, bounds: &HsvBounds) -> GrayImage {
    let mut mask = GrayImage::new(image.width(), image.height());
    for (src, dst) in image.pixels().zip(mask.pixels_mut()) {
        *dst = Luma([if bounds.contains(src.0) { 255 } else { 0 }]);
    }
    mask
}

pub fn grayscale(image: &RgbImage) -> GrayImage {
    image::imageops::grayscale(image)
}

/// 255 where `min <= value <= max`, 0 elsewhere.
pub fn threshold_range(gray: &GrayImage, min: u8, max: u8) -> GrayImage {
    let mut mask = GrayImage::new(gray.width(), gray.height());
    for (src, dst) in gray.pixels().zip(mask.pixels_mut()) {
        let value = src.0[0];
        *dst = Luma([if value >= min && value <= max { 255 } else { 0 }]);
    }
    mask
}

/// Per-channel median over a `(2r+1)` square window. Radius 0 is a copy.
pub fn median_blur(image: &RgbImage, radius: u32) -> RgbImage {
    if radius == 0 {
        return image.clone();
    }
    imageproc::filter::median_filter(image, radius, radius)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn primary_colors_map_to_expected_hues() {
        assert_eq!(hsv_pixel([255, 0, 0]), [0, 255, 255]);
        assert_eq!(hsv_pixel([0, 255, 0]), [60, 255, 255]);
        assert_eq!(hsv_pixel([0, 0, 255]), [120, 255, 255]);
        assert_eq!(hsv_pixel([0, 0, 0]), [0, 0, 0]);
        assert_eq!(hsv_pixel([200, 200, 200]), [0, 0, 200]);
    }

    #[test]
    fn in_range_is_inclusive() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, Rgb([10, 20, 30]));
        image.put_pixel(1, 0, Rgb([11, 20, 30]));
        let bounds = HsvBounds {
            lower: [0, 20, 30],
            upper: [10, 20, 30],
        };
        let mask = in_range(&image, &bounds);
        assert_eq!(mask.get_pixel(0, 0).0[0], 255);
        assert_eq!(mask.get_pixel(1, 0).0[0], 0);
    }

    #[test]
    fn threshold_range_keeps_only_the_band() {
        let gray = GrayImage::from_raw(4, 1, vec![0, 100, 200, 255]).unwrap();
        let mask = threshold_range(&gray, 100, 200);
        assert_eq!(mask.into_raw(), vec![0, 255, 255, 0]);
    }
}
