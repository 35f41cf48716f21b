//! Background subtraction for Motion mode.
//!
//! `MotionSegmentor` keeps a running per-pixel Gaussian (mean and variance) of
//! the masks it is fed and classifies each new pixel as background, shadow or
//! foreground. Inputs must arrive in capture order; the model is rebuilt only
//! by constructing a new segmentor.

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{dilate, erode};

pub const FOREGROUND: u8 = 255;
pub const SHADOW: u8 = 127;
pub const BACKGROUND: u8 = 0;

const VAR_INIT: f32 = 15.0;
const VAR_MIN: f32 = 4.0;
const VAR_MAX: f32 = 75.0;
const SHADOW_RATIO_MIN: f32 = 0.5;
/// Segmentor output above this counts as activity (shadows included).
const ACTIVITY_THRESHOLD: u8 = 25;
/// Half-width of the square noise kernel (9x9).
const NOISE_RADIUS: u8 = 4;
const DILATE_PASSES: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentorSettings {
    /// Number of frames that make up the effective history.
    pub history: u32,
    /// Squared Mahalanobis distance above which a pixel is foreground.
    pub var_threshold: f32,
    pub detect_shadows: bool,
}

impl Default for SegmentorSettings {
    fn default() -> Self {
        Self {
            history: 200,
            var_threshold: 16.0,
            detect_shadows: true,
        }
    }
}

pub struct MotionSegmentor {
    settings: SegmentorSettings,
    width: u32,
    height: u32,
    mean: Vec<f32>,
    variance: Vec<f32>,
    frames_seen: u32,
}

impl MotionSegmentor {
    pub fn new(settings: SegmentorSettings) -> Self {
        Self {
            settings,
            width: 0,
            height: 0,
            mean: Vec::new(),
            variance: Vec::new(),
            frames_seen: 0,
        }
    }

    pub fn settings(&self) -> &SegmentorSettings {
        &self.settings
    }

    pub fn frames_seen(&self) -> u32 {
        self.frames_seen
    }

    /// Feed the next mask and return the foreground classification.
    ///
    /// The first input (or the first after a size change) seeds the model and
    /// yields an all-background mask.
    pub fn apply(&mut self, input: &GrayImage) -> GrayImage {
        let (width, height) = input.dimensions();
        let mut output = GrayImage::new(width, height);

        if self.frames_seen == 0 || width != self.width || height != self.height {
            self.seed(input);
            return output;
        }

        self.frames_seen = self.frames_seen.saturating_add(1);
        let horizon = self
            .settings
            .history
            .max(1)
            .min(self.frames_seen.saturating_mul(2));
        let alpha = 1.0 / horizon as f32;
        let threshold = self.settings.var_threshold;

        for (idx, (src, dst)) in input.pixels().zip(output.pixels_mut()).enumerate() {
            let value = f32::from(src.0[0]);
            let mean = self.mean[idx];
            let variance = self.variance[idx];
            let diff = value - mean;
            let dist2 = diff * diff;

            let class = if dist2 < threshold * variance {
                BACKGROUND
            } else if self.settings.detect_shadows && is_shadow(value, mean) {
                SHADOW
            } else {
                FOREGROUND
            };
            *dst = Luma([class]);

            self.mean[idx] = mean + alpha * diff;
            self.variance[idx] = (variance + alpha * (dist2 - variance)).clamp(VAR_MIN, VAR_MAX);
        }

        output
    }

    fn seed(&mut self, input: &GrayImage) {
        self.width = input.width();
        self.height = input.height();
        self.mean = input.pixels().map(|p| f32::from(p.0[0])).collect();
        self.variance = vec![VAR_INIT; self.mean.len()];
        self.frames_seen = 1;
    }
}

/// A darker copy of the background is a shadow, not an object.
fn is_shadow(value: f32, mean: f32) -> bool {
    if mean <= 0.0 {
        return false;
    }
    let ratio = value / mean;
    (SHADOW_RATIO_MIN..1.0).contains(&ratio)
}

/// Count of foreground pixels inside `[x0, x1) x [y0, y1)`.
pub fn foreground_pixels(mask: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32) -> usize {
    let x1 = x1.min(mask.width());
    let y1 = y1.min(mask.height());
    let mut count = 0;
    for y in y0..y1 {
        for x in x0..x1 {
            if mask.get_pixel(x, y).0[0] == FOREGROUND {
                count += 1;
            }
        }
    }
    count
}

/// Binarize a segmentor mask and strip specks smaller than the noise kernel.
///
/// Foreground and shadow both pass the threshold. One 9x9 erosion removes
/// isolated pixels, then three 9x9 dilations grow what survived.
pub fn denoise_activity(mask: &GrayImage) -> GrayImage {
    let mut binary = mask.clone();
    for pixel in binary.pixels_mut() {
        pixel.0[0] = if pixel.0[0] > ACTIVITY_THRESHOLD {
            FOREGROUND
        } else {
            BACKGROUND
        };
    }
    let mut cleaned = erode(&binary, Norm::LInf, NOISE_RADIUS);
    for _ in 0..DILATE_PASSES {
        cleaned = dilate(&cleaned, Norm::LInf, NOISE_RADIUS);
    }
    cleaned
}

/// Whether a segmentor mask shows motion once noise is removed.
pub fn has_motion(mask: &GrayImage) -> bool {
    denoise_activity(mask).pixels().any(|p| p.0[0] == FOREGROUND)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_with_block(x: u32) -> GrayImage {
        let mut mask = GrayImage::new(40, 20);
        for j in 5..15 {
            for i in x..x + 10 {
                mask.put_pixel(i, j, Luma([255]));
            }
        }
        mask
    }

    #[test]
    fn isolated_pixels_are_not_motion() {
        let mut mask = GrayImage::new(40, 40);
        mask.put_pixel(20, 20, Luma([FOREGROUND]));
        mask.put_pixel(3, 30, Luma([SHADOW]));
        assert!(!has_motion(&mask));
        assert!(denoise_activity(&mask).pixels().all(|p| p.0[0] == BACKGROUND));
    }

    #[test]
    fn solid_regions_are_motion() {
        let mut mask = GrayImage::new(40, 40);
        for y in 10..22 {
            for x in 10..22 {
                mask.put_pixel(x, y, Luma([SHADOW]));
            }
        }
        assert!(has_motion(&mask));
        let cleaned = denoise_activity(&mask);
        // Grown past the original block by the dilations.
        assert_eq!(cleaned.get_pixel(5, 15).0[0], FOREGROUND);
    }

    #[test]
    fn faint_values_are_below_the_activity_threshold() {
        let mask = GrayImage::from_pixel(30, 30, Luma([20]));
        assert!(!has_motion(&mask));
    }

    #[test]
    fn first_mask_seeds_the_model() {
        let mut segmentor = MotionSegmentor::new(SegmentorSettings::default());
        let fg = segmentor.apply(&mask_with_block(5));
        assert!(fg.pixels().all(|p| p.0[0] == BACKGROUND));
        assert_eq!(segmentor.frames_seen(), 1);
    }

    #[test]
    fn static_scene_stays_background() {
        let mut segmentor = MotionSegmentor::new(SegmentorSettings::default());
        for _ in 0..5 {
            let fg = segmentor.apply(&mask_with_block(5));
            assert_eq!(foreground_pixels(&fg, 0, 0, 40, 20), 0);
        }
    }

    #[test]
    fn moving_block_produces_foreground_at_its_edges() {
        let mut segmentor = MotionSegmentor::new(SegmentorSettings::default());
        segmentor.apply(&mask_with_block(5));
        let fg = segmentor.apply(&mask_with_block(8));

        // Newly covered columns 15..18 and uncovered columns 5..8.
        assert_eq!(foreground_pixels(&fg, 15, 5, 18, 15), 30);
        assert_eq!(foreground_pixels(&fg, 5, 5, 8, 15), 30);
        assert_eq!(foreground_pixels(&fg, 9, 5, 14, 15), 0);
    }

    #[test]
    fn darker_pixels_are_classified_as_shadow() {
        let mut segmentor = MotionSegmentor::new(SegmentorSettings::default());
        let bright = GrayImage::from_pixel(4, 4, Luma([200]));
        let dim = GrayImage::from_pixel(4, 4, Luma([150]));
        segmentor.apply(&bright);
        let fg = segmentor.apply(&dim);
        assert!(fg.pixels().all(|p| p.0[0] == SHADOW));

        let mut no_shadows = MotionSegmentor::new(SegmentorSettings {
            detect_shadows: false,
            ..SegmentorSettings::default()
        });
        no_shadows.apply(&bright);
        let fg = no_shadows.apply(&dim);
        assert!(fg.pixels().all(|p| p.0[0] == FOREGROUND));
    }
}
