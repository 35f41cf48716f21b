//! Aspect-preserving resize onto a square model canvas.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use crate::frame::{BoundingBox, Point};

/// Canvas fill for the area not covered by the resized frame.
pub const PAD_VALUE: u8 = 114;

/// A frame resized into a `size x size` canvas, anchored at the top-left.
pub struct Letterbox {
    pub image: RgbImage,
    /// Frame-to-canvas scale factor.
    pub ratio: f32,
    source_width: u32,
    source_height: u32,
}

impl Letterbox {
    pub fn new(frame: &RgbImage, size: u32) -> Self {
        let (w0, h0) = frame.dimensions();
        let size = size.max(1);
        let ratio = (size as f32 / w0.max(1) as f32).min(size as f32 / h0.max(1) as f32);
        let w1 = ((w0 as f32 * ratio).round() as u32).clamp(1, size);
        let h1 = ((h0 as f32 * ratio).round() as u32).clamp(1, size);

        let mut image = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
        if (w1, h1) == (w0, h0) {
            imageops::replace(&mut image, frame, 0, 0);
        } else {
            let resized = imageops::resize(frame, w1, h1, FilterType::Triangle);
            imageops::replace(&mut image, &resized, 0, 0);
        }

        Self {
            image,
            ratio,
            source_width: w0,
            source_height: h0,
        }
    }

    /// Planar `1 x 3 x S x S` tensor data scaled to `[0, 1]`.
    pub fn to_tensor(&self) -> Vec<f32> {
        let (w, h) = self.image.dimensions();
        let plane = (w * h) as usize;
        let mut data = vec![0f32; plane * 3];
        for (x, y, px) in self.image.enumerate_pixels() {
            let idx = (y * w + x) as usize;
            for c in 0..3 {
                data[c * plane + idx] = f32::from(px.0[c]) / 255.0;
            }
        }
        data
    }

    /// Map a canvas-space `(cx, cy, w, h)` box back onto the source frame.
    pub fn restore(&self, cx: f32, cy: f32, w: f32, h: f32) -> Option<BoundingBox> {
        if self.ratio <= 0.0 {
            return None;
        }
        let cx = cx / self.ratio;
        let cy = cy / self.ratio;
        let w = w / self.ratio;
        let h = h / self.ratio;
        let x0 = (cx - w / 2.0).round() as i32;
        let y0 = (cy - h / 2.0).round() as i32;
        let x1 = (cx + w / 2.0).round() as i32;
        let y1 = (cy + h / 2.0).round() as i32;
        BoundingBox::from_corners(Point::new(x0, y0), Point::new(x1, y1))
            .clamp_to(self.source_width, self.source_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_frames_are_padded_below() {
        let frame = RgbImage::from_pixel(200, 100, Rgb([10, 20, 30]));
        let lb = Letterbox::new(&frame, 100);
        assert!((lb.ratio - 0.5).abs() < 1e-6);
        assert_eq!(lb.image.dimensions(), (100, 100));
        assert_eq!(lb.image.get_pixel(10, 10).0, [10, 20, 30]);
        assert_eq!(lb.image.get_pixel(10, 80).0, [PAD_VALUE; 3]);
    }

    #[test]
    fn restore_undoes_the_scale() {
        let frame = RgbImage::new(200, 100);
        let lb = Letterbox::new(&frame, 100);
        let bbox = lb.restore(25.0, 25.0, 10.0, 10.0).unwrap();
        assert_eq!(bbox, BoundingBox::from_xywh(40, 40, 20, 20));
    }

    #[test]
    fn tensor_is_planar() {
        let frame = RgbImage::from_pixel(2, 2, Rgb([255, 0, 51]));
        let data = Letterbox::new(&frame, 2).to_tensor();
        assert_eq!(data.len(), 12);
        assert!(data[..4].iter().all(|&v| v == 1.0));
        assert!(data[4..8].iter().all(|&v| v == 0.0));
        assert!(data[8..].iter().all(|&v| (v - 0.2).abs() < 1e-6));
    }
}
