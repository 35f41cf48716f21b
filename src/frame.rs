//! Frame and geometry primitives.
//!
//! - `Frame`: one captured RGB image plus capture metadata. Lives for one loop iteration.
//! - `BoundingBox`: axis-aligned box held as a top-left / bottom-right point pair.
//! - `Point`: integer pixel coordinate.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// RGB frames only. Sources normalize native layouts before handing frames out.
pub const FRAME_CHANNELS: u8 = 3;

/// A captured frame.
///
/// Pixel data is always 8-bit RGB, row-major, no padding.
#[derive(Clone, Debug)]
pub struct Frame {
    pub image: RgbImage,
    /// Monotonic capture instant.
    pub captured_at: Instant,
    /// Sequence number assigned by the source, starting at 0.
    pub index: u64,
}

impl Frame {
    pub fn new(image: RgbImage, index: u64) -> Self {
        Self {
            image,
            captured_at: Instant::now(),
            index,
        }
    }

    /// Build a frame from a packed RGB24 buffer.
    ///
    /// Returns `None` when the buffer length does not match `width * height * 3`.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32, index: u64) -> Option<Self> {
        RgbImage::from_raw(width, height, pixels).map(|image| Self::new(image, index))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn channels(&self) -> u8 {
        FRAME_CHANNELS
    }

    /// Raw interleaved RGB bytes.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box. `bottom_right` is exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top_left: Point,
    pub bottom_right: Point,
}

impl BoundingBox {
    /// Build a box from two corners in any order.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            top_left: Point::new(a.x.min(b.x), a.y.min(b.y)),
            bottom_right: Point::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// Build a box from an origin and a size.
    pub fn from_xywh(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::from_corners(Point::new(x, y), Point::new(x + width, y + height))
    }

    pub fn x(&self) -> i32 {
        self.top_left.x
    }

    pub fn y(&self) -> i32 {
        self.top_left.y
    }

    pub fn width(&self) -> i32 {
        self.bottom_right.x - self.top_left.x
    }

    pub fn height(&self) -> i32 {
        self.bottom_right.y - self.top_left.y
    }

    pub fn area(&self) -> i64 {
        i64::from(self.width().max(0)) * i64::from(self.height().max(0))
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Integer centroid.
    pub fn center(&self) -> Point {
        Point::new(
            self.top_left.x + self.width() / 2,
            self.top_left.y + self.height() / 2,
        )
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        Self {
            top_left: Point::new(self.top_left.x + dx, self.top_left.y + dy),
            bottom_right: Point::new(self.bottom_right.x + dx, self.bottom_right.y + dy),
        }
    }

    /// Intersect with a `width` x `height` image. `None` when nothing is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        let max_x = i32::try_from(width).ok()?;
        let max_y = i32::try_from(height).ok()?;
        let clamped = Self {
            top_left: Point::new(self.top_left.x.clamp(0, max_x), self.top_left.y.clamp(0, max_y)),
            bottom_right: Point::new(
                self.bottom_right.x.clamp(0, max_x),
                self.bottom_right.y.clamp(0, max_y),
            ),
        };
        if clamped.is_empty() {
            None
        } else {
            Some(clamped)
        }
    }

    /// Intersection-over-union with another box.
    pub fn iou(&self, other: &Self) -> f32 {
        let ix0 = self.top_left.x.max(other.top_left.x);
        let iy0 = self.top_left.y.max(other.top_left.y);
        let ix1 = self.bottom_right.x.min(other.bottom_right.x);
        let iy1 = self.bottom_right.y.min(other.bottom_right.y);
        let inter = i64::from((ix1 - ix0).max(0)) * i64::from((iy1 - iy0).max(0));
        let union = self.area() + other.area() - inter;
        if union <= 0 {
            0.0
        } else {
            inter as f32 / union as f32
        }
    }

    pub fn to_rect(&self) -> Option<imageproc::rect::Rect> {
        if self.is_empty() {
            return None;
        }
        Some(
            imageproc::rect::Rect::at(self.top_left.x, self.top_left.y)
                .of_size(self.width() as u32, self.height() as u32),
        )
    }
}
