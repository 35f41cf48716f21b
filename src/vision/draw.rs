//! Frame overlays.

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
    draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use std::path::Path;

use crate::frame::{BoundingBox, Point};
use crate::trajectory::TrajectoryBuffer;

pub const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const TRAJECTORY_COLOR: Rgb<u8> = Rgb([0, 255, 255]);
const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

const CENTER_RADIUS: i32 = 5;
const LABEL_SCALE: f32 = 16.0;
const LABEL_PAD: u32 = 2;
const LABEL_STRIP_HEIGHT: u32 = 14;

/// Per-class colors, indexed by `class_id % PALETTE.len()`.
pub const PALETTE: [Rgb<u8>; 10] = [
    Rgb([255, 64, 64]),
    Rgb([64, 255, 64]),
    Rgb([64, 64, 255]),
    Rgb([255, 255, 64]),
    Rgb([255, 64, 255]),
    Rgb([64, 255, 255]),
    Rgb([255, 128, 0]),
    Rgb([128, 0, 255]),
    Rgb([255, 128, 192]),
    Rgb([128, 255, 128]),
];

pub fn class_color(class_id: usize) -> Rgb<u8> {
    PALETTE[class_id % PALETTE.len()]
}

const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Font used for detection labels.
///
/// Without a usable font, labels degrade to an empty colored strip.
#[derive(Default)]
pub struct LabelFont {
    font: Option<FontVec>,
}

impl LabelFont {
    /// Load `path` if given, otherwise the first readable well-known system font.
    pub fn load(path: Option<&Path>) -> Self {
        if let Some(path) = path {
            match read_font(path) {
                Some(font) => return Self { font: Some(font) },
                None => log::warn!("LabelFont: cannot use {}", path.display()),
            }
        }
        for candidate in SYSTEM_FONT_CANDIDATES {
            if let Some(font) = read_font(Path::new(candidate)) {
                log::debug!("LabelFont: using {}", candidate);
                return Self { font: Some(font) };
            }
        }
        log::warn!("LabelFont: no font found, labels will be drawn without text");
        Self::default()
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_available(&self) -> bool {
        self.font.is_some()
    }
}

fn read_font(path: &Path) -> Option<FontVec> {
    let bytes = std::fs::read(path).ok()?;
    FontVec::try_from_vec(bytes).ok()
}

fn rect_of(bbox: &BoundingBox, image: &RgbImage) -> Option<Rect> {
    bbox.clamp_to(image.width(), image.height())?.to_rect()
}

/// One-pixel hollow rectangle.
pub fn draw_box(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    draw_box_thick(image, bbox, color, 1);
}

pub fn draw_box_thick(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>, thickness: u32) {
    for inset in 0..thickness as i32 {
        let inner = BoundingBox::from_corners(
            Point::new(bbox.top_left.x + inset, bbox.top_left.y + inset),
            Point::new(bbox.bottom_right.x - inset, bbox.bottom_right.y - inset),
        );
        match rect_of(&inner, image) {
            Some(rect) => draw_hollow_rect_mut(image, rect, color),
            None => break,
        }
    }
}

/// Polyline through the trajectory plus a filled dot on the newest point.
pub fn draw_trajectory(image: &mut RgbImage, trajectory: &TrajectoryBuffer) {
    let points: Vec<_> = trajectory.iter().copied().collect();
    for pair in points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        for offset in [0.0f32, 1.0] {
            draw_line_segment_mut(
                image,
                (a.x as f32 + offset, a.y as f32),
                (b.x as f32 + offset, b.y as f32),
                TRAJECTORY_COLOR,
            );
            draw_line_segment_mut(
                image,
                (a.x as f32, a.y as f32 + offset),
                (b.x as f32, b.y as f32 + offset),
                TRAJECTORY_COLOR,
            );
        }
    }
    if let Some(last) = trajectory.last() {
        draw_filled_circle_mut(image, (last.x, last.y), CENTER_RADIUS, TRAJECTORY_COLOR);
    }
}

/// Tracked-object overlay: box, trajectory, centre dot.
pub fn draw_track(image: &mut RgbImage, bbox: &BoundingBox, trajectory: &TrajectoryBuffer) {
    draw_trajectory(image, trajectory);
    draw_box(image, bbox, BOX_COLOR);
}

/// Detection overlay: colored box and a filled label strip holding `label`.
pub fn draw_detection(
    image: &mut RgbImage,
    bbox: &BoundingBox,
    label: &str,
    color: Rgb<u8>,
    font: &LabelFont,
) {
    draw_box_thick(image, bbox, color, 2);

    let (strip_w, strip_h) = match &font.font {
        Some(f) => {
            let (w, h) = text_size(PxScale::from(LABEL_SCALE), f, label);
            (w + 2 * LABEL_PAD, h + 2 * LABEL_PAD)
        }
        None => (bbox.width().max(1) as u32, LABEL_STRIP_HEIGHT),
    };
    let strip_y = if bbox.y() >= strip_h as i32 {
        bbox.y() - strip_h as i32
    } else {
        bbox.y()
    };
    draw_filled_rect_mut(
        image,
        Rect::at(bbox.x(), strip_y).of_size(strip_w.max(1), strip_h.max(1)),
        color,
    );

    if let Some(f) = &font.font {
        draw_text_mut(
            image,
            LABEL_TEXT_COLOR,
            bbox.x() + LABEL_PAD as i32,
            strip_y + LABEL_PAD as i32,
            PxScale::from(LABEL_SCALE),
            f,
            label,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_outline_is_drawn_on_the_border_only() {
        let mut image = RgbImage::new(20, 20);
        draw_box(&mut image, &BoundingBox::from_xywh(5, 5, 10, 10), BOX_COLOR);
        assert_eq!(*image.get_pixel(5, 5), BOX_COLOR);
        assert_eq!(*image.get_pixel(14, 14), BOX_COLOR);
        assert_eq!(*image.get_pixel(10, 10), Rgb([0, 0, 0]));
    }

    #[test]
    fn boxes_outside_the_frame_are_ignored() {
        let mut image = RgbImage::new(10, 10);
        draw_box(&mut image, &BoundingBox::from_xywh(50, 50, 5, 5), BOX_COLOR);
        assert!(image.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn trajectory_marks_the_latest_point() {
        let mut image = RgbImage::new(40, 40);
        let mut trajectory = TrajectoryBuffer::new();
        trajectory.push(Point::new(5, 5));
        trajectory.push(Point::new(30, 20));
        draw_trajectory(&mut image, &trajectory);
        assert_eq!(*image.get_pixel(30, 20), TRAJECTORY_COLOR);
        assert_eq!(*image.get_pixel(5, 5), TRAJECTORY_COLOR);
    }

    #[test]
    fn detection_without_font_still_draws_a_strip() {
        let mut image = RgbImage::new(50, 50);
        let color = class_color(12);
        assert_eq!(color, PALETTE[2]);
        draw_detection(
            &mut image,
            &BoundingBox::from_xywh(10, 20, 20, 20),
            "person",
            color,
            &LabelFont::none(),
        );
        assert_eq!(*image.get_pixel(15, 10), color);
    }
}
