use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::template_matching::{find_extremes, match_template, MatchTemplateMethod};

use super::{TrackError, TrackUpdate, Tracker, TrackerFactory};
use crate::frame::{BoundingBox, Frame, Point};
use crate::vision::grayscale;

const MIN_SEARCH_MARGIN: i32 = 8;
const MIN_TARGET_SIDE: i32 = 2;

/// Tuning knobs for `TemplateTracker`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackerSettings {
    /// Search window padding, as a fraction of the larger box side.
    pub search_margin: f32,
    /// Mean squared error (normalized to `[0, 1]`) above which the target is lost.
    pub max_match_error: f32,
    /// Blend factor applied to the template after every successful match.
    pub learning_rate: f32,
    /// Templates larger than this are matched at reduced resolution.
    pub max_template_side: u32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            search_margin: 0.5,
            max_match_error: 0.08,
            learning_rate: 0.15,
            max_template_side: 48,
        }
    }
}

/// Grayscale template tracker.
///
/// Matches the stored appearance by sum of squared differences inside a
/// window around the last known position and slowly adapts the template.
pub struct TemplateTracker {
    settings: TrackerSettings,
    session: Option<Session>,
}

struct Session {
    bbox: BoundingBox,
    scale: u32,
    template: Vec<f32>,
    template_w: u32,
    template_h: u32,
}

impl TemplateTracker {
    pub fn new(settings: TrackerSettings) -> Self {
        Self {
            settings,
            session: None,
        }
    }

    fn scale_for(&self, bbox: &BoundingBox) -> u32 {
        let side = bbox.width().max(bbox.height()) as u32;
        let limit = self.settings.max_template_side.max(1);
        side.div_ceil(limit).max(1)
    }

    fn search_window(&self, bbox: &BoundingBox, width: u32, height: u32) -> Option<BoundingBox> {
        let side = bbox.width().max(bbox.height()) as f32;
        let margin = ((side * self.settings.search_margin) as i32).max(MIN_SEARCH_MARGIN);
        BoundingBox::from_corners(
            Point::new(bbox.top_left.x - margin, bbox.top_left.y - margin),
            Point::new(bbox.bottom_right.x + margin, bbox.bottom_right.y + margin),
        )
        .clamp_to(width, height)
    }
}

impl Tracker for TemplateTracker {
    fn init(&mut self, frame: &Frame, bbox: BoundingBox) -> Result<(), TrackError> {
        self.session = None;
        if bbox.width() < MIN_TARGET_SIDE || bbox.height() < MIN_TARGET_SIDE {
            return Err(TrackError::DegenerateBox(bbox));
        }
        let clamped = bbox
            .clamp_to(frame.width(), frame.height())
            .ok_or(TrackError::OutOfFrame(bbox))?;
        if clamped.width() < MIN_TARGET_SIDE || clamped.height() < MIN_TARGET_SIDE {
            return Err(TrackError::DegenerateBox(clamped));
        }

        let gray = grayscale(&frame.image);
        let scale = self.scale_for(&clamped);
        let patch = downscale(&crop(&gray, &clamped), scale);
        self.session = Some(Session {
            bbox: clamped,
            scale,
            template_w: patch.width(),
            template_h: patch.height(),
            template: patch.pixels().map(|p| f32::from(p.0[0])).collect(),
        });
        log::debug!("TemplateTracker: init on {:?} (scale 1/{})", clamped, scale);
        Ok(())
    }

    fn update(&mut self, frame: &Frame) -> TrackUpdate {
        let Some(session) = self.session.as_ref() else {
            return TrackUpdate::Lost;
        };
        let Some(window) = self.search_window(&session.bbox, frame.width(), frame.height()) else {
            self.session = None;
            return TrackUpdate::Lost;
        };

        let gray = grayscale(&frame.image);
        let region = downscale(&crop(&gray, &window), session.scale);
        if region.width() < session.template_w || region.height() < session.template_h {
            self.session = None;
            return TrackUpdate::Lost;
        }

        let template = session.template_image();
        let scores = match_template(&region, &template, MatchTemplateMethod::SumOfSquaredErrors);
        let extremes = find_extremes(&scores);
        let pixels = (session.template_w * session.template_h) as f32;
        let error = extremes.min_value / pixels / (255.0 * 255.0);
        if error > self.settings.max_match_error {
            log::debug!("TemplateTracker: lost target (match error {:.3})", error);
            self.session = None;
            return TrackUpdate::Lost;
        }

        let (mx, my) = extremes.min_value_location;
        let scale = session.scale as i32;
        let bbox = BoundingBox::from_xywh(
            window.x() + mx as i32 * scale,
            window.y() + my as i32 * scale,
            session.bbox.width(),
            session.bbox.height(),
        );
        let Some(bbox) = bbox.clamp_to(frame.width(), frame.height()) else {
            self.session = None;
            return TrackUpdate::Lost;
        };

        let learning_rate = self.settings.learning_rate.clamp(0.0, 1.0);
        if let Some(session) = self.session.as_mut() {
            let fresh = downscale(&crop(&gray, &bbox), session.scale);
            if fresh.dimensions() == (session.template_w, session.template_h) {
                for (t, p) in session.template.iter_mut().zip(fresh.pixels()) {
                    *t += learning_rate * (f32::from(p.0[0]) - *t);
                }
            }
            session.bbox = bbox;
        }
        TrackUpdate::Tracked(bbox)
    }
}

impl Session {
    fn template_image(&self) -> GrayImage {
        GrayImage::from_fn(self.template_w, self.template_h, |x, y| {
            let v = self.template[(y * self.template_w + x) as usize];
            Luma([v.round().clamp(0.0, 255.0) as u8])
        })
    }
}

fn crop(gray: &GrayImage, bbox: &BoundingBox) -> GrayImage {
    imageops::crop_imm(
        gray,
        bbox.x() as u32,
        bbox.y() as u32,
        bbox.width() as u32,
        bbox.height() as u32,
    )
    .to_image()
}

fn downscale(image: &GrayImage, scale: u32) -> GrayImage {
    if scale <= 1 {
        return image.clone();
    }
    let width = (image.width() / scale).max(1);
    let height = (image.height() / scale).max(1);
    imageops::resize(image, width, height, FilterType::Triangle)
}

/// Produces `TemplateTracker`s sharing one set of settings.
#[derive(Clone, Debug, Default)]
pub struct TemplateTrackerFactory {
    pub settings: TrackerSettings,
}

impl TemplateTrackerFactory {
    pub fn new(settings: TrackerSettings) -> Self {
        Self { settings }
    }
}

impl TrackerFactory for TemplateTrackerFactory {
    fn create(&self) -> Box<dyn Tracker> {
        Box::new(TemplateTracker::new(self.settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn textured_frame(x: u32, y: u32, index: u64) -> Frame {
        let mut image = RgbImage::from_pixel(100, 100, Rgb([40, 40, 40]));
        for j in 0..20 {
            for i in 0..20 {
                let v = (60 + i * 5 + j * 2) as u8;
                image.put_pixel(x + i, y + j, Rgb([v, 255 - v, v / 2]));
            }
        }
        Frame::new(image, index)
    }

    #[test]
    fn follows_a_translated_patch() {
        let mut tracker = TemplateTracker::new(TrackerSettings::default());
        tracker
            .init(&textured_frame(30, 30, 0), BoundingBox::from_xywh(30, 30, 20, 20))
            .unwrap();
        match tracker.update(&textured_frame(35, 30, 1)) {
            TrackUpdate::Tracked(bbox) => assert_eq!(bbox.center(), Point::new(45, 40)),
            TrackUpdate::Lost => panic!("target lost"),
        }
    }

    #[test]
    fn reports_loss_when_the_target_vanishes() {
        let mut tracker = TemplateTracker::new(TrackerSettings::default());
        tracker
            .init(&textured_frame(30, 30, 0), BoundingBox::from_xywh(30, 30, 20, 20))
            .unwrap();
        let blank = Frame::new(RgbImage::from_pixel(100, 100, Rgb([255, 255, 255])), 1);
        assert_eq!(tracker.update(&blank), TrackUpdate::Lost);
        // The session is over until the next init.
        assert_eq!(tracker.update(&textured_frame(30, 30, 2)), TrackUpdate::Lost);
    }

    #[test]
    fn rejects_degenerate_and_outside_boxes() {
        let mut tracker = TemplateTracker::new(TrackerSettings::default());
        let frame = textured_frame(30, 30, 0);
        assert!(matches!(
            tracker.init(&frame, BoundingBox::from_xywh(10, 10, 1, 10)),
            Err(TrackError::DegenerateBox(_))
        ));
        assert!(matches!(
            tracker.init(&frame, BoundingBox::from_xywh(200, 200, 10, 10)),
            Err(TrackError::OutOfFrame(_))
        ));
    }

    #[test]
    fn large_targets_are_matched_at_reduced_resolution() {
        let tracker = TemplateTracker::new(TrackerSettings::default());
        assert_eq!(tracker.scale_for(&BoundingBox::from_xywh(0, 0, 40, 40)), 1);
        assert_eq!(tracker.scale_for(&BoundingBox::from_xywh(0, 0, 120, 30)), 3);
    }
}
