use image::{Rgb, RgbImage};

use trackcam::track::{TemplateTracker, TrackerSettings};
use trackcam::{BoundingBox, Frame, Point, TrackError, TrackUpdate, Tracker};

const BACKGROUND: Rgb<u8> = Rgb([20, 20, 20]);

fn frame_with_patch(index: u64, origin: (u32, u32)) -> Frame {
    let mut image = RgbImage::from_pixel(100, 100, BACKGROUND);
    for j in 0..20u32 {
        for i in 0..20u32 {
            let v = (60 + i * 5 + j * 2) as u8;
            image.put_pixel(origin.0 + i, origin.1 + j, Rgb([v, 255 - v, v / 2]));
        }
    }
    Frame::new(image, index)
}

fn distance(a: Point, b: Point) -> f64 {
    f64::from((a.x - b.x).pow(2) + (a.y - b.y).pow(2)).sqrt()
}

#[test]
fn follows_a_translated_patch() -> Result<(), TrackError> {
    let mut tracker = TemplateTracker::new(TrackerSettings::default());
    tracker.init(&frame_with_patch(0, (30, 30)), BoundingBox::from_xywh(30, 30, 20, 20))?;

    match tracker.update(&frame_with_patch(1, (35, 30))) {
        TrackUpdate::Tracked(bbox) => {
            assert!(
                distance(bbox.center(), Point::new(45, 40)) <= 3.0,
                "tracked {:?}",
                bbox
            );
            assert_eq!((bbox.width(), bbox.height()), (20, 20));
        }
        TrackUpdate::Lost => panic!("tracker lost a translated patch"),
    }
    Ok(())
}

#[test]
fn keeps_following_over_several_frames() -> Result<(), TrackError> {
    let mut tracker = TemplateTracker::new(TrackerSettings::default());
    tracker.init(&frame_with_patch(0, (10, 40)), BoundingBox::from_xywh(10, 40, 20, 20))?;

    for step in 1..=8u32 {
        let x = 10 + step * 4;
        match tracker.update(&frame_with_patch(u64::from(step), (x, 40))) {
            TrackUpdate::Tracked(bbox) => assert_eq!(bbox.x(), x as i32),
            TrackUpdate::Lost => panic!("lost at step {}", step),
        }
    }
    Ok(())
}

#[test]
fn reports_loss_when_the_target_disappears() -> Result<(), TrackError> {
    let mut tracker = TemplateTracker::new(TrackerSettings::default());
    tracker.init(&frame_with_patch(0, (30, 30)), BoundingBox::from_xywh(30, 30, 20, 20))?;

    let empty = Frame::new(RgbImage::from_pixel(100, 100, BACKGROUND), 1);
    assert_eq!(tracker.update(&empty), TrackUpdate::Lost);
    // No session survives a loss.
    assert_eq!(tracker.update(&frame_with_patch(2, (30, 30))), TrackUpdate::Lost);
    Ok(())
}

#[test]
fn rejects_unusable_selections() {
    let frame = frame_with_patch(0, (30, 30));
    let mut tracker = TemplateTracker::new(TrackerSettings::default());
    assert!(matches!(
        tracker.init(&frame, BoundingBox::from_xywh(10, 10, 1, 1)),
        Err(TrackError::DegenerateBox(_))
    ));
    assert!(matches!(
        tracker.init(&frame, BoundingBox::from_xywh(200, 200, 20, 20)),
        Err(TrackError::OutOfFrame(_))
    ));
}
