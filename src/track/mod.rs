//! Single-object visual trackers.
//!
//! The engine drives a tracker only through `Tracker::init` and
//! `Tracker::update`; the algorithm behind it is replaceable through a
//! `TrackerFactory`.

mod template;

pub use template::{TemplateTracker, TemplateTrackerFactory, TrackerSettings};

use thiserror::Error;

use crate::frame::{BoundingBox, Frame};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrackError {
    #[error("bounding box {0:?} is too small to track")]
    DegenerateBox(BoundingBox),
    #[error("bounding box {0:?} lies outside the frame")]
    OutOfFrame(BoundingBox),
}

/// Outcome of one `Tracker::update` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackUpdate {
    Tracked(BoundingBox),
    /// The session has ended; `init` must be called before the next update.
    Lost,
}

pub trait Tracker: Send {
    /// Start a new session on `bbox` in `frame`.
    fn init(&mut self, frame: &Frame, bbox: BoundingBox) -> Result<(), TrackError>;

    /// Locate the target in the next frame.
    fn update(&mut self, frame: &Frame) -> TrackUpdate;
}

/// Builds fresh trackers when a tracking mode is entered.
pub trait TrackerFactory: Send {
    fn create(&self) -> Box<dyn Tracker>;
}
