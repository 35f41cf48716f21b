//! trackcam: real-time object tracking on live video.
//!
//! A producer thread pulls frames from a capture source, runs the selected
//! detection mode on each one, computes frame statistics and hands the
//! annotated frame to subscribers without ever blocking on them.
//!
//! # Module Structure
//!
//! - `ingest`: frame sources (synthetic, image sequences, V4L2, video files)
//! - `engine`: mode state machine and consumer commands
//! - `track`, `segment`, `detect`: the per-mode algorithms
//! - `vision`: color conversion, contours and overlay drawing
//! - `publish`: drop-oldest fan-out to subscribers
//! - `runtime`: the producer loop and its `Pipeline` handle
//! - `config`: TOML file and environment configuration

pub mod config;
pub mod detect;
pub mod engine;
pub mod frame;
pub mod ingest;
pub mod publish;
pub mod runtime;
pub mod segment;
pub mod stats;
pub mod track;
pub mod trajectory;
pub mod vision;

pub use config::TrackcamConfig;
pub use detect::{Detection, ModelHandle, ModelLoadError, ModelLoader, NeuralDetector};
pub use engine::{
    Command, DetectionEngine, DetectionMode, EngineSettings, FrameReport, ModeParameters,
    ModeState, Notice,
};
pub use frame::{BoundingBox, Frame, Point};
pub use ingest::{open_source, CaptureError, FrameSource, SourceConfig};
pub use publish::{EventPublisher, FrameEvent, Subscription};
pub use runtime::{CancellationToken, Pipeline, StatusEvent, StopReason};
pub use stats::{FpsMeter, FrameStatistics};
pub use track::{TrackError, TrackUpdate, Tracker, TrackerFactory};
pub use trajectory::TrajectoryBuffer;
