//! Frame ingestion sources.
//!
//! This module provides the sources a pipeline can read from:
//! - Synthetic scenes (`stub://...`), for tests and demos
//! - Image sequences (a directory of PNG/JPEG files, or a single image)
//! - USB/V4L2 devices (feature: ingest-v4l2)
//! - Local video files (feature: ingest-file-ffmpeg)
//!
//! Every source yields 8-bit RGB `Frame`s. Native layouts (BGR, NV12, YUYV,
//! MJPEG) are normalized before a frame leaves the source. A read that
//! returns no data is end-of-stream (`Ok(None)`) and is never retried; the
//! device is released when the source is dropped.

#[cfg(feature = "ingest-file-ffmpeg")]
mod file_ffmpeg;
mod normalize;
mod sequence;
mod synthetic;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

#[cfg(feature = "ingest-file-ffmpeg")]
pub use file_ffmpeg::FfmpegFileSource;
pub use normalize::{normalize_to_rgb, PixelFormat};
pub use sequence::SequenceSource;
pub use synthetic::{SyntheticScene, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::frame::Frame;
use crate::runtime::CancellationToken;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture source {source_id} unavailable: {reason}")]
    Unavailable { source_id: String, reason: String },
    #[error("frame read failed: {0}")]
    Read(String),
    #[error("frame format error: {0}")]
    Format(String),
}

impl CaptureError {
    pub fn unavailable(source_id: &str, reason: impl ToString) -> Self {
        CaptureError::Unavailable {
            source_id: source_id.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Where and how to capture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceConfig {
    /// `stub://<scene>`, a V4L2 device (`/dev/videoN`, `v4l2://N` or `N`),
    /// an image directory or file, or a video file.
    pub id: String,
    /// Preferred frame width (devices and synthetic scenes).
    pub width: u32,
    /// Preferred frame height (devices and synthetic scenes).
    pub height: u32,
    /// Frame pacing; 0 delivers frames as fast as they can be produced.
    pub target_fps: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            id: "stub://moving-square".to_string(),
            width: 640,
            height: 480,
            target_fps: 30,
        }
    }
}

/// Counters for a source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

pub trait FrameSource: Send {
    /// Identifier the source was opened with.
    fn id(&self) -> &str;

    /// Capture the next frame.
    ///
    /// `Ok(None)` marks end-of-stream. Implementations that wait (pacing,
    /// device polls) return early with `Ok(None)` once `cancel` fires.
    fn next_frame(&mut self, cancel: &CancellationToken) -> Result<Option<Frame>, CaptureError>;

    fn stats(&self) -> SourceStats;
}

/// Open the source named by `config.id`.
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
    let id = config.id.trim();
    if id.is_empty() {
        return Err(CaptureError::unavailable(id, "empty source identifier"));
    }

    if id.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(config)?));
    }

    if is_device_id(id) {
        return open_device(config);
    }

    let path = Path::new(id);
    if !path.exists() {
        return Err(CaptureError::unavailable(id, "no such file or directory"));
    }
    if path.is_dir() || sequence::is_image_file(path) {
        return Ok(Box::new(SequenceSource::open(config)?));
    }
    open_video_file(config)
}

fn is_device_id(id: &str) -> bool {
    id.starts_with("/dev/video") || id.starts_with("v4l2://") || id.parse::<u32>().is_ok()
}

#[cfg(feature = "ingest-v4l2")]
fn open_device(config: &SourceConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
    Ok(Box::new(V4l2Source::open(config)?))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_device(config: &SourceConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
    Err(CaptureError::unavailable(
        &config.id,
        "V4L2 capture requires the ingest-v4l2 feature",
    ))
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn open_video_file(config: &SourceConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
    Ok(Box::new(FfmpegFileSource::open(config)?))
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn open_video_file(config: &SourceConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
    Err(CaptureError::unavailable(
        &config.id,
        "video files require the ingest-file-ffmpeg feature",
    ))
}

/// Sleeps between frames to honour a target frame rate.
#[derive(Debug)]
pub(crate) struct Pacer {
    interval: Option<Duration>,
    next_due: Option<Instant>,
}

const PACER_SLICE: Duration = Duration::from_millis(20);

impl Pacer {
    pub(crate) fn new(target_fps: u32) -> Self {
        Self {
            interval: (target_fps > 0).then(|| Duration::from_secs(1) / target_fps),
            next_due: None,
        }
    }

    /// Wait for the next slot. Returns false if cancelled while waiting.
    pub(crate) fn wait(&mut self, cancel: &CancellationToken) -> bool {
        let Some(interval) = self.interval else {
            return !cancel.is_cancelled();
        };
        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);
        while Instant::now() < due {
            if cancel.is_cancelled() {
                return false;
            }
            let remaining = due.saturating_duration_since(Instant::now());
            std::thread::sleep(remaining.min(PACER_SLICE));
        }
        // Do not try to catch up after a stall.
        self.next_due = Some(due.max(now) + interval);
        !cancel.is_cancelled()
    }
}
