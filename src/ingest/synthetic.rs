//! Synthetic source (`stub://<scene>[?frames=N]`) for tests and demos.

use image::{Rgb, RgbImage};

use super::{CaptureError, FrameSource, Pacer, SourceConfig, SourceStats};
use crate::frame::Frame;
use crate::runtime::CancellationToken;

const SQUARE_SIDE: u32 = 20;
const SQUARE_STEP: u32 = 2;
const BACKGROUND: Rgb<u8> = Rgb([16, 16, 16]);
const SQUARE_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyntheticScene {
    /// A bright square sliding left to right across a dark background.
    MovingSquare,
    /// A uniform mid-gray frame.
    Blank,
}

pub struct SyntheticSource {
    id: String,
    scene: SyntheticScene,
    width: u32,
    height: u32,
    /// End-of-stream after this many frames.
    frame_limit: Option<u64>,
    frame_count: u64,
    pacer: Pacer,
}

impl SyntheticSource {
    pub fn new(config: &SourceConfig) -> Result<Self, CaptureError> {
        let target = config.id.trim_start_matches("stub://");
        let (scene_name, query) = match target.split_once('?') {
            Some((scene, query)) => (scene, Some(query)),
            None => (target, None),
        };
        let scene = match scene_name {
            "" | "moving-square" => SyntheticScene::MovingSquare,
            "blank" => SyntheticScene::Blank,
            other => {
                log::warn!(
                    "SyntheticSource: unknown scene '{}', using moving-square",
                    other
                );
                SyntheticScene::MovingSquare
            }
        };

        let mut frame_limit = None;
        if let Some(query) = query {
            for pair in query.split('&') {
                match pair.split_once('=') {
                    Some(("frames", n)) => {
                        frame_limit = Some(n.parse::<u64>().map_err(|_| {
                            CaptureError::unavailable(&config.id, "frames must be an integer")
                        })?);
                    }
                    _ => log::warn!("SyntheticSource: ignoring option '{}'", pair),
                }
            }
        }

        if config.width == 0 || config.height == 0 {
            return Err(CaptureError::unavailable(&config.id, "frame size must be non-zero"));
        }

        log::info!(
            "SyntheticSource: connected to {} ({}x{})",
            config.id,
            config.width,
            config.height
        );
        Ok(Self {
            id: config.id.clone(),
            scene,
            width: config.width,
            height: config.height,
            frame_limit,
            frame_count: 0,
            pacer: Pacer::new(config.target_fps),
        })
    }

    pub fn scene(&self) -> SyntheticScene {
        self.scene
    }

    fn render(&self) -> RgbImage {
        match self.scene {
            SyntheticScene::Blank => RgbImage::from_pixel(self.width, self.height, Rgb([128; 3])),
            SyntheticScene::MovingSquare => {
                let mut image = RgbImage::from_pixel(self.width, self.height, BACKGROUND);
                let side = SQUARE_SIDE.min(self.width).min(self.height);
                let travel = (self.width - side).max(1);
                let x0 = ((self.frame_count * u64::from(SQUARE_STEP)) % u64::from(travel)) as u32;
                let y0 = (self.height - side) / 2;
                for y in y0..y0 + side {
                    for x in x0..x0 + side {
                        image.put_pixel(x, y, SQUARE_COLOR);
                    }
                }
                image
            }
        }
    }
}

impl FrameSource for SyntheticSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn next_frame(&mut self, cancel: &CancellationToken) -> Result<Option<Frame>, CaptureError> {
        if self.frame_limit.is_some_and(|limit| self.frame_count >= limit) {
            return Ok(None);
        }
        if !self.pacer.wait(cancel) {
            return Ok(None);
        }
        let frame = Frame::new(self.render(), self.frame_count);
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.id.clone(),
        }
    }
}
