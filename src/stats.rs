//! Per-frame statistics and frame-rate measurement.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Instant;

use crate::frame::{Frame, FRAME_CHANNELS};

const CHANNELS: usize = FRAME_CHANNELS as usize;

/// Number of frame instants kept by `FpsMeter`.
pub const FPS_WINDOW: usize = 100;

/// Per-channel mean and population standard deviation plus global extrema.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct FrameStatistics {
    pub mean: [f64; CHANNELS],
    pub std_dev: [f64; CHANNELS],
    pub min: u8,
    pub max: u8,
}

impl FrameStatistics {
    pub fn compute(frame: &Frame) -> Self {
        Self::from_pixels(frame.pixels())
    }

    /// Statistics over interleaved RGB bytes. An empty buffer yields all zeros.
    pub fn from_pixels(pixels: &[u8]) -> Self {
        let count = pixels.len() / CHANNELS;
        if count == 0 {
            return Self::default();
        }

        let mut sum = [0f64; CHANNELS];
        let mut sum_sq = [0f64; CHANNELS];
        let mut min = u8::MAX;
        let mut max = u8::MIN;

        for px in pixels.chunks_exact(CHANNELS) {
            for (c, &value) in px.iter().enumerate() {
                let v = f64::from(value);
                sum[c] += v;
                sum_sq[c] += v * v;
                min = min.min(value);
                max = max.max(value);
            }
        }

        let n = count as f64;
        let mut mean = [0f64; CHANNELS];
        let mut std_dev = [0f64; CHANNELS];
        for c in 0..CHANNELS {
            mean[c] = sum[c] / n;
            let variance = (sum_sq[c] / n - mean[c] * mean[c]).max(0.0);
            std_dev[c] = variance.sqrt();
        }

        Self {
            mean,
            std_dev,
            min,
            max,
        }
    }
}

/// Rolling frame-rate estimate over the last `FPS_WINDOW` frames.
#[derive(Debug)]
pub struct FpsMeter {
    ticks: VecDeque<Instant>,
}

impl Default for FpsMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl FpsMeter {
    pub fn new() -> Self {
        Self {
            ticks: VecDeque::with_capacity(FPS_WINDOW),
        }
    }

    /// Record a frame at `now` and return the current rate.
    pub fn tick(&mut self, now: Instant) -> f64 {
        if self.ticks.len() == FPS_WINDOW {
            self.ticks.pop_front();
        }
        self.ticks.push_back(now);
        self.fps()
    }

    /// Frames per second across the window; 0 until two frames have been seen.
    pub fn fps(&self) -> f64 {
        let (Some(first), Some(last)) = (self.ticks.front(), self.ticks.back()) else {
            return 0.0;
        };
        let elapsed = last.duration_since(*first).as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        (self.ticks.len() - 1) as f64 / elapsed
    }
}
