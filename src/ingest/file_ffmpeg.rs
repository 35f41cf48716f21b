//! Video files decoded with FFmpeg.

use ffmpeg_next as ffmpeg;

use super::{CaptureError, FrameSource, Pacer, SourceConfig, SourceStats};
use crate::frame::Frame;
use crate::runtime::CancellationToken;

pub struct FfmpegFileSource {
    id: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    /// Set once the demuxer is exhausted and the decoder has been flushed.
    draining: bool,
    frame_count: u64,
    pacer: Pacer,
}

impl FfmpegFileSource {
    pub fn open(config: &SourceConfig) -> Result<Self, CaptureError> {
        let unavailable = |reason: String| CaptureError::unavailable(&config.id, reason);

        ffmpeg::init().map_err(|e| unavailable(format!("initialize ffmpeg: {}", e)))?;
        let input = ffmpeg::format::input(&config.id)
            .map_err(|e| unavailable(format!("open input: {}", e)))?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| unavailable("file has no video track".to_string()))?;
        let stream_index = stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| unavailable(format!("decoder parameters: {}", e)))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|e| unavailable(format!("open video decoder: {}", e)))?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .map_err(|e| unavailable(format!("create scaler: {}", e)))?;

        log::info!(
            "FfmpegFileSource: opened {} ({}x{})",
            config.id,
            decoder.width(),
            decoder.height()
        );
        Ok(Self {
            id: config.id.clone(),
            input,
            stream_index,
            decoder,
            scaler,
            draining: false,
            frame_count: 0,
            pacer: Pacer::new(config.target_fps),
        })
    }

    /// Pull one decoded frame, feeding packets as needed.
    fn decode_next(&mut self) -> Result<Option<ffmpeg::frame::Video>, CaptureError> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return Ok(Some(decoded));
            }
            if self.draining {
                return Ok(None);
            }
            match self.input.packets().next() {
                Some((stream, packet)) => {
                    if stream.index() != self.stream_index {
                        continue;
                    }
                    self.decoder
                        .send_packet(&packet)
                        .map_err(|e| CaptureError::Read(format!("send packet: {}", e)))?;
                }
                None => {
                    self.decoder
                        .send_eof()
                        .map_err(|e| CaptureError::Read(format!("flush decoder: {}", e)))?;
                    self.draining = true;
                }
            }
        }
    }
}

impl FrameSource for FfmpegFileSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn next_frame(&mut self, cancel: &CancellationToken) -> Result<Option<Frame>, CaptureError> {
        let Some(decoded) = self.decode_next()? else {
            log::info!("FfmpegFileSource: {} reached end of file", self.id);
            return Ok(None);
        };
        if !self.pacer.wait(cancel) {
            return Ok(None);
        }

        let mut rgb = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb)
            .map_err(|e| CaptureError::Format(format!("scale frame to RGB: {}", e)))?;
        let (pixels, width, height) = frame_to_pixels(&rgb)?;
        let frame = Frame::from_rgb(pixels, width, height, self.frame_count)
            .ok_or_else(|| CaptureError::Format("decoded frame size mismatch".into()))?;
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

/// Copy the RGB plane out, dropping any row padding.
fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32), CaptureError> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = width as usize * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let line = data
            .get(start..start + row_bytes)
            .ok_or_else(|| CaptureError::Format("frame row is out of bounds".into()))?;
        pixels.extend_from_slice(line);
    }
    Ok((pixels, width, height))
}
