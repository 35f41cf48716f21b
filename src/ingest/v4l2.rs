//! V4L2 capture devices (`/dev/videoN`, `v4l2://N`, or a bare index).
//!
//! Requests RGB3 at the configured size and frame rate. Drivers that refuse
//! are read in whatever they negotiate; YUYV, BGR3 and MJPG are converted to
//! RGB before the frame is returned.

use ouroboros::self_referencing;
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::FourCC;

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{CaptureError, FrameSource, SourceConfig, SourceStats};
use crate::frame::Frame;
use crate::runtime::CancellationToken;

const BUFFER_COUNT: u32 = 4;

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: MmapStream<'this, v4l::Device>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Encoding {
    Raw(PixelFormat),
    Mjpeg,
}

impl Encoding {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"RGB3" => Some(Encoding::Raw(PixelFormat::Rgb24)),
            b"BGR3" => Some(Encoding::Raw(PixelFormat::Bgr24)),
            b"YUYV" => Some(Encoding::Raw(PixelFormat::Yuyv)),
            b"NV12" => Some(Encoding::Raw(PixelFormat::Nv12)),
            b"MJPG" => Some(Encoding::Mjpeg),
            _ => None,
        }
    }
}

pub struct V4l2Source {
    id: String,
    state: DeviceState,
    encoding: Encoding,
    width: u32,
    height: u32,
    frame_count: u64,
}

fn device_path(id: &str) -> String {
    if let Some(index) = id.strip_prefix("v4l2://") {
        format!("/dev/video{}", index)
    } else if id.parse::<u32>().is_ok() {
        format!("/dev/video{}", id)
    } else {
        id.to_string()
    }
}

impl V4l2Source {
    pub fn open(config: &SourceConfig) -> Result<Self, CaptureError> {
        let path = device_path(&config.id);
        let mut device =
            v4l::Device::with_path(&path).map_err(|e| CaptureError::unavailable(&config.id, e))?;

        let mut format = device
            .format()
            .map_err(|e| CaptureError::unavailable(&config.id, e))?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = FourCC::new(b"RGB3");
        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("V4l2Source: failed to set format on {}: {}", path, err);
                device
                    .format()
                    .map_err(|e| CaptureError::unavailable(&config.id, e))?
            }
        };

        let encoding = Encoding::from_fourcc(format.fourcc).ok_or_else(|| {
            CaptureError::unavailable(
                &config.id,
                format!("unsupported pixel format {}", format.fourcc),
            )
        })?;

        if config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("V4l2Source: failed to set fps on {}: {}", path, err);
            }
        }

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                MmapStream::with_buffers(device, Type::VideoCapture, BUFFER_COUNT)
            },
        }
        .try_build()
        .map_err(|e| CaptureError::unavailable(&config.id, e))?;

        log::info!(
            "V4l2Source: connected to {} ({}x{} {})",
            path,
            format.width,
            format.height,
            format.fourcc
        );
        Ok(Self {
            id: config.id.clone(),
            state,
            encoding,
            width: format.width,
            height: format.height,
            frame_count: 0,
        })
    }

    fn decode(&self, buf: &[u8]) -> Result<Frame, CaptureError> {
        let frame = match self.encoding {
            Encoding::Raw(format) => {
                let rgb = normalize_to_rgb(buf, self.width, self.height, format)?;
                Frame::from_rgb(rgb, self.width, self.height, self.frame_count)
            }
            Encoding::Mjpeg => {
                let image = image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)
                    .map_err(|e| CaptureError::Format(format!("MJPG frame: {}", e)))?
                    .to_rgb8();
                Some(Frame::new(image, self.frame_count))
            }
        };
        frame.ok_or_else(|| CaptureError::Format("frame buffer does not match its size".into()))
    }
}

impl FrameSource for V4l2Source {
    fn id(&self) -> &str {
        &self.id
    }

    fn next_frame(&mut self, cancel: &CancellationToken) -> Result<Option<Frame>, CaptureError> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        // The driver paces dequeues at the negotiated frame rate.
        let pixels = self
            .state
            .with_mut(|fields| {
                fields
                    .stream
                    .next()
                    .map(|(buf, meta)| buf[..(meta.bytesused as usize).min(buf.len())].to_vec())
            })
            .map_err(|e| CaptureError::Read(e.to_string()))?;
        if pixels.is_empty() {
            log::info!("V4l2Source: {} returned an empty buffer", self.id);
            return Ok(None);
        }
        let frame = self.decode(&pixels)?;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_ids_map_to_nodes() {
        assert_eq!(device_path("v4l2://2"), "/dev/video2");
        assert_eq!(device_path("0"), "/dev/video0");
        assert_eq!(device_path("/dev/video1"), "/dev/video1");
    }

    #[test]
    fn known_fourccs_have_encodings() {
        assert_eq!(
            Encoding::from_fourcc(FourCC::new(b"YUYV")),
            Some(Encoding::Raw(PixelFormat::Yuyv))
        );
        assert_eq!(Encoding::from_fourcc(FourCC::new(b"MJPG")), Some(Encoding::Mjpeg));
        assert_eq!(Encoding::from_fourcc(FourCC::new(b"H264")), None);
    }
}
