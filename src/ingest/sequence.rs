//! Image-sequence source: a directory of PNG/JPEG files, or a single image.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use super::{CaptureError, FrameSource, Pacer, SourceConfig, SourceStats};
use crate::frame::Frame;
use crate::runtime::CancellationToken;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub(crate) fn is_image_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                IMAGE_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
            .unwrap_or(false)
}

/// Plays image files in file-name order, then ends the stream.
pub struct SequenceSource {
    id: String,
    pending: VecDeque<PathBuf>,
    frame_count: u64,
    pacer: Pacer,
}

impl SequenceSource {
    pub fn open(config: &SourceConfig) -> Result<Self, CaptureError> {
        let root = Path::new(&config.id);
        let mut files = if root.is_dir() {
            let entries = std::fs::read_dir(root)
                .map_err(|e| CaptureError::unavailable(&config.id, e))?;
            let mut files = Vec::new();
            for entry in entries {
                let path = entry
                    .map_err(|e| CaptureError::unavailable(&config.id, e))?
                    .path();
                if is_image_file(&path) {
                    files.push(path);
                }
            }
            files
        } else if is_image_file(root) {
            vec![root.to_path_buf()]
        } else {
            return Err(CaptureError::unavailable(&config.id, "not an image or directory"));
        };

        if files.is_empty() {
            return Err(CaptureError::unavailable(&config.id, "no PNG/JPEG images found"));
        }
        files.sort();
        log::info!(
            "SequenceSource: {} image(s) queued from {}",
            files.len(),
            config.id
        );

        Ok(Self {
            id: config.id.clone(),
            pending: files.into(),
            frame_count: 0,
            pacer: Pacer::new(config.target_fps),
        })
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl FrameSource for SequenceSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn next_frame(&mut self, cancel: &CancellationToken) -> Result<Option<Frame>, CaptureError> {
        let Some(path) = self.pending.pop_front() else {
            return Ok(None);
        };
        if !self.pacer.wait(cancel) {
            return Ok(None);
        }
        let image = image::open(&path)
            .map_err(|e| CaptureError::Read(format!("{}: {}", path.display(), e)))?
            .to_rgb8();
        let frame = Frame::new(image, self.frame_count);
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
    use image::{Rgb, RgbImage};

    #[test]
    fn plays_images_in_name_order() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        RgbImage::from_pixel(4, 4, Rgb([200, 0, 0])).save(dir.path().join("b.png"))?;
        RgbImage::from_pixel(4, 4, Rgb([0, 200, 0])).save(dir.path().join("a.png"))?;
        std::fs::write(dir.path().join("notes.txt"), "skip me")?;

        let config = SourceConfig {
            id: dir.path().display().to_string(),
            target_fps: 0,
            ..SourceConfig::default()
        };
        let mut source = SequenceSource::open(&config)?;
        assert_eq!(source.remaining(), 2);

        let cancel = CancellationToken::new();
        let first = source.next_frame(&cancel)?.unwrap();
        let second = source.next_frame(&cancel)?.unwrap();
        assert_eq!(*first.image.get_pixel(0, 0), Rgb([0, 200, 0]));
        assert_eq!(*second.image.get_pixel(0, 0), Rgb([200, 0, 0]));
        assert!(source.next_frame(&cancel)?.is_none());
        assert_eq!(source.stats().frames_captured, 2);
        Ok(())
    }

    #[test]
    fn empty_directories_are_unavailable() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let config = SourceConfig {
            id: dir.path().display().to_string(),
            ..SourceConfig::default()
        };
        assert!(matches!(
            SequenceSource::open(&config),
            Err(CaptureError::Unavailable { .. })
        ));
        Ok(())
    }
}
