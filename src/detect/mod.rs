//! Neural object detection.
//!
//! A `ModelHandle` (network plus ordered class labels) is produced by a
//! `ModelLoader`; `NeuralDetector` runs letterboxing, inference, decoding,
//! rescaling and NMS against it.

mod backend;
mod backends;
mod letterbox;
mod result;
mod yolo;

pub use backend::{DetectionNetwork, ModelLoader};
#[cfg(feature = "backend-tract")]
pub use backends::{TractModelLoader, TractNetwork};
pub use backends::{default_loader, UnavailableModelLoader};
pub use letterbox::{Letterbox, PAD_VALUE};
pub use result::{Detection, Prediction};
pub use yolo::{decode, non_max_suppression, Candidate};

use anyhow::Result;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::frame::Frame;

#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("class list {0} contains no class names")]
    EmptyClassList(PathBuf),
    #[error("model {path} could not be loaded: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error("no inference backend is compiled into this build")]
    BackendUnavailable,
}

/// Read a class list: one name per line, order defines the class index.
///
/// Surrounding whitespace is trimmed and blank lines are skipped.
pub fn load_class_list(path: &Path) -> Result<Vec<String>, ModelLoadError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ModelLoadError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let labels: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if labels.is_empty() {
        return Err(ModelLoadError::EmptyClassList(path.to_path_buf()));
    }
    Ok(labels)
}

/// A loaded network and its class labels.
pub struct ModelHandle {
    network: Box<dyn DetectionNetwork>,
    labels: Vec<String>,
}

impl ModelHandle {
    pub fn new(network: Box<dyn DetectionNetwork>, labels: Vec<String>) -> Self {
        Self { network, labels }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn backend(&self) -> &'static str {
        self.network.name()
    }

    pub fn label(&self, class_id: usize) -> String {
        self.labels
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class {}", class_id))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NeuralSettings {
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for NeuralSettings {
    fn default() -> Self {
        Self {
            input_size: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 100,
        }
    }
}

/// Stateless detection pipeline; all model state lives in the `ModelHandle`.
#[derive(Clone, Debug, Default)]
pub struct NeuralDetector {
    settings: NeuralSettings,
}

impl NeuralDetector {
    pub fn new(settings: NeuralSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &NeuralSettings {
        &self.settings
    }

    pub fn detect(&self, frame: &Frame, handle: &mut ModelHandle) -> Result<Vec<Detection>> {
        let letterbox = Letterbox::new(&frame.image, handle.network.input_size());
        let prediction = handle.network.infer(&letterbox.to_tensor())?;
        let candidates = decode(
            &prediction,
            handle.labels.len(),
            self.settings.confidence_threshold,
        )?;

        let mut detections: Vec<Detection> = candidates
            .into_iter()
            .filter_map(|c| {
                let bbox = letterbox.restore(c.cx, c.cy, c.w, c.h)?;
                Some(Detection {
                    class_id: c.class_id,
                    label: handle.label(c.class_id),
                    confidence: c.confidence,
                    bbox,
                })
            })
            .collect();

        non_max_suppression(&mut detections, self.settings.iou_threshold, |d| {
            (d.confidence, d.bbox)
        });
        detections.truncate(self.settings.max_detections);
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::io::Write;

    struct FixedNetwork {
        output: Prediction,
    }

    impl DetectionNetwork for FixedNetwork {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn input_size(&self) -> u32 {
            64
        }

        fn infer(&mut self, input: &[f32]) -> Result<Prediction> {
            assert_eq!(input.len(), 3 * 64 * 64);
            Ok(self.output.clone())
        }
    }

    #[test]
    fn class_list_skips_blank_lines() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "person\n\n  car \nbicycle")?;
        let labels = load_class_list(file.path())?;
        assert_eq!(labels, vec!["person", "car", "bicycle"]);
        Ok(())
    }

    #[test]
    fn empty_or_missing_class_lists_fail() -> Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        assert!(matches!(
            load_class_list(file.path()),
            Err(ModelLoadError::EmptyClassList(_))
        ));
        assert!(matches!(
            load_class_list(Path::new("/nonexistent/classes.txt")),
            Err(ModelLoadError::Unreadable { .. })
        ));
        Ok(())
    }

    #[test]
    fn detections_are_rescaled_and_suppressed() -> Result<()> {
        // Two anchors on the same object, one elsewhere; 2 classes.
        #[rustfmt::skip]
        let data = vec![
            16.0, 17.0, 48.0,
            16.0, 16.0, 24.0,
            8.0, 8.0, 8.0,
            8.0, 8.0, 8.0,
            0.9, 0.6, 0.1,
            0.0, 0.0, 0.5,
        ];
        let mut handle = ModelHandle::new(
            Box::new(FixedNetwork {
                output: Prediction::new(vec![1, 6, 3], data),
            }),
            vec!["person".to_string(), "dog".to_string()],
        );
        let frame = Frame::new(RgbImage::new(128, 64), 0);
        let detector = NeuralDetector::new(NeuralSettings::default());

        let detections = detector.detect(&frame, &mut handle)?;
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].label, "person");
        assert_eq!(detections[0].bbox, crate::frame::BoundingBox::from_xywh(24, 24, 16, 16));
        assert_eq!(detections[1].class_id, 1);
        assert_eq!(detections[1].label, "dog");
        assert_eq!(detections[1].bbox, crate::frame::BoundingBox::from_xywh(88, 40, 16, 16));
        Ok(())
    }
}
