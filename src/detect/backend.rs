use anyhow::Result;
use std::path::Path;

use super::result::Prediction;
use super::{ModelHandle, ModelLoadError};

/// An inference engine behind a loaded model.
///
/// Implementations receive a normalized `1 x 3 x S x S` CHW tensor (RGB,
/// values in `[0, 1]`) where `S` is `input_size()`, and return the first
/// output tensor unchanged.
pub trait DetectionNetwork: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Square input resolution expected by the model.
    fn input_size(&self) -> u32;

    fn infer(&mut self, input: &[f32]) -> Result<Prediction>;
}

/// Builds a `ModelHandle` from a model file and a class-list file.
pub trait ModelLoader: Send {
    fn load(&self, model_path: &Path, classes_path: &Path) -> Result<ModelHandle, ModelLoadError>;
}
