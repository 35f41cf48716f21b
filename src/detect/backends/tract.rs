#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectionNetwork, ModelLoader};
use crate::detect::result::Prediction;
use crate::detect::{load_class_list, ModelHandle, ModelLoadError};

type TractPlan = TypedRunnableModel<TypedModel>;

/// Tract-based ONNX network.
///
/// Loads a local model file once and runs it on letterboxed RGB tensors.
pub struct TractNetwork {
    model: TractPlan,
    input_size: u32,
}

impl TractNetwork {
    /// Load an ONNX model from disk and prepare it for `size x size` input.
    pub fn new<P: AsRef<Path>>(model_path: P, size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size: size,
        })
    }
}

impl DetectionNetwork for TractNetwork {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn infer(&mut self, input: &[f32]) -> Result<Prediction> {
        let side = self.input_size as usize;
        let tensor = tract_ndarray::Array4::from_shape_vec((1, 3, side, side), input.to_vec())
            .context("input tensor does not match the model resolution")?
            .into_tensor();
        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        Ok(Prediction::new(
            view.shape().to_vec(),
            view.iter().copied().collect(),
        ))
    }
}

/// Loads ONNX detection models through tract.
#[derive(Clone, Debug)]
pub struct TractModelLoader {
    input_size: u32,
}

impl TractModelLoader {
    pub fn new(input_size: u32) -> Self {
        Self { input_size }
    }
}

impl ModelLoader for TractModelLoader {
    fn load(&self, model_path: &Path, classes_path: &Path) -> Result<ModelHandle, ModelLoadError> {
        std::fs::metadata(model_path).map_err(|source| ModelLoadError::Unreadable {
            path: model_path.to_path_buf(),
            source,
        })?;
        let labels = load_class_list(classes_path)?;
        let network = TractNetwork::new(model_path, self.input_size).map_err(|err| {
            ModelLoadError::Malformed {
                path: model_path.to_path_buf(),
                reason: format!("{:#}", err),
            }
        })?;
        log::info!(
            "TractModelLoader: loaded {} ({} classes, {}x{} input)",
            model_path.display(),
            labels.len(),
            self.input_size,
            self.input_size
        );
        Ok(ModelHandle::new(Box::new(network), labels))
    }
}
