#[cfg(feature = "backend-tract")]
pub mod tract;

#[cfg(feature = "backend-tract")]
pub use tract::{TractModelLoader, TractNetwork};

use std::path::Path;

use super::backend::ModelLoader;
use super::{ModelHandle, ModelLoadError};

/// Loader used when no inference backend is compiled in.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnavailableModelLoader;

impl ModelLoader for UnavailableModelLoader {
    fn load(&self, _model: &Path, _classes: &Path) -> Result<ModelHandle, ModelLoadError> {
        Err(ModelLoadError::BackendUnavailable)
    }
}

/// The best loader available in this build.
pub fn default_loader(input_size: u32) -> Box<dyn ModelLoader> {
    #[cfg(feature = "backend-tract")]
    {
        Box::new(TractModelLoader::new(input_size))
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        let _ = input_size;
        Box::new(UnavailableModelLoader)
    }
}
