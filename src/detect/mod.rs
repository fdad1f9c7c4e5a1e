mod backend;
mod backends;
pub mod labels;
mod result;

use std::path::Path;

use anyhow::Result;

pub use backend::Detector;
pub use backends::{ScriptedBackend, ScriptedReply};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{non_maximum_suppression, BoundingBox, Detection, NormalizedBox};

/// Load the ONNX detector at `model_path` with the given label vocabulary.
pub fn load_model(model_path: &Path, labels: Vec<String>) -> Result<Box<dyn Detector>> {
    #[cfg(feature = "backend-tract")]
    {
        let mut backend = TractBackend::new(model_path, labels)?;
        backend.warm_up()?;
        Ok(Box::new(backend))
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        let _ = labels;
        Err(anyhow::anyhow!(
            "loading {} requires the backend-tract feature",
            model_path.display()
        ))
    }
}
