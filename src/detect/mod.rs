//! Detection model capability.
//!
//! The model is opaque to the rest of the crate: given a decoded RGB image a
//! backend returns raw detections. Which backend runs is decided once at
//! startup by [`load_backend`]; the result is shared read-only afterwards.

mod backend;
mod backends;
pub mod decode;
mod result;

use std::sync::Arc;

use anyhow::Result;

use crate::config::DetectorSettings;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{Detection, DetectionBatch};

/// Load the configured detector.
///
/// A configured `model_path` requires the `backend-tract` feature; without a
/// model path the stub backend runs and reports no detections.
pub fn load_backend(settings: &DetectorSettings) -> Result<Arc<dyn DetectorBackend>> {
    let backend: Arc<dyn DetectorBackend> = match &settings.model_path {
        #[cfg(feature = "backend-tract")]
        Some(path) => Arc::new(TractBackend::new(
            path,
            settings.input_width,
            settings.input_height,
            settings.labels.clone(),
        )?),
        #[cfg(not(feature = "backend-tract"))]
        Some(path) => {
            return Err(anyhow::anyhow!(
                "model {} configured but the backend-tract feature is disabled",
                path.display()
            ))
        }
        None => {
            log::warn!("no model_path configured; using stub detector (no detections)");
            Arc::new(StubBackend::new(settings.labels.clone()))
        }
    };
    backend.warm_up()?;
    log::info!(
        "detector '{}' loaded with {} class labels",
        backend.name(),
        backend.labels().len()
    );
    Ok(backend)
}
