use image::RgbImage;

use crate::detect::result::DetectionBatch;
use crate::error::PipelineError;

/// Detector backend trait.
///
/// The model is loaded once at startup and shared read-only by every request,
/// so detection takes `&self` and backends must be `Send + Sync`.
/// Implementations must not mutate model state from `detect`.
pub trait DetectorBackend: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Class label table, indexed by class index.
    fn labels(&self) -> &[String];

    /// Run detection on one RGB image and return raw, unfiltered detections.
    fn detect(&self, image: &RgbImage) -> Result<DetectionBatch, PipelineError>;

    /// Optional warm-up hook.
    fn warm_up(&self) -> Result<(), PipelineError> {
        Ok(())
    }
}
