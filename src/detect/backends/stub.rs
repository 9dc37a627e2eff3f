use image::RgbImage;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::DetectionBatch;
use crate::error::PipelineError;

/// Stub backend that returns a scripted batch for every image.
///
/// Deterministic, so the pipeline can be exercised without model weights.
pub struct StubBackend {
    labels: Vec<String>,
    detections: DetectionBatch,
    failure: Option<String>,
}

impl StubBackend {
    pub fn new(labels: Vec<String>) -> Self {
        Self {
            labels,
            detections: Vec::new(),
            failure: None,
        }
    }

    /// Return `detections` from every `detect` call.
    pub fn with_detections(mut self, detections: DetectionBatch) -> Self {
        self.detections = detections;
        self
    }

    /// Fail every `detect` call with an inference error.
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new(vec!["BigBag".to_string()])
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn detect(&self, image: &RgbImage) -> Result<DetectionBatch, PipelineError> {
        if let Some(message) = &self.failure {
            return Err(PipelineError::Inference(message.clone()));
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(PipelineError::Inference("image has no pixels".to_string()));
        }
        Ok(self.detections.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Detection;

    #[test]
    fn stub_backend_returns_scripted_batch() {
        let batch = vec![Detection::new(1.0, 2.0, 3.0, 4.0, 0.9, 0)];
        let backend = StubBackend::default().with_detections(batch.clone());
        let image = RgbImage::new(8, 8);

        assert_eq!(backend.detect(&image).unwrap(), batch);
        assert_eq!(backend.detect(&image).unwrap(), batch);
        assert_eq!(backend.labels(), ["BigBag".to_string()]);
    }

    #[test]
    fn failing_stub_reports_inference_error() {
        let backend = StubBackend::default().failing("model crashed");
        let err = backend.detect(&RgbImage::new(4, 4)).unwrap_err();
        assert!(matches!(err, PipelineError::Inference(msg) if msg == "model crashed"));
    }
}
