//! Frame pipeline: detect, filter and count, annotate.
//!
//! The still-image, snapshot and live-stream paths all run the same sequence
//! through [`FramePipeline`]; they only differ in where the image comes from
//! and what they do with the outcome.

pub mod encode;
pub mod filter;

use std::sync::Arc;

use image::RgbImage;

use crate::annotate::{AnnotationStyle, Annotator};
use crate::detect::{DetectionBatch, DetectorBackend};
use crate::error::PipelineError;

pub use encode::{encode_jpeg, DEFAULT_JPEG_QUALITY};
pub use filter::{
    count_target, filter_and_count, filter_confident, CONFIDENCE_THRESHOLD, TARGET_CLASS_INDEX,
};

/// Result of one pipeline run.
#[derive(Clone, Debug)]
pub struct FrameOutcome {
    pub annotated: RgbImage,
    pub target_count: usize,
    pub detections: DetectionBatch,
}

/// Detections and count from an in-place run.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameSummary {
    pub target_count: usize,
    pub detections: DetectionBatch,
}

#[derive(Clone)]
pub struct FramePipeline {
    detector: Arc<dyn DetectorBackend>,
    annotator: Arc<Annotator>,
}

impl FramePipeline {
    pub fn new(detector: Arc<dyn DetectorBackend>, annotator: Arc<Annotator>) -> Self {
        Self {
            detector,
            annotator,
        }
    }

    /// Pipeline with an annotator built from the detector's label table.
    pub fn with_detector(detector: Arc<dyn DetectorBackend>) -> Self {
        let annotator = Arc::new(Annotator::new(detector.labels().to_vec()));
        Self::new(detector, annotator)
    }

    pub fn detector(&self) -> &Arc<dyn DetectorBackend> {
        &self.detector
    }

    pub fn annotator(&self) -> &Annotator {
        &self.annotator
    }

    /// Run on `image`, drawing onto a copy.
    pub fn run(
        &self,
        image: &RgbImage,
        style: AnnotationStyle,
    ) -> Result<FrameOutcome, PipelineError> {
        let FrameSummary {
            target_count,
            detections,
        } = self.detect_and_count(image)?;
        let annotated = self.annotator.annotate(image, &detections, style);
        Ok(FrameOutcome {
            annotated,
            target_count,
            detections,
        })
    }

    /// Run on `frame`, drawing directly onto it.
    pub fn run_in_place(
        &self,
        frame: &mut RgbImage,
        style: AnnotationStyle,
    ) -> Result<FrameSummary, PipelineError> {
        let summary = self.detect_and_count(frame)?;
        self.annotator
            .annotate_in_place(frame, &summary.detections, style);
        Ok(summary)
    }

    fn detect_and_count(&self, image: &RgbImage) -> Result<FrameSummary, PipelineError> {
        let raw = self.detector.detect(image)?;
        let (detections, target_count) = filter_and_count(raw);
        Ok(FrameSummary {
            target_count,
            detections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::{STILL_STYLE, STREAM_STYLE};
    use crate::detect::{Detection, StubBackend};
    use image::Rgb;

    fn scenario_a() -> Vec<Detection> {
        vec![
            Detection::new(2.0, 2.0, 12.0, 12.0, 0.9, 0),
            Detection::new(3.0, 3.0, 13.0, 13.0, 0.5, 0),
            Detection::new(14.0, 14.0, 28.0, 28.0, 0.95, 1),
        ]
    }

    fn pipeline(batch: Vec<Detection>) -> FramePipeline {
        FramePipeline::with_detector(Arc::new(StubBackend::default().with_detections(batch)))
    }

    #[test]
    fn filters_counts_and_annotates() {
        let image = RgbImage::new(32, 32);
        let outcome = pipeline(scenario_a()).run(&image, STILL_STYLE).unwrap();

        assert_eq!(outcome.target_count, 1);
        assert_eq!(outcome.detections.len(), 2);
        assert_eq!(outcome.detections[0].confidence, 0.9);
        assert_eq!(outcome.detections[1].class_index, 1);
        assert_eq!(*outcome.annotated.get_pixel(2, 2), STILL_STYLE.box_color);
        assert_eq!(*image.get_pixel(2, 2), Rgb([0, 0, 0]));
    }

    #[test]
    fn empty_detections_leave_image_unchanged() {
        let image = RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]));
        let outcome = pipeline(Vec::new()).run(&image, STILL_STYLE).unwrap();
        assert_eq!(outcome.target_count, 0);
        assert!(outcome.detections.is_empty());
        assert_eq!(outcome.annotated, image);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let image = RgbImage::new(32, 32);
        let p = pipeline(scenario_a());
        let first = p.run(&image, STILL_STYLE).unwrap();
        let second = p.run(&image, STILL_STYLE).unwrap();
        assert_eq!(first.detections, second.detections);
        assert_eq!(first.target_count, second.target_count);
        assert_eq!(first.annotated, second.annotated);
    }

    #[test]
    fn in_place_run_draws_on_the_frame() {
        let mut frame = RgbImage::new(32, 32);
        let summary = pipeline(scenario_a())
            .run_in_place(&mut frame, STREAM_STYLE)
            .unwrap();
        assert_eq!(summary.target_count, 1);
        assert_eq!(*frame.get_pixel(2, 2), STREAM_STYLE.box_color);
    }

    #[test]
    fn detector_failure_propagates() {
        let p = FramePipeline::with_detector(Arc::new(StubBackend::default().failing("boom")));
        let err = p.run(&RgbImage::new(4, 4), STILL_STYLE).unwrap_err();
        assert!(matches!(err, PipelineError::Inference(_)));
    }

    #[test]
    fn unknown_class_is_annotated_without_error() {
        let batch = vec![Detection::new(1.0, 1.0, 9.0, 9.0, 0.99, 42)];
        let p = pipeline(batch);
        let outcome = p.run(&RgbImage::new(16, 16), STILL_STYLE).unwrap();
        assert_eq!(outcome.target_count, 0);
        assert_eq!(
            p.annotator().label_for(&outcome.detections[0]),
            "Class 42 0.99"
        );
    }
}
