#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::decode::{decode_rows, InputScale};
use crate::detect::result::DetectionBatch;
use crate::error::PipelineError;

/// Tract-based backend for YOLOv5 ONNX exports.
///
/// Loads a local model file once; `detect` only reads the optimized plan, so
/// one instance is shared by every request.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    width: u32,
    height: u32,
    labels: Vec<String>,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        width: u32,
        height: u32,
        labels: Vec<String>,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            labels,
        })
    }

    fn build_input(&self, image: &RgbImage) -> Tensor {
        let resized = image::imageops::resize(image, self.width, self.height, FilterType::Triangle);
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, self.width as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        input.into_tensor()
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn detect(&self, image: &RgbImage) -> Result<DetectionBatch, PipelineError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(PipelineError::Inference("image has no pixels".to_string()));
        }
        let input = self.build_input(image);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| PipelineError::Inference(format!("ONNX inference failed: {e:#}")))?;
        let output = outputs
            .first()
            .ok_or_else(|| PipelineError::Inference("model produced no outputs".to_string()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| PipelineError::Inference(format!("output tensor was not f32: {e}")))?;
        let row_len = *view
            .shape()
            .last()
            .ok_or_else(|| PipelineError::Inference("output tensor has no shape".to_string()))?;
        let data: Vec<f32> = view.iter().copied().collect();

        let scale = InputScale::new(image.width(), image.height(), self.width, self.height);
        Ok(decode_rows(&data, row_len, scale))
    }

    fn warm_up(&self) -> Result<(), PipelineError> {
        self.detect(&RgbImage::new(self.width, self.height)).map(|_| ())
    }
}
