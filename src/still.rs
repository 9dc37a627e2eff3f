//! Still-image path: save upload, run pipeline, write annotated output,
//! record the count.
//!
//! Each request writes its own `annotated_<16 hex>.jpg` so concurrent uploads
//! never overwrite each other's result. A record is appended only after the
//! annotated image and the upload have been written.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rand::RngCore;

use crate::annotate::STILL_STYLE;
use crate::detect::DetectionBatch;
use crate::error::PipelineError;
use crate::pipeline::{encode_jpeg, FramePipeline, DEFAULT_JPEG_QUALITY};
use crate::storage::DetectionStore;

#[derive(Clone, Debug)]
pub struct StillOutcome {
    pub record_id: i64,
    pub image_name: String,
    pub upload_path: PathBuf,
    pub output_name: String,
    pub output_path: PathBuf,
    pub target_count: usize,
    pub detections: DetectionBatch,
}

#[derive(Clone)]
pub struct StillImageService {
    pipeline: FramePipeline,
    store: Arc<dyn DetectionStore>,
    upload_dir: PathBuf,
    output_dir: PathBuf,
}

impl StillImageService {
    pub fn new(
        pipeline: FramePipeline,
        store: Arc<dyn DetectionStore>,
        upload_dir: PathBuf,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            pipeline,
            store,
            upload_dir,
            output_dir,
        }
    }

    /// Create the upload and output directories.
    pub fn prepare_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.upload_dir)
            .with_context(|| format!("create upload dir {}", self.upload_dir.display()))?;
        std::fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("create output dir {}", self.output_dir.display()))?;
        Ok(())
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn store(&self) -> &Arc<dyn DetectionStore> {
        &self.store
    }

    /// Process uploaded bytes under the client-supplied file name.
    ///
    /// The upload is saved only once the annotated output exists, so a
    /// rejected or failed request leaves nothing behind in either directory.
    pub fn process_upload(
        &self,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<StillOutcome, PipelineError> {
        let image_name = sanitize_file_name(file_name)?;
        if bytes.is_empty() {
            return Err(PipelineError::Input("uploaded file is empty".to_string()));
        }
        let upload_path = self.upload_dir.join(&image_name);
        self.run(image_name, upload_path, bytes, true)
    }

    /// Process a local image file in place; it is not copied to the upload dir.
    pub fn process_path(&self, path: &Path) -> Result<StillOutcome, PipelineError> {
        let bytes = std::fs::read(path)
            .map_err(|e| PipelineError::Input(format!("read {}: {}", path.display(), e)))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let image_name = sanitize_file_name(&name)?;
        if bytes.is_empty() {
            return Err(PipelineError::Input(format!("{} is empty", path.display())));
        }
        self.run(image_name, path.to_path_buf(), &bytes, false)
    }

    fn run(
        &self,
        image_name: String,
        upload_path: PathBuf,
        bytes: &[u8],
        save_upload: bool,
    ) -> Result<StillOutcome, PipelineError> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| PipelineError::Input(format!("undecodable image {}: {}", image_name, e)))?
            .into_rgb8();
        let outcome = self.pipeline.run(&image, STILL_STYLE)?;
        let jpeg = encode_jpeg(&outcome.annotated, DEFAULT_JPEG_QUALITY)?;
        let count = u32::try_from(outcome.target_count)
            .map_err(|_| PipelineError::Persistence("count exceeds u32 range".to_string()))?;

        let output_name = unique_output_name();
        let output_path = self.output_dir.join(&output_name);
        std::fs::write(&output_path, jpeg).map_err(|e| {
            PipelineError::Persistence(format!("save output {}: {}", output_path.display(), e))
        })?;

        if save_upload {
            if let Err(e) = std::fs::write(&upload_path, bytes) {
                let _ = std::fs::remove_file(&output_path);
                return Err(PipelineError::Persistence(format!(
                    "save upload {}: {}",
                    upload_path.display(),
                    e
                )));
            }
        }

        let record_id =
            match self
                .store
                .append(&image_name, &upload_path.to_string_lossy(), count)
            {
                Ok(id) => id,
                Err(err) => {
                    let _ = std::fs::remove_file(&output_path);
                    if save_upload {
                        let _ = std::fs::remove_file(&upload_path);
                    }
                    return Err(err);
                }
            };

        log::info!(
            "record #{}: {} bigbag_count={} output={}",
            record_id,
            image_name,
            outcome.target_count,
            output_name
        );

        Ok(StillOutcome {
            record_id,
            image_name,
            upload_path,
            output_name,
            output_path,
            target_count: outcome.target_count,
            detections: outcome.detections,
        })
    }
}

/// Strip any client-side directory components from an upload name.
pub fn sanitize_file_name(file_name: &str) -> Result<String, PipelineError> {
    let name = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        return Err(PipelineError::Input("missing file name".to_string()));
    }
    Ok(name.to_string())
}

fn unique_output_name() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("annotated_{}.jpg", hex::encode(bytes))
}
