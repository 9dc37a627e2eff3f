//! Error taxonomy for the detection pipeline.
//!
//! Callers branch on the variant to pick their response: upload and snapshot
//! input problems are user errors, everything else is an internal failure.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Missing, empty or malformed upload / camera payload.
    #[error("invalid input: {0}")]
    Input(String),

    /// The detection model failed on this image.
    #[error("inference failed: {0}")]
    Inference(String),

    /// Camera unavailable, busy, or a frame read failed.
    #[error("camera device error: {0}")]
    Device(String),

    /// Detection store unreachable or the write failed.
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// Compressing an annotated frame failed.
    #[error("encoding failed: {0}")]
    Encoding(String),
}

impl PipelineError {
    /// True for errors caused by what the client sent.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::Input(_))
    }
}

impl From<rusqlite::Error> for PipelineError {
    fn from(err: rusqlite::Error) -> Self {
        PipelineError::Persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_failure_kind() {
        let err = PipelineError::Device("camera busy".to_string());
        assert!(err.to_string().contains("camera device error"));
        assert!(err.to_string().contains("camera busy"));
    }

    #[test]
    fn only_input_errors_are_client_errors() {
        assert!(PipelineError::Input("empty file".into()).is_client_error());
        assert!(!PipelineError::Inference("model".into()).is_client_error());
        assert!(!PipelineError::Persistence("db".into()).is_client_error());
        assert!(!PipelineError::Encoding("jpeg".into()).is_client_error());
        assert!(!PipelineError::Device("open".into()).is_client_error());
    }

    #[test]
    fn sqlite_errors_map_to_persistence() {
        let err: PipelineError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, PipelineError::Persistence(_)));
    }
}
