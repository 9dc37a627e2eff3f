//! Single client-submitted frame → target-class coordinates.

use base64::{engine::general_purpose, Engine as _};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::annotate::STILL_STYLE;
use crate::detect::Detection;
use crate::error::PipelineError;
use crate::pipeline::{FramePipeline, TARGET_CLASS_INDEX};

#[derive(Debug, Deserialize)]
pub struct SnapshotRequest {
    /// `data:image/...;base64,<payload>` or a bare base64 payload.
    pub image: String,
}

/// Top-left corner and size in whole pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BoxCoords {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl From<&Detection> for BoxCoords {
    fn from(det: &Detection) -> Self {
        Self {
            x: det.x1 as i32,
            y: det.y1 as i32,
            width: (det.x2 - det.x1) as i32,
            height: (det.y2 - det.y1) as i32,
        }
    }
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SnapshotResponse {
    Success {
        count: usize,
        bigbags: Vec<BoxCoords>,
    },
    Error {
        message: String,
    },
}

impl SnapshotResponse {
    pub fn error(err: &PipelineError) -> Self {
        SnapshotResponse::Error {
            message: err.to_string(),
        }
    }
}

/// Extract and base64-decode the payload of a data URL.
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>, PipelineError> {
    let payload = match data_url.split_once(',') {
        Some((_, payload)) => payload,
        None => data_url,
    }
    .trim();
    if payload.is_empty() {
        return Err(PipelineError::Input("image payload is empty".to_string()));
    }
    general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| PipelineError::Input(format!("invalid base64 payload: {}", e)))
}

/// Decode a data URL into RGB pixels.
pub fn decode_snapshot_image(data_url: &str) -> Result<RgbImage, PipelineError> {
    let bytes = decode_data_url(data_url)?;
    let image = image::load_from_memory(&bytes)
        .map_err(|e| PipelineError::Input(format!("undecodable image: {}", e)))?;
    Ok(image.into_rgb8())
}

/// Run the pipeline once on a submitted frame.
pub fn predict_snapshot(
    pipeline: &FramePipeline,
    data_url: &str,
) -> Result<SnapshotResponse, PipelineError> {
    let image = decode_snapshot_image(data_url)?;
    let outcome = pipeline.run(&image, STILL_STYLE)?;
    let bigbags = outcome
        .detections
        .iter()
        .filter(|det| det.class_index == TARGET_CLASS_INDEX)
        .map(BoxCoords::from)
        .collect();
    Ok(SnapshotResponse::Success {
        count: outcome.target_count,
        bigbags,
    })
}

/// Handle a raw JSON request body; every failure becomes an error response.
pub fn handle_snapshot_body(pipeline: &FramePipeline, body: &[u8]) -> SnapshotResponse {
    let request: SnapshotRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => {
            let err = PipelineError::Input(format!("invalid request body: {}", e));
            log::warn!("snapshot rejected: {}", err);
            return SnapshotResponse::error(&err);
        }
    };
    match predict_snapshot(pipeline, &request.image) {
        Ok(response) => response,
        Err(err) => {
            if err.is_client_error() {
                log::warn!("snapshot rejected: {}", err);
            } else {
                log::error!("snapshot failed: {}", err);
            }
            SnapshotResponse::error(&err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StubBackend;
    use crate::pipeline::{encode_jpeg, DEFAULT_JPEG_QUALITY};
    use std::sync::Arc;

    fn data_url(image: &RgbImage) -> String {
        let jpeg = encode_jpeg(image, DEFAULT_JPEG_QUALITY).unwrap();
        format!(
            "data:image/jpeg;base64,{}",
            general_purpose::STANDARD.encode(jpeg)
        )
    }

    fn pipeline(batch: Vec<Detection>) -> FramePipeline {
        FramePipeline::with_detector(Arc::new(StubBackend::default().with_detections(batch)))
    }

    #[test]
    fn reports_target_class_boxes_only() {
        let p = pipeline(vec![
            Detection::new(10.7, 20.2, 50.9, 60.5, 0.9, 0),
            Detection::new(1.0, 1.0, 5.0, 5.0, 0.5, 0),
            Detection::new(3.0, 3.0, 9.0, 9.0, 0.97, 1),
        ]);
        let response = predict_snapshot(&p, &data_url(&RgbImage::new(64, 64))).unwrap();
        assert_eq!(
            response,
            SnapshotResponse::Success {
                count: 1,
                bigbags: vec![BoxCoords {
                    x: 10,
                    y: 20,
                    width: 40,
                    height: 40,
                }],
            }
        );
    }

    #[test]
    fn accepts_bare_base64_payload() {
        let url = data_url(&RgbImage::new(8, 8));
        let bare = url.split_once(',').unwrap().1;
        assert!(decode_snapshot_image(bare).is_ok());
    }

    #[test]
    fn success_serializes_with_status_tag() {
        let json = serde_json::to_value(SnapshotResponse::Success {
            count: 0,
            bigbags: Vec::new(),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "success", "count": 0, "bigbags": []})
        );
    }

    #[test]
    fn bad_base64_is_a_structured_error() {
        let body = br#"{"image": "data:image/png;base64,@@not-base64@@"}"#;
        let response = handle_snapshot_body(&pipeline(Vec::new()), body);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "error");
        assert!(json["message"].as_str().unwrap().contains("base64"));
    }

    #[test]
    fn undecodable_image_is_a_structured_error() {
        let payload = general_purpose::STANDARD.encode(b"definitely not an image");
        let body = serde_json::json!({ "image": format!("data:image/png;base64,{payload}") });
        let response = handle_snapshot_body(&pipeline(Vec::new()), body.to_string().as_bytes());
        assert!(matches!(response, SnapshotResponse::Error { .. }));
    }

    #[test]
    fn missing_image_field_is_a_structured_error() {
        let response = handle_snapshot_body(&pipeline(Vec::new()), b"{}");
        assert!(matches!(response, SnapshotResponse::Error { .. }));
    }

    #[test]
    fn inference_failure_is_a_structured_error() {
        let p = FramePipeline::with_detector(Arc::new(StubBackend::default().failing("gpu lost")));
        let body = serde_json::json!({ "image": data_url(&RgbImage::new(8, 8)) });
        let response = handle_snapshot_body(&p, body.to_string().as_bytes());
        assert_eq!(
            response,
            SnapshotResponse::Error {
                message: "inference failed: gpu lost".to_string()
            }
        );
    }
}
