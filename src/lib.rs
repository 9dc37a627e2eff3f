//! BigBag detection service
//!
//! Detects bulk bags ("BigBags") in still images, single browser snapshots and
//! a live camera stream, annotates them, and keeps an append-only history of
//! per-image counts.
//!
//! # Module Structure
//!
//! - `detect`: Detector capability (stub and ONNX backends, YOLO decoding)
//! - `pipeline`: Confidence filter, target count, annotation, JPEG encoding
//! - `annotate`: Box and label drawing
//! - `camera`: Frame sources (synthetic, V4L2) and exclusive device access
//! - `stream`: Live multipart JPEG session state machine
//! - `snapshot`: Data-URL frame in, JSON coordinates out
//! - `still`: Upload in, annotated image and history record out
//! - `storage`: `detections` table on SQLite
//! - `api`: HTTP surface

use rusqlite::{Connection, OpenFlags};

pub mod annotate;
pub mod api;
pub mod camera;
pub mod config;
pub mod detect;
pub mod error;
pub mod pipeline;
pub mod snapshot;
pub mod still;
pub mod storage;
pub mod stream;

pub use annotate::{AnnotationStyle, Annotator, STILL_STYLE, STREAM_STYLE};
pub use api::{ApiConfig, ApiHandle, ApiServer, AppState};
pub use camera::{CameraConfig, CameraSource, DeviceGate};
pub use config::ServiceConfig;
pub use detect::{load_backend, Detection, DetectionBatch, DetectorBackend, StubBackend};
pub use error::PipelineError;
pub use pipeline::{FrameOutcome, FramePipeline, CONFIDENCE_THRESHOLD, TARGET_CLASS_INDEX};
pub use snapshot::{handle_snapshot_body, BoxCoords, SnapshotResponse};
pub use still::{StillImageService, StillOutcome};
pub use storage::{DetectionRecord, DetectionStore, InMemoryDetectionStore, SqliteDetectionStore};
pub use stream::{StreamSession, StreamState};

/// Open a SQLite connection; `file:` paths are treated as URIs.
pub(crate) fn open_db_connection(db_path: &str) -> rusqlite::Result<Connection> {
    if db_path.starts_with("file:") {
        return Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        );
    }
    Connection::open(db_path)
}
