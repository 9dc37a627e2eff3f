use anyhow::Result;
use base64::{engine::general_purpose, Engine as _};
use serde_json::Value;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use tempfile::tempdir;

use bigbag_detector::api::{ApiConfig, ApiHandle, ApiServer, AppState};
use bigbag_detector::{
    CameraConfig, Detection, DeviceGate, FramePipeline, SqliteDetectionStore, StillImageService,
    StubBackend,
};

struct TestApi {
    _dir: tempfile::TempDir,
    gate: DeviceGate,
    api_handle: Option<ApiHandle>,
}

impl TestApi {
    fn new(camera_device: &str, detections: Vec<Detection>) -> Result<Self> {
        let dir = tempdir()?;
        let db_path = dir.path().join("database.db");
        let store = Arc::new(SqliteDetectionStore::open(&db_path.to_string_lossy())?);
        let pipeline =
            FramePipeline::with_detector(Arc::new(StubBackend::default().with_detections(detections)));
        let still = StillImageService::new(
            pipeline.clone(),
            store,
            dir.path().join("uploads"),
            dir.path().join("output"),
        );
        still.prepare_dirs()?;

        let gate = DeviceGate::new();
        let state = AppState {
            pipeline,
            still,
            camera: CameraConfig {
                device: camera_device.to_string(),
                target_fps: 0,
                width: 16,
                height: 8,
            },
            gate: gate.clone(),
        };
        let api_config = ApiConfig {
            addr: "127.0.0.1:0".to_string(),
            max_upload_bytes: 1024 * 1024,
        };
        let api_handle = ApiServer::new(api_config, state).spawn()?;
        Ok(Self {
            _dir: dir,
            gate,
            api_handle: Some(api_handle),
        })
    }

    fn addr(&self) -> SocketAddr {
        self.api_handle.as_ref().map(|h| h.addr).expect("api running")
    }

    fn request(&self, raw: &[u8]) -> Result<(String, Vec<u8>)> {
        let mut stream = TcpStream::connect(self.addr())?;
        stream.write_all(raw)?;
        let mut response = Vec::new();
        stream.read_to_end(&mut response)?;
        let split = response
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("response headers");
        let headers = String::from_utf8_lossy(&response[..split]).to_string();
        Ok((headers, response[split + 4..].to_vec()))
    }

    fn get(&self, path: &str) -> Result<(String, Vec<u8>)> {
        self.request(format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n").as_bytes())
    }

    fn post(&self, path: &str, content_type: &str, body: &[u8]) -> Result<(String, Vec<u8>)> {
        let mut raw = format!(
            "POST {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\r\n",
            body.len()
        )
        .into_bytes();
        raw.extend_from_slice(body);
        self.request(&raw)
    }

    fn upload(&self, file_name: &str, data: &[u8]) -> Result<(String, Vec<u8>)> {
        let boundary = "testboundary42";
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        self.post(
            "/predict",
            &format!("multipart/form-data; boundary={boundary}"),
            &body,
        )
    }
}

impl Drop for TestApi {
    fn drop(&mut self) {
        if let Some(handle) = self.api_handle.take() {
            let _ = handle.stop();
        }
    }
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    image::RgbImage::new(width, height)
        .write_to(&mut buf, image::ImageFormat::Png)
        .expect("encode png");
    buf.into_inner()
}

fn bag_detections() -> Vec<Detection> {
    vec![
        Detection::new(2.0, 2.0, 20.0, 20.0, 0.91, 0),
        Detection::new(4.0, 4.0, 12.0, 12.0, 0.60, 0),
        Detection::new(22.0, 22.0, 30.0, 30.0, 0.99, 1),
    ]
}

fn history_json(api: &TestApi) -> Result<Value> {
    let (headers, body) = api.get("/history.json")?;
    assert!(headers.starts_with("HTTP/1.1 200"));
    Ok(serde_json::from_slice(&body)?)
}

#[test]
fn upload_renders_count_and_records_history() -> Result<()> {
    let api = TestApi::new("stub://cam", bag_detections())?;

    let (headers, body) = api.upload("bags.png", &png_bytes(32, 32))?;
    assert!(headers.starts_with("HTTP/1.1 200"), "{headers}");
    let html = String::from_utf8(body)?;
    assert!(html.contains("bigbag_count: <strong>1</strong>"));

    let history = history_json(&api)?;
    let records = history.as_array().expect("array");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["image_name"], "bags.png");
    assert_eq!(records[0]["count"], 1);

    let start = html.find("/output/").expect("output link") + "/output/".len();
    let end = start + html[start..].find('"').expect("closing quote");
    let (headers, jpeg) = api.get(&format!("/output/{}", &html[start..end]))?;
    assert!(headers.contains("Content-Type: image/jpeg"));
    assert!(image::load_from_memory(&jpeg).is_ok());

    let (_, body) = api.get("/history")?;
    assert!(String::from_utf8(body)?.contains("<td>bags.png</td><td>1</td>"));
    Ok(())
}

#[test]
fn upload_without_detections_records_zero() -> Result<()> {
    let api = TestApi::new("stub://cam", Vec::new())?;
    let (headers, _) = api.upload("empty.png", &png_bytes(8, 8))?;
    assert!(headers.starts_with("HTTP/1.1 200"));
    assert_eq!(history_json(&api)?[0]["count"], 0);
    Ok(())
}

#[test]
fn missing_or_empty_upload_redirects_home() -> Result<()> {
    let api = TestApi::new("stub://cam", bag_detections())?;

    let (headers, _) = api.upload("", b"")?;
    assert!(headers.starts_with("HTTP/1.1 303"), "{headers}");
    assert!(headers.contains("Location: /"));

    let (headers, _) = api.post("/predict", "text/plain", b"nothing")?;
    assert!(headers.starts_with("HTTP/1.1 303"));

    assert_eq!(history_json(&api)?.as_array().map(Vec::len), Some(0));
    Ok(())
}

#[test]
fn predict_camera_returns_target_boxes() -> Result<()> {
    let api = TestApi::new("stub://cam", bag_detections())?;
    let payload = general_purpose::STANDARD.encode(png_bytes(32, 32));
    let body = serde_json::json!({ "image": format!("data:image/png;base64,{payload}") });

    let (headers, body) = api.post("/predict_camera", "application/json", body.to_string().as_bytes())?;
    assert!(headers.contains("Content-Type: application/json"));
    let json: Value = serde_json::from_slice(&body)?;
    assert_eq!(
        json,
        serde_json::json!({
            "status": "success",
            "count": 1,
            "bigbags": [{"x": 2, "y": 2, "width": 18, "height": 18}]
        })
    );
    // Snapshots are never persisted.
    assert_eq!(history_json(&api)?.as_array().map(Vec::len), Some(0));
    Ok(())
}

#[test]
fn predict_camera_reports_bad_input_as_json() -> Result<()> {
    let api = TestApi::new("stub://cam", Vec::new())?;
    for body in [
        &br#"{"image": "data:image/png;base64,!!!"}"#[..],
        &b"not json"[..],
    ] {
        let (headers, body) = api.post("/predict_camera", "application/json", body)?;
        assert!(headers.starts_with("HTTP/1.1 200"));
        let json: Value = serde_json::from_slice(&body)?;
        assert_eq!(json["status"], "error");
        assert!(json["message"].is_string());
    }
    Ok(())
}

#[test]
fn video_feed_streams_one_part_per_frame() -> Result<()> {
    let api = TestApi::new("stub://cam?frames=2", bag_detections())?;
    let (headers, body) = api.get("/video_feed")?;
    assert!(headers.contains("Content-Type: multipart/x-mixed-replace; boundary=frame"));

    let parts = body
        .windows(b"--frame\r\n".len())
        .filter(|w| *w == b"--frame\r\n")
        .count();
    assert_eq!(parts, 2);
    assert!(!api.gate.is_busy());
    Ok(())
}

#[test]
fn video_feed_is_empty_when_camera_fails_to_open() -> Result<()> {
    let api = TestApi::new("stub://fail", Vec::new())?;
    let (headers, body) = api.get("/video_feed")?;
    assert!(headers.starts_with("HTTP/1.1 200"));
    assert!(body.is_empty());
    Ok(())
}

#[test]
fn video_feed_is_empty_while_camera_is_busy() -> Result<()> {
    let api = TestApi::new("stub://cam?frames=3", Vec::new())?;
    let lease = api.gate.try_acquire()?;
    let (_, body) = api.get("/video_feed")?;
    assert!(body.is_empty());

    drop(lease);
    let (_, body) = api.get("/video_feed")?;
    assert!(!body.is_empty());
    Ok(())
}

#[test]
fn unknown_routes_and_methods_are_rejected() -> Result<()> {
    let api = TestApi::new("stub://cam", Vec::new())?;
    let (headers, _) = api.get("/nope")?;
    assert!(headers.starts_with("HTTP/1.1 404"));
    let (headers, _) = api.get("/predict")?;
    assert!(headers.starts_with("HTTP/1.1 405"));
    let (headers, _) = api.get("/output/..")?;
    assert!(headers.starts_with("HTTP/1.1 404"));
    let (headers, body) = api.get("/health")?;
    assert!(headers.starts_with("HTTP/1.1 200"));
    assert_eq!(body, br#"{"status":"ok"}"#);
    Ok(())
}
