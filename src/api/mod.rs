//! HTTP surface of the detection service.
//!
//! A non-blocking accept loop hands each connection to its own thread; the
//! pipeline then runs synchronously on that thread. `/video_feed` holds its
//! connection for the life of the stream session.

mod http;
mod multipart;
mod pages;

use anyhow::{anyhow, Result};
use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::camera::{CameraConfig, DeviceGate};
use crate::pipeline::FramePipeline;
use crate::snapshot::handle_snapshot_body;
use crate::still::{sanitize_file_name, StillImageService};
use crate::stream::{StreamSession, STREAM_CONTENT_TYPE};

use http::{
    read_request, write_html_response, write_json_response, write_redirect, write_response,
    write_streaming_header, HttpRequest, RequestTooLarge,
};

/// Allowance for multipart framing on top of the upload itself.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;
const INTERNAL_ERROR_MESSAGE: &str =
    "An error occurred while processing the image. Check the server log for details.";

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub max_upload_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:5000".to_string(),
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Everything a request handler needs, shared by all connection threads.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: FramePipeline,
    pub still: StillImageService,
    pub camera: CameraConfig,
    pub gate: DeviceGate,
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    /// Stop accepting connections. Open streams end at their next frame.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, state: AppState) -> Self {
        Self { cfg, state }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = self.cfg;
        let state = self.state;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, cfg, state, shutdown_thread) {
                log::error!("http api stopped: {}", err);
            }
        });
        log::info!("http api listening on {}", addr);

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    cfg: ApiConfig,
    state: AppState,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let cfg = cfg.clone();
                let state = state.clone();
                let shutdown = shutdown.clone();
                std::thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &cfg, &state, &shutdown) {
                        log::warn!("request from {} failed: {:#}", peer, err);
                    }
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    cfg: &ApiConfig,
    state: &AppState,
    shutdown: &AtomicBool,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;

    let request = match read_request(&mut stream, cfg.max_upload_bytes + FORM_OVERHEAD_BYTES) {
        Ok(request) => request,
        Err(err) if err.is::<RequestTooLarge>() => {
            write_json_response(&mut stream, 413, r#"{"error":"payload_too_large"}"#)?;
            return Err(err);
        }
        Err(err) => {
            write_json_response(&mut stream, 400, r#"{"error":"bad_request"}"#)?;
            return Err(err);
        }
    };
    log::debug!("{} {}", request.method, request.path);

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/") => write_html_response(&mut stream, 200, &pages::index_page()),
        ("POST", "/predict") => handle_predict(&mut stream, &request, state),
        ("GET", "/video_feed") => handle_video_feed(&mut stream, state, shutdown),
        ("POST", "/predict_camera") => {
            let response = handle_snapshot_body(&state.pipeline, &request.body);
            let payload = serde_json::to_vec(&response)?;
            write_response(&mut stream, 200, "application/json", &payload)
        }
        ("GET", "/history") => handle_history(&mut stream, state, false),
        ("GET", "/history.json") => handle_history(&mut stream, state, true),
        ("GET", "/health") => write_json_response(&mut stream, 200, r#"{"status":"ok"}"#),
        ("GET", path) if path.starts_with("/output/") => {
            handle_output(&mut stream, state, &path["/output/".len()..])
        }
        (
            _,
            "/" | "/predict" | "/video_feed" | "/predict_camera" | "/history" | "/history.json"
            | "/health",
        ) => write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#),
        _ => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    }
}

fn handle_predict(stream: &mut TcpStream, request: &HttpRequest, state: &AppState) -> Result<()> {
    let upload = request
        .header("content-type")
        .and_then(multipart::boundary_from_content_type)
        .and_then(|boundary| match multipart::parse_form_data(&request.body, &boundary) {
            Ok(parts) => Some(parts),
            Err(err) => {
                log::warn!("malformed upload form: {:#}", err);
                None
            }
        })
        .and_then(|parts| parts.into_iter().find(|part| part.name == "file"));

    let Some(file) = upload else {
        log::warn!("upload rejected: no file part");
        return write_redirect(stream, "/");
    };
    let file_name = file.file_name.unwrap_or_default();
    if file_name.is_empty() || file.data.is_empty() {
        log::warn!("upload rejected: no file selected");
        return write_redirect(stream, "/");
    }

    match state.still.process_upload(&file_name, &file.data) {
        Ok(outcome) => write_html_response(
            stream,
            200,
            &pages::result_page(&outcome.image_name, outcome.target_count, &outcome.output_name),
        ),
        Err(err) if err.is_client_error() => {
            log::warn!("upload {} rejected: {}", file_name, err);
            write_redirect(stream, "/")
        }
        Err(err) => {
            log::error!("upload {} failed: {}", file_name, err);
            write_response(
                stream,
                500,
                "text/plain; charset=utf-8",
                INTERNAL_ERROR_MESSAGE.as_bytes(),
            )
        }
    }
}

fn handle_video_feed(stream: &mut TcpStream, state: &AppState, shutdown: &AtomicBool) -> Result<()> {
    let session = StreamSession::new(
        state.camera.clone(),
        state.gate.clone(),
        state.pipeline.clone(),
    );
    write_streaming_header(stream, STREAM_CONTENT_TYPE)?;
    for chunk in session {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        if let Err(err) = stream.write_all(&chunk).and_then(|_| stream.flush()) {
            log::info!("video feed consumer went away: {}", err);
            break;
        }
    }
    Ok(())
}

fn handle_history(stream: &mut TcpStream, state: &AppState, as_json: bool) -> Result<()> {
    let records = match state.still.store().list() {
        Ok(records) => records,
        Err(err) => {
            log::error!("history unavailable: {}", err);
            return write_response(
                stream,
                500,
                "text/plain; charset=utf-8",
                b"History is unavailable. Check the server log for details.",
            );
        }
    };
    if as_json {
        let payload = serde_json::to_vec(&records)?;
        write_response(stream, 200, "application/json", &payload)
    } else {
        write_html_response(stream, 200, &pages::history_page(&records))
    }
}

fn handle_output(stream: &mut TcpStream, state: &AppState, requested: &str) -> Result<()> {
    let name = match sanitize_file_name(requested) {
        Ok(name) if name == requested => name,
        _ => return write_json_response(stream, 404, r#"{"error":"not_found"}"#),
    };
    match std::fs::read(state.still.output_dir().join(&name)) {
        Ok(bytes) => write_response(stream, 200, content_type_for(&name), &bytes),
        Err(_) => write_json_response(stream, 404, r#"{"error":"not_found"}"#),
    }
}

fn content_type_for(name: &str) -> &'static str {
    let ext = name.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => "application/octet-stream",
    }
}
