//! Live camera stream driver.
//!
//! A [`StreamSession`] is a pull-based state machine:
//!
//! ```text
//! Opening --device ok--> Streaming --read fails--> Closed
//!    \                       \--consumer drops-----> Closed
//!     \--device busy / open fails-----------------> Closed
//! ```
//!
//! Each `next()` in `Streaming` reads one frame, runs the frame pipeline on it
//! in place and yields one `multipart/x-mixed-replace` part. The consumer
//! cancels by dropping the session; the camera and its lease are released
//! before any further read can happen. `Closed` is terminal.

use image::RgbImage;

use crate::annotate::STREAM_STYLE;
use crate::camera::{CameraConfig, CameraFrame, CameraLease, CameraSource, DeviceGate};
use crate::error::PipelineError;
use crate::pipeline::{encode_jpeg, FramePipeline, DEFAULT_JPEG_QUALITY};

pub const MULTIPART_BOUNDARY: &str = "frame";
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    Opening,
    Streaming,
    Closed,
}

pub struct StreamSession {
    state: StreamState,
    config: CameraConfig,
    gate: DeviceGate,
    pipeline: FramePipeline,
    camera: Option<CameraSource>,
    lease: Option<CameraLease>,
    frames_sent: u64,
    frames_skipped: u64,
    jpeg_quality: u8,
}

impl StreamSession {
    pub fn new(config: CameraConfig, gate: DeviceGate, pipeline: FramePipeline) -> Self {
        Self {
            state: StreamState::Opening,
            config,
            gate,
            pipeline,
            camera: None,
            lease: None,
            frames_sent: 0,
            frames_skipped: 0,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }

    /// Release the camera and move to `Closed`. Idempotent.
    pub fn close(&mut self) {
        if self.state == StreamState::Closed {
            return;
        }
        let summary = self.close_summary();
        // Camera before lease: the next session must find the device free.
        self.camera = None;
        self.lease = None;
        self.state = StreamState::Closed;
        if let Some(summary) = summary {
            log::info!("{}", summary);
        }
    }

    /// Closing line for a session that got as far as streaming.
    fn close_summary(&self) -> Option<String> {
        (self.state == StreamState::Streaming).then(|| {
            format!(
                "stream on {} closed after {} frames ({} skipped)",
                self.config.device, self.frames_sent, self.frames_skipped
            )
        })
    }

    fn open(&mut self) -> Result<(), PipelineError> {
        let lease = self.gate.try_acquire()?;
        let mut camera = CameraSource::new(self.config.clone())
            .map_err(|e| PipelineError::Device(format!("{e:#}")))?;
        camera
            .connect()
            .map_err(|e| PipelineError::Device(format!("{e:#}")))?;
        self.lease = Some(lease);
        self.camera = Some(camera);
        log::info!("stream on {} opened", self.config.device);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<CameraFrame, PipelineError> {
        let camera = self
            .camera
            .as_mut()
            .ok_or_else(|| PipelineError::Device("camera not open".to_string()))?;
        camera
            .next_frame()
            .map_err(|e| PipelineError::Device(format!("{e:#}")))
    }

    fn process(&self, frame: CameraFrame) -> Result<Vec<u8>, PipelineError> {
        let mut image: RgbImage = frame
            .into_rgb_image()
            .map_err(|e| PipelineError::Device(format!("{e:#}")))?;
        self.pipeline.run_in_place(&mut image, STREAM_STYLE)?;
        let jpeg = encode_jpeg(&image, self.jpeg_quality)?;
        Ok(multipart_part(&jpeg))
    }

    fn next_chunk(&mut self) -> Option<Vec<u8>> {
        loop {
            let frame = match self.read_frame() {
                Ok(frame) => frame,
                Err(err) => {
                    log::info!("stream on {} ended: {}", self.config.device, err);
                    self.close();
                    return None;
                }
            };
            match self.process(frame) {
                Ok(chunk) => {
                    self.frames_sent += 1;
                    return Some(chunk);
                }
                Err(PipelineError::Encoding(err)) => {
                    self.frames_skipped += 1;
                    log::warn!("stream frame skipped: {}", err);
                }
                Err(err) => {
                    log::error!("stream on {} aborted: {}", self.config.device, err);
                    self.close();
                    return None;
                }
            }
        }
    }
}

impl Iterator for StreamSession {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.state {
                StreamState::Opening => match self.open() {
                    Ok(()) => self.state = StreamState::Streaming,
                    Err(err) => {
                        log::warn!("stream on {} not opened: {}", self.config.device, err);
                        self.close();
                        return None;
                    }
                },
                StreamState::Streaming => return self.next_chunk(),
                StreamState::Closed => return None,
            }
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Wrap one JPEG as a `boundary=frame` multipart part.
pub fn multipart_part(jpeg: &[u8]) -> Vec<u8> {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\n\r\n",
        MULTIPART_BOUNDARY
    );
    let mut part = Vec::with_capacity(header.len() + jpeg.len() + 4);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n\r\n");
    part
}
