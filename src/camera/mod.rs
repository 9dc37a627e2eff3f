//! Camera frame sources.
//!
//! - V4L2 devices such as `/dev/video0` (feature: ingest-v4l2)
//! - Synthetic `stub://` sources for tests and demos
//!
//! Sources hand back frames in the device's native layout; callers convert to
//! RGB with [`CameraFrame::into_rgb_image`]. A camera is exclusive to one
//! stream session at a time, enforced through [`DeviceGate`].

mod normalize;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use image::RgbImage;

use crate::config::CameraSettings;
use crate::error::PipelineError;

pub use normalize::PixelFormat;
#[cfg(feature = "ingest-v4l2")]
use v4l2::V4l2Camera;

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0") or `stub://name[?frames=N]`.
    pub device: String,
    /// Requested frame rate.
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

impl From<&CameraSettings> for CameraConfig {
    fn from(settings: &CameraSettings) -> Self {
        Self {
            device: settings.device.clone(),
            target_fps: settings.target_fps,
            width: settings.width,
            height: settings.height,
        }
    }
}

/// One captured frame in the device's pixel layout.
#[derive(Clone, Debug)]
pub struct CameraFrame {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl CameraFrame {
    /// Convert to an RGB image.
    pub fn into_rgb_image(self) -> Result<RgbImage> {
        let rgb = normalize::normalize_to_rgb(&self.pixels, self.width, self.height, self.format)?;
        RgbImage::from_raw(self.width, self.height, rgb)
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", self.width, self.height))
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub device: String,
}

/// Camera frame source.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "ingest-v4l2")]
    Device(V4l2Camera),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.device.starts_with("stub://") {
            return Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticCamera::new(config)?),
            });
        }
        #[cfg(feature = "ingest-v4l2")]
        {
            Ok(Self {
                backend: CameraBackend::Device(V4l2Camera::new(config)),
            })
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            Err(anyhow!(
                "camera {} requires the ingest-v4l2 feature",
                config.device
            ))
        }
    }

    /// Open the device.
    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.connect(),
        }
    }

    /// Block until the next frame is captured.
    pub fn next_frame(&mut self) -> Result<CameraFrame> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.next_frame(),
        }
    }

    pub fn stats(&self) -> CameraStats {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.stats(),
        }
    }
}

// ----------------------------------------------------------------------------
// Device exclusivity
// ----------------------------------------------------------------------------

/// Hands out at most one [`CameraLease`] at a time.
#[derive(Clone, Debug, Default)]
pub struct DeviceGate {
    in_use: Arc<AtomicBool>,
}

impl DeviceGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the camera, or fail with a device error if a session holds it.
    pub fn try_acquire(&self) -> Result<CameraLease, PipelineError> {
        self.in_use
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PipelineError::Device("camera busy: another stream is active".into()))?;
        Ok(CameraLease {
            in_use: self.in_use.clone(),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }
}

/// Exclusive claim on the camera, released on drop.
#[derive(Debug)]
pub struct CameraLease {
    in_use: Arc<AtomicBool>,
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        self.in_use.store(false, Ordering::Release);
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticCamera {
    config: CameraConfig,
    frame_limit: Option<u64>,
    fail_open: bool,
    connected: bool,
    frame_count: u64,
}

impl SyntheticCamera {
    fn new(config: CameraConfig) -> Result<Self> {
        let target = config.device.trim_start_matches("stub://");
        let (name, query) = target.split_once('?').unwrap_or((target, ""));
        let mut frame_limit = None;
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            match pair.split_once('=') {
                Some(("frames", value)) => {
                    frame_limit = Some(
                        value
                            .parse()
                            .with_context(|| format!("invalid stub frame limit '{}'", value))?,
                    );
                }
                _ => return Err(anyhow!("unknown stub camera option '{}'", pair)),
            }
        }
        Ok(Self {
            fail_open: name == "fail",
            config,
            frame_limit,
            connected: false,
            frame_count: 0,
        })
    }

    fn connect(&mut self) -> Result<()> {
        if self.fail_open {
            return Err(anyhow!("cannot open camera {}", self.config.device));
        }
        self.connected = true;
        log::info!("CameraSource: connected to {} (synthetic)", self.config.device);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<CameraFrame> {
        if !self.connected {
            return Err(anyhow!("camera {} not connected", self.config.device));
        }
        if self
            .frame_limit
            .is_some_and(|limit| self.frame_count >= limit)
        {
            return Err(anyhow!("camera {} produced no frame", self.config.device));
        }
        if self.frame_count > 0 && self.config.target_fps > 0 {
            std::thread::sleep(Duration::from_secs_f64(1.0 / self.config.target_fps as f64));
        }
        self.frame_count += 1;
        Ok(CameraFrame {
            pixels: self.generate_pixels(),
            width: self.config.width,
            height: self.config.height,
            format: PixelFormat::Bgr24,
        })
    }

    /// Horizontal gradient shifted by the frame counter, in BGR order like
    /// most capture drivers deliver.
    fn generate_pixels(&self) -> Vec<u8> {
        let (w, h) = (self.config.width as usize, self.config.height as usize);
        let mut pixels = vec![0u8; w * h * 3];
        for (i, px) in pixels.chunks_exact_mut(3).enumerate() {
            let x = (i % w) as u64;
            let shade = ((x + self.frame_count) % 256) as u8;
            px.copy_from_slice(&[shade, shade / 2, 255 - shade]);
        }
        pixels
    }

    fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
        }
    }
}
