use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_ADDR: &str = "127.0.0.1:5000";
const DEFAULT_DB_PATH: &str = "database.db";
const DEFAULT_UPLOAD_DIR: &str = "static/uploads";
const DEFAULT_OUTPUT_DIR: &str = "static/output";
const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";
const DEFAULT_CAMERA_FPS: u32 = 10;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_MODEL_INPUT: u32 = 640;
const DEFAULT_LABEL: &str = "BigBag";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Deserialize, Default)]
struct ServiceConfigFile {
    addr: Option<String>,
    db_path: Option<String>,
    upload_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    font_path: Option<PathBuf>,
    max_upload_bytes: Option<usize>,
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    model_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    labels: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub addr: String,
    pub db_path: String,
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub font_path: Option<PathBuf>,
    pub max_upload_bytes: usize,
    pub camera: CameraSettings,
    pub detector: DetectorSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub device: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub model_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub labels: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        // An empty file section yields every default.
        Self::from_file(ServiceConfigFile::default())
    }
}

impl ServiceConfig {
    /// Load from `BIGBAG_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("BIGBAG_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit file path (or defaults), then apply env overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ServiceConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        Self {
            addr: file.addr.unwrap_or_else(|| DEFAULT_ADDR.to_string()),
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            upload_dir: file
                .upload_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR)),
            output_dir: file
                .output_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            font_path: file.font_path,
            max_upload_bytes: file.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            camera: CameraSettings {
                device: camera
                    .device
                    .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
                target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            },
            detector: DetectorSettings {
                model_path: detector.model_path,
                input_width: detector.input_width.unwrap_or(DEFAULT_MODEL_INPUT),
                input_height: detector.input_height.unwrap_or(DEFAULT_MODEL_INPUT),
                labels: detector
                    .labels
                    .unwrap_or_else(|| vec![DEFAULT_LABEL.to_string()]),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = non_empty_env("BIGBAG_ADDR") {
            self.addr = addr;
        }
        if let Some(db_path) = non_empty_env("BIGBAG_DB_PATH") {
            self.db_path = db_path;
        }
        if let Some(dir) = non_empty_env("BIGBAG_UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty_env("BIGBAG_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(device) = non_empty_env("BIGBAG_CAMERA_DEVICE") {
            self.camera.device = device;
        }
        if let Some(path) = non_empty_env("BIGBAG_MODEL_PATH") {
            self.detector.model_path = Some(PathBuf::from(path));
        }
        if let Some(path) = non_empty_env("BIGBAG_FONT_PATH") {
            self.font_path = Some(PathBuf::from(path));
        }
        if let Some(limit) = non_empty_env("BIGBAG_MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = limit
                .parse()
                .map_err(|_| anyhow!("BIGBAG_MAX_UPLOAD_BYTES must be an integer byte count"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if self.detector.input_width == 0 || self.detector.input_height == 0 {
            return Err(anyhow!("model input size must be greater than zero"));
        }
        if self.detector.labels.is_empty() {
            return Err(anyhow!("detector labels must not be empty"));
        }
        if self.max_upload_bytes == 0 {
            return Err(anyhow!("max_upload_bytes must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ServiceConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}
