//! bigbagd - BigBag detection web service
//!
//! This daemon:
//! 1. Loads the service configuration (file + BIGBAG_* env overrides)
//! 2. Opens the detection store and loads the detector once
//! 3. Serves the upload, snapshot, live stream and history routes

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};

use bigbag_detector::{
    api::{ApiConfig, ApiServer, AppState},
    load_backend, Annotator, CameraConfig, DeviceGate, FramePipeline, ServiceConfig,
    SqliteDetectionStore, StillImageService,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON or TOML config file.
    #[arg(long, env = "BIGBAG_CONFIG")]
    config: Option<PathBuf>,
    /// Listen address, overriding the config file.
    #[arg(long)]
    addr: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = ServiceConfig::load_from(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        config.addr = addr;
    }

    let store = Arc::new(SqliteDetectionStore::open(&config.db_path)?);
    let detector = load_backend(&config.detector)?;
    let mut annotator = Annotator::new(detector.labels().to_vec());
    if let Some(path) = &config.font_path {
        annotator = annotator.with_font_file(path)?;
        log::info!("label font loaded from {}", path.display());
    }
    let pipeline = FramePipeline::new(detector, Arc::new(annotator));

    let still = StillImageService::new(
        pipeline.clone(),
        store,
        config.upload_dir.clone(),
        config.output_dir.clone(),
    );
    still.prepare_dirs()?;

    let state = AppState {
        pipeline,
        still,
        camera: CameraConfig::from(&config.camera),
        gate: DeviceGate::new(),
    };
    let api_config = ApiConfig {
        addr: config.addr.clone(),
        max_upload_bytes: config.max_upload_bytes,
    };
    let api_handle = ApiServer::new(api_config, state).spawn()?;
    log::info!(
        "bigbagd running on http://{} (db {}, camera {})",
        api_handle.addr,
        config.db_path,
        config.camera.device
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;

    log::info!("bigbagd waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping http api...");
    api_handle.stop()?;

    Ok(())
}
