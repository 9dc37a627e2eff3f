//! bigbag_detect - run BigBag detection on local image files
//!
//! Inputs are read in place. Annotated copies are always written to the
//! configured output dir; a history record is added only with `--record`.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use bigbag_detector::{
    load_backend, Annotator, DetectionStore, FramePipeline, InMemoryDetectionStore,
    ServiceConfig, SqliteDetectionStore, StillImageService,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Images to process.
    images: Vec<PathBuf>,
    /// JSON or TOML config file.
    #[arg(long, env = "BIGBAG_CONFIG")]
    config: Option<PathBuf>,
    /// Append a record per image to the configured database. Without it the
    /// counts are only printed.
    #[arg(long)]
    record: bool,
    /// Print the stored history as JSON and exit.
    #[arg(long)]
    history: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let config = ServiceConfig::load_from(args.config.as_deref())?;

    if args.history {
        let store = SqliteDetectionStore::open(&config.db_path)?;
        println!("{}", serde_json::to_string_pretty(&store.list()?)?);
        return Ok(());
    }
    if args.images.is_empty() {
        return Err(anyhow!("no images given"));
    }

    let store: Arc<dyn DetectionStore> = if args.record {
        Arc::new(SqliteDetectionStore::open(&config.db_path)?)
    } else {
        Arc::new(InMemoryDetectionStore::new())
    };
    let detector = load_backend(&config.detector)?;
    let mut annotator = Annotator::new(detector.labels().to_vec());
    if let Some(path) = &config.font_path {
        annotator = annotator.with_font_file(path)?;
    }
    let still = StillImageService::new(
        FramePipeline::new(detector, Arc::new(annotator)),
        store,
        config.upload_dir.clone(),
        config.output_dir.clone(),
    );
    still.prepare_dirs()?;

    let mut failures = 0usize;
    for path in &args.images {
        match still.process_path(path) {
            Ok(outcome) => println!(
                "{}\tbigbag_count={}\t{}",
                path.display(),
                outcome.target_count,
                outcome.output_path.display()
            ),
            Err(err) => {
                failures += 1;
                eprintln!("{}\terror: {}", path.display(), err);
            }
        }
    }
    if failures > 0 {
        return Err(anyhow!("{} of {} images failed", failures, args.images.len()));
    }
    Ok(())
}
