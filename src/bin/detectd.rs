//! detectd - camera frame to detections daemon
//!
//! This daemon:
//! 1. Loads the label catalog and the detection model
//! 2. Opens the configured frame source (stub, still image, V4L2)
//! 3. Runs the single-flight detection loop
//! 4. Logs each new batch with boxes placed on the display viewport
//! 5. Stops cleanly on Ctrl-C or after the configured cycle count

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use frame_detect::{
    open_source, CatalogIndex, Decoder, DetectionLoop, DetectorConfig, InferenceEngine,
    Preprocessor, StubEngine, Viewport,
};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "detectd", about = "Run object detection over a camera feed")]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension)
    #[arg(long, env = "DETECT_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Stop after this many published batches
    #[arg(long, value_name = "N")]
    max_cycles: Option<u64>,

    /// Frame source URL (stub://name, /dev/videoN, or an image path)
    #[arg(long, value_name = "URL")]
    source: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = DetectorConfig::load_from(args.config.as_deref())?;
    if let Some(url) = args.source {
        cfg.source.url = url;
    }
    if let Some(max_cycles) = args.max_cycles {
        if max_cycles == 0 {
            bail!("--max-cycles must be greater than zero");
        }
        cfg.max_cycles = Some(max_cycles);
    }

    let catalog = Arc::new(CatalogIndex::load(&cfg.labels_path, cfg.duplicate_ids)?);
    if catalog.is_empty() {
        log::warn!(
            "label catalog {} has no entries; every candidate will be unknown",
            cfg.labels_path.display()
        );
    }

    let engine = build_engine(&cfg, &catalog)?;
    let preprocessor =
        Preprocessor::new(cfg.input_size)?.with_normalization(cfg.mean, cfg.scale)?;
    let decoder = Decoder::new(catalog)
        .with_threshold(cfg.score_threshold)?
        .with_policy(cfg.unknown_class);

    let mut source = open_source(&cfg.source)?;
    source
        .connect()
        .with_context(|| format!("connect frame source {}", cfg.source.url))?;

    let handle = DetectionLoop::new(source, engine, preprocessor, decoder)
        .with_max_cycles(cfg.max_cycles)
        .spawn()?;

    let stop = handle.stop_flag();
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    log::info!(
        "detectd running. source={} model={} threshold={:.2}",
        cfg.source.url,
        cfg.model_path,
        cfg.score_threshold
    );

    let mut last_cycle = 0u64;
    let mut last_health_log = Instant::now();
    while !handle.is_finished() {
        std::thread::sleep(POLL_INTERVAL);

        if let Some(batch) = handle.latest() {
            if batch.cycle != last_cycle {
                last_cycle = batch.cycle;
                log_batch(&batch, cfg.viewport);
            }
        }

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            let status = handle.status();
            log::info!(
                "loop state={:?} cycles={}",
                status.state,
                status.cycles_completed
            );
            last_health_log = Instant::now();
        }
    }

    let exit = handle.join()?;
    log::info!(
        "detectd stopped after {} cycles ({:?})",
        exit.cycles_completed,
        exit.reason
    );
    Ok(())
}

fn build_engine(cfg: &DetectorConfig, catalog: &CatalogIndex) -> Result<Box<dyn InferenceEngine>> {
    if cfg.model_path.starts_with("stub://") {
        let engine = match catalog.ids().first() {
            Some(&id) => StubEngine::single(id, 0.9, [0.25, 0.25, 0.75, 0.75]),
            None => StubEngine::empty(),
        };
        log::info!("using stub engine for {}", cfg.model_path);
        return Ok(Box::new(engine));
    }

    #[cfg(feature = "backend-tract")]
    {
        let engine = frame_detect::detect::TractEngine::new(&cfg.model_path, cfg.input_size)?;
        Ok(Box::new(engine))
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        bail!(
            "model {} requires the backend-tract feature",
            cfg.model_path
        )
    }
}

fn log_batch(batch: &frame_detect::DetectionBatch, viewport: Viewport) {
    log::info!(
        "cycle {}: {} detections, latency={}ms inference={}ms",
        batch.cycle,
        batch.len(),
        batch.latency_ms,
        batch.inference_ms
    );
    for detection in &batch.detections {
        let rect = detection.rect.to_screen(viewport);
        log::info!(
            "  {} at x={:.0} y={:.0} w={:.0} h={:.0}",
            detection,
            rect.x,
            rect.y,
            rect.width,
            rect.height
        );
    }
}
