//! screenfeedd - display-capture feed daemon
//!
//! This daemon:
//! 1. Opens the configured display source
//! 2. Runs the capture -> encode -> publish loop on a worker thread
//! 3. Serves as a demo consumer, logging publish cadence from the shared slot
//! 4. Homes the virtual pan/tilt state at startup
//! 5. Stops cleanly on SIGINT/SIGTERM

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};

use screenfeed::{
    compositor_from_url, CaptureLoop, Command, DaemonConfig, DisplaySource, JpegEncoder,
    PanTiltController, SharedSlot,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = DaemonConfig::load()?;
    log::info!(
        "source {} (display {}), delay {} ms, quality {}",
        cfg.source_url,
        cfg.display_index,
        cfg.delay_ms,
        cfg.quality
    );

    let compositor = compositor_from_url(&cfg.source_url, cfg.synthetic.clone())?;
    let source = DisplaySource::open(cfg.display_index, compositor)?;
    let encoder = JpegEncoder::new(cfg.quality);
    let slot = Arc::new(SharedSlot::new());

    let controls = PanTiltController::new();
    controls.dispatch(Command::Reset);
    log::info!("pan/tilt homed: {:?}", controls.position());

    let handle = CaptureLoop::new(source, encoder, slot.clone(), cfg.capture_config()).spawn()?;

    let shutdown = handle.shutdown_token();
    ctrlc::set_handler(move || {
        log::info!("stop requested");
        shutdown.trigger();
    })
    .context("install signal handler")?;

    // Demo consumer: follow the slot and log cadence until the worker closes it.
    let mut last_seq = 0u64;
    let mut frames_seen = 0u64;
    let mut last_log = Instant::now();
    while let Some(frame) = slot.wait_newer(last_seq) {
        last_seq = frame.seq;
        frames_seen += 1;
        if last_log.elapsed() >= Duration::from_secs(5) {
            log::info!(
                "frame {} ({} bytes), {} seen since start",
                frame.seq,
                frame.data.len(),
                frames_seen
            );
            last_log = Instant::now();
        }
    }

    let stats = handle.stop()?;
    log::info!(
        "stopped: {} frames published, {} errors",
        stats.frames_published,
        stats.errors
    );
    Ok(())
}
