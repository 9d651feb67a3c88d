//! End-to-end capture loop scenarios: pacing, stop semantics, fault policy,
//! and exactly-once source cleanup.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use screenfeed::{
    CaptureConfig, CaptureHandle, CaptureLoop, DisplaySource, FaultPolicy, JpegEncoder,
    SharedSlot, SyntheticCompositor, SyntheticConfig, SyntheticStats,
};

fn spawn_loop(
    compositor: SyntheticCompositor,
    config: CaptureConfig,
) -> Result<(CaptureHandle, Arc<SharedSlot>, Arc<SyntheticStats>)> {
    let stats = compositor.stats_handle();
    let source = DisplaySource::open(0, Box::new(compositor))?;
    let slot = Arc::new(SharedSlot::new());
    let handle =
        CaptureLoop::new(source, JpegEncoder::max_quality(), slot.clone(), config).spawn()?;
    Ok((handle, slot, stats))
}

#[test]
fn five_iterations_publish_five_frames_and_clean_up_once() -> Result<()> {
    let compositor = SyntheticCompositor::new(SyntheticConfig::default());
    let config = CaptureConfig {
        delay_ms: 0,
        frame_limit: Some(5),
        ..CaptureConfig::default()
    };
    let (handle, slot, stats) = spawn_loop(compositor, config)?;

    // The worker stops itself after the 5th publish.
    let fifth = slot.wait_newer(4).expect("fifth frame");
    assert_eq!(fifth.seq, 5);
    assert_eq!(&fifth.data[..2], &[0xFF, 0xD8]);

    // Stop requested twice in quick succession: cleanup still runs once.
    handle.request_stop();
    handle.request_stop();
    let loop_stats = handle.stop()?;

    assert_eq!(loop_stats.frames_published, 5);
    assert_eq!(loop_stats.errors, 0);
    assert_eq!(stats.snapshots(), 5);
    assert_eq!(stats.closes(), 1, "source must be released exactly once");

    // The slot still holds the 5th frame's bytes and is closed.
    assert_eq!(slot.latest().expect("latest frame"), fifth);
    assert!(slot.wait_newer(5).is_none());
    Ok(())
}

#[test]
fn stop_interrupts_a_long_sleep_promptly() -> Result<()> {
    let compositor = SyntheticCompositor::new(SyntheticConfig::default());
    let config = CaptureConfig {
        delay_ms: 60_000,
        ..CaptureConfig::default()
    };
    let (handle, slot, stats) = spawn_loop(compositor, config)?;

    // First frame arrives, then the worker sleeps for a minute.
    slot.wait_newer(0).expect("first frame");

    let begin = Instant::now();
    handle.request_stop();
    let loop_stats = handle.stop()?;

    assert!(
        begin.elapsed() < Duration::from_secs(5),
        "stop took {:?}, shutdown was not observed during sleep",
        begin.elapsed()
    );
    assert_eq!(loop_stats.frames_published, 1);
    assert_eq!(stats.closes(), 1);
    Ok(())
}

#[test]
fn retry_policy_skips_transient_faults() -> Result<()> {
    // Snapshots 2 and 3 fail, then the source recovers.
    let compositor = SyntheticCompositor::new(SyntheticConfig::default()).fail_on(&[2, 3]);
    let config = CaptureConfig {
        delay_ms: 0,
        frame_limit: Some(3),
        fault_policy: FaultPolicy::Retry { max_consecutive: 5 },
    };
    let (handle, slot, stats) = spawn_loop(compositor, config)?;

    slot.wait_newer(2).expect("third frame");
    let loop_stats = handle.stop()?;

    assert_eq!(loop_stats.frames_published, 3);
    assert_eq!(loop_stats.errors, 2);
    assert_eq!(stats.snapshots(), 5);
    assert_eq!(stats.closes(), 1);
    Ok(())
}

#[test]
fn retry_policy_gives_up_after_consecutive_faults() -> Result<()> {
    let compositor = SyntheticCompositor::new(SyntheticConfig::default()).fail_from(1);
    let config = CaptureConfig {
        delay_ms: 0,
        frame_limit: None,
        fault_policy: FaultPolicy::Retry { max_consecutive: 2 },
    };
    let (handle, slot, stats) = spawn_loop(compositor, config)?;

    // The worker exits with an error; the closed slot unblocks readers.
    assert!(slot.wait_newer(0).is_none());
    assert!(handle.stop().is_err());

    assert_eq!(stats.snapshots(), 2);
    assert_eq!(stats.closes(), 1, "cleanup must run on the error path too");
    Ok(())
}

#[test]
fn fatal_policy_ends_the_loop_on_first_fault() -> Result<()> {
    let compositor = SyntheticCompositor::new(SyntheticConfig::default()).fail_from(1);
    let config = CaptureConfig {
        delay_ms: 0,
        frame_limit: None,
        fault_policy: FaultPolicy::Fatal,
    };
    let (handle, slot, stats) = spawn_loop(compositor, config)?;

    assert!(slot.wait_newer(0).is_none());
    assert!(handle.stop().is_err());

    assert_eq!(stats.snapshots(), 1);
    assert_eq!(stats.closes(), 1);
    Ok(())
}

#[test]
fn consumers_see_a_coherent_latest_frame_under_load() -> Result<()> {
    let compositor = SyntheticCompositor::new(SyntheticConfig {
        width: 64,
        height: 48,
        rotation: 0,
    });
    let config = CaptureConfig {
        delay_ms: 0,
        frame_limit: Some(20),
        ..CaptureConfig::default()
    };
    let (handle, slot, _stats) = spawn_loop(compositor, config)?;

    // Several readers chase the slot concurrently; every frame they observe
    // must be a complete JPEG with a monotonically increasing sequence.
    let mut readers = Vec::new();
    for _ in 0..3 {
        let slot = slot.clone();
        readers.push(std::thread::spawn(move || {
            let mut last_seq = 0u64;
            while let Some(frame) = slot.wait_newer(last_seq) {
                assert!(frame.seq > last_seq);
                assert_eq!(&frame.data[..2], &[0xFF, 0xD8]);
                last_seq = frame.seq;
            }
            last_seq
        }));
    }

    let loop_stats = handle.stop()?;
    for reader in readers {
        let observed = reader.join().expect("reader thread");
        assert!(observed <= loop_stats.frames_published);
    }
    Ok(())
}
