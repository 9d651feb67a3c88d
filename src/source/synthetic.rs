//! Synthetic compositor.
//!
//! A deterministic, always-available `Compositor` used for tests and for
//! running the daemon without a real display. It renders a slowly shifting
//! gradient so consecutive frames differ, exposes counters through a shared
//! stats handle, and can inject capture faults on chosen snapshots to
//! exercise the loop's fault policy.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};

use super::{Compositor, DisplayMode, Rect, Rotation};
use crate::frame::BYTES_PER_PIXEL;

/// Configuration for the synthetic display.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Native width in pixels.
    pub width: u32,
    /// Native height in pixels.
    pub height: u32,
    /// Rotation in quarter turns (as a compositor would report it).
    pub rotation: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            rotation: 0,
        }
    }
}

/// Counters shared between the compositor and observers (tests, health logs).
#[derive(Debug, Default)]
pub struct SyntheticStats {
    pub opens: AtomicU32,
    pub closes: AtomicU32,
    pub snapshots: AtomicU64,
}

impl SyntheticStats {
    pub fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn snapshots(&self) -> u64 {
        self.snapshots.load(Ordering::SeqCst)
    }
}

pub struct SyntheticCompositor {
    config: SyntheticConfig,
    open: bool,
    snapshot_count: u64,
    latched: bool,
    stats: Arc<SyntheticStats>,
    /// Snapshot numbers (1-based) that fail with a capture error.
    faulty_snapshots: Vec<u64>,
    /// Every snapshot from this number on fails (persistent fault).
    fail_from: Option<u64>,
}

impl SyntheticCompositor {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            open: false,
            snapshot_count: 0,
            latched: false,
            stats: Arc::new(SyntheticStats::default()),
            faulty_snapshots: Vec::new(),
            fail_from: None,
        }
    }

    /// Shared counter handle; grab before boxing the compositor.
    pub fn stats_handle(&self) -> Arc<SyntheticStats> {
        self.stats.clone()
    }

    /// Fail the given snapshot numbers (1-based), then recover.
    pub fn fail_on(mut self, snapshots: &[u64]) -> Self {
        self.faulty_snapshots = snapshots.to_vec();
        self
    }

    /// Fail every snapshot starting at the given number (1-based).
    pub fn fail_from(mut self, snapshot: u64) -> Self {
        self.fail_from = Some(snapshot);
        self
    }

    fn render(&self, rect: &Rect, out: &mut [u8]) {
        // Shifting gradient: varies per pixel and per snapshot.
        let phase = self.snapshot_count;
        let mut i = 0;
        for y in rect.y..rect.y + rect.height {
            for x in rect.x..rect.x + rect.width {
                out[i] = (x as u64 + phase) as u8;
                out[i + 1] = (y as u64 + phase) as u8;
                out[i + 2] = (x as u64 ^ y as u64) as u8;
                out[i + 3] = 0xFF;
                i += BYTES_PER_PIXEL;
            }
        }
    }
}

impl Compositor for SyntheticCompositor {
    fn open(&mut self, display_index: u32) -> Result<()> {
        log::debug!("synthetic compositor: open display {}", display_index);
        self.open = true;
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) {
        log::debug!("synthetic compositor: close");
        self.open = false;
        self.latched = false;
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn mode(&self) -> Result<DisplayMode> {
        if !self.open {
            return Err(anyhow!("synthetic compositor is not open"));
        }
        Ok(DisplayMode {
            width: self.config.width,
            height: self.config.height,
            rotation: Rotation::from_quarter_turns(self.config.rotation),
        })
    }

    fn snapshot(&mut self) -> Result<()> {
        if !self.open {
            return Err(anyhow!("synthetic compositor is not open"));
        }
        self.snapshot_count += 1;
        self.stats.snapshots.fetch_add(1, Ordering::SeqCst);

        let injected = self.faulty_snapshots.contains(&self.snapshot_count)
            || self.fail_from.is_some_and(|from| self.snapshot_count >= from);
        if injected {
            self.latched = false;
            return Err(anyhow!(
                "injected snapshot fault (snapshot {})",
                self.snapshot_count
            ));
        }

        self.latched = true;
        Ok(())
    }

    fn read_pixels(&mut self, rect: &Rect, out: &mut [u8]) -> Result<()> {
        if !self.latched {
            return Err(anyhow!("read_pixels without a latched snapshot"));
        }
        if out.len() != rect.byte_len() {
            return Err(anyhow!(
                "pixel buffer is {} bytes, rect needs {}",
                out.len(),
                rect.byte_len()
            ));
        }
        self.render(rect, out);
        Ok(())
    }
}
