//! Display capture sources.
//!
//! This module provides `DisplaySource`, the capture side of the input loop.
//! A `DisplaySource` wraps a `Compositor` (the external service that renders
//! the screen and can hand out snapshots of it) and turns it into a stream of
//! `RawFrame`s:
//! - `open` acquires the display handle and queries its mode
//! - `capture` takes one snapshot and reads its pixels into a scratch buffer
//! - `close` releases the display handle
//!
//! Open and mode-query failures are unrecoverable: `open` either yields a
//! fully working source or an error, never a half-initialized one. Capture
//! failures during steady state are returned per call; the capture loop's
//! fault policy decides whether they are fatal.

use anyhow::{anyhow, Context, Result};

use crate::frame::{RawFrame, BYTES_PER_PIXEL};

pub mod synthetic;

pub use synthetic::{SyntheticCompositor, SyntheticConfig, SyntheticStats};

/// Display rotation reported by the compositor, in quarter turns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rotation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Normalize a quarter-turn count (e.g. a `display_rotate` firmware value).
    pub fn from_quarter_turns(turns: u32) -> Self {
        match turns % 4 {
            0 => Rotation::Deg0,
            1 => Rotation::Deg90,
            2 => Rotation::Deg180,
            _ => Rotation::Deg270,
        }
    }

    /// Whether this rotation swaps the display's width and height.
    pub fn is_transposed(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// Native mode of an open display.
#[derive(Clone, Copy, Debug)]
pub struct DisplayMode {
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
}

impl DisplayMode {
    /// Effective capture dimensions: native width/height, swapped when the
    /// display is rotated by an odd multiple of 90 degrees.
    pub fn effective_size(&self) -> (u32, u32) {
        if self.rotation.is_transposed() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }
}

/// A region of the display, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    /// RGBA byte length of this region.
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }
}

/// The display compositor collaborator.
///
/// Implementations own the actual display/capture handles. `snapshot` latches
/// the currently rendered screen contents; `read_pixels` copies the latched
/// region out as tightly packed RGBA rows. Hosts embedding this crate provide
/// their compositor of choice; `SyntheticCompositor` is built in for tests
/// and for running without a real display.
pub trait Compositor: Send {
    /// Acquire the capture handle for the given display.
    fn open(&mut self, display_index: u32) -> Result<()>;

    /// Release the capture handle. Called at most once per successful `open`.
    fn close(&mut self);

    /// Query the native mode of the open display.
    fn mode(&self) -> Result<DisplayMode>;

    /// Latch a snapshot of the current screen contents.
    fn snapshot(&mut self) -> Result<()>;

    /// Copy pixels of the latched snapshot into `out` (RGBA, no row padding).
    /// `out` is exactly `rect.byte_len()` bytes.
    fn read_pixels(&mut self, rect: &Rect, out: &mut [u8]) -> Result<()>;
}

/// Pick a compositor from a source URL.
///
/// `synthetic://` sources use the built-in deterministic compositor; real
/// displays are reached through a host-supplied `Compositor` instead of a URL.
pub fn compositor_from_url(url: &str, synthetic: SyntheticConfig) -> Result<Box<dyn Compositor>> {
    if url.starts_with("synthetic://") {
        Ok(Box::new(SyntheticCompositor::new(synthetic)))
    } else {
        Err(anyhow!(
            "unsupported source url '{}'; expected synthetic:// or a host-supplied compositor",
            url
        ))
    }
}

/// An open display ready to produce frames.
pub struct DisplaySource {
    compositor: Box<dyn Compositor>,
    width: u32,
    height: u32,
    stride: usize,
    rect: Rect,
    scratch: Vec<u8>,
    frames_captured: u64,
}

impl DisplaySource {
    /// Open the display and prepare capture state.
    ///
    /// On any failure the compositor handle is released before the error is
    /// returned, so no half-initialized source can exist.
    pub fn open(display_index: u32, mut compositor: Box<dyn Compositor>) -> Result<Self> {
        compositor
            .open(display_index)
            .with_context(|| format!("open display {}", display_index))?;

        let mode = match compositor.mode().context("query display mode") {
            Ok(mode) => mode,
            Err(err) => {
                compositor.close();
                return Err(err);
            }
        };

        let (width, height) = mode.effective_size();
        if width == 0 || height == 0 {
            compositor.close();
            return Err(anyhow!(
                "display {} reported empty mode {}x{}",
                display_index,
                mode.width,
                mode.height
            ));
        }

        log::info!(
            "display {}: {}x{} native, {:?}, {}x{} effective",
            display_index,
            mode.width,
            mode.height,
            mode.rotation,
            width,
            height
        );

        let stride = width as usize * BYTES_PER_PIXEL;
        let rect = Rect::full(width, height);
        let scratch = vec![0u8; stride * height as usize];

        Ok(Self {
            compositor,
            width,
            height,
            stride,
            rect,
            scratch,
            frames_captured: 0,
        })
    }

    /// Capture one snapshot.
    ///
    /// The returned frame borrows this source's scratch buffer and must be
    /// consumed (encoded) before the next capture.
    pub fn capture(&mut self) -> Result<RawFrame<'_>> {
        self.compositor.snapshot().context("compositor snapshot")?;
        self.compositor
            .read_pixels(&self.rect, &mut self.scratch)
            .context("read snapshot pixels")?;
        self.frames_captured += 1;

        Ok(RawFrame {
            width: self.width,
            height: self.height,
            stride: self.stride,
            data: &self.scratch,
        })
    }

    /// Release the underlying compositor handle.
    pub fn close(&mut self) {
        self.compositor.close();
    }

    /// Effective capture width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Effective capture height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Frames captured since open.
    pub fn frames_captured(&self) -> u64 {
        self.frames_captured
    }
}
