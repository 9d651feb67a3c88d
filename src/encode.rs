//! JPEG encoding of raw snapshots.
//!
//! The encoder takes one RGBA `RawFrame` (honoring its row stride), drops the
//! alpha channel, and produces a baseline JPEG byte buffer. Every call
//! returns a fresh, independently-owned buffer; nothing is retained between
//! calls.

use anyhow::{anyhow, Context, Result};

use crate::frame::{RawFrame, BYTES_PER_PIXEL};

/// Highest quality the codec accepts. Requests above this are clamped to it.
pub const MAX_QUALITY: u8 = 100;

const MIN_QUALITY: u8 = 1;

/// JPEG encoder with a fixed, validated quality setting.
#[derive(Clone, Copy, Debug)]
pub struct JpegEncoder {
    quality: u8,
}

impl JpegEncoder {
    /// Create an encoder, clamping `quality` into the codec's valid range.
    pub fn new(quality: u8) -> Self {
        let clamped = quality.clamp(MIN_QUALITY, MAX_QUALITY);
        if clamped != quality {
            log::warn!(
                "jpeg quality {} outside {}..={}, clamped to {}",
                quality,
                MIN_QUALITY,
                MAX_QUALITY,
                clamped
            );
        }
        Self { quality: clamped }
    }

    /// Encoder requesting maximum quality.
    pub fn max_quality() -> Self {
        Self::new(MAX_QUALITY)
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode one frame to a baseline JPEG.
    pub fn encode(&self, frame: &RawFrame<'_>) -> Result<Vec<u8>> {
        if frame.width == 0 || frame.height == 0 {
            return Err(anyhow!(
                "cannot encode empty frame ({}x{})",
                frame.width,
                frame.height
            ));
        }
        if frame.data.len() < frame.expected_len() {
            return Err(anyhow!(
                "frame buffer is {} bytes, {}x{} with stride {} needs {}",
                frame.data.len(),
                frame.width,
                frame.height,
                frame.stride,
                frame.expected_len()
            ));
        }

        // RGBA rows (possibly padded) -> tightly packed RGB.
        let mut rgb = Vec::with_capacity(frame.width as usize * frame.height as usize * 3);
        for y in 0..frame.height {
            let row = frame
                .row(y)
                .ok_or_else(|| anyhow!("frame row {} is out of bounds", y))?;
            for pixel in row.chunks_exact(BYTES_PER_PIXEL) {
                rgb.extend_from_slice(&pixel[..3]);
            }
        }

        let mut out = Vec::new();
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, self.quality);
        encoder
            .encode(
                &rgb,
                frame.width,
                frame.height,
                image::ExtendedColorType::Rgb8,
            )
            .context("encode jpeg")?;
        Ok(out)
    }
}

impl Default for JpegEncoder {
    fn default() -> Self {
        Self::max_quality()
    }
}
