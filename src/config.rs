//! Daemon configuration.
//!
//! Settings layer the way the host expects: built-in defaults, then an
//! optional JSON config file (`SCREENFEED_CONFIG`), then environment
//! overrides, then validation. Invalid configuration aborts startup; the
//! daemon never runs half-configured.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;

use crate::source::SyntheticConfig;
use crate::worker::{CaptureConfig, FaultPolicy};

const DEFAULT_SOURCE_URL: &str = "synthetic://desktop";
const DEFAULT_DISPLAY_INDEX: u32 = 0;
const DEFAULT_DELAY_MS: u64 = 1000;
const DEFAULT_QUALITY: u8 = crate::encode::MAX_QUALITY;
const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 5;

#[derive(Debug, Deserialize, Default)]
struct DaemonConfigFile {
    source: Option<String>,
    display: Option<DisplayConfigFile>,
    capture: Option<CaptureConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    index: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    rotation: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    delay_ms: Option<u64>,
    quality: Option<u8>,
    frame_limit: Option<u64>,
    max_consecutive_errors: Option<u32>,
}

/// Validated daemon settings.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Compositor source URL (`synthetic://...` for the built-in one).
    pub source_url: String,
    pub display_index: u32,
    /// Dimensions and rotation of the synthetic display (ignored for real
    /// compositors, which report their own mode).
    pub synthetic: SyntheticConfig,
    /// Milliseconds between capture iterations.
    pub delay_ms: u64,
    /// JPEG quality request, clamped by the encoder into its valid range.
    pub quality: u8,
    /// Stop after this many frames; `None` runs until signalled.
    pub frame_limit: Option<u64>,
    /// Consecutive capture failures tolerated before giving up.
    /// 0 means any failure is fatal.
    pub max_consecutive_errors: u32,
}

impl DaemonConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SCREENFEED_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => read_config_file(Path::new(path))?,
            None => DaemonConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DaemonConfigFile) -> Self {
        let display = file.display.unwrap_or_default();
        let capture = file.capture.unwrap_or_default();
        let synthetic_defaults = SyntheticConfig::default();
        Self {
            source_url: file.source.unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            display_index: display.index.unwrap_or(DEFAULT_DISPLAY_INDEX),
            synthetic: SyntheticConfig {
                width: display.width.unwrap_or(synthetic_defaults.width),
                height: display.height.unwrap_or(synthetic_defaults.height),
                rotation: display.rotation.unwrap_or(synthetic_defaults.rotation),
            },
            delay_ms: capture.delay_ms.unwrap_or(DEFAULT_DELAY_MS),
            quality: capture.quality.unwrap_or(DEFAULT_QUALITY),
            frame_limit: capture.frame_limit,
            max_consecutive_errors: capture
                .max_consecutive_errors
                .unwrap_or(DEFAULT_MAX_CONSECUTIVE_ERRORS),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SCREENFEED_SOURCE") {
            if !url.trim().is_empty() {
                self.source_url = url;
            }
        }
        if let Ok(index) = std::env::var("SCREENFEED_DISPLAY") {
            self.display_index = index
                .parse()
                .map_err(|_| anyhow!("SCREENFEED_DISPLAY must be an integer display index"))?;
        }
        if let Ok(delay) = std::env::var("SCREENFEED_DELAY_MS") {
            self.delay_ms = delay
                .parse()
                .map_err(|_| anyhow!("SCREENFEED_DELAY_MS must be an integer millisecond delay"))?;
        }
        if let Ok(quality) = std::env::var("SCREENFEED_QUALITY") {
            self.quality = quality
                .parse()
                .map_err(|_| anyhow!("SCREENFEED_QUALITY must be an integer 1..=100"))?;
        }
        if let Ok(max_errors) = std::env::var("SCREENFEED_MAX_ERRORS") {
            self.max_consecutive_errors = max_errors
                .parse()
                .map_err(|_| anyhow!("SCREENFEED_MAX_ERRORS must be an integer count"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.synthetic.width == 0 || self.synthetic.height == 0 {
            return Err(anyhow!(
                "display dimensions must be non-zero (got {}x{})",
                self.synthetic.width,
                self.synthetic.height
            ));
        }
        if self.frame_limit == Some(0) {
            return Err(anyhow!("frame_limit must be greater than zero when set"));
        }
        Ok(())
    }

    /// Capture-loop settings derived from this configuration.
    pub fn capture_config(&self) -> CaptureConfig {
        let fault_policy = if self.max_consecutive_errors == 0 {
            FaultPolicy::Fatal
        } else {
            FaultPolicy::Retry {
                max_consecutive: self.max_consecutive_errors,
            }
        };
        CaptureConfig {
            delay_ms: self.delay_ms,
            frame_limit: self.frame_limit,
            fault_policy,
        }
    }
}

fn read_config_file(path: &Path) -> Result<DaemonConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
