// SPDX-License-Identifier: GPL-3.0-only

//! User configuration
//!
//! Stored as JSON under the platform config directory
//! (`~/.config/mosaic/config.json` on Linux). Missing files and missing keys
//! fall back to defaults; command-line flags override loaded values.

use crate::backends::camera::types::Colorimetry;
use crate::constants::{DEFAULT_BLOCK_SIZE, DEFAULT_MAX_FPS, TEXTURE_CACHE_CAPACITY};
use crate::errors::{PipelineError, PipelineResult};
use crate::gpu::wgpu;
use crate::pipelines::parameter::BlockSize;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Adapter selection preference
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum GpuPowerPreference {
    /// Prefer a discrete GPU
    #[default]
    HighPerformance,
    /// Prefer an integrated GPU
    LowPower,
}

impl GpuPowerPreference {
    pub fn to_wgpu(self) -> wgpu::PowerPreference {
        match self {
            Self::HighPerformance => wgpu::PowerPreference::HighPerformance,
            Self::LowPower => wgpu::PowerPreference::LowPower,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Initial pixelation block size
    pub block_size: u32,
    /// Upper bound on GPU dispatches per second for the live path (None = uncapped)
    pub max_fps: Option<u32>,
    /// Which adapter to ask for
    pub power_preference: GpuPowerPreference,
    /// Capture buffers whose plane textures stay cached
    pub texture_cache_capacity: usize,
    /// Colorimetry assumed for synthetic capture sources
    pub colorimetry: Colorimetry,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_fps: Some(DEFAULT_MAX_FPS),
            power_preference: GpuPowerPreference::default(),
            texture_cache_capacity: TEXTURE_CACHE_CAPACITY,
            colorimetry: Colorimetry::default(),
        }
    }
}

impl Config {
    /// Location of the user config file, if the platform has a config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("mosaic").join("config.json"))
    }

    /// Load the user config, falling back to defaults on any problem
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable config");
                Self::default()
            }
        }
    }

    /// Load a config file that the user named explicitly
    pub fn load_from(path: &Path) -> PipelineResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&contents)?;
        debug!(path = %path.display(), ?config, "Loaded config");
        Ok(config)
    }

    /// Write the config as pretty-printed JSON, creating parent directories
    pub fn save_to(&self, path: &Path) -> PipelineResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// The configured block size, or the default if the stored value is invalid
    pub fn block_size(&self) -> BlockSize {
        BlockSize::new(i64::from(self.block_size)).unwrap_or_else(|e| {
            warn!(error = %e, "Invalid block size in config, using default");
            BlockSize::default()
        })
    }

    /// Minimum time between live dispatches
    pub fn frame_interval(&self) -> Option<Duration> {
        self.max_fps
            .filter(|fps| *fps > 0)
            .map(|fps| Duration::from_secs_f64(1.0 / fps as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_interval() {
        let mut config = Config::default();
        config.max_fps = Some(50);
        assert_eq!(config.frame_interval(), Some(Duration::from_millis(20)));

        config.max_fps = Some(0);
        assert_eq!(config.frame_interval(), None);

        config.max_fps = None;
        assert_eq!(config.frame_interval(), None);
    }

    #[test]
    fn test_invalid_block_size_falls_back() {
        let config = Config {
            block_size: 0,
            ..Default::default()
        };
        assert_eq!(config.block_size().get(), DEFAULT_BLOCK_SIZE);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{ "block_size": 12 }"#).unwrap();
        assert_eq!(config.block_size, 12);
        assert_eq!(config.max_fps, Some(DEFAULT_MAX_FPS));
        assert_eq!(config.power_preference, GpuPowerPreference::HighPerformance);
    }
}
