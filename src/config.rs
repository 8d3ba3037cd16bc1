// SPDX-License-Identifier: GPL-3.0-only

//! User configuration
//!
//! Persisted as JSON under the user configuration directory. Missing or
//! malformed files fall back to defaults so the binary always starts.

use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::backends::camera::types::CameraDirection;
use crate::constants::capture::DEFAULT_JPEG_QUALITY;
use crate::errors::{AppError, AppResult};
use crate::storage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Preferred camera facing; `None` opens the first available camera
    pub direction: Option<CameraDirection>,
    /// Output directory override for saved captures
    pub output_dir: Option<PathBuf>,
    /// Staging directory override for in-flight filtered captures
    pub staging_dir: Option<PathBuf>,
    /// JPEG quality for saved captures (1-100)
    pub jpeg_quality: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            direction: None,
            output_dir: None,
            staging_dir: None,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl Config {
    /// Path of the persisted configuration file, when a config directory
    /// exists on this system.
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("lutcam").join("config.json"))
    }

    /// Load the configuration, falling back to defaults on any problem.
    pub fn load() -> Self {
        let Some(path) = Self::path() else {
            return Self::default();
        };
        match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(config) => config,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "malformed config, using defaults");
                    Self::default()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unreadable config, using defaults");
                Self::default()
            }
        }
    }

    /// Write the configuration back to disk.
    pub fn save(&self) -> AppResult<()> {
        let path = Self::path()
            .ok_or_else(|| AppError::Config("no user configuration directory".to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Config(err.to_string()))?;
        }
        let raw = serde_json::to_string_pretty(self)
            .map_err(|err| AppError::Config(err.to_string()))?;
        fs::write(&path, raw).map_err(|err| AppError::Config(err.to_string()))?;
        Ok(())
    }

    /// Output directory, honoring the override.
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(storage::default_output_dir)
    }

    /// Staging directory, honoring the override.
    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir
            .clone()
            .unwrap_or_else(storage::default_staging_dir)
    }

    /// JPEG quality clamped to the encoder's valid range.
    pub fn effective_jpeg_quality(&self) -> u8 {
        self.jpeg_quality.clamp(1, 100)
    }
}
