//! Engine configuration
//!
//! A small YAML-backed config: session sample rate, buffer-size policy, and
//! an optional output device. Loading is lenient (missing or unparsable
//! files fall back to defaults with a warning) so a broken config never
//! keeps the engine from starting.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::types::DEFAULT_SAMPLE_RATE;

/// How the driver buffer size is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BufferSizePolicy {
    /// A safe general-purpose size
    #[default]
    Default,
    /// An exact frame count (clamped to what the engine supports)
    Fixed(u32),
    /// A known-good responsive size
    LowLatency,
}

/// Engine-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Session sample rate in Hz
    pub sample_rate: u32,
    /// Driver buffer size policy
    pub buffer_size: BufferSizePolicy,
    /// Output device name; `None` selects the system default
    pub output_device: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            buffer_size: BufferSizePolicy::Default,
            output_device: None,
        }
    }
}

/// Default location of the engine config file
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reel")
        .join("config.yaml")
}

/// Load a YAML config, falling back to defaults on any problem
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("Config file {:?} doesn't exist, using defaults", path);
        return T::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<T>(&contents) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Failed to parse config {:?}: {}, using defaults", path, e);
                T::default()
            }
        },
        Err(e) => {
            log::warn!("Failed to read config {:?}: {}, using defaults", path, e);
            T::default()
        }
    }
}

/// Save a config as YAML, creating parent directories as needed
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {:?}", parent))?;
    }
    let yaml = serde_yaml::to_string(config).context("serializing config")?;
    std::fs::write(path, yaml).with_context(|| format!("writing config {:?}", path))?;
    Ok(())
}
