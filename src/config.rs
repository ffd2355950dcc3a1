use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::discovery::bridge::VIDEO_FOUND_HANDLER;
use crate::discovery::dom::OverlaySpec;
use crate::discovery::normalize::NormalizerConfig;

/// Engine settings, loaded from `<config dir>/video-saver/config.toml`.
/// Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Quiet period after the last DOM mutation before re-scanning.
    pub quiet_period_ms: u64,
    /// Host handler that receives resolved sources.
    pub handler_name: String,
    pub normalizer: NormalizerConfig,
    pub overlay: OverlaySpec,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quiet_period_ms: 500,
            handler_name: VIDEO_FOUND_HANDLER.to_string(),
            normalizer: NormalizerConfig::default(),
            overlay: OverlaySpec::default(),
        }
    }
}

impl EngineConfig {
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("video-saver").join("config.toml"))
}

pub fn load(path: &Path) -> Result<EngineConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&data).with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// An explicit path must exist; the default location is optional.
pub fn load_or_default(explicit: Option<&Path>) -> Result<EngineConfig> {
    if let Some(path) = explicit {
        return load(path);
    }

    match config_path() {
        Some(path) if path.exists() => {
            tracing::debug!("loading config from {}", path.display());
            load(&path)
        }
        _ => Ok(EngineConfig::default()),
    }
}
