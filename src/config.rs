//! Player configuration with persistence.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const CONFIG_DIR: &str = "mplayer-remote";
const CONFIG_FILE: &str = "config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("Failed to read config: {0}")]
  Io(#[from] io::Error),
  #[error("Invalid config file: {0}")]
  Json(#[from] serde_json::Error),
  #[error("No config directory on this platform")]
  NoConfigDir,
  #[error("{0}")]
  Invalid(String),
}

/// Player configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerConfig {
  /// Custom MPlayer executable path (None = auto-detect).
  #[serde(default)]
  pub mplayer_path: Option<String>,

  /// Arguments appended after the fixed slave-mode arguments.
  #[serde(default)]
  pub mplayer_args: Vec<String>,

  /// How long to wait for the startup banner. 0 waits forever.
  #[serde(default = "default_startup_timeout_ms")]
  pub startup_timeout_ms: u64,

  /// Budget for a file to start playing.
  #[serde(default = "default_open_timeout_ms")]
  pub open_timeout_ms: u64,

  /// Budget for every other bounded command.
  #[serde(default = "default_command_timeout_ms")]
  pub command_timeout_ms: u64,
}

fn default_startup_timeout_ms() -> u64 {
  10_000
}

fn default_open_timeout_ms() -> u64 {
  15_000
}

fn default_command_timeout_ms() -> u64 {
  3_000
}

impl Default for PlayerConfig {
  fn default() -> Self {
    Self {
      mplayer_path: None,
      mplayer_args: Vec::new(),
      startup_timeout_ms: default_startup_timeout_ms(),
      open_timeout_ms: default_open_timeout_ms(),
      command_timeout_ms: default_command_timeout_ms(),
    }
  }
}

impl PlayerConfig {
  /// Validate configuration values.
  pub fn validate(&self) -> Result<(), String> {
    if self.open_timeout_ms == 0 {
      return Err("Open timeout must be greater than zero".to_string());
    }
    if self.command_timeout_ms == 0 {
      return Err("Command timeout must be greater than zero".to_string());
    }
    if self.mplayer_args.iter().any(|a| a.trim().is_empty()) {
      return Err("MPlayer arguments cannot be empty".to_string());
    }
    Ok(())
  }

  pub fn startup_timeout(&self) -> Option<Duration> {
    (self.startup_timeout_ms > 0).then(|| Duration::from_millis(self.startup_timeout_ms))
  }

  pub fn open_timeout(&self) -> Duration {
    Duration::from_millis(self.open_timeout_ms)
  }

  pub fn command_timeout(&self) -> Duration {
    Duration::from_millis(self.command_timeout_ms)
  }

  /// `<config dir>/mplayer-remote/config.json`.
  pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
  }

  /// Read and validate a config file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let data = fs::read_to_string(path)?;
    let config: Self = serde_json::from_str(&data)?;
    config.validate().map_err(ConfigError::Invalid)?;
    log::info!("Loaded player config from {:?}", path);
    Ok(config)
  }

  /// Load from the default location, falling back to defaults if absent.
  pub fn load_or_default() -> Result<Self, ConfigError> {
    let path = Self::default_path().ok_or(ConfigError::NoConfigDir)?;
    Self::load_from_or_default(&path)
  }

  fn load_from_or_default(path: &Path) -> Result<Self, ConfigError> {
    if !path.exists() {
      log::info!("No player config at {:?}, using defaults", path);
      return Ok(Self::default());
    }
    Self::load(path)
  }

  /// Write the config as pretty JSON, creating parent directories.
  pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(self)?)?;
    Ok(())
  }
}
