use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::Geometry;

/// Top-level configuration loaded from `~/.holdfast/config.toml`.
///
/// Every section falls back to its defaults when absent, so an empty or
/// missing file is always valid.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub terminal: TerminalConfig,
}

impl Config {
    /// Load from the default path, falling back to defaults when the file
    /// does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic validation for settings not expressible via type checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bridge.call_deadline_ms == 0 {
            return Err(ConfigError::Validation(
                "bridge.call_deadline_ms must be greater than zero".into(),
            ));
        }
        if self.bridge.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "bridge.max_attempts must be at least 1".into(),
            ));
        }
        if self.terminal.default_rows == 0 || self.terminal.default_cols == 0 {
            return Err(ConfigError::Validation(
                "terminal.default_rows/default_cols must be non-zero".into(),
            ));
        }
        Ok(())
    }

    fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".holdfast")
            .join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

/// Deadline and retry behaviour for command-bridge calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Per-call deadline in milliseconds.
    #[serde(default = "default_call_deadline_ms")]
    pub call_deadline_ms: u64,
    /// Attempts per control command (open, start-stream, resize, close).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts, in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            call_deadline_ms: default_call_deadline_ms(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

fn default_call_deadline_ms() -> u64 {
    10_000
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    250
}

/// Terminal-facing defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Rows used for the initial resize when the consumer has not yet
    /// reported geometry.
    #[serde(default = "default_rows")]
    pub default_rows: u16,
    #[serde(default = "default_cols")]
    pub default_cols: u16,
}

impl TerminalConfig {
    pub fn default_geometry(&self) -> Geometry {
        Geometry::new(self.default_rows, self.default_cols)
    }
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            default_rows: default_rows(),
            default_cols: default_cols(),
        }
    }
}

fn default_rows() -> u16 {
    24
}
fn default_cols() -> u16 {
    80
}
