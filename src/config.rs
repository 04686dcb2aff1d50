//! Configuration file parser for ~/.config/emlfeed/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are logged as warnings. Command-line flags override every
//! value here.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::sync::{DEFAULT_ATTEMPTS, DEFAULT_BATCH_SIZE, DEFAULT_DELAY};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Importer defaults read from the config file.
///
/// The database URL may embed credentials, so `Debug` masks it.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database location: a `sqlite:` URL or a file path.
    pub database_url: Option<String>,

    /// Entries per store call.
    pub batch_size: usize,

    /// Attempts per batch before the run fails.
    pub retries: u32,

    /// Seconds to wait between attempts.
    pub retry_delay_secs: u64,

    /// Suppress per-entry warnings.
    pub quiet: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            batch_size: DEFAULT_BATCH_SIZE,
            retries: DEFAULT_ATTEMPTS,
            retry_delay_secs: DEFAULT_DELAY.as_secs(),
            quiet: false,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("batch_size", &self.batch_size)
            .field("retries", &self.retries)
            .field("retry_delay_secs", &self.retry_delay_secs)
            .field("quiet", &self.quiet)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 5] = [
        "database_url",
        "batch_size",
        "retries",
        "retry_delay_secs",
        "quiet",
    ];

    /// `~/.config/emlfeed/config.toml`, or `None` when `HOME` is unset.
    pub fn default_path() -> Option<PathBuf> {
        let home = std::env::var_os("HOME")?;
        Some(
            PathBuf::from(home)
                .join(".config")
                .join("emlfeed")
                .join("config.toml"),
        )
    }

    /// Read `path`, falling back to defaults when it is missing or blank.
    ///
    /// Unknown keys only produce a warning; a malformed value is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let size = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        if size > Self::MAX_FILE_SIZE {
            return Err(ConfigError::TooLarge(format!(
                "{} is {size} bytes, the limit is {}",
                path.display(),
                Self::MAX_FILE_SIZE
            )));
        }

        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Blank config file, using defaults");
            return Ok(Self::default());
        }

        warn_unknown_keys(&content);

        let config: Config = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), ?config, "Loaded configuration");
        Ok(config)
    }
}

fn warn_unknown_keys(content: &str) {
    let Ok(table) = content.parse::<toml::Table>() else {
        return;
    };
    for key in table.keys() {
        if !Config::KNOWN_KEYS.contains(&key.as_str()) {
            tracing::warn!(key = %key, "Unrecognized config key, ignoring");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
