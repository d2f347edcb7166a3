//! Configuration file parser for ~/.config/eatfeed/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted but logged as warnings, since they are most
//! likely typos.
use crate::feed::{RefreshOptions, MAX_RESPONSE_BYTES};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

/// Top-level configuration. Any subset of keys may be given.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minutes between automatic save + refresh-all. 0 = manual refresh only.
    pub refresh_interval_minutes: u64,

    /// Wall-clock limit for one download, in seconds.
    pub fetch_timeout_secs: u64,

    pub max_response_bytes: usize,

    /// Edge length of feed icons, in pixels.
    pub icon_size: u32,

    /// Subscription list location. Defaults to `~/.eatfeed`.
    pub subscriptions_file: Option<PathBuf>,

    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval_minutes: 30,
            fetch_timeout_secs: 60,
            max_response_bytes: MAX_RESPONSE_BYTES,
            icon_size: 16,
            subscriptions_file: None,
            user_agent: concat!("eatfeed/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 6] = [
        "refresh_interval_minutes",
        "fetch_timeout_secs",
        "max_response_bytes",
        "icon_size",
        "subscriptions_file",
        "user_agent",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            refresh_interval_minutes = config.refresh_interval_minutes,
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn refresh_options(&self) -> RefreshOptions {
        RefreshOptions {
            timeout: Duration::from_secs(self.fetch_timeout_secs),
            icon_size: self.icon_size,
        }
    }

    /// `None` when automatic refresh is off.
    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_minutes > 0)
            .then(|| Duration::from_secs(self.refresh_interval_minutes * 60))
    }

    /// Configured subscription file, or `.eatfeed` under `home`.
    pub fn subscriptions_path(&self, home: &Path) -> PathBuf {
        self.subscriptions_file
            .clone()
            .unwrap_or_else(|| home.join(".eatfeed"))
    }
}
