use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::model::BookingConfig;
use crate::sweep::SweepOptions;

/// Process-level settings, read from `SLOTLINE_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub sweep_interval: Duration,
    pub dry_run: bool,
    /// Base URL of the bot webhook. Without it notifications are only logged.
    pub notify_url: Option<String>,
    pub notify_timeout: Duration,
    pub compact_threshold: u64,
    /// JSON file with the seed booking configuration.
    pub booking_config: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            sweep_interval: Duration::from_secs(900),
            dry_run: false,
            notify_url: None,
            notify_timeout: Duration::from_millis(3000),
            compact_threshold: 1000,
            booking_config: None,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let num = |key: &str| var(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            data_dir: var("SLOTLINE_DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            metrics_port: var("SLOTLINE_METRICS_PORT").and_then(|s| s.trim().parse().ok()),
            sweep_interval: num("SLOTLINE_SWEEP_INTERVAL_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            dry_run: var("SLOTLINE_DRY_RUN")
                .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")),
            notify_url: var("SLOTLINE_NOTIFY_URL"),
            notify_timeout: num("SLOTLINE_NOTIFY_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.notify_timeout),
            compact_threshold: num("SLOTLINE_COMPACT_THRESHOLD").unwrap_or(defaults.compact_threshold),
            booking_config: var("SLOTLINE_BOOKING_CONFIG").map(PathBuf::from),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("slotline.wal")
    }

    pub fn sweep_options(&self) -> SweepOptions {
        SweepOptions {
            interval: self.sweep_interval,
            dry_run: self.dry_run,
            notify_timeout: self.notify_timeout,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid booking config in {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Load and validate a seed `BookingConfig` from a JSON file.
pub fn load_booking_config(path: &Path) -> Result<BookingConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: BookingConfig = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate().map_err(|reason| ConfigError::Invalid {
        path: path.to_path_buf(),
        reason,
    })?;
    Ok(config)
}
