//! Configuration loading and parsing for qdelay.
//!
//! ```toml
//! [queue]
//! key = "jobs"
//! poll_interval_ms = 10
//! strict_payload_type = false
//!
//! [store]
//! path = "/var/lib/qdelay/queue.db"
//! busy_timeout_ms = 5000
//! ```
//!
//! Every field is optional. Values missing from the file fall back to the built-in
//! defaults; command-line flags take precedence over both.

use std::path::{Path, PathBuf};
use std::time::Duration;

use qdelay_core::{DEFAULT_POLL_INTERVAL, QueueOptions};
use qdelay_store::SqliteOptions;
use qdelay_types::{EmptyQueueKey, QueueKey};
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_QUEUE_KEY: &str = "qdelay";
pub const CONFIG_ENV_VAR: &str = "QDELAY_CONFIG";

#[derive(Debug, Default, Deserialize)]
pub struct QdelayConfig {
    pub queue: Option<QueueConfig>,
    pub store: Option<StoreConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct QueueConfig {
    /// Queue key. Default: "qdelay".
    pub key: Option<String>,
    /// Wait between empty polls in milliseconds. Default: 10.
    pub poll_interval_ms: Option<u64>,
    /// Reject payloads that do not decode into the queue's payload type. Default: false.
    #[serde(default)]
    pub strict_payload_type: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file. Default: ~/.qdelay/queue.db
    pub path: Option<PathBuf>,
    /// How long to wait for another connection's write lock. Default: 5000.
    pub busy_timeout_ms: Option<u64>,
    /// How long a claim waits for the write lock before reporting nothing due. Default: 0.
    pub claim_lock_wait_ms: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

/// `$QDELAY_CONFIG`, or `~/.qdelay/config.toml`.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV_VAR).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(path));
    }
    qdelay_dir().map(|dir| dir.join("config.toml"))
}

/// `~/.qdelay/queue.db`.
#[must_use]
pub fn default_db_path() -> Option<PathBuf> {
    qdelay_dir().map(|dir| dir.join("queue.db"))
}

fn qdelay_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".qdelay"))
}

impl QdelayConfig {
    /// Load the config file at [`config_path`]. A missing file is `Ok(None)`.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    pub fn queue_key(&self) -> Result<QueueKey, EmptyQueueKey> {
        let key = self
            .queue
            .as_ref()
            .and_then(|q| q.key.clone())
            .unwrap_or_else(|| DEFAULT_QUEUE_KEY.to_string());
        QueueKey::new(key)
    }

    #[must_use]
    pub fn queue_options(&self) -> QueueOptions {
        let queue = self.queue.as_ref();
        QueueOptions {
            poll_interval: queue
                .and_then(|q| q.poll_interval_ms)
                .filter(|ms| *ms > 0)
                .map_or(DEFAULT_POLL_INTERVAL, Duration::from_millis),
            strict_payload_type: queue.is_some_and(|q| q.strict_payload_type),
        }
    }

    #[must_use]
    pub fn db_path(&self) -> Option<PathBuf> {
        self.store
            .as_ref()
            .and_then(|s| s.path.clone())
            .or_else(default_db_path)
    }

    #[must_use]
    pub fn sqlite_options(&self) -> SqliteOptions {
        let mut options = SqliteOptions::default();
        if let Some(store) = &self.store {
            if let Some(ms) = store.busy_timeout_ms {
                options.busy_timeout = Duration::from_millis(ms);
            }
            if let Some(ms) = store.claim_lock_wait_ms {
                options.claim_lock_wait = Duration::from_millis(ms);
            }
        }
        options
    }
}
