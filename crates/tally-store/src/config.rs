//! Configuration for ledger store selection.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Which backend to open and how to bound it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// PostgreSQL URL for the remote store. `None` selects the file store.
    #[serde(default)]
    pub database_url: Option<String>,
    /// Directory of the local fallback snapshot.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Open the file store when the remote store cannot be reached at startup.
    #[serde(default = "default_fallback")]
    pub fallback_to_local: bool,
    /// Maximum pooled database connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Connection acquire timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Deadline for every store call in milliseconds.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_ms: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_fallback() -> bool {
    true
}

fn default_max_connections() -> u32 {
    20
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_operation_timeout() -> u64 {
    5_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            data_dir: default_data_dir(),
            fallback_to_local: default_fallback(),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout(),
            operation_timeout_ms: default_operation_timeout(),
        }
    }
}

impl StoreConfig {
    /// File store in `data_dir`.
    pub fn local(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Set the remote database URL.
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Enable or disable the local fallback.
    pub fn with_fallback(mut self, enable: bool) -> Self {
        self.fallback_to_local = enable;
        self
    }

    /// Set the per-call deadline.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}
