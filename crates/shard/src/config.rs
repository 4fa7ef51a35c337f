//! Shard configuration via `shard.toml`
//!
//! One config file lives in the workspace root and applies to every rank.
//! On first start a default `shard.toml` is created. To change settings,
//! edit the file and restart the shard.

use crate::error::{ShardError, ShardResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use strata_wire::DEFAULT_MAX_FRAME_BYTES;

/// Config file name placed in the workspace directory.
pub const CONFIG_FILE_NAME: &str = "shard.toml";

/// Shard configuration loaded from `shard.toml`.
///
/// # Example
///
/// ```toml
/// drain_timeout_ms = 30000
/// accept_poll_ms = 20
/// max_frame_bytes = 67108864
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardConfig {
    /// How long a maintenance operation waits for pending transactions
    /// before giving up with a retryable `Busy` error.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
    /// Accept loop poll interval; bounds how quickly `shutdown` is noticed.
    #[serde(default = "default_accept_poll_ms")]
    pub accept_poll_ms: u64,
    /// Largest request frame a worker will read.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

fn default_drain_timeout_ms() -> u64 {
    30_000
}

fn default_accept_poll_ms() -> u64 {
    20
}

fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            drain_timeout_ms: default_drain_timeout_ms(),
            accept_poll_ms: default_accept_poll_ms(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl ShardConfig {
    /// Drain timeout as a `Duration`
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Accept poll interval as a `Duration`
    pub fn accept_poll(&self) -> Duration {
        Duration::from_millis(self.accept_poll_ms)
    }

    /// Reject values the server cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error if the poll interval or frame limit is zero.
    pub fn validate(&self) -> ShardResult<()> {
        if self.accept_poll_ms == 0 {
            return Err(ShardError::Config(
                "accept_poll_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_frame_bytes == 0 {
            return Err(ShardError::Config(
                "max_frame_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Strata shard configuration
#
# Milliseconds a maintenance operation (create/drop collection or index)
# waits for in-flight transactions before failing with a retryable error.
drain_timeout_ms = 30000

# Accept loop poll interval in milliseconds. Shutdown is noticed within
# one interval.
accept_poll_ms = 20

# Largest request frame accepted from a client, in bytes (default 64 MiB).
max_frame_bytes = 67108864
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> ShardResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ShardError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: ShardConfig = toml::from_str(&content).map_err(|e| {
            ShardError::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> ShardResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                ShardError::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}
