//! Recovery configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::{RecoveryError, RecoveryResult};

/// Default bound on one reestablish attempt
pub const DEFAULT_REESTABLISH_TIMEOUT_SECS: u64 = 30;

/// Default transfer chunk size (512 KiB)
pub const DEFAULT_CHUNK_SIZE_BYTES: u64 = 512 * 1024;

/// Shard recovery configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Bound on resuming a reestablished session, in seconds (default: 30)
    #[serde(default = "default_reestablish_timeout_secs")]
    pub reestablish_timeout_secs: u64,

    /// Transfer chunk size in bytes (default: 512 KiB)
    #[serde(default = "default_chunk_size_bytes")]
    pub chunk_size_bytes: u64,
}

fn default_reestablish_timeout_secs() -> u64 {
    DEFAULT_REESTABLISH_TIMEOUT_SECS
}

fn default_chunk_size_bytes() -> u64 {
    DEFAULT_CHUNK_SIZE_BYTES
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            reestablish_timeout_secs: default_reestablish_timeout_secs(),
            chunk_size_bytes: default_chunk_size_bytes(),
        }
    }
}

impl RecoveryConfig {
    pub fn reestablish_timeout(&self) -> Duration {
        Duration::from_secs(self.reestablish_timeout_secs)
    }

    /// Reject zero values.
    pub fn validate(&self) -> RecoveryResult<()> {
        if self.reestablish_timeout_secs == 0 {
            return Err(RecoveryError::InvalidConfig("reestablish_timeout_secs"));
        }
        if self.chunk_size_bytes == 0 {
            return Err(RecoveryError::InvalidConfig("chunk_size_bytes"));
        }
        Ok(())
    }
}
