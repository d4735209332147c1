//! Discovery settings as read from a node configuration file

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::SettingsResult;
use super::snapshot::{
    DiscoverySettingsSnapshot, DEFAULT_INITIAL_STATE_TIMEOUT_SECS, DEFAULT_PUBLISH_TIMEOUT_SECS,
};

/// Serialized form of the discovery settings.
///
/// `commit_timeout_secs` is optional: when absent the commit timeout follows
/// the publish timeout, including across later dynamic updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoverySettingsConfig {
    /// Publish window in seconds (default: 30)
    #[serde(default = "default_publish_timeout_secs")]
    pub publish_timeout_secs: u64,

    /// Commit window in seconds (default: the publish timeout)
    #[serde(default)]
    pub commit_timeout_secs: Option<u64>,

    /// Send diffs to nodes known to hold the current version (default: true)
    #[serde(default = "default_publish_diff_enabled")]
    pub publish_diff_enabled: bool,

    /// Initial state wait in seconds (default: 30, not dynamic)
    #[serde(default = "default_initial_state_timeout_secs")]
    pub initial_state_timeout_secs: u64,
}

fn default_publish_timeout_secs() -> u64 {
    DEFAULT_PUBLISH_TIMEOUT_SECS
}

fn default_publish_diff_enabled() -> bool {
    true
}

fn default_initial_state_timeout_secs() -> u64 {
    DEFAULT_INITIAL_STATE_TIMEOUT_SECS
}

impl Default for DiscoverySettingsConfig {
    fn default() -> Self {
        Self {
            publish_timeout_secs: default_publish_timeout_secs(),
            commit_timeout_secs: None,
            publish_diff_enabled: default_publish_diff_enabled(),
            initial_state_timeout_secs: default_initial_state_timeout_secs(),
        }
    }
}

impl DiscoverySettingsConfig {
    /// Whether the commit timeout was set explicitly.
    pub fn commit_timeout_explicit(&self) -> bool {
        self.commit_timeout_secs.is_some()
    }

    /// Build and validate the snapshot this config describes.
    pub fn to_snapshot(&self) -> SettingsResult<DiscoverySettingsSnapshot> {
        let publish_timeout = Duration::from_secs(self.publish_timeout_secs);
        let commit_timeout = self
            .commit_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(publish_timeout);
        DiscoverySettingsSnapshot::new(
            publish_timeout,
            commit_timeout,
            self.publish_diff_enabled,
            Duration::from_secs(self.initial_state_timeout_secs),
        )
    }
}
