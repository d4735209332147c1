//! Discovery settings snapshot
//!
//! Immutable once built. An update produces a whole new snapshot; nothing
//! ever mutates one field-by-field.

use std::time::Duration;

use super::errors::{SettingsError, SettingsResult};

/// Default publish timeout (seconds)
pub const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 30;
/// Default commit timeout when no publish timeout applies (seconds)
pub const DEFAULT_COMMIT_TIMEOUT_SECS: u64 = 30;
/// Default initial state timeout (seconds)
pub const DEFAULT_INITIAL_STATE_TIMEOUT_SECS: u64 = 30;
/// Upper bound on every duration setting (one day)
pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

pub(crate) const PUBLISH_TIMEOUT: &str = "discovery.publish_timeout";
pub(crate) const COMMIT_TIMEOUT: &str = "discovery.commit_timeout";
pub(crate) const INITIAL_STATE_TIMEOUT: &str = "discovery.initial_state_timeout";

/// Timeouts and feature flags consumed by publication rounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverySettingsSnapshot {
    publish_timeout: Duration,
    commit_timeout: Duration,
    publish_diff_enabled: bool,
    initial_state_timeout: Duration,
}

impl DiscoverySettingsSnapshot {
    /// Build a validated snapshot. Every duration must be non-zero and at
    /// most `MAX_TIMEOUT_SECS`, so deadlines derived from it never overflow.
    pub fn new(
        publish_timeout: Duration,
        commit_timeout: Duration,
        publish_diff_enabled: bool,
        initial_state_timeout: Duration,
    ) -> SettingsResult<Self> {
        check_duration(PUBLISH_TIMEOUT, publish_timeout)?;
        check_duration(COMMIT_TIMEOUT, commit_timeout)?;
        check_duration(INITIAL_STATE_TIMEOUT, initial_state_timeout)?;
        Ok(Self {
            publish_timeout,
            commit_timeout,
            publish_diff_enabled,
            initial_state_timeout,
        })
    }

    /// Window for collecting a publish quorum.
    pub fn publish_timeout(&self) -> Duration {
        self.publish_timeout
    }

    /// Window for collecting commit acks.
    pub fn commit_timeout(&self) -> Duration {
        self.commit_timeout
    }

    /// Whether diffs may be sent to nodes holding the current version.
    pub fn publish_diff_enabled(&self) -> bool {
        self.publish_diff_enabled
    }

    /// How long a joining node waits for its first committed state.
    pub fn initial_state_timeout(&self) -> Duration {
        self.initial_state_timeout
    }
}

fn check_duration(setting: &'static str, value: Duration) -> SettingsResult<()> {
    if value.is_zero() {
        return Err(SettingsError::NonPositive(setting));
    }
    if value > Duration::from_secs(MAX_TIMEOUT_SECS) {
        return Err(SettingsError::TooLarge {
            setting,
            max_secs: MAX_TIMEOUT_SECS,
        });
    }
    Ok(())
}

impl Default for DiscoverySettingsSnapshot {
    fn default() -> Self {
        Self {
            publish_timeout: Duration::from_secs(DEFAULT_PUBLISH_TIMEOUT_SECS),
            commit_timeout: Duration::from_secs(DEFAULT_COMMIT_TIMEOUT_SECS),
            publish_diff_enabled: true,
            initial_state_timeout: Duration::from_secs(DEFAULT_INITIAL_STATE_TIMEOUT_SECS),
        }
    }
}
