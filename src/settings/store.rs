//! Dynamic settings store
//!
//! Holds exactly one immutable `DiscoverySettingsSnapshot` behind a
//! `tokio::sync::watch` channel:
//! - readers take an `Arc` of the whole snapshot and keep it as long as they
//!   need (an in-flight publication keeps the values it started with)
//! - an update builds a complete new snapshot and swaps it in with one
//!   `send_replace`; subscribers never observe a torn update
//! - updates are serialized so two concurrent updates cannot interleave

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;

use super::config::DiscoverySettingsConfig;
use super::errors::{SettingsError, SettingsResult};
use super::snapshot::{DiscoverySettingsSnapshot, INITIAL_STATE_TIMEOUT};
use crate::observability::{log_event_with_fields, Event};

/// A partial change to the dynamic settings.
///
/// Unset fields keep their current value. `initial_state_timeout` may only
/// be present if it repeats the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub publish_timeout: Option<Duration>,
    pub commit_timeout: Option<Duration>,
    pub publish_diff_enabled: Option<bool>,
    pub initial_state_timeout: Option<Duration>,
}

impl SettingsUpdate {
    /// Update only the publish timeout.
    pub fn publish_timeout(timeout: Duration) -> Self {
        Self {
            publish_timeout: Some(timeout),
            ..Default::default()
        }
    }

    /// Update only the commit timeout.
    pub fn commit_timeout(timeout: Duration) -> Self {
        Self {
            commit_timeout: Some(timeout),
            ..Default::default()
        }
    }

    /// Update only the diff flag.
    pub fn publish_diff_enabled(enabled: bool) -> Self {
        Self {
            publish_diff_enabled: Some(enabled),
            ..Default::default()
        }
    }
}

/// Snapshot holder with atomic, whole-value updates.
#[derive(Debug)]
pub struct DynamicSettingsStore {
    sender: watch::Sender<Arc<DiscoverySettingsSnapshot>>,
    /// Whether commit_timeout was ever set explicitly; guards updates too.
    commit_timeout_explicit: Mutex<bool>,
}

impl DynamicSettingsStore {
    /// Create a store holding `initial`.
    ///
    /// When `commit_timeout_explicit` is false the commit timeout tracks
    /// every later publish timeout update.
    pub fn new(initial: DiscoverySettingsSnapshot, commit_timeout_explicit: bool) -> Self {
        let (sender, _) = watch::channel(Arc::new(initial));
        Self {
            sender,
            commit_timeout_explicit: Mutex::new(commit_timeout_explicit),
        }
    }

    /// Create a store from configuration.
    pub fn from_config(config: &DiscoverySettingsConfig) -> SettingsResult<Self> {
        Ok(Self::new(config.to_snapshot()?, config.commit_timeout_explicit()))
    }

    /// The current snapshot.
    pub fn current(&self) -> Arc<DiscoverySettingsSnapshot> {
        self.sender.borrow().clone()
    }

    /// Subscribe to whole-snapshot updates.
    pub fn subscribe(&self) -> watch::Receiver<Arc<DiscoverySettingsSnapshot>> {
        self.sender.subscribe()
    }

    /// Apply an update, returning the snapshot now in effect.
    ///
    /// On error the current snapshot is left untouched.
    pub fn update(&self, update: SettingsUpdate) -> SettingsResult<Arc<DiscoverySettingsSnapshot>> {
        let mut explicit = self
            .commit_timeout_explicit
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let current = self.current();

        let result = Self::build(&current, &update, *explicit);
        let next = match result {
            Ok(next) => Arc::new(next),
            Err(err) => {
                let reason = err.to_string();
                log_event_with_fields(Event::SettingsRejected, &[("reason", reason.as_str())]);
                return Err(err);
            }
        };

        if update.commit_timeout.is_some() {
            *explicit = true;
        }
        self.sender.send_replace(Arc::clone(&next));

        let commit_ms = next.commit_timeout().as_millis().to_string();
        let publish_ms = next.publish_timeout().as_millis().to_string();
        log_event_with_fields(
            Event::SettingsUpdated,
            &[
                ("commit_timeout_ms", commit_ms.as_str()),
                ("publish_diff_enabled", if next.publish_diff_enabled() { "true" } else { "false" }),
                ("publish_timeout_ms", publish_ms.as_str()),
            ],
        );
        Ok(next)
    }

    fn build(
        current: &DiscoverySettingsSnapshot,
        update: &SettingsUpdate,
        commit_timeout_explicit: bool,
    ) -> SettingsResult<DiscoverySettingsSnapshot> {
        if let Some(initial) = update.initial_state_timeout {
            if initial != current.initial_state_timeout() {
                return Err(SettingsError::NotDynamic(INITIAL_STATE_TIMEOUT));
            }
        }

        let publish_timeout = update.publish_timeout.unwrap_or(current.publish_timeout());
        let commit_timeout = match update.commit_timeout {
            Some(explicit) => explicit,
            None if !commit_timeout_explicit => publish_timeout,
            None => current.commit_timeout(),
        };

        DiscoverySettingsSnapshot::new(
            publish_timeout,
            commit_timeout,
            update
                .publish_diff_enabled
                .unwrap_or(current.publish_diff_enabled()),
            current.initial_state_timeout(),
        )
    }
}

impl Default for DynamicSettingsStore {
    fn default() -> Self {
        Self::new(DiscoverySettingsSnapshot::default(), false)
    }
}
