//! Metrics registry
//!
//! - Counters only, monotonic
//! - Reset only on process start
//! - Relaxed atomics; exact values, no cross-counter consistency

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters for publication and shard recovery.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    publications_started: AtomicU64,
    publications_committed: AtomicU64,
    publications_timed_out: AtomicU64,
    publications_quorum_unreachable: AtomicU64,
    publications_superseded: AtomicU64,
    publications_stale_version: AtomicU64,
    commit_stale_nodes: AtomicU64,
    full_payloads_sent: AtomicU64,
    diff_payloads_sent: AtomicU64,
    recoveries_started: AtomicU64,
    recoveries_completed: AtomicU64,
    recoveries_cancelled: AtomicU64,
    recoveries_failed: AtomicU64,
    reestablish_accepted: AtomicU64,
    reestablish_rejected: AtomicU64,
}

macro_rules! counter {
    ($inc:ident, $field:ident) => {
        #[doc = concat!("Increment `", stringify!($field), "`")]
        pub fn $inc(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl MetricsRegistry {
    /// Create a new registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    counter!(increment_publications_started, publications_started);
    counter!(increment_publications_committed, publications_committed);
    counter!(increment_publications_timed_out, publications_timed_out);
    counter!(increment_publications_quorum_unreachable, publications_quorum_unreachable);
    counter!(increment_publications_superseded, publications_superseded);
    counter!(increment_publications_stale_version, publications_stale_version);
    counter!(increment_full_payloads, full_payloads_sent);
    counter!(increment_diff_payloads, diff_payloads_sent);
    counter!(increment_recoveries_started, recoveries_started);
    counter!(increment_recoveries_completed, recoveries_completed);
    counter!(increment_recoveries_cancelled, recoveries_cancelled);
    counter!(increment_recoveries_failed, recoveries_failed);
    counter!(increment_reestablish_accepted, reestablish_accepted);
    counter!(increment_reestablish_rejected, reestablish_rejected);

    /// Add nodes that never commit-acked a round.
    pub fn add_commit_stale_nodes(&self, count: u64) {
        self.commit_stale_nodes.fetch_add(count, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            publications_started: load(&self.publications_started),
            publications_committed: load(&self.publications_committed),
            publications_timed_out: load(&self.publications_timed_out),
            publications_quorum_unreachable: load(&self.publications_quorum_unreachable),
            publications_superseded: load(&self.publications_superseded),
            publications_stale_version: load(&self.publications_stale_version),
            commit_stale_nodes: load(&self.commit_stale_nodes),
            full_payloads_sent: load(&self.full_payloads_sent),
            diff_payloads_sent: load(&self.diff_payloads_sent),
            recoveries_started: load(&self.recoveries_started),
            recoveries_completed: load(&self.recoveries_completed),
            recoveries_cancelled: load(&self.recoveries_cancelled),
            recoveries_failed: load(&self.recoveries_failed),
            reestablish_accepted: load(&self.reestablish_accepted),
            reestablish_rejected: load(&self.reestablish_rejected),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub publications_started: u64,
    pub publications_committed: u64,
    pub publications_timed_out: u64,
    pub publications_quorum_unreachable: u64,
    pub publications_superseded: u64,
    pub publications_stale_version: u64,
    pub commit_stale_nodes: u64,
    pub full_payloads_sent: u64,
    pub diff_payloads_sent: u64,
    pub recoveries_started: u64,
    pub recoveries_completed: u64,
    pub recoveries_cancelled: u64,
    pub recoveries_failed: u64,
    pub reestablish_accepted: u64,
    pub reestablish_rejected: u64,
}
