//! One round of state dissemination
//!
//! A session captures everything a round needs at the moment it starts:
//! - the member and voting sets
//! - the settings snapshot (later settings updates do not touch it)
//! - the publish deadline
//!
//! It is destroyed when its collector resolves and the commit phase, if any,
//! finishes.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use super::ack_collector::{AckCollector, PublishOutcome};
use crate::identity::{ClusterStateVersion, NodeId};
use crate::settings::DiscoverySettingsSnapshot;

/// State of a single publication round.
#[derive(Debug)]
pub struct PublicationSession {
    version: ClusterStateVersion,
    started_at: DateTime<Utc>,
    started: Instant,
    settings: Arc<DiscoverySettingsSnapshot>,
    collector: Arc<AckCollector>,
}

impl PublicationSession {
    pub fn new(
        version: ClusterStateVersion,
        members: BTreeSet<NodeId>,
        voting: BTreeSet<NodeId>,
        settings: Arc<DiscoverySettingsSnapshot>,
    ) -> Self {
        Self {
            version,
            started_at: Utc::now(),
            started: Instant::now(),
            settings,
            collector: Arc::new(AckCollector::new(version, members, voting)),
        }
    }

    pub fn version(&self) -> ClusterStateVersion {
        self.version
    }

    /// Wall-clock start time, for logs.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Settings captured when the session started.
    pub fn settings(&self) -> &DiscoverySettingsSnapshot {
        &self.settings
    }

    pub fn collector(&self) -> &Arc<AckCollector> {
        &self.collector
    }

    pub fn members(&self) -> &BTreeSet<NodeId> {
        self.collector.members()
    }

    /// Instant the publish window closes.
    pub fn publish_deadline(&self) -> Instant {
        self.started + self.settings.publish_timeout()
    }

    /// Members that have not answered yet.
    pub fn pending_nodes(&self) -> BTreeSet<NodeId> {
        let tally = self.collector.tally();
        self.members()
            .iter()
            .filter(|node| {
                !tally.acked.contains(*node)
                    && !tally.nacked.contains(*node)
                    && !tally.failed.contains(*node)
            })
            .cloned()
            .collect()
    }

    pub fn acked_nodes(&self) -> BTreeSet<NodeId> {
        self.collector.tally().acked
    }

    /// Nacked and failed members.
    pub fn failed_nodes(&self) -> BTreeSet<NodeId> {
        let tally = self.collector.tally();
        tally.nacked.union(&tally.failed).cloned().collect()
    }

    /// Wait for the round to resolve, bounded by the captured publish timeout.
    pub async fn resolve(&self) -> PublishOutcome {
        self.collector.wait(self.publish_deadline()).await
    }
}
