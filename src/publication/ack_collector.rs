//! Acknowledgment accounting for one publication
//!
//! Invariants:
//! - Quorum = floor(N/2) + 1 of the voting set supplied at construction
//! - Acked, nacked and failed sets are disjoint; a node's first answer counts
//! - Records for another version, or from nodes outside the member set, are ignored
//! - Exactly one resolution is ever produced; every later trigger is discarded
//! - After `Success`, late answers are still tallied for the commit phase but
//!   never change the resolution; after any other resolution they are dropped
//!
//! Arrivals are unordered. All bookkeeping for one collector happens inside
//! a single mutex so the quorum decision is linearizable.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};

use crate::identity::{ClusterStateVersion, NodeId};
use crate::wire::{AckOutcome, PublishAck};

/// How a publication round resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Quorum of acks reached
    Success,
    /// Publish window elapsed first
    Timeout,
    /// Failures and nacks made quorum impossible
    QuorumUnreachable,
    /// A newer publication replaced this one
    Superseded,
}

impl PublishOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Timeout => "timeout",
            Self::QuorumUnreachable => "quorum_unreachable",
            Self::Superseded => "superseded",
        }
    }
}

/// One node's answer to a publish request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckRecord {
    pub node_id: NodeId,
    pub version: ClusterStateVersion,
    pub outcome: AckOutcome,
}

impl From<PublishAck> for AckRecord {
    fn from(ack: PublishAck) -> Self {
        Self {
            node_id: ack.node_id,
            version: ack.version,
            outcome: ack.outcome,
        }
    }
}

/// Point-in-time copy of the collector's bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AckTally {
    pub acked: BTreeSet<NodeId>,
    pub nacked: BTreeSet<NodeId>,
    pub failed: BTreeSet<NodeId>,
}

#[derive(Debug, Clone, Copy)]
enum Bucket {
    Acked,
    Nacked,
    Failed,
}

#[derive(Debug, Default)]
struct CollectorInner {
    tally: AckTally,
    resolution: Option<PublishOutcome>,
}

/// Tallies acks for one publication version.
#[derive(Debug)]
pub struct AckCollector {
    version: ClusterStateVersion,
    members: BTreeSet<NodeId>,
    voting: BTreeSet<NodeId>,
    quorum: usize,
    inner: Mutex<CollectorInner>,
    changed: Notify,
}

/// Quorum size for `voting` members.
pub fn quorum_size(voting: usize) -> usize {
    voting / 2 + 1
}

impl AckCollector {
    /// Create a collector.
    ///
    /// `members` is every node the publication is sent to; only answers from
    /// `voting` (a subset) count toward quorum. An empty voting set can never
    /// reach quorum and resolves `QuorumUnreachable` immediately.
    pub fn new(
        version: ClusterStateVersion,
        members: BTreeSet<NodeId>,
        voting: BTreeSet<NodeId>,
    ) -> Self {
        let voting: BTreeSet<NodeId> = voting.intersection(&members).cloned().collect();
        let quorum = quorum_size(voting.len());
        let resolution = voting.is_empty().then_some(PublishOutcome::QuorumUnreachable);

        Self {
            version,
            members,
            voting,
            quorum,
            inner: Mutex::new(CollectorInner {
                tally: AckTally::default(),
                resolution,
            }),
            changed: Notify::new(),
        }
    }

    pub fn version(&self) -> ClusterStateVersion {
        self.version
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    pub fn voting_count(&self) -> usize {
        self.voting.len()
    }

    pub fn members(&self) -> &BTreeSet<NodeId> {
        &self.members
    }

    fn lock(&self) -> MutexGuard<'_, CollectorInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record an ack or nack.
    ///
    /// Returns the resolution if this record produced it.
    pub fn record(&self, record: &AckRecord) -> Option<PublishOutcome> {
        if record.version != self.version {
            return None;
        }
        match record.outcome {
            AckOutcome::Ack => self.apply(&record.node_id, Bucket::Acked),
            AckOutcome::Nack => self.apply(&record.node_id, Bucket::Nacked),
        }
    }

    /// Record a send/receive failure; counts as an implicit nack.
    pub fn record_transport_failure(
        &self,
        node_id: &NodeId,
        version: ClusterStateVersion,
    ) -> Option<PublishOutcome> {
        if version != self.version {
            return None;
        }
        self.apply(node_id, Bucket::Failed)
    }

    fn apply(&self, node_id: &NodeId, bucket: Bucket) -> Option<PublishOutcome> {
        if !self.members.contains(node_id) {
            return None;
        }

        let mut inner = self.lock();
        let late = match inner.resolution {
            None => false,
            Some(PublishOutcome::Success) => true,
            Some(_) => return None,
        };
        let tally = &inner.tally;
        if tally.acked.contains(node_id)
            || tally.nacked.contains(node_id)
            || tally.failed.contains(node_id)
        {
            return None;
        }
        let tally = &mut inner.tally;
        let set = match bucket {
            Bucket::Acked => &mut tally.acked,
            Bucket::Nacked => &mut tally.nacked,
            Bucket::Failed => &mut tally.failed,
        };
        set.insert(node_id.clone());

        if late {
            drop(inner);
            self.changed.notify_waiters();
            return None;
        }
        let outcome = self.evaluate(&inner.tally)?;
        inner.resolution = Some(outcome);
        drop(inner);
        self.changed.notify_waiters();
        Some(outcome)
    }

    fn evaluate(&self, tally: &AckTally) -> Option<PublishOutcome> {
        let voting_acks = tally.acked.intersection(&self.voting).count();
        if voting_acks >= self.quorum {
            return Some(PublishOutcome::Success);
        }

        let rejected = tally
            .nacked
            .iter()
            .chain(tally.failed.iter())
            .filter(|node| self.voting.contains(*node))
            .count();
        if self.voting.len() - rejected < self.quorum {
            return Some(PublishOutcome::QuorumUnreachable);
        }
        None
    }

    /// Resolve `outcome` unless already resolved; returns the authoritative outcome.
    fn resolve(&self, outcome: PublishOutcome) -> PublishOutcome {
        let mut inner = self.lock();
        let resolved = *inner.resolution.get_or_insert(outcome);
        drop(inner);
        if resolved == outcome {
            self.changed.notify_waiters();
        }
        resolved
    }

    /// The publish window elapsed.
    pub fn expire(&self) -> PublishOutcome {
        self.resolve(PublishOutcome::Timeout)
    }

    /// A newer publication replaced this one.
    pub fn supersede(&self) -> PublishOutcome {
        self.resolve(PublishOutcome::Superseded)
    }

    /// Future completing on the next resolution or late answer.
    ///
    /// Registered on creation: create it before inspecting the tally.
    pub fn changed(&self) -> Notified<'_> {
        self.changed.notified()
    }

    pub fn resolution(&self) -> Option<PublishOutcome> {
        self.lock().resolution
    }

    pub fn tally(&self) -> AckTally {
        self.lock().tally.clone()
    }

    /// Voting members among the acked nodes.
    pub fn voting_acks(&self) -> usize {
        self.lock().tally.acked.intersection(&self.voting).count()
    }

    /// Voting members among the nacked and failed nodes.
    pub fn voting_rejections(&self) -> usize {
        let inner = self.lock();
        inner
            .tally
            .nacked
            .iter()
            .chain(inner.tally.failed.iter())
            .filter(|node| self.voting.contains(*node))
            .count()
    }

    /// Wait for a resolution; expires the collector at `deadline`.
    ///
    /// Dropping this future leaves the collector unresolved and still usable.
    pub async fn wait(&self, deadline: Instant) -> PublishOutcome {
        loop {
            let notified = self.changed();
            if let Some(outcome) = self.resolution() {
                return outcome;
            }
            tokio::select! {
                _ = notified => continue,
                _ = sleep_until(deadline) => return self.expire(),
            }
        }
    }
}
