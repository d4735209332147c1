//! Cluster state coordinator
//!
//! Drives publish → commit for states originated on this node.
//!
//! Invariants:
//! - A candidate must carry exactly `current_version + 1`
//! - `current_version` advances only when a round reached quorum
//! - Commit is sent only to nodes that acked, and only after quorum
//! - A round keeps the settings snapshot it started with
//! - At most one round is pending; a new round supersedes a pending one,
//!   but a round that already reached quorum proceeds to commit regardless
//!
//! Payload choice is per recipient: a node gets a diff only if diffs are
//! enabled and it is known to hold the base version. A diff that is nacked
//! is retried once as a full snapshot.
//!
//! Publish sends are owned by their round and aborted when `publish`
//! returns or is dropped, so no send outlives the round that issued it.
//! A superseded round carries the same version as its replacement. A
//! publish request it already put on the wire can still reach a follower
//! after the replacement's and overwrite the staged state there; the
//! follower then acks and commits the superseded payload. Aborting the
//! sends only narrows that window, it does not close it against a network
//! that reorders messages.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::task::JoinSet;

use super::ack_collector::{AckCollector, AckRecord, PublishOutcome};
use super::errors::{PublishError, PublishResult, TransportResult};
use super::session::PublicationSession;
use super::state::ClusterState;
use super::transport::{ClusterTransport, MembershipProvider};
use crate::identity::{ClusterStateVersion, NodeId};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::settings::DynamicSettingsStore;
use crate::wire::{AckOutcome, CommitAck, CommitRequest, PayloadKind, PublishRequest};

/// Result of a committed publication round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub version: ClusterStateVersion,
    /// Nodes that acked the publish request
    pub acked: BTreeSet<NodeId>,
    /// Nodes that commit-acked within the commit window
    pub committed: BTreeSet<NodeId>,
    /// Members that never commit-acked; they get a full state next round
    pub stale: BTreeSet<NodeId>,
}

#[derive(Debug)]
struct PendingRound {
    collector: Arc<AckCollector>,
    state: Arc<ClusterState>,
}

#[derive(Debug)]
struct CoordinatorInner {
    current: Arc<ClusterState>,
    pending: Option<PendingRound>,
    /// Last version each node commit-acked while it was current
    known_versions: BTreeMap<NodeId, ClusterStateVersion>,
}

impl CoordinatorInner {
    /// Fold a resolved pending round into the current state.
    fn settle(&mut self) {
        let resolution = match &self.pending {
            Some(round) => round.collector.resolution(),
            None => return,
        };
        match resolution {
            Some(PublishOutcome::Success) => {
                if let Some(round) = self.pending.take() {
                    if round.state.version() > self.current.version() {
                        self.current = round.state;
                    }
                }
            }
            Some(_) => self.pending = None,
            None => {}
        }
    }

    fn is_pending(&self, collector: &Arc<AckCollector>) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|round| Arc::ptr_eq(&round.collector, collector))
    }
}

/// Payload bytes prepared once per round.
#[derive(Debug)]
struct RoundPayloads {
    full: Arc<Vec<u8>>,
    diff: Option<Arc<Vec<u8>>>,
    base_version: ClusterStateVersion,
}

/// Originates publications on the elected node.
pub struct ClusterStateCoordinator {
    transport: Arc<dyn ClusterTransport>,
    membership: Arc<dyn MembershipProvider>,
    settings: Arc<DynamicSettingsStore>,
    metrics: Arc<MetricsRegistry>,
    inner: Mutex<CoordinatorInner>,
}

impl ClusterStateCoordinator {
    /// Create a coordinator starting from the empty state.
    pub fn new(
        transport: Arc<dyn ClusterTransport>,
        membership: Arc<dyn MembershipProvider>,
        settings: Arc<DynamicSettingsStore>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            transport,
            membership,
            settings,
            metrics,
            inner: Mutex::new(CoordinatorInner {
                current: Arc::new(ClusterState::empty()),
                pending: None,
                known_versions: BTreeMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CoordinatorInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Last state that reached quorum.
    pub fn current_state(&self) -> Arc<ClusterState> {
        let mut inner = self.lock();
        inner.settle();
        Arc::clone(&inner.current)
    }

    pub fn current_version(&self) -> ClusterStateVersion {
        self.current_state().version()
    }

    /// Version `node` is known to hold, if any.
    pub fn known_version(&self, node: &NodeId) -> Option<ClusterStateVersion> {
        self.lock().known_versions.get(node).copied()
    }

    /// Publish `state` and, once a quorum accepted it, commit it.
    pub async fn publish(&self, state: ClusterState) -> PublishResult<PublishReport> {
        let settings = self.settings.current();
        let members = self.membership.members();
        let voting = self.membership.voting_members();
        let version = state.version();

        let session = PublicationSession::new(version, members, voting, settings);
        let collector = Arc::clone(session.collector());
        let (payloads, known_versions) = self.begin_round(state, &session)?;

        self.metrics.increment_publications_started();
        let version_str = version.to_string();
        let member_count = session.members().len().to_string();
        let quorum = collector.quorum().to_string();
        let started_at = session.started_at().to_rfc3339();
        log_event_with_fields(
            Event::PublishStart,
            &[
                ("members", member_count.as_str()),
                ("quorum", quorum.as_str()),
                ("started_at", started_at.as_str()),
                ("version", version_str.as_str()),
            ],
        );

        // Dropping the set aborts every send still waiting on a peer.
        let mut sends = JoinSet::new();
        for node in session.members() {
            let use_diff = session.settings().publish_diff_enabled()
                && known_versions.get(node) == Some(&payloads.base_version);
            self.dispatch_publish(
                &mut sends,
                node.clone(),
                version,
                use_diff,
                &payloads,
                &collector,
            );
        }

        let outcome = session.resolve().await;
        match outcome {
            PublishOutcome::Success => {
                self.lock().settle();
                log_event_with_fields(
                    Event::PublishQuorumReached,
                    &[("version", version_str.as_str())],
                );
                Ok(self.commit(&session).await)
            }
            PublishOutcome::Timeout => {
                self.abandon(&collector);
                self.metrics.increment_publications_timed_out();
                let acked = collector.voting_acks();
                let acked_str = acked.to_string();
                log_event_with_fields(
                    Event::PublishTimeout,
                    &[("acked", acked_str.as_str()), ("version", version_str.as_str())],
                );
                Err(PublishError::Timeout {
                    version,
                    acked,
                    quorum: collector.quorum(),
                })
            }
            PublishOutcome::QuorumUnreachable => {
                self.abandon(&collector);
                self.metrics.increment_publications_quorum_unreachable();
                let rejected = collector.voting_rejections();
                let rejected_str = rejected.to_string();
                log_event_with_fields(
                    Event::PublishQuorumUnreachable,
                    &[("rejected", rejected_str.as_str()), ("version", version_str.as_str())],
                );
                Err(PublishError::QuorumUnreachable {
                    version,
                    rejected,
                    voting: collector.voting_count(),
                })
            }
            PublishOutcome::Superseded => {
                sends.abort_all();
                Err(PublishError::Superseded(version))
            }
        }
    }

    /// Validate the candidate, supersede any pending round, and install the
    /// new one. Payloads are built under the lock against the current state.
    fn begin_round(
        &self,
        state: ClusterState,
        session: &PublicationSession,
    ) -> PublishResult<(RoundPayloads, BTreeMap<NodeId, ClusterStateVersion>)> {
        let mut inner = self.lock();
        inner.settle();

        let expected = inner.current.version().successor();
        if state.version() != expected {
            return Err(self.reject_stale(expected, state.version()));
        }

        let full = Arc::new(state.encode()?);
        let diff = if session.settings().publish_diff_enabled() {
            Some(Arc::new(state.diff_from(&inner.current).encode()?))
        } else {
            None
        };

        if let Some(previous) = inner.pending.take() {
            match previous.collector.supersede() {
                PublishOutcome::Superseded => {
                    self.metrics.increment_publications_superseded();
                    let superseded = previous.collector.version().to_string();
                    log_event_with_fields(
                        Event::PublishSuperseded,
                        &[("version", superseded.as_str())],
                    );
                }
                PublishOutcome::Success => {
                    // Reached quorum after settle() ran; it owns this version now.
                    inner.current = previous.state;
                    let expected = inner.current.version().successor();
                    return Err(self.reject_stale(expected, state.version()));
                }
                PublishOutcome::Timeout | PublishOutcome::QuorumUnreachable => {}
            }
        }

        inner.pending = Some(PendingRound {
            collector: Arc::clone(session.collector()),
            state: Arc::new(state),
        });

        let payloads = RoundPayloads {
            full,
            diff,
            base_version: inner.current.version(),
        };
        Ok((payloads, inner.known_versions.clone()))
    }

    fn reject_stale(&self, expected: ClusterStateVersion, found: ClusterStateVersion) -> PublishError {
        self.metrics.increment_publications_stale_version();
        let expected_str = expected.to_string();
        let found_str = found.to_string();
        log_event_with_fields(
            Event::PublishStaleVersion,
            &[("expected", expected_str.as_str()), ("found", found_str.as_str())],
        );
        PublishError::StaleVersion { expected, found }
    }

    /// Drop the round if it is still the pending one.
    fn abandon(&self, collector: &Arc<AckCollector>) {
        let mut inner = self.lock();
        if inner.is_pending(collector) {
            inner.pending = None;
        }
    }

    fn dispatch_publish(
        &self,
        sends: &mut JoinSet<()>,
        node: NodeId,
        version: ClusterStateVersion,
        use_diff: bool,
        payloads: &RoundPayloads,
        collector: &Arc<AckCollector>,
    ) {
        let transport = Arc::clone(&self.transport);
        let metrics = Arc::clone(&self.metrics);
        let collector = Arc::clone(collector);
        let full = Arc::clone(&payloads.full);
        let diff = payloads.diff.as_ref().filter(|_| use_diff).map(Arc::clone);

        sends.spawn(async move {
            let request = |payload_kind: PayloadKind, payload: &Arc<Vec<u8>>| PublishRequest {
                version,
                payload_kind,
                payload: payload.to_vec(),
            };

            let first = match &diff {
                Some(diff) => {
                    metrics.increment_diff_payloads();
                    transport.send_publish(&node, request(PayloadKind::Diff, diff)).await
                }
                None => {
                    metrics.increment_full_payloads();
                    transport.send_publish(&node, request(PayloadKind::Full, &full)).await
                }
            };

            let answer = match first {
                Ok(ack) if diff.is_some() && ack.outcome == AckOutcome::Nack => {
                    metrics.increment_full_payloads();
                    transport.send_publish(&node, request(PayloadKind::Full, &full)).await
                }
                other => other,
            };

            match answer {
                Ok(ack) => {
                    collector.record(&AckRecord {
                        node_id: node,
                        version: ack.version,
                        outcome: ack.outcome,
                    });
                }
                Err(_) => {
                    collector.record_transport_failure(&node, version);
                }
            }
        });
    }

    /// Send commit to every node that acked, including nodes whose ack
    /// arrives during the commit window, and wait for their commit acks.
    ///
    /// Bounded by the captured commit timeout; ends early once every member
    /// answered the publish and every commit was answered.
    async fn commit(&self, session: &PublicationSession) -> PublishReport {
        let version = session.version();
        let version_str = version.to_string();
        let collector = session.collector();
        let deadline = tokio::time::Instant::now() + session.settings().commit_timeout();

        let mut sent = BTreeSet::new();
        let mut committed = BTreeSet::new();
        let mut in_flight = FuturesUnordered::new();

        let commit_phase = async {
            loop {
                let changed = collector.changed();
                let tally = collector.tally();

                let newly_acked: Vec<NodeId> = tally.acked.difference(&sent).cloned().collect();
                if !newly_acked.is_empty() {
                    let count = newly_acked.len().to_string();
                    log_event_with_fields(
                        Event::CommitSent,
                        &[("nodes", count.as_str()), ("version", version_str.as_str())],
                    );
                }
                for node in newly_acked {
                    in_flight.push(send_commit(self.transport.as_ref(), node.clone(), version));
                    sent.insert(node);
                }

                let answered = tally.acked.len() + tally.nacked.len() + tally.failed.len();
                if in_flight.is_empty() && answered >= session.members().len() {
                    break;
                }

                tokio::select! {
                    Some((node, response)) = in_flight.next(), if !in_flight.is_empty() => {
                        if let Ok(ack) = response {
                            if ack.version == version {
                                committed.insert(node);
                            }
                        }
                    }
                    _ = changed => {}
                }
            }
        };
        let _ = tokio::time::timeout_at(deadline, commit_phase).await;

        let stale: BTreeSet<NodeId> = session.members().difference(&committed).cloned().collect();
        for node in &stale {
            log_event_with_fields(
                Event::CommitStaleNode,
                &[("node", node.as_str()), ("version", version_str.as_str())],
            );
        }

        {
            let mut inner = self.lock();
            inner.settle();
            if inner.current.version() == version {
                inner.known_versions = committed.iter().map(|node| (node.clone(), version)).collect();
            }
        }

        self.metrics.increment_publications_committed();
        self.metrics.add_commit_stale_nodes(stale.len() as u64);
        let committed_count = committed.len().to_string();
        let stale_count = stale.len().to_string();
        log_event_with_fields(
            Event::CommitComplete,
            &[
                ("committed", committed_count.as_str()),
                ("stale", stale_count.as_str()),
                ("version", version_str.as_str()),
            ],
        );

        PublishReport {
            version,
            acked: collector.tally().acked,
            committed,
            stale,
        }
    }
}

fn send_commit(
    transport: &dyn ClusterTransport,
    node: NodeId,
    version: ClusterStateVersion,
) -> impl Future<Output = (NodeId, TransportResult<CommitAck>)> {
    let response = transport.send_commit(&node, CommitRequest { version });
    async move { (node, response.await) }
}

impl std::fmt::Debug for ClusterStateCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterStateCoordinator")
            .field("current_version", &self.current_version())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publication::{ClusterStateApplier, LinkBehavior, LoopbackTransport, StaticMembership};
    use crate::settings::{DiscoverySettingsSnapshot, SettingsUpdate};
    use crate::wire::PayloadKind;
    use serde_json::json;
    use std::time::Duration;

    struct Cluster {
        transport: Arc<LoopbackTransport>,
        appliers: Vec<Arc<ClusterStateApplier>>,
        settings: Arc<DynamicSettingsStore>,
        metrics: Arc<MetricsRegistry>,
        coordinator: ClusterStateCoordinator,
    }

    fn node(i: usize) -> NodeId {
        NodeId::new(format!("n{}", i))
    }

    fn cluster(n: usize) -> Cluster {
        let transport = Arc::new(LoopbackTransport::new());
        let appliers: Vec<_> = (1..=n)
            .map(|i| {
                let applier = Arc::new(ClusterStateApplier::new(
                    node(i),
                    &DiscoverySettingsSnapshot::default(),
                ));
                transport.register(Arc::clone(&applier));
                applier
            })
            .collect();
        let settings = Arc::new(DynamicSettingsStore::default());
        let metrics = Arc::new(MetricsRegistry::new());
        let coordinator = ClusterStateCoordinator::new(
            transport.clone(),
            Arc::new(StaticMembership::new((1..=n).map(node))),
            Arc::clone(&settings),
            Arc::clone(&metrics),
        );
        Cluster {
            transport,
            appliers,
            settings,
            metrics,
            coordinator,
        }
    }

    fn publish_kinds(transport: &LoopbackTransport, version: u64) -> Vec<PayloadKind> {
        transport
            .sent()
            .into_iter()
            .filter_map(|message| match message {
                crate::publication::SentMessage::Publish {
                    version: v,
                    payload_kind,
                    ..
                } if v == ClusterStateVersion::new(version) => Some(payload_kind),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_publish_commits_on_all_nodes() {
        let c = cluster(3);
        let state = ClusterState::empty().next().with_entry("k", json!(1));

        let report = c.coordinator.publish(state.clone()).await.unwrap();
        assert_eq!(report.committed.len(), 3);
        assert!(report.stale.is_empty());
        assert_eq!(c.coordinator.current_version(), ClusterStateVersion::new(1));
        for applier in &c.appliers {
            assert_eq!(*applier.current_state(), state);
        }
        assert_eq!(c.metrics.snapshot().publications_committed, 1);
    }

    #[tokio::test]
    async fn test_non_successor_version_rejected() {
        let c = cluster(3);
        let skipped = ClusterState::empty().next().next();
        let err = c.coordinator.publish(skipped).await.unwrap_err();
        assert_eq!(
            err,
            PublishError::StaleVersion {
                expected: ClusterStateVersion::new(1),
                found: ClusterStateVersion::new(2),
            }
        );
        assert!(c.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_second_round_uses_diffs_for_committed_nodes() {
        let c = cluster(3);
        let s1 = ClusterState::empty().next().with_entry("a", json!(1));
        c.coordinator.publish(s1.clone()).await.unwrap();
        assert_eq!(publish_kinds(&c.transport, 1), vec![PayloadKind::Full; 3]);

        let s2 = s1.next().with_entry("b", json!(2));
        c.coordinator.publish(s2.clone()).await.unwrap();
        assert_eq!(publish_kinds(&c.transport, 2), vec![PayloadKind::Diff; 3]);
        assert_eq!(*c.appliers[0].current_state(), s2);
    }

    #[tokio::test]
    async fn test_diff_disabled_sends_full() {
        let c = cluster(3);
        c.settings
            .update(SettingsUpdate::publish_diff_enabled(false))
            .unwrap();
        let s1 = ClusterState::empty().next();
        c.coordinator.publish(s1.clone()).await.unwrap();
        c.coordinator.publish(s1.next()).await.unwrap();
        assert_eq!(publish_kinds(&c.transport, 2), vec![PayloadKind::Full; 3]);
    }

    #[tokio::test]
    async fn test_quorum_unreachable_fails_fast() {
        let c = cluster(3);
        c.transport.set_link(&node(2), LinkBehavior::Fail);
        c.transport.set_link(&node(3), LinkBehavior::Fail);

        let err = c.coordinator.publish(ClusterState::empty().next()).await.unwrap_err();
        assert!(matches!(err, PublishError::QuorumUnreachable { rejected: 2, voting: 3, .. }));
        assert_eq!(c.coordinator.current_version(), ClusterStateVersion::INITIAL);
        assert!(c.transport.commits_sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_settings_captured_at_round_start() {
        let c = Arc::new(cluster(3));
        c.settings
            .update(SettingsUpdate::publish_timeout(Duration::from_secs(10)))
            .unwrap();
        for i in 2..=3 {
            c.transport.set_link(&node(i), LinkBehavior::Unresponsive);
        }

        let start = tokio::time::Instant::now();
        let publisher = Arc::clone(&c);
        let round = tokio::spawn(async move {
            publisher.coordinator.publish(ClusterState::empty().next()).await
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        c.settings
            .update(SettingsUpdate::publish_timeout(Duration::from_secs(60)))
            .unwrap();

        let result = round.await.unwrap();
        assert!(matches!(result, Err(PublishError::Timeout { .. })));
        assert!(start.elapsed() < Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_round_superseded() {
        let c = Arc::new(cluster(3));
        for i in 1..=3 {
            c.transport
                .set_link(&node(i), LinkBehavior::Delay(Duration::from_secs(5)));
        }

        let publisher = Arc::clone(&c);
        let first = tokio::spawn(async move {
            publisher
                .coordinator
                .publish(ClusterState::empty().next().with_entry("v", json!("old")))
                .await
        });
        tokio::time::sleep(Duration::from_secs(1)).await;

        let replacement = ClusterState::empty().next().with_entry("v", json!("new"));
        let report = c.coordinator.publish(replacement.clone()).await.unwrap();
        assert_eq!(report.version, ClusterStateVersion::new(1));

        let first = first.await.unwrap();
        assert_eq!(first, Err(PublishError::Superseded(ClusterStateVersion::new(1))));
        assert_eq!(*c.coordinator.current_state(), replacement);
        assert_eq!(c.metrics.snapshot().publications_superseded, 1);
    }
}
