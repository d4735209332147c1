//! Publication Quorum Tests
//!
//! End-to-end publish/commit rounds over the loopback transport:
//! - Success needs floor(N/2)+1 voting acks within the publish window
//! - Commits go only to nodes that acked
//! - Nodes that never commit-ack are reported stale and healed with a full
//!   state next round
//!
//! Timing scenarios run in paused tokio time.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use meshstate::identity::{ClusterStateVersion, NodeId};
use meshstate::observability::MetricsRegistry;
use meshstate::publication::{
    AckCollector, AckRecord, ClusterState, ClusterStateApplier, ClusterStateCoordinator,
    ClusterTransport, LinkBehavior, LoopbackTransport, PublishError, PublishOutcome, SentMessage,
    StaticMembership, TransportFuture, TransportResult,
};
use meshstate::settings::{DiscoverySettingsSnapshot, DynamicSettingsStore};
use meshstate::wire::{
    AckOutcome, CommitAck, CommitRequest, PayloadKind, PublishAck, PublishRequest,
};
use serde_json::json;
use tokio::time::Instant;

struct Cluster {
    transport: Arc<LoopbackTransport>,
    appliers: Vec<Arc<ClusterStateApplier>>,
    metrics: Arc<MetricsRegistry>,
    coordinator: ClusterStateCoordinator,
}

fn node(i: usize) -> NodeId {
    NodeId::new(format!("n{}", i))
}

fn nodes(range: std::ops::RangeInclusive<usize>) -> BTreeSet<NodeId> {
    range.map(node).collect()
}

fn cluster(n: usize) -> Arc<Cluster> {
    let transport = Arc::new(LoopbackTransport::new());
    let appliers = (1..=n)
        .map(|i| {
            let applier = Arc::new(ClusterStateApplier::new(
                node(i),
                &DiscoverySettingsSnapshot::default(),
            ));
            transport.register(Arc::clone(&applier));
            applier
        })
        .collect();
    let metrics = Arc::new(MetricsRegistry::new());
    let coordinator = ClusterStateCoordinator::new(
        transport.clone(),
        Arc::new(StaticMembership::new((1..=n).map(node))),
        Arc::new(DynamicSettingsStore::default()),
        Arc::clone(&metrics),
    );
    Arc::new(Cluster {
        transport,
        appliers,
        metrics,
        coordinator,
    })
}

fn publish_kind_to(transport: &LoopbackTransport, target: &NodeId, version: u64) -> Vec<PayloadKind> {
    transport
        .sent()
        .into_iter()
        .filter_map(|message| match message {
            SentMessage::Publish {
                target: t,
                version: v,
                payload_kind,
            } if &t == target && v == ClusterStateVersion::new(version) => Some(payload_kind),
            _ => None,
        })
        .collect()
}

// =============================================================================
// Quorum Timing
// =============================================================================

/// Three of five nodes ack at t=10s: the round succeeds at t=10s, commits go
/// to those three only, the other two are reported stale.
#[tokio::test(start_paused = true)]
async fn test_majority_acks_at_ten_seconds_commits() {
    let c = cluster(5);
    for i in 1..=3 {
        c.transport
            .set_link(&node(i), LinkBehavior::Delay(Duration::from_secs(10)));
    }
    for i in 4..=5 {
        c.transport.set_link(&node(i), LinkBehavior::Unresponsive);
    }

    let state = ClusterState::empty().next().with_entry("k", json!("v"));
    let publisher = Arc::clone(&c);
    let round_state = state.clone();
    let round = tokio::spawn(async move { publisher.coordinator.publish(round_state).await });

    tokio::time::sleep(Duration::from_secs(9)).await;
    assert_eq!(c.coordinator.current_version(), ClusterStateVersion::INITIAL);
    assert!(c.transport.commits_sent().is_empty());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(c.coordinator.current_version(), ClusterStateVersion::new(1));
    let commits: BTreeSet<NodeId> = c.transport.commits_sent().into_iter().collect();
    assert_eq!(commits, nodes(1..=3));

    let report = round.await.unwrap().unwrap();
    assert_eq!(report.acked, nodes(1..=3));
    assert_eq!(report.committed, nodes(1..=3));
    assert_eq!(report.stale, nodes(4..=5));
    assert_eq!(c.transport.commits_sent().len(), 3);

    for applier in &c.appliers[..3] {
        assert_eq!(*applier.current_state(), state);
    }
    for applier in &c.appliers[3..] {
        assert_eq!(applier.current_version(), ClusterStateVersion::INITIAL);
    }

    let metrics = c.metrics.snapshot();
    assert_eq!(metrics.publications_committed, 1);
    assert_eq!(metrics.commit_stale_nodes, 2);
}

/// Only two of five ever ack: the round times out at the 30s publish
/// timeout, nothing is committed and the version does not move.
#[tokio::test(start_paused = true)]
async fn test_minority_acks_times_out() {
    let c = cluster(5);
    for i in 3..=5 {
        c.transport.set_link(&node(i), LinkBehavior::Unresponsive);
    }

    let start = Instant::now();
    let err = c
        .coordinator
        .publish(ClusterState::empty().next())
        .await
        .unwrap_err();

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(30));
    assert!(elapsed < Duration::from_secs(31));
    assert_eq!(
        err,
        PublishError::Timeout {
            version: ClusterStateVersion::new(1),
            acked: 2,
            quorum: 3,
        }
    );
    assert!(c.transport.commits_sent().is_empty());
    assert_eq!(c.coordinator.current_version(), ClusterStateVersion::INITIAL);
    for applier in &c.appliers {
        assert_eq!(applier.current_version(), ClusterStateVersion::INITIAL);
    }
    assert_eq!(c.metrics.snapshot().publications_timed_out, 1);
}

/// After a timed-out round the next candidate still has to be the successor
/// of the last committed version.
#[tokio::test(start_paused = true)]
async fn test_timed_out_version_can_be_republished() {
    let c = cluster(3);
    for i in 2..=3 {
        c.transport.set_link(&node(i), LinkBehavior::Unresponsive);
    }
    assert!(c.coordinator.publish(ClusterState::empty().next()).await.is_err());

    for i in 2..=3 {
        c.transport.set_link(&node(i), LinkBehavior::Deliver);
    }
    let report = c
        .coordinator
        .publish(ClusterState::empty().next())
        .await
        .unwrap();
    assert_eq!(report.version, ClusterStateVersion::new(1));
    assert_eq!(report.committed, nodes(1..=3));
}

// =============================================================================
// Round Lifetime
// =============================================================================

/// Counts one in-flight send until the send future is dropped.
struct LiveSend(Arc<AtomicUsize>);

impl LiveSend {
    fn new(live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(live))
    }
}

impl Drop for LiveSend {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Transport whose peers never answer.
#[derive(Default)]
struct SilentTransport {
    live: Arc<AtomicUsize>,
}

impl SilentTransport {
    fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl ClusterTransport for SilentTransport {
    fn send_publish(&self, _target: &NodeId, _request: PublishRequest) -> TransportFuture<PublishAck> {
        let send = LiveSend::new(&self.live);
        Box::pin(async move {
            let _send = send;
            std::future::pending::<TransportResult<PublishAck>>().await
        })
    }

    fn send_commit(&self, _target: &NodeId, _request: CommitRequest) -> TransportFuture<CommitAck> {
        let send = LiveSend::new(&self.live);
        Box::pin(async move {
            let _send = send;
            std::future::pending::<TransportResult<CommitAck>>().await
        })
    }
}

fn silent_coordinator(transport: &Arc<SilentTransport>) -> Arc<ClusterStateCoordinator> {
    Arc::new(ClusterStateCoordinator::new(
        transport.clone(),
        Arc::new(StaticMembership::new((1..=3).map(node))),
        Arc::new(DynamicSettingsStore::default()),
        Arc::new(MetricsRegistry::new()),
    ))
}

/// Rounds that time out against silent peers leave no send behind.
#[tokio::test(start_paused = true)]
async fn test_timed_out_rounds_leave_no_sends_running() {
    let transport = Arc::new(SilentTransport::default());
    let coordinator = silent_coordinator(&transport);

    for _ in 0..5 {
        let err = coordinator
            .publish(ClusterState::empty().next())
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Timeout { .. }));
    }
    tokio::time::sleep(Duration::from_secs(3_600)).await;
    assert_eq!(transport.live(), 0);
}

/// A superseded round stops its sends; only the replacement's stay live.
#[tokio::test(start_paused = true)]
async fn test_superseded_round_stops_its_sends() {
    let transport = Arc::new(SilentTransport::default());
    let coordinator = silent_coordinator(&transport);

    let first = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.publish(ClusterState::empty().next()).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(transport.live(), 3);

    let second = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.publish(ClusterState::empty().next()).await })
    };
    assert_eq!(
        first.await.unwrap(),
        Err(PublishError::Superseded(ClusterStateVersion::new(1)))
    );
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(transport.live(), 3);

    assert!(matches!(
        second.await.unwrap(),
        Err(PublishError::Timeout { .. })
    ));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(transport.live(), 0);
}

/// Dropping a publish mid-round aborts its sends.
#[tokio::test(start_paused = true)]
async fn test_dropped_publish_stops_its_sends() {
    let transport = Arc::new(SilentTransport::default());
    let coordinator = silent_coordinator(&transport);

    let round = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.publish(ClusterState::empty().next()).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(transport.live(), 3);

    round.abort();
    assert!(round.await.unwrap_err().is_cancelled());
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(transport.live(), 0);
}

// =============================================================================
// Stale Node Healing
// =============================================================================

/// A node that missed a commit receives a full state next round while the
/// others receive a diff.
#[tokio::test(start_paused = true)]
async fn test_stale_node_receives_full_state_next_round() {
    let c = cluster(3);
    c.transport.set_link(&node(3), LinkBehavior::Unresponsive);

    let s1 = ClusterState::empty().next().with_entry("a", json!(1));
    let report = c.coordinator.publish(s1.clone()).await.unwrap();
    assert_eq!(report.stale, nodes(3..=3));

    c.transport.set_link(&node(3), LinkBehavior::Deliver);
    let s2 = s1.next().with_entry("b", json!(2));
    let report = c.coordinator.publish(s2.clone()).await.unwrap();

    assert_eq!(report.committed, nodes(1..=3));
    assert_eq!(publish_kind_to(&c.transport, &node(1), 2), vec![PayloadKind::Diff]);
    assert_eq!(publish_kind_to(&c.transport, &node(3), 2), vec![PayloadKind::Full]);
    assert_eq!(*c.appliers[2].current_state(), s2);
}

// =============================================================================
// Follower Ordering
// =============================================================================

/// A follower never accepts a version at or below the one it holds.
#[test]
fn test_follower_rejects_older_version() {
    let applier = ClusterStateApplier::new(node(1), &DiscoverySettingsSnapshot::default());
    let s1 = ClusterState::empty().next();
    let s2 = s1.next();

    for state in [&s1, &s2] {
        let ack = applier.handle_publish(PublishRequest {
            version: state.version(),
            payload_kind: PayloadKind::Full,
            payload: state.encode().unwrap(),
        });
        assert_eq!(ack.outcome, AckOutcome::Ack);
        applier
            .handle_commit(meshstate::wire::CommitRequest {
                version: state.version(),
            })
            .unwrap();
    }

    let ack = applier.handle_publish(PublishRequest {
        version: s1.version(),
        payload_kind: PayloadKind::Full,
        payload: s1.encode().unwrap(),
    });
    assert_eq!(ack.outcome, AckOutcome::Nack);
    assert_eq!(applier.current_version(), ClusterStateVersion::new(2));
}

// =============================================================================
// Concurrency
// =============================================================================

/// Acks recorded from many threads at once resolve the session exactly once.
#[test]
fn test_concurrent_acks_resolve_once() {
    let members = nodes(1..=9);
    let version = ClusterStateVersion::new(1);
    let collector = Arc::new(AckCollector::new(version, members.clone(), members.clone()));

    let handles: Vec<_> = members
        .into_iter()
        .map(|node_id| {
            let collector = Arc::clone(&collector);
            thread::spawn(move || {
                collector.record(&AckRecord {
                    node_id,
                    version,
                    outcome: AckOutcome::Ack,
                })
            })
        })
        .collect();

    let resolutions: Vec<PublishOutcome> = handles
        .into_iter()
        .filter_map(|handle| handle.join().unwrap())
        .collect();
    assert_eq!(resolutions, vec![PublishOutcome::Success]);
    assert_eq!(collector.resolution(), Some(PublishOutcome::Success));
    assert_eq!(collector.tally().acked.len(), 9);
}
