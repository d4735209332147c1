//! Recovery Reestablish Tests
//!
//! A target that lost its connection mid-recovery asks the source to
//! reestablish the session:
//! - identity must match exactly (recovery id, shard, target allocation)
//! - the transfer resumes from the last recorded checkpoint
//! - a second attempt while one is in flight is rejected Busy
//! - completed or cancelled sessions answer NotFound

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use meshstate::identity::{AllocationId, Checkpoint, ErrorKind, NodeId, RecoveryId, ShardId};
use meshstate::observability::MetricsRegistry;
use meshstate::shard_recovery::{
    AllocationTable, RecoveryError, RecoveryReestablishHandler, RecoveryResult, RecoveryResumer,
    RecoverySessionRegistry, RecoveryState, ResumeFuture, ResumeToken, TransferPlan,
};
use meshstate::wire::ReestablishRecoveryRequest;

/// Resumer that takes a fixed time and counts its calls.
struct SlowResumer {
    delay: Duration,
    calls: AtomicUsize,
}

impl SlowResumer {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            calls: AtomicUsize::new(0),
        })
    }
}

impl RecoveryResumer for SlowResumer {
    fn resume(&self, _token: &ResumeToken) -> ResumeFuture {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            Ok::<(), RecoveryError>(())
        })
    }
}

fn shard() -> ShardId {
    ShardId::new("idx", 2)
}

fn registry() -> Arc<RecoverySessionRegistry> {
    Arc::new(RecoverySessionRegistry::new(Arc::new(MetricsRegistry::new())))
}

fn start(registry: &RecoverySessionRegistry, allocation: &str) -> RecoveryId {
    registry.start_session(
        shard(),
        NodeId::new("source"),
        NodeId::new("target"),
        AllocationId::new(allocation),
    )
}

fn handler(
    registry: Arc<RecoverySessionRegistry>,
    allocation: &str,
    resumer: Arc<SlowResumer>,
) -> RecoveryReestablishHandler {
    let allocations = Arc::new(AllocationTable::new());
    allocations.assign(shard(), AllocationId::new(allocation));
    RecoveryReestablishHandler::new(registry, allocations, resumer, Duration::from_secs(30))
}

fn request(id: RecoveryId, allocation: &str) -> ReestablishRecoveryRequest {
    ReestablishRecoveryRequest::new(id, shard(), AllocationId::new(allocation))
}

// =============================================================================
// Identity Validation
// =============================================================================

/// Recovery 7 on shard (idx, 2) was started for allocation A1; the target now
/// reports A2. The request fails AllocationMismatch and the session keeps
/// its state and checkpoint.
#[test]
fn test_reassigned_target_gets_allocation_mismatch() {
    let registry = registry();
    let mut id = start(&registry, "A1");
    while id != RecoveryId::new(7) {
        registry.cancel_session(id, "setup").unwrap();
        id = start(&registry, "A1");
    }
    registry.record_checkpoint(id, Checkpoint::new(65_536)).unwrap();
    registry.mark_disconnected(id).unwrap();
    let before = registry.get(id).unwrap();

    let err = registry
        .reestablish(id, &shard(), &AllocationId::new("A2"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AllocationMismatch);
    assert!(!err.kind().is_resumable());

    let after = registry.get(id).unwrap();
    assert_eq!(after, before);
    assert_eq!(after.state(), RecoveryState::Disconnected);
    assert_eq!(after.last_checkpoint(), Checkpoint::new(65_536));
}

/// Once a session completed, reestablishing it is a harmless NotFound.
#[test]
fn test_completed_session_is_not_found() {
    let registry = registry();
    let id = start(&registry, "A1");
    registry.complete_session(id).unwrap();

    let err = registry
        .reestablish(id, &shard(), &AllocationId::new("A1"))
        .unwrap_err();
    assert_eq!(err, RecoveryError::NotFound(id));
}

#[test]
fn test_unknown_id_is_not_found() {
    let registry = registry();
    let err = registry
        .reestablish(RecoveryId::new(42), &shard(), &AllocationId::new("A1"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

/// A cancelled session rejects every later reestablish.
#[tokio::test]
async fn test_cancelled_session_rejects_reestablish() {
    let registry = registry();
    let id = start(&registry, "A1");
    registry.cancel_session(id, "index deleted").unwrap();

    let handler = handler(registry, "A1", SlowResumer::new(Duration::ZERO));
    let err = handler.handle(request(id, "A1")).await.unwrap_err();
    assert_eq!(err, RecoveryError::NotFound(id));
}

// =============================================================================
// Concurrency
// =============================================================================

/// Two reestablish requests for one session: exactly one proceeds, the other
/// is rejected Busy, and the resumer runs once.
#[tokio::test(start_paused = true)]
async fn test_concurrent_handle_calls_one_busy() {
    let registry = registry();
    let id = start(&registry, "A1");
    registry.mark_disconnected(id).unwrap();
    let resumer = SlowResumer::new(Duration::from_secs(1));
    let handler = handler(Arc::clone(&registry), "A1", Arc::clone(&resumer));

    let (first, second) = tokio::join!(
        handler.handle(request(id, "A1")),
        handler.handle(request(id, "A1"))
    );

    let results = [first, second];
    let accepted = results.iter().filter(|r| r.is_ok()).count();
    let busy = results
        .iter()
        .filter(|r| matches!(r, Err(RecoveryError::Busy(busy_id)) if *busy_id == id))
        .count();
    assert_eq!(accepted, 1);
    assert_eq!(busy, 1);
    assert_eq!(resumer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(registry.get(id).unwrap().state(), RecoveryState::Active);
}

/// Registry-level race from many threads: one winner, everyone else Busy.
#[test]
fn test_concurrent_reestablish_threads_one_winner() {
    let registry = registry();
    let id = start(&registry, "A1");
    registry.mark_disconnected(id).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.reestablish(id, &shard(), &AllocationId::new("A1")))
        })
        .collect();
    let results: Vec<RecoveryResult<ResumeToken>> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter(|r| r.is_err())
        .all(|r| r == &Err(RecoveryError::Busy(id))));
}

// =============================================================================
// Resumption
// =============================================================================

/// Interrupt a transfer, reestablish, and finish from the returned
/// checkpoint: the target ends up with exactly the source bytes.
#[tokio::test]
async fn test_resumed_transfer_identical_to_uninterrupted() {
    let source: Vec<u8> = (0..10_000u32).map(|i| (i % 97) as u8).collect();
    let plan = TransferPlan::new(source.len() as u64, 1_024).unwrap();

    let mut uninterrupted = Vec::new();
    plan.copy_from(&source, Checkpoint::START, &mut uninterrupted, |_| true);

    let registry = registry();
    let id = start(&registry, "A1");
    let mut received = Vec::new();
    let mut chunks = 0;
    plan.copy_from(&source, Checkpoint::START, &mut received, |checkpoint| {
        chunks += 1;
        registry.record_checkpoint(id, checkpoint).unwrap();
        chunks < 4
    });
    registry.mark_disconnected(id).unwrap();

    let handler = handler(Arc::clone(&registry), "A1", SlowResumer::new(Duration::ZERO));
    let token = handler.handle(request(id, "A1")).await.unwrap();
    assert_eq!(token.checkpoint, Checkpoint::new(4_096));
    assert!(token.checkpoint.offset() <= received.len() as u64);

    received.truncate(token.checkpoint.offset() as usize);
    plan.copy_from(&source, token.checkpoint, &mut received, |checkpoint| {
        registry.record_checkpoint(id, checkpoint).is_ok()
    });
    registry.complete_session(id).unwrap();

    assert_eq!(received, uninterrupted);
    assert!(registry.is_empty());
}

/// A resume that outlasts the reestablish timeout leaves the session
/// Disconnected so the target can try again.
#[tokio::test(start_paused = true)]
async fn test_slow_resume_times_out_and_retries() {
    let registry = registry();
    let id = start(&registry, "A1");
    registry.mark_disconnected(id).unwrap();

    let slow = handler(Arc::clone(&registry), "A1", SlowResumer::new(Duration::from_secs(60)));
    let err = slow.handle(request(id, "A1")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(err.kind().is_resumable());
    assert_eq!(registry.get(id).unwrap().state(), RecoveryState::Disconnected);

    let fast = handler(Arc::clone(&registry), "A1", SlowResumer::new(Duration::ZERO));
    assert!(fast.handle(request(id, "A1")).await.is_ok());
}

/// The target gives up on a reestablish while the source is still resuming.
/// Dropping that request must not leave the session stuck Busy.
#[tokio::test(start_paused = true)]
async fn test_dropped_reestablish_can_be_retried() {
    let registry = registry();
    let id = start(&registry, "A1");
    registry.record_checkpoint(id, Checkpoint::new(8_192)).unwrap();
    registry.mark_disconnected(id).unwrap();

    let stuck = Arc::new(handler(
        Arc::clone(&registry),
        "A1",
        SlowResumer::new(Duration::from_secs(3_600)),
    ));
    let task = {
        let stuck = Arc::clone(&stuck);
        tokio::spawn(async move { stuck.handle(request(id, "A1")).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(registry.get(id).unwrap().state(), RecoveryState::Reestablishing);

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    tokio::time::sleep(Duration::from_secs(3_600)).await;
    assert_eq!(registry.get(id).unwrap().state(), RecoveryState::Disconnected);

    let fast = handler(Arc::clone(&registry), "A1", SlowResumer::new(Duration::ZERO));
    let token = fast.handle(request(id, "A1")).await.unwrap();
    assert_eq!(token.checkpoint, Checkpoint::new(8_192));
    assert_eq!(registry.get(id).unwrap().state(), RecoveryState::Active);
}
