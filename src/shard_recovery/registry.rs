//! Recovery session registry
//!
//! Invariants:
//! - Recovery ids are assigned monotonically from 1 and never reused
//! - Each session is guarded by its own mutex; the map lock is held only to
//!   look up, insert or remove an entry, so sessions never block each other
//! - A session that reaches a terminal state is removed; every later request
//!   naming it gets NotFound
//! - `target_allocation_id` is compared, never updated
//!
//! Reestablish validation order: NotFound, ShardMismatch, AllocationMismatch,
//! Busy. A rejected request leaves the session untouched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use super::errors::{RecoveryError, RecoveryResult};
use super::session::RecoverySession;
use super::state::RecoveryState;
use crate::identity::{AllocationId, Checkpoint, NodeId, RecoveryId, ShardId};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};

/// Permission to resume a transfer, returned by a successful reestablish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeToken {
    pub recovery_id: RecoveryId,
    pub shard_id: ShardId,
    pub target_allocation_id: AllocationId,
    /// Transfer resumes here instead of from the start
    pub checkpoint: Checkpoint,
}

type SessionEntry = Arc<Mutex<RecoverySession>>;

/// All in-flight recovery sessions of this node.
#[derive(Debug)]
pub struct RecoverySessionRegistry {
    sessions: RwLock<HashMap<RecoveryId, SessionEntry>>,
    next_id: AtomicU64,
    metrics: Arc<MetricsRegistry>,
}

fn lock_session(entry: &SessionEntry) -> MutexGuard<'_, RecoverySession> {
    entry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RecoverySessionRegistry {
    pub fn new(metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            metrics,
        }
    }

    fn entry(&self, recovery_id: RecoveryId) -> Option<SessionEntry> {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&recovery_id)
            .cloned()
    }

    fn remove(&self, recovery_id: RecoveryId) {
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&recovery_id);
    }

    /// Run `op` on a live session. Unknown and terminal sessions are NotFound.
    fn with_live<T>(
        &self,
        recovery_id: RecoveryId,
        op: impl FnOnce(&mut RecoverySession) -> RecoveryResult<T>,
    ) -> RecoveryResult<T> {
        let entry = self.entry(recovery_id).ok_or(RecoveryError::NotFound(recovery_id))?;
        let mut session = lock_session(&entry);
        if session.state().is_terminal() {
            return Err(RecoveryError::NotFound(recovery_id));
        }
        op(&mut session)
    }

    /// Move a live session to a terminal state and drop it from the map.
    fn finish(
        &self,
        recovery_id: RecoveryId,
        transition: impl FnOnce(RecoveryState) -> RecoveryResult<RecoveryState>,
    ) -> RecoveryResult<RecoverySession> {
        let finished = self.with_live(recovery_id, |session| {
            let next = transition(session.state())?;
            session.set_state(next);
            Ok(session.clone())
        })?;
        self.remove(recovery_id);
        Ok(finished)
    }

    /// Start tracking a new recovery; the session starts Active.
    pub fn start_session(
        &self,
        shard_id: ShardId,
        source_node: NodeId,
        target_node: NodeId,
        target_allocation_id: AllocationId,
    ) -> RecoveryId {
        let recovery_id = RecoveryId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let session = RecoverySession::new(
            recovery_id,
            shard_id,
            source_node,
            target_node,
            target_allocation_id,
        );

        let id_str = recovery_id.to_string();
        let shard_str = session.shard_id().to_string();
        let allocation = session.target_allocation_id().to_string();
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(recovery_id, Arc::new(Mutex::new(session)));

        self.metrics.increment_recoveries_started();
        log_event_with_fields(
            Event::RecoveryStart,
            &[
                ("allocation_id", allocation.as_str()),
                ("recovery_id", id_str.as_str()),
                ("shard", shard_str.as_str()),
            ],
        );
        recovery_id
    }

    /// Copy of a live session.
    pub fn get(&self, recovery_id: RecoveryId) -> Option<RecoverySession> {
        let entry = self.entry(recovery_id)?;
        let session = lock_session(&entry);
        (!session.state().is_terminal()).then(|| session.clone())
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The transport reported the peer unreachable.
    ///
    /// A session already Disconnected stays so.
    pub fn mark_disconnected(&self, recovery_id: RecoveryId) -> RecoveryResult<()> {
        self.with_live(recovery_id, |session| {
            if session.state() != RecoveryState::Disconnected {
                session.set_state(session.state().disconnect()?);
            }
            Ok(())
        })?;

        let id_str = recovery_id.to_string();
        log_event_with_fields(Event::RecoveryDisconnected, &[("recovery_id", id_str.as_str())]);
        Ok(())
    }

    /// Validate a reestablish request and move the session to Reestablishing.
    ///
    /// An Active session is treated as disconnected: the target may notice
    /// the dropped connection before the source does.
    pub fn reestablish(
        &self,
        recovery_id: RecoveryId,
        shard_id: &ShardId,
        target_allocation_id: &AllocationId,
    ) -> RecoveryResult<ResumeToken> {
        let result = self.with_live(recovery_id, |session| {
            if session.shard_id() != shard_id {
                return Err(RecoveryError::ShardMismatch {
                    recovery_id,
                    expected: session.shard_id().clone(),
                    found: shard_id.clone(),
                });
            }
            if session.target_allocation_id() != target_allocation_id {
                return Err(RecoveryError::AllocationMismatch {
                    recovery_id,
                    expected: session.target_allocation_id().clone(),
                    found: target_allocation_id.clone(),
                });
            }

            let next = match session.state() {
                RecoveryState::Reestablishing => return Err(RecoveryError::Busy(recovery_id)),
                RecoveryState::Active => RecoveryState::Active
                    .disconnect()
                    .and_then(RecoveryState::begin_reestablish)?,
                state => state.begin_reestablish()?,
            };
            session.set_state(next);

            Ok(ResumeToken {
                recovery_id,
                shard_id: session.shard_id().clone(),
                target_allocation_id: session.target_allocation_id().clone(),
                checkpoint: session.last_checkpoint(),
            })
        });

        let id_str = recovery_id.to_string();
        match &result {
            Ok(token) => {
                self.metrics.increment_reestablish_accepted();
                let checkpoint = token.checkpoint.to_string();
                log_event_with_fields(
                    Event::RecoveryReestablishAccepted,
                    &[("checkpoint", checkpoint.as_str()), ("recovery_id", id_str.as_str())],
                );
            }
            Err(err) => {
                self.metrics.increment_reestablish_rejected();
                let reason = err.to_string();
                log_event_with_fields(
                    Event::RecoveryReestablishRejected,
                    &[
                        ("code", err.kind().as_str()),
                        ("reason", reason.as_str()),
                        ("recovery_id", id_str.as_str()),
                    ],
                );
            }
        }
        result
    }

    /// Reestablishing → Active once the transfer resumed.
    pub fn confirm_resumed(&self, recovery_id: RecoveryId) -> RecoveryResult<Checkpoint> {
        let checkpoint = self.with_live(recovery_id, |session| {
            session.set_state(session.state().confirm_resumed()?);
            Ok(session.last_checkpoint())
        })?;

        let id_str = recovery_id.to_string();
        let checkpoint_str = checkpoint.to_string();
        log_event_with_fields(
            Event::RecoveryResumed,
            &[("checkpoint", checkpoint_str.as_str()), ("recovery_id", id_str.as_str())],
        );
        Ok(checkpoint)
    }

    /// Reestablishing → Disconnected; the session may be reestablished again.
    pub fn abandon_reestablish(&self, recovery_id: RecoveryId) -> RecoveryResult<()> {
        self.with_live(recovery_id, |session| {
            session.set_state(session.state().abandon_reestablish()?);
            Ok(())
        })?;

        let id_str = recovery_id.to_string();
        log_event_with_fields(Event::RecoveryDisconnected, &[("recovery_id", id_str.as_str())]);
        Ok(())
    }

    /// Record a confirmed transfer point; an older checkpoint is ignored.
    ///
    /// Returns the checkpoint now stored.
    pub fn record_checkpoint(
        &self,
        recovery_id: RecoveryId,
        checkpoint: Checkpoint,
    ) -> RecoveryResult<Checkpoint> {
        self.with_live(recovery_id, |session| Ok(session.advance_checkpoint(checkpoint)))
    }

    /// Active → Completed; the session is released.
    pub fn complete_session(&self, recovery_id: RecoveryId) -> RecoveryResult<()> {
        let session = self.finish(recovery_id, RecoveryState::complete)?;

        self.metrics.increment_recoveries_completed();
        let id_str = recovery_id.to_string();
        let checkpoint = session.last_checkpoint().to_string();
        log_event_with_fields(
            Event::RecoveryComplete,
            &[("checkpoint", checkpoint.as_str()), ("recovery_id", id_str.as_str())],
        );
        Ok(())
    }

    /// Mark Cancelled and release the session.
    pub fn cancel_session(&self, recovery_id: RecoveryId, reason: &str) -> RecoveryResult<()> {
        self.finish(recovery_id, RecoveryState::cancel)?;

        self.metrics.increment_recoveries_cancelled();
        let id_str = recovery_id.to_string();
        log_event_with_fields(
            Event::RecoveryCancelled,
            &[("reason", reason), ("recovery_id", id_str.as_str())],
        );
        Ok(())
    }

    /// Mark Failed and release the session.
    pub fn fail_session(&self, recovery_id: RecoveryId, reason: &str) -> RecoveryResult<()> {
        self.finish(recovery_id, RecoveryState::fail)?;

        self.metrics.increment_recoveries_failed();
        let id_str = recovery_id.to_string();
        log_event_with_fields(
            Event::RecoveryFailed,
            &[("reason", reason), ("recovery_id", id_str.as_str())],
        );
        Ok(())
    }
}
