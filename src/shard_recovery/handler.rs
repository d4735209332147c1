//! Recovery reestablish handler
//!
//! Source-side handling of a `ReestablishRecoveryRequest`:
//! 1. Validate identity against the registry (NotFound, ShardMismatch,
//!    AllocationMismatch, Busy)
//! 2. Check the shard copy was not reassigned in the meantime; if it was,
//!    cancel the session and answer AllocationMismatch
//! 3. Resume the transfer from the last checkpoint, bounded by the
//!    reestablish timeout
//!
//! Outcomes of step 3:
//! - resumed → Active
//! - resume error → Failed (session released)
//! - timed out → Disconnected again; the target may retry
//! - caller dropped the request mid-resume → Disconnected again

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use super::allocation::AllocationProvider;
use super::errors::{RecoveryError, RecoveryResult};
use super::registry::{RecoverySessionRegistry, ResumeToken};
use crate::identity::RecoveryId;
use crate::wire::ReestablishRecoveryRequest;

/// Future returned by a `RecoveryResumer`
pub type ResumeFuture = Pin<Box<dyn Future<Output = RecoveryResult<()>> + Send + 'static>>;

/// Restarts the data transfer of a reestablished session.
pub trait RecoveryResumer: Send + Sync {
    /// Resume sending from `token.checkpoint`.
    fn resume(&self, token: &ResumeToken) -> ResumeFuture;
}

/// Validates and resumes recovery sessions after a reported disconnect.
pub struct RecoveryReestablishHandler {
    registry: Arc<RecoverySessionRegistry>,
    allocations: Arc<dyn AllocationProvider>,
    resumer: Arc<dyn RecoveryResumer>,
    reestablish_timeout: Duration,
}

impl RecoveryReestablishHandler {
    pub fn new(
        registry: Arc<RecoverySessionRegistry>,
        allocations: Arc<dyn AllocationProvider>,
        resumer: Arc<dyn RecoveryResumer>,
        reestablish_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            allocations,
            resumer,
            reestablish_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<RecoverySessionRegistry> {
        &self.registry
    }

    /// Handle one reestablish request.
    ///
    /// On success the session is Active again and the returned token tells
    /// the target where the transfer resumes.
    pub async fn handle(&self, request: ReestablishRecoveryRequest) -> RecoveryResult<ResumeToken> {
        let recovery_id = request.recovery_id;
        let token = self.registry.reestablish(
            recovery_id,
            &request.shard_id,
            &request.target_allocation_id,
        )?;

        match self.allocations.current_allocation(&token.shard_id) {
            Some(current) if current == token.target_allocation_id => {}
            Some(current) => {
                self.registry.cancel_session(recovery_id, "shard copy reassigned")?;
                return Err(RecoveryError::AllocationMismatch {
                    recovery_id,
                    expected: current,
                    found: token.target_allocation_id,
                });
            }
            None => {
                self.registry.cancel_session(recovery_id, "shard copy no longer allocated")?;
                return Err(RecoveryError::NotFound(recovery_id));
            }
        }

        let guard = ReestablishGuard {
            registry: &self.registry,
            recovery_id,
            armed: true,
        };
        let resume = self.resumer.resume(&token);
        let outcome = tokio::time::timeout(self.reestablish_timeout, resume).await;
        guard.disarm();

        match outcome {
            Ok(Ok(())) => {
                self.registry.confirm_resumed(recovery_id)?;
                Ok(token)
            }
            Ok(Err(err)) => {
                let reason = err.to_string();
                self.registry.fail_session(recovery_id, &reason)?;
                Err(RecoveryError::ResumeFailed {
                    recovery_id,
                    reason,
                })
            }
            Err(_) => {
                self.registry.abandon_reestablish(recovery_id)?;
                Err(RecoveryError::Timeout {
                    recovery_id,
                    timeout: self.reestablish_timeout,
                })
            }
        }
    }
}

/// Returns a Reestablishing session to Disconnected if the resume wait is
/// dropped before it finished, so the target can retry instead of seeing
/// Busy forever.
struct ReestablishGuard<'a> {
    registry: &'a RecoverySessionRegistry,
    recovery_id: RecoveryId,
    armed: bool,
}

impl ReestablishGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ReestablishGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            // The session may have been cancelled meanwhile; nothing to undo then.
            let _ = self.registry.abandon_reestablish(self.recovery_id);
        }
    }
}

impl std::fmt::Debug for RecoveryReestablishHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryReestablishHandler")
            .field("live_sessions", &self.registry.len())
            .field("reestablish_timeout", &self.reestablish_timeout)
            .finish_non_exhaustive()
    }
}
