//! Follower-side state application
//!
//! Invariants:
//! - A follower never applies a version lower than or equal to the one it holds
//! - A published state is only staged; it becomes visible on a matching commit
//! - A diff is accepted only on top of the exact held version, otherwise nacked
//!
//! A newer publish replaces a staged, uncommitted state.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;

use super::errors::{PublishError, PublishResult};
use super::state::{ClusterState, ClusterStateDiff};
use crate::identity::{ClusterStateVersion, NodeId};
use crate::observability::{log_event_with_fields, Event};
use crate::settings::DiscoverySettingsSnapshot;
use crate::wire::{CommitAck, CommitRequest, PayloadKind, PublishAck, PublishRequest};

/// Applies published and committed states on one node.
#[derive(Debug)]
pub struct ClusterStateApplier {
    node_id: NodeId,
    initial_state_timeout: Duration,
    committed: watch::Sender<Arc<ClusterState>>,
    staged: Mutex<Option<ClusterState>>,
}

impl ClusterStateApplier {
    /// Create an applier holding the empty state.
    pub fn new(node_id: NodeId, settings: &DiscoverySettingsSnapshot) -> Self {
        let (committed, _) = watch::channel(Arc::new(ClusterState::empty()));
        Self {
            node_id,
            initial_state_timeout: settings.initial_state_timeout(),
            committed,
            staged: Mutex::new(None),
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Last committed state.
    pub fn current_state(&self) -> Arc<ClusterState> {
        self.committed.borrow().clone()
    }

    pub fn current_version(&self) -> ClusterStateVersion {
        self.committed.borrow().version()
    }

    /// Version of the staged, not yet committed state.
    pub fn staged_version(&self) -> Option<ClusterStateVersion> {
        self.lock_staged().as_ref().map(ClusterState::version)
    }

    /// Subscribe to committed states.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ClusterState>> {
        self.committed.subscribe()
    }

    fn lock_staged(&self) -> MutexGuard<'_, Option<ClusterState>> {
        self.staged.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Handle a publish request; any rejection is a nack.
    pub fn handle_publish(&self, request: PublishRequest) -> PublishAck {
        let version = request.version;
        let mut staged = self.lock_staged();
        match self.stage(&request) {
            Ok(state) => {
                *staged = Some(state);
                PublishAck::ack(self.node_id.clone(), version)
            }
            Err(err) => {
                let reason = err.to_string();
                let version_str = version.to_string();
                log_event_with_fields(
                    Event::StateRejected,
                    &[
                        ("node", self.node_id.as_str()),
                        ("reason", reason.as_str()),
                        ("version", version_str.as_str()),
                    ],
                );
                PublishAck::nack(self.node_id.clone(), version)
            }
        }
    }

    fn stage(&self, request: &PublishRequest) -> PublishResult<ClusterState> {
        let held = self.current_version();
        if request.version <= held {
            return Err(PublishError::StaleVersion {
                expected: held.successor(),
                found: request.version,
            });
        }

        let state = match request.payload_kind {
            PayloadKind::Full => ClusterState::decode(&request.payload)?,
            PayloadKind::Diff => {
                let diff = ClusterStateDiff::decode(&request.payload)?;
                diff.apply_to(&self.current_state())?
            }
        };
        if state.version() != request.version {
            return Err(PublishError::Payload(format!(
                "payload version {} does not match request version {}",
                state.version(),
                request.version
            )));
        }
        Ok(state)
    }

    /// Handle a commit request.
    ///
    /// Committing the version already held is acknowledged again.
    pub fn handle_commit(&self, request: CommitRequest) -> PublishResult<CommitAck> {
        let mut staged = self.lock_staged();
        let ack = CommitAck {
            node_id: self.node_id.clone(),
            version: request.version,
        };

        if self.current_version() == request.version {
            return Ok(ack);
        }
        match staged.take() {
            Some(state) if state.version() == request.version => {
                self.committed.send_replace(Arc::new(state));
                let version = request.version.to_string();
                log_event_with_fields(
                    Event::StateApplied,
                    &[("node", self.node_id.as_str()), ("version", version.as_str())],
                );
                Ok(ack)
            }
            other => {
                *staged = other;
                Err(PublishError::NotFound(request.version))
            }
        }
    }

    /// Wait until a first state is committed, bounded by the node's initial
    /// state timeout.
    pub async fn wait_for_initial_state(&self) -> PublishResult<Arc<ClusterState>> {
        let mut receiver = self.subscribe();
        let wait = async {
            receiver
                .wait_for(|state| state.version() > ClusterStateVersion::INITIAL)
                .await
                .map(|state| Arc::clone(&state))
        };
        let result = match tokio::time::timeout(self.initial_state_timeout, wait).await {
            Ok(Ok(state)) => Ok(state),
            Ok(Err(_)) | Err(_) => Err(PublishError::InitialStateTimeout(self.initial_state_timeout)),
        };
        result
    }
}
