//! In-process transport
//!
//! Routes framed messages to `ClusterStateApplier`s registered in the same
//! process. Every message is encoded to a checksummed frame and decoded on
//! the receiving side, so the wire layout is exercised end to end.
//!
//! Each link can be delayed, made unresponsive, or made to fail, which is how
//! simulations and tests model slow and partitioned nodes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use super::applier::ClusterStateApplier;
use super::errors::{TransportError, TransportResult};
use super::transport::{ClusterTransport, TransportFuture};
use crate::identity::{ClusterStateVersion, NodeId};
use crate::wire::{
    decode_frame, encode_frame, CommitAck, CommitRequest, PayloadKind, PublishAck, PublishRequest,
};

/// Behavior of the link to one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkBehavior {
    /// Deliver immediately
    #[default]
    Deliver,
    /// Deliver after a fixed delay
    Delay(Duration),
    /// Never answer
    Unresponsive,
    /// Fail every send immediately
    Fail,
}

impl LinkBehavior {
    async fn before_delivery(self, target: &NodeId) -> TransportResult<()> {
        match self {
            Self::Deliver => Ok(()),
            Self::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            Self::Unresponsive => std::future::pending().await,
            Self::Fail => Err(TransportError::Unreachable(target.clone())),
        }
    }
}

/// A message handed to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMessage {
    Publish {
        target: NodeId,
        version: ClusterStateVersion,
        payload_kind: PayloadKind,
    },
    Commit {
        target: NodeId,
        version: ClusterStateVersion,
    },
}

/// Transport that delivers to appliers in the same process.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    appliers: RwLock<HashMap<NodeId, Arc<ClusterStateApplier>>>,
    links: RwLock<HashMap<NodeId, LinkBehavior>>,
    sent: Mutex<Vec<SentMessage>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route messages for the applier's node to it.
    pub fn register(&self, applier: Arc<ClusterStateApplier>) {
        let mut appliers = self.appliers.write().unwrap_or_else(|p| p.into_inner());
        appliers.insert(applier.node_id().clone(), applier);
    }

    pub fn set_link(&self, node: &NodeId, behavior: LinkBehavior) {
        let mut links = self.links.write().unwrap_or_else(|p| p.into_inner());
        links.insert(node.clone(), behavior);
    }

    /// Every message sent so far, in send order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Commit requests sent so far.
    pub fn commits_sent(&self) -> Vec<NodeId> {
        self.sent()
            .into_iter()
            .filter_map(|message| match message {
                SentMessage::Commit { target, .. } => Some(target),
                SentMessage::Publish { .. } => None,
            })
            .collect()
    }

    fn route(&self, target: &NodeId) -> (Option<Arc<ClusterStateApplier>>, LinkBehavior) {
        let applier = self
            .appliers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(target)
            .cloned();
        let link = self
            .links
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(target)
            .copied()
            .unwrap_or_default();
        (applier, link)
    }

    fn record(&self, message: SentMessage) {
        self.sent.lock().unwrap_or_else(|p| p.into_inner()).push(message);
    }
}

impl ClusterTransport for LoopbackTransport {
    fn send_publish(&self, target: &NodeId, request: PublishRequest) -> TransportFuture<PublishAck> {
        self.record(SentMessage::Publish {
            target: target.clone(),
            version: request.version,
            payload_kind: request.payload_kind,
        });
        let (applier, link) = self.route(target);
        let target = target.clone();
        let frame = encode_frame(&request);

        Box::pin(async move {
            let frame = frame?;
            let applier = applier.ok_or_else(|| TransportError::Unreachable(target.clone()))?;
            link.before_delivery(&target).await?;

            let request = decode_frame::<PublishRequest>(&frame)?;
            let ack = applier.handle_publish(request);
            let ack = decode_frame::<PublishAck>(&encode_frame(&ack)?)?;
            Ok::<_, TransportError>(ack)
        })
    }

    fn send_commit(&self, target: &NodeId, request: CommitRequest) -> TransportFuture<CommitAck> {
        self.record(SentMessage::Commit {
            target: target.clone(),
            version: request.version,
        });
        let (applier, link) = self.route(target);
        let target = target.clone();
        let frame = encode_frame(&request);

        Box::pin(async move {
            let frame = frame?;
            let applier = applier.ok_or_else(|| TransportError::Unreachable(target.clone()))?;
            link.before_delivery(&target).await?;

            let request = decode_frame::<CommitRequest>(&frame)?;
            let ack = applier
                .handle_commit(request)
                .map_err(|err| TransportError::Failed {
                    node: target.clone(),
                    reason: err.to_string(),
                })?;
            let ack = decode_frame::<CommitAck>(&encode_frame(&ack)?)?;
            Ok::<_, TransportError>(ack)
        })
    }
}
