//! Collaborator interfaces consumed by the coordinator
//!
//! - `ClusterTransport`: asynchronous send of publish and commit requests
//! - `MembershipProvider`: the member and voting sets at session start

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;

use super::errors::TransportResult;
use crate::identity::NodeId;
use crate::wire::{CommitAck, CommitRequest, PublishAck, PublishRequest};

/// Boxed response future, detached from the transport's lifetime so it can
/// be driven from a spawned task.
pub type TransportFuture<T> = Pin<Box<dyn Future<Output = TransportResult<T>> + Send + 'static>>;

/// Message delivery to other nodes
pub trait ClusterTransport: Send + Sync {
    /// Send a publish request and resolve with the node's answer.
    fn send_publish(&self, target: &NodeId, request: PublishRequest) -> TransportFuture<PublishAck>;

    /// Send a commit request and resolve with the node's commit ack.
    fn send_commit(&self, target: &NodeId, request: CommitRequest) -> TransportFuture<CommitAck>;
}

/// Current cluster membership
pub trait MembershipProvider: Send + Sync {
    /// Every node a publication is sent to.
    fn members(&self) -> BTreeSet<NodeId>;

    /// Nodes whose acks count toward quorum; a subset of `members`.
    fn voting_members(&self) -> BTreeSet<NodeId>;
}

/// Fixed membership; every member votes unless listed otherwise.
#[derive(Debug, Clone, Default)]
pub struct StaticMembership {
    members: BTreeSet<NodeId>,
    non_voting: BTreeSet<NodeId>,
}

impl StaticMembership {
    pub fn new(members: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            members: members.into_iter().collect(),
            non_voting: BTreeSet::new(),
        }
    }

    /// Add a member that receives publications but does not vote.
    pub fn with_non_voting(mut self, node: NodeId) -> Self {
        self.members.insert(node.clone());
        self.non_voting.insert(node);
        self
    }
}

impl MembershipProvider for StaticMembership {
    fn members(&self) -> BTreeSet<NodeId> {
        self.members.clone()
    }

    fn voting_members(&self) -> BTreeSet<NodeId> {
        self.members.difference(&self.non_voting).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_voting_member_excluded_from_voting_set() {
        let membership = StaticMembership::new(["a", "b"].into_iter().map(NodeId::from))
            .with_non_voting(NodeId::from("learner"));
        assert_eq!(membership.members().len(), 3);
        assert_eq!(membership.voting_members().len(), 2);
        assert!(!membership.voting_members().contains(&NodeId::from("learner")));
    }
}
