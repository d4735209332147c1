//! Two-phase cluster state publication
//!
//! The elected node publishes each new state to every member, waits for a
//! quorum of voting members to accept it, then commits it.
//!
//! Invariants:
//! - Quorum = floor(N/2) + 1 of the voting set at session start
//! - A session resolves exactly once: Success, Timeout, QuorumUnreachable
//!   or Superseded
//! - Nothing is committed anywhere unless the publish phase reached quorum
//! - Nodes that never commit-ack are logged stale and receive a full state
//!   on the next round
//!
//! Followers apply states through `ClusterStateApplier` and never accept a
//! version at or below the one they hold.

mod ack_collector;
mod applier;
mod coordinator;
mod errors;
mod loopback;
mod session;
mod state;
mod transport;

pub use ack_collector::{quorum_size, AckCollector, AckRecord, AckTally, PublishOutcome};
pub use applier::ClusterStateApplier;
pub use coordinator::{ClusterStateCoordinator, PublishReport};
pub use errors::{PublishError, PublishResult, TransportError, TransportResult};
pub use loopback::{LinkBehavior, LoopbackTransport, SentMessage};
pub use session::PublicationSession;
pub use state::{ClusterState, ClusterStateDiff};
pub use transport::{ClusterTransport, MembershipProvider, StaticMembership, TransportFuture};
