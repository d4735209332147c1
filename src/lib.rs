//! meshstate
//!
//! Cluster state dissemination and resumable shard recovery for a node of a
//! clustered data store:
//! - `publication`: two-phase publish/commit of versioned cluster states
//!   with majority acknowledgment under timeouts
//! - `shard_recovery`: recovery sessions that survive a dropped connection
//!   and resume from their last checkpoint
//!
//! Supporting subsystems: `identity`, `settings`, `wire`, `provider`,
//! `observability`, `cli`.

pub mod cli;
pub mod identity;
pub mod observability;
pub mod provider;
pub mod publication;
pub mod settings;
pub mod shard_recovery;
pub mod wire;
