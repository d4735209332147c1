//! Wire compatibility layer
//!
//! Byte layouts for the coordination messages exchanged between nodes.
//!
//! Invariants:
//! - Fields are written and read in a fixed order; reordering breaks peers
//! - int64 fields that carry versions or ids are never negative
//! - A decoded message must consume its whole body
//! - Frames carry a CRC32 trailer; a bad checksum fails the whole frame

mod codec;
mod errors;
mod frame;
mod messages;

pub use codec::{WireReader, WireWriter};
pub use errors::{WireError, WireResult};
pub use frame::{decode_frame, encode_frame, peek_kind};
pub use messages::{
    AckOutcome, CommitAck, CommitRequest, MessageKind, PayloadKind, PublishAck, PublishRequest,
    ReestablishRecoveryRequest, WireMessage,
};
