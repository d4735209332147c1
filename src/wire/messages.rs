//! Cluster coordination messages
//!
//! Field order is part of the compatibility contract:
//!
//! | Message | Fields, in order |
//! |---|---|
//! | PublishRequest | version:int64, payloadKind:u8, payload:bytes |
//! | PublishAck | nodeId:string, version:int64, outcome:u8 |
//! | CommitRequest | version:int64 |
//! | CommitAck | nodeId:string, version:int64 |
//! | ReestablishRecoveryRequest | recoveryId:int64, indexId:string, shardNumber:int32, targetAllocationId:string |

use super::codec::{WireReader, WireWriter};
use super::errors::{WireError, WireResult};
use crate::identity::{AllocationId, ClusterStateVersion, NodeId, RecoveryId, ShardId};

/// Frame-level message discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    PublishRequest = 1,
    PublishAck = 2,
    CommitRequest = 3,
    CommitAck = 4,
    ReestablishRecoveryRequest = 5,
}

impl MessageKind {
    /// Convert from u8, returns None for unknown values
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::PublishRequest),
            2 => Some(Self::PublishAck),
            3 => Some(Self::CommitRequest),
            4 => Some(Self::CommitAck),
            5 => Some(Self::ReestablishRecoveryRequest),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// A message with a fixed field order.
pub trait WireMessage: Sized {
    /// Discriminant used in frames
    const KIND: MessageKind;

    /// Write every field, in order.
    fn write_to(&self, writer: &mut WireWriter) -> WireResult<()>;

    /// Read every field, in order.
    fn read_from(reader: &mut WireReader<'_>) -> WireResult<Self>;

    /// Encode the message body.
    fn encode(&self) -> WireResult<Vec<u8>> {
        let mut writer = WireWriter::new();
        self.write_to(&mut writer)?;
        Ok(writer.into_bytes())
    }

    /// Decode a message body; trailing bytes are an error.
    fn decode(data: &[u8]) -> WireResult<Self> {
        let mut reader = WireReader::new(data);
        let message = Self::read_from(&mut reader)?;
        reader.finish()?;
        Ok(message)
    }
}

/// Whether a publish payload carries a whole state or a diff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PayloadKind {
    Full = 0,
    Diff = 1,
}

impl PayloadKind {
    fn from_u8(value: u8) -> WireResult<Self> {
        match value {
            0 => Ok(Self::Full),
            1 => Ok(Self::Diff),
            _ => Err(WireError::InvalidEnum { field: "payload_kind", value }),
        }
    }
}

/// Publish acknowledgment outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AckOutcome {
    Ack = 0,
    Nack = 1,
}

impl AckOutcome {
    fn from_u8(value: u8) -> WireResult<Self> {
        match value {
            0 => Ok(Self::Ack),
            1 => Ok(Self::Nack),
            _ => Err(WireError::InvalidEnum { field: "outcome", value }),
        }
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack)
    }
}

/// Proposed state, sent to every member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub version: ClusterStateVersion,
    pub payload_kind: PayloadKind,
    pub payload: Vec<u8>,
}

impl WireMessage for PublishRequest {
    const KIND: MessageKind = MessageKind::PublishRequest;

    fn write_to(&self, writer: &mut WireWriter) -> WireResult<()> {
        writer.write_u64_as_i64("version", self.version.value())?;
        writer.write_u8(self.payload_kind as u8);
        writer.write_bytes("payload", &self.payload)
    }

    fn read_from(reader: &mut WireReader<'_>) -> WireResult<Self> {
        let version = ClusterStateVersion::new(reader.read_i64_as_u64("version")?);
        let payload_kind = PayloadKind::from_u8(reader.read_u8()?)?;
        let payload = reader.read_bytes()?;
        Ok(Self {
            version,
            payload_kind,
            payload,
        })
    }
}

/// A member's answer to a `PublishRequest`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishAck {
    pub node_id: NodeId,
    pub version: ClusterStateVersion,
    pub outcome: AckOutcome,
}

impl PublishAck {
    pub fn ack(node_id: NodeId, version: ClusterStateVersion) -> Self {
        Self {
            node_id,
            version,
            outcome: AckOutcome::Ack,
        }
    }

    pub fn nack(node_id: NodeId, version: ClusterStateVersion) -> Self {
        Self {
            node_id,
            version,
            outcome: AckOutcome::Nack,
        }
    }
}

impl WireMessage for PublishAck {
    const KIND: MessageKind = MessageKind::PublishAck;

    fn write_to(&self, writer: &mut WireWriter) -> WireResult<()> {
        writer.write_string("node_id", self.node_id.as_str())?;
        writer.write_u64_as_i64("version", self.version.value())?;
        writer.write_u8(self.outcome as u8);
        Ok(())
    }

    fn read_from(reader: &mut WireReader<'_>) -> WireResult<Self> {
        let node_id = NodeId::new(reader.read_string("node_id")?);
        let version = ClusterStateVersion::new(reader.read_i64_as_u64("version")?);
        let outcome = AckOutcome::from_u8(reader.read_u8()?)?;
        Ok(Self {
            node_id,
            version,
            outcome,
        })
    }
}

/// Confirmation that a quorum accepted `version`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitRequest {
    pub version: ClusterStateVersion,
}

impl WireMessage for CommitRequest {
    const KIND: MessageKind = MessageKind::CommitRequest;

    fn write_to(&self, writer: &mut WireWriter) -> WireResult<()> {
        writer.write_u64_as_i64("version", self.version.value())
    }

    fn read_from(reader: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            version: ClusterStateVersion::new(reader.read_i64_as_u64("version")?),
        })
    }
}

/// A member applied the committed `version`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAck {
    pub node_id: NodeId,
    pub version: ClusterStateVersion,
}

impl WireMessage for CommitAck {
    const KIND: MessageKind = MessageKind::CommitAck;

    fn write_to(&self, writer: &mut WireWriter) -> WireResult<()> {
        writer.write_string("node_id", self.node_id.as_str())?;
        writer.write_u64_as_i64("version", self.version.value())
    }

    fn read_from(reader: &mut WireReader<'_>) -> WireResult<Self> {
        let node_id = NodeId::new(reader.read_string("node_id")?);
        let version = ClusterStateVersion::new(reader.read_i64_as_u64("version")?);
        Ok(Self { node_id, version })
    }
}

/// Target's request to resume a recovery after a dropped connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReestablishRecoveryRequest {
    pub recovery_id: RecoveryId,
    pub shard_id: ShardId,
    pub target_allocation_id: AllocationId,
}

impl ReestablishRecoveryRequest {
    pub fn new(recovery_id: RecoveryId, shard_id: ShardId, target_allocation_id: AllocationId) -> Self {
        Self {
            recovery_id,
            shard_id,
            target_allocation_id,
        }
    }
}

impl WireMessage for ReestablishRecoveryRequest {
    const KIND: MessageKind = MessageKind::ReestablishRecoveryRequest;

    fn write_to(&self, writer: &mut WireWriter) -> WireResult<()> {
        writer.write_u64_as_i64("recovery_id", self.recovery_id.value())?;
        writer.write_string("index_id", &self.shard_id.index_id)?;
        writer.write_i32(self.shard_id.shard_number);
        writer.write_string("target_allocation_id", self.target_allocation_id.as_str())
    }

    fn read_from(reader: &mut WireReader<'_>) -> WireResult<Self> {
        let recovery_id = RecoveryId::new(reader.read_i64_as_u64("recovery_id")?);
        let index_id = reader.read_string("index_id")?;
        let shard_number = reader.read_i32()?;
        let target_allocation_id = AllocationId::new(reader.read_string("target_allocation_id")?);
        Ok(Self {
            recovery_id,
            shard_id: ShardId::new(index_id, shard_number),
            target_allocation_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_request_field_order() {
        let request = PublishRequest {
            version: ClusterStateVersion::new(2),
            payload_kind: PayloadKind::Diff,
            payload: vec![0xAB],
        };
        let bytes = request.encode().unwrap();
        assert_eq!(
            bytes,
            vec![2, 0, 0, 0, 0, 0, 0, 0, 1, 1, 0, 0, 0, 0xAB]
        );
    }

    #[test]
    fn test_publish_ack_node_id_first() {
        let ack = PublishAck::nack(NodeId::new("n1"), ClusterStateVersion::new(9));
        let bytes = ack.encode().unwrap();
        assert_eq!(&bytes[..6], &[2, 0, 0, 0, b'n', b'1']);
        assert_eq!(&bytes[6..14], &9i64.to_le_bytes());
        assert_eq!(bytes[14], 1);
        assert_eq!(PublishAck::decode(&bytes).unwrap(), ack);
    }

    #[test]
    fn test_invalid_outcome_rejected() {
        let mut bytes = PublishAck::ack(NodeId::new("n"), ClusterStateVersion::new(1))
            .encode()
            .unwrap();
        let last = bytes.len() - 1;
        bytes[last] = 7;
        assert_eq!(
            PublishAck::decode(&bytes),
            Err(WireError::InvalidEnum { field: "outcome", value: 7 })
        );
    }

    #[test]
    fn test_reestablish_request_layout() {
        let request = ReestablishRecoveryRequest::new(
            RecoveryId::new(7),
            ShardId::new("idx", 2),
            AllocationId::new("A1"),
        );
        let bytes = request.encode().unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(&7i64.to_le_bytes());
        expected.extend_from_slice(&[3, 0, 0, 0, b'i', b'd', b'x']);
        expected.extend_from_slice(&2i32.to_le_bytes());
        expected.extend_from_slice(&[2, 0, 0, 0, b'A', b'1']);
        assert_eq!(bytes, expected);
        assert_eq!(ReestablishRecoveryRequest::decode(&bytes).unwrap(), request);
    }

    #[test]
    fn test_commit_request_trailing_bytes_rejected() {
        let mut bytes = CommitRequest {
            version: ClusterStateVersion::new(3),
        }
        .encode()
        .unwrap();
        bytes.push(0);
        assert_eq!(CommitRequest::decode(&bytes), Err(WireError::TrailingBytes(1)));
    }
}
