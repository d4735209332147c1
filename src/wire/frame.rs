//! Checksummed message frames
//!
//! Layout:
//!
//! ```text
//! [kind u8][body_len u32 LE][body][crc32 u32 LE]
//! ```
//!
//! The CRC32 (IEEE) covers kind, length and body. Any mismatch is corruption
//! and the frame is rejected before the body is decoded.

use crc32fast::Hasher;

use super::codec::{WireReader, WireWriter};
use super::errors::{WireError, WireResult};
use super::messages::{MessageKind, WireMessage};

const TRAILER_LEN: usize = 4;

fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Encode `message` into a complete frame.
pub fn encode_frame<M: WireMessage>(message: &M) -> WireResult<Vec<u8>> {
    let body = message.encode()?;

    let mut writer = WireWriter::new();
    writer.write_u8(M::KIND.as_u8());
    writer.write_bytes("body", &body)?;
    let mut frame = writer.into_bytes();

    let crc = checksum(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// Read the message kind of a frame after verifying its checksum.
pub fn peek_kind(frame: &[u8]) -> WireResult<MessageKind> {
    let (kind, _) = split_verified(frame)?;
    MessageKind::from_u8(kind).ok_or(WireError::UnknownKind(kind))
}

/// Decode a frame that must carry an `M`.
pub fn decode_frame<M: WireMessage>(frame: &[u8]) -> WireResult<M> {
    let (kind, body) = split_verified(frame)?;
    if kind != M::KIND.as_u8() {
        return Err(WireError::UnexpectedKind {
            expected: M::KIND.as_u8(),
            found: kind,
        });
    }
    M::decode(&body)
}

fn split_verified(frame: &[u8]) -> WireResult<(u8, Vec<u8>)> {
    if frame.len() < TRAILER_LEN {
        return Err(WireError::Truncated {
            needed: TRAILER_LEN,
            remaining: frame.len(),
        });
    }
    let (covered, trailer) = frame.split_at(frame.len() - TRAILER_LEN);

    let mut trailer_reader = WireReader::new(trailer);
    let expected = trailer_reader.read_u32()?;
    let actual = checksum(covered);
    if expected != actual {
        return Err(WireError::ChecksumMismatch { expected, actual });
    }

    let mut reader = WireReader::new(covered);
    let kind = reader.read_u8()?;
    let body = reader.read_bytes()?;
    reader.finish()?;
    Ok((kind, body))
}
