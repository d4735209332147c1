//! Transfer chunking
//!
//! Chunk boundaries are fixed multiples of the chunk size, independent of
//! where a transfer starts. A transfer resumed from a checkpoint therefore
//! sends exactly the bytes an uninterrupted transfer would have sent from
//! that offset on.

use std::ops::Range;

use super::config::RecoveryConfig;
use super::errors::{RecoveryError, RecoveryResult};
use crate::identity::Checkpoint;

/// Chunk layout of one shard transfer stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPlan {
    total_len: u64,
    chunk_size: u64,
}

impl TransferPlan {
    pub fn new(total_len: u64, chunk_size: u64) -> RecoveryResult<Self> {
        if chunk_size == 0 {
            return Err(RecoveryError::InvalidConfig("chunk_size_bytes"));
        }
        Ok(Self {
            total_len,
            chunk_size,
        })
    }

    pub fn from_config(total_len: u64, config: &RecoveryConfig) -> RecoveryResult<Self> {
        Self::new(total_len, config.chunk_size_bytes)
    }

    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Number of chunks in a transfer from the start.
    pub fn chunk_count(&self) -> u64 {
        self.total_len.div_ceil(self.chunk_size)
    }

    pub fn is_complete(&self, checkpoint: Checkpoint) -> bool {
        checkpoint.offset() >= self.total_len
    }

    /// Byte ranges still to send after `checkpoint`.
    ///
    /// A checkpoint inside a chunk yields the rest of that chunk first.
    pub fn chunks_from(&self, checkpoint: Checkpoint) -> Chunks {
        Chunks {
            next: checkpoint.offset().min(self.total_len),
            total_len: self.total_len,
            chunk_size: self.chunk_size,
        }
    }

    /// Copy the remaining chunks of `source` into `sink`, calling `on_chunk`
    /// with the checkpoint reached after each one.
    ///
    /// Stops early when `on_chunk` returns false, returning the checkpoint
    /// reached so far.
    pub fn copy_from<F>(
        &self,
        source: &[u8],
        checkpoint: Checkpoint,
        sink: &mut Vec<u8>,
        mut on_chunk: F,
    ) -> Checkpoint
    where
        F: FnMut(Checkpoint) -> bool,
    {
        let mut reached = checkpoint;
        for range in self.chunks_from(checkpoint) {
            let start = clamp_index(range.start, source.len());
            let end = clamp_index(range.end, source.len());
            sink.extend_from_slice(&source[start..end]);
            reached = Checkpoint::new(range.end);
            if !on_chunk(reached) {
                break;
            }
        }
        reached
    }
}

fn clamp_index(offset: u64, len: usize) -> usize {
    usize::try_from(offset).map_or(len, |offset| offset.min(len))
}

/// Iterator over the byte ranges of a transfer.
#[derive(Debug, Clone)]
pub struct Chunks {
    next: u64,
    total_len: u64,
    chunk_size: u64,
}

impl Iterator for Chunks {
    type Item = Range<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total_len {
            return None;
        }
        let boundary = (self.next / self.chunk_size + 1).saturating_mul(self.chunk_size);
        let end = boundary.min(self.total_len);
        let range = self.next..end;
        self.next = end;
        Some(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[test]
    fn test_chunks_are_aligned() {
        let plan = TransferPlan::new(10, 4).unwrap();
        let chunks: Vec<_> = plan.chunks_from(Checkpoint::START).collect();
        assert_eq!(chunks, vec![0..4, 4..8, 8..10]);
        assert_eq!(plan.chunk_count(), 3);
    }

    /// A mid-chunk checkpoint finishes that chunk, then follows the same
    /// boundaries as a full transfer.
    #[test]
    fn test_resume_mid_chunk() {
        let plan = TransferPlan::new(10, 4).unwrap();
        let chunks: Vec<_> = plan.chunks_from(Checkpoint::new(5)).collect();
        assert_eq!(chunks, vec![5..8, 8..10]);
    }

    #[test]
    fn test_checkpoint_past_end_yields_nothing() {
        let plan = TransferPlan::new(10, 4).unwrap();
        assert_eq!(plan.chunks_from(Checkpoint::new(12)).count(), 0);
        assert!(plan.is_complete(Checkpoint::new(10)));
        assert!(!plan.is_complete(Checkpoint::new(9)));
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert_eq!(
            TransferPlan::new(10, 0),
            Err(RecoveryError::InvalidConfig("chunk_size_bytes"))
        );
    }

    /// Interrupting after two chunks and resuming from the reached checkpoint
    /// produces the same bytes as one uninterrupted copy.
    #[test]
    fn test_resumed_copy_matches_uninterrupted() {
        let source = payload(1000);
        let plan = TransferPlan::new(source.len() as u64, 128).unwrap();

        let mut uninterrupted = Vec::new();
        let done = plan.copy_from(&source, Checkpoint::START, &mut uninterrupted, |_| true);
        assert_eq!(done, Checkpoint::new(1000));

        let mut resumed = Vec::new();
        let mut sent = 0;
        let reached = plan.copy_from(&source, Checkpoint::START, &mut resumed, |_| {
            sent += 1;
            sent < 2
        });
        assert_eq!(reached, Checkpoint::new(256));

        plan.copy_from(&source, reached, &mut resumed, |_| true);
        assert_eq!(resumed, uninterrupted);
        assert_eq!(resumed, source);
    }
}
