//! Accumulates prefix-compressed entries into a data or index block.

use crate::codec::{put_fixed32, put_varint32};
use crate::error::{Error, Result};

/// Entries between restart points, below which keys are delta-encoded
/// against the previous entry.
pub const DEFAULT_RESTART_INTERVAL: usize = 16;
/// Advisory target size for a finished data block.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Builds one block: `entry* restarts:u32_le[num_restarts] num_restarts:u32_le`.
pub struct BlockBuilder {
    restart_interval: usize,
    buf: Vec<u8>,
    restarts: Vec<u32>,
    entries_since_restart: usize,
    last_key: Vec<u8>,
    finished: bool,
}

impl BlockBuilder {
    /// Creates an empty builder with the given restart interval.
    pub fn new(restart_interval: usize) -> Self {
        BlockBuilder {
            restart_interval: restart_interval.max(1),
            buf: Vec::new(),
            restarts: vec![0],
            entries_since_restart: 0,
            last_key: Vec::new(),
            finished: false,
        }
    }

    /// Appends `(key, value)`. `key` must compare strictly greater than
    /// the previous key added (or be the first entry).
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.finished {
            return Err(Error::invalid_argument("block builder already finished"));
        }
        if !self.last_key.is_empty() && key <= self.last_key.as_slice() {
            return Err(Error::invalid_argument(
                "block builder requires strictly increasing keys",
            ));
        }

        let shared = if self.entries_since_restart < self.restart_interval {
            longest_common_prefix(&self.last_key, key)
        } else {
            self.restarts.push(self.buf.len() as u32);
            self.entries_since_restart = 0;
            0
        };

        let unshared = key.len() - shared;
        put_varint32(&mut self.buf, shared as u32);
        put_varint32(&mut self.buf, unshared as u32);
        put_varint32(&mut self.buf, value.len() as u32);
        self.buf.extend_from_slice(&key[shared..]);
        self.buf.extend_from_slice(value);

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.entries_since_restart += 1;
        Ok(())
    }

    /// Finishes the block: appends the restart array and count, and
    /// returns the full buffer.
    pub fn finish(&mut self) -> &[u8] {
        if !self.finished {
            for &r in &self.restarts {
                put_fixed32(&mut self.buf, r);
            }
            put_fixed32(&mut self.buf, self.restarts.len() as u32);
            self.finished = true;
        }
        &self.buf
    }

    /// Current size, including the trailer a `finish()` would add.
    pub fn size_estimate(&self) -> usize {
        self.buf.len() + 4 * (self.restarts.len() + 1)
    }

    /// True if no entries have been added since construction or the last
    /// `reset`.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Clears the builder back to its initial state.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.restarts.clear();
        self.restarts.push(0);
        self.entries_since_restart = 0;
        self.last_key.clear();
        self.finished = false;
    }
}

fn longest_common_prefix(a: &[u8], b: &[u8]) -> usize {
    let n = a.len().min(b.len());
    (0..n).take_while(|&i| a[i] == b[i]).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sstable::block_reader::BlockReader;
    use crate::comparator::BytewiseComparator;

    #[test]
    fn restart_interval_two_shares_prefix_then_restarts() {
        let mut b = BlockBuilder::new(2);
        b.add(b"apple", b"1").unwrap();
        b.add(b"apply", b"2").unwrap();
        b.add(b"banana", b"3").unwrap();
        let block = b.finish().to_vec();

        let reader = BlockReader::new(block, BytewiseComparator).unwrap();
        let entries: Vec<(Vec<u8>, Vec<u8>)> = reader
            .iter()
            .map(|(k, v)| (k.to_vec(), v.to_vec()))
            .collect();
        assert_eq!(
            entries,
            vec![
                (b"apple".to_vec(), b"1".to_vec()),
                (b"apply".to_vec(), b"2".to_vec()),
                (b"banana".to_vec(), b"3".to_vec()),
            ]
        );
    }

    #[test]
    fn rejects_out_of_order_keys() {
        let mut b = BlockBuilder::new(16);
        b.add(b"b", b"1").unwrap();
        assert!(b.add(b"a", b"2").is_err());
    }

    #[test]
    fn size_estimate_accounts_for_restart_trailer() {
        let mut b = BlockBuilder::new(16);
        b.add(b"a", b"1").unwrap();
        let estimate = b.size_estimate();
        let finished_len = b.finish().len();
        assert_eq!(estimate, finished_len);
    }
}
