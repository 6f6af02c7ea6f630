//! Forward iteration and point lookup over a decoded data or index block.

use std::cmp::Ordering;

use crate::codec::get_varint32;
use crate::comparator::Comparator;
use crate::error::{Error, Result};

/// A decoded block: owns the raw bytes and exposes restart-aware
/// iteration and binary-search lookup.
pub struct BlockReader<C: Comparator> {
    data: Vec<u8>,
    restarts_offset: usize,
    num_restarts: usize,
    cmp: C,
}

fn read_u32_le(buf: &[u8], offset: usize) -> Result<u32> {
    buf.get(offset..offset + 4)
        .map(|s| u32::from_le_bytes(s.try_into().unwrap()))
        .ok_or_else(|| Error::corruption("block trailer truncated"))
}

impl<C: Comparator> BlockReader<C> {
    /// Wraps already-decoded (trailer-stripped) block bytes.
    pub fn new(data: Vec<u8>, cmp: C) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::corruption("block too small for restart count"));
        }
        let num_restarts = read_u32_le(&data, data.len() - 4)? as usize;
        if num_restarts == 0 {
            return Err(Error::corruption("block has zero restarts"));
        }
        let restarts_offset = data
            .len()
            .checked_sub(4 + 4 * num_restarts)
            .ok_or_else(|| Error::corruption("block restart array overruns buffer"))?;
        let first_restart = read_u32_le(&data, restarts_offset)?;
        if first_restart != 0 {
            return Err(Error::corruption("restarts[0] must be 0"));
        }
        Ok(BlockReader {
            data,
            restarts_offset,
            num_restarts,
            cmp,
        })
    }

    fn restart_offset(&self, i: usize) -> Result<usize> {
        Ok(read_u32_le(&self.data, self.restarts_offset + 4 * i)? as usize)
    }

    /// Decodes one entry at `offset`, returning `(key, value, next_offset)`.
    /// `prev_key` supplies the shared prefix for non-restart entries.
    fn decode_entry<'a>(
        &'a self,
        offset: usize,
        prev_key: &[u8],
    ) -> Result<(Vec<u8>, &'a [u8], usize)> {
        let buf = self
            .data
            .get(offset..self.restarts_offset)
            .ok_or_else(|| Error::corruption("entry offset past restart array"))?;
        let (shared, n1) = get_varint32(buf)?;
        let (unshared, n2) = get_varint32(&buf[n1..])?;
        let (value_len, n3) = get_varint32(&buf[n1 + n2..])?;
        let header_len = n1 + n2 + n3;
        let shared = shared as usize;
        let unshared = unshared as usize;
        let value_len = value_len as usize;

        if shared > prev_key.len() {
            return Err(Error::corruption("shared prefix longer than previous key"));
        }
        let key_delta = buf
            .get(header_len..header_len + unshared)
            .ok_or_else(|| Error::corruption("key delta truncated"))?;
        let mut key = Vec::with_capacity(shared + unshared);
        key.extend_from_slice(&prev_key[..shared]);
        key.extend_from_slice(key_delta);

        let value_start = offset + header_len + unshared;
        let value = self
            .data
            .get(value_start..value_start + value_len)
            .ok_or_else(|| Error::corruption("value truncated"))?;

        Ok((key, value, value_start + value_len))
    }

    /// Binary search over restart points for the entry at or preceding
    /// `target`, then linear scan to the first key `≥ target`. Returns
    /// `(key, value)` of that entry, or `None` if `target` is greater
    /// than every key in the block.
    pub fn find(&self, target: &[u8]) -> Result<Option<(Vec<u8>, &[u8])>> {
        let mut lo = 0usize;
        let mut hi = self.num_restarts - 1;
        while lo < hi {
            let mid = lo + (hi - lo + 1) / 2;
            let offset = self.restart_offset(mid)?;
            let (key, _, _) = self.decode_entry(offset, &[])?;
            match self.cmp.compare(&key, target) {
                Ordering::Less | Ordering::Equal => lo = mid,
                Ordering::Greater => hi = mid - 1,
            }
        }

        let mut offset = self.restart_offset(lo)?;
        let mut prev_key = Vec::new();
        while offset < self.restarts_offset {
            let (key, value, next) = self.decode_entry(offset, &prev_key)?;
            if self.cmp.compare(&key, target) != Ordering::Less {
                return Ok(Some((key, value)));
            }
            prev_key = key;
            offset = next;
        }
        Ok(None)
    }

    /// Forward iterator over every `(key, value)` pair in the block.
    pub fn iter(&self) -> BlockIter<'_, C> {
        BlockIter {
            block: self,
            offset: 0,
            prev_key: Vec::new(),
        }
    }
}

/// Forward-only iterator over a [`BlockReader`].
pub struct BlockIter<'b, C: Comparator> {
    block: &'b BlockReader<C>,
    offset: usize,
    prev_key: Vec<u8>,
}

impl<'b, C: Comparator> Iterator for BlockIter<'b, C> {
    type Item = (Vec<u8>, &'b [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.block.restarts_offset {
            return None;
        }
        let (key, value, next) = self
            .block
            .decode_entry(self.offset, &self.prev_key)
            .expect("corrupt block entry");
        self.prev_key = key.clone();
        self.offset = next;
        Some((key, value))
    }
}
