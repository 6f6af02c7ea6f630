//! A standalone Bloom filter, double-hashed from a single 32-bit
//! finalizer so only one hash actually runs per key.
//!
//! Not yet wired into the SSTable format — see `DESIGN.md` for why
//! "absent filter" currently means every lookup falls through to a
//! block fetch rather than each data block growing its own filter
//! segment.

#[cfg(test)]
mod tests;

use crc32fast::Hasher;

/// Bits set per key; `k` (the number of probe rounds) is derived from
/// this via `0.69 * bits_per_key`, rounded, never below 1.
const DEFAULT_BITS_PER_KEY: usize = 10;

fn bloom_hash(key: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(key);
    hasher.finalize()
}

/// A fixed-size bit array supporting double-hashed insert/probe.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u8>,
    num_bits: usize,
    k: u32,
}

impl BloomFilter {
    /// Builds a filter sized for `n` keys at `bits_per_key`.
    pub fn new(n: usize, bits_per_key: usize) -> Self {
        let bits_per_key = bits_per_key.max(1);
        let mut num_bits = (n * bits_per_key).max(64);
        // round up to a whole number of bytes
        num_bits = num_bits.div_ceil(8) * 8;
        let k = ((bits_per_key as f64) * 0.69).round().max(1.0) as u32;
        BloomFilter {
            bits: vec![0u8; num_bits / 8],
            num_bits,
            k: k.min(30),
        }
    }

    /// Builds a filter for `keys` using the default bits-per-key.
    pub fn build(keys: &[&[u8]]) -> Self {
        let mut filter = BloomFilter::new(keys.len(), DEFAULT_BITS_PER_KEY);
        for key in keys {
            filter.add(key);
        }
        filter
    }

    fn probe_indices(&self, key: &[u8]) -> impl Iterator<Item = usize> + '_ {
        let h1 = bloom_hash(key);
        let h2 = h1.rotate_left(15);
        let num_bits = self.num_bits as u32;
        (0..self.k).map(move |i| {
            let g = h1.wrapping_add(i.wrapping_mul(h2));
            (g % num_bits) as usize
        })
    }

    /// Sets the bits corresponding to `key`.
    pub fn add(&mut self, key: &[u8]) {
        for bit in self.probe_indices(key).collect::<Vec<_>>() {
            self.bits[bit / 8] |= 1 << (bit % 8);
        }
    }

    /// True if every bit `key` would set is already set. Never a false
    /// negative for a key that was [`BloomFilter::add`]ed; may be a
    /// false positive for a key that was not.
    pub fn might_contain(&self, key: &[u8]) -> bool {
        self.probe_indices(key)
            .all(|bit| self.bits[bit / 8] & (1 << (bit % 8)) != 0)
    }

    /// Serializes to `bits ‖ num_bits:u32_le ‖ k:u8`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.bits.clone();
        out.extend_from_slice(&(self.num_bits as u32).to_le_bytes());
        out.push(self.k as u8);
        out
    }

    /// Decodes a buffer produced by [`BloomFilter::encode`].
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < 5 {
            return None;
        }
        let (bits, tail) = buf.split_at(buf.len() - 5);
        let num_bits = u32::from_le_bytes(tail[0..4].try_into().unwrap()) as usize;
        let k = tail[4] as u32;
        if bits.len() * 8 < num_bits {
            return None;
        }
        Some(BloomFilter {
            bits: bits.to_vec(),
            num_bits,
            k,
        })
    }
}
