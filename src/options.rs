//! Tunables threaded through table building, reading, and the write path.

use std::sync::Arc;

use crate::cache::BlockCache;
use crate::comparator::{BytewiseComparator, Comparator};
use crate::sstable::reader::Block;

/// Default restart interval for block builders (entries between restart
/// points).
pub const DEFAULT_BLOCK_RESTART_INTERVAL: usize = 16;
/// Default target size (bytes) at which a data block is flushed.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Durability knob for a single write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// If true, the write blocks until the log fsyncs; if false, the
    /// write returns once the OS has buffered it.
    pub sync: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions { sync: false }
    }
}

/// Options governing table layout, caching, and checksum verification.
/// Generic over the user key comparator so `block_cache` can be typed
/// precisely.
pub struct Options<C: Comparator + Clone + 'static = BytewiseComparator> {
    /// Entries between restart points in a data block.
    pub block_restart_interval: usize,
    /// Target size, in bytes, at which a data block is flushed.
    pub block_size: usize,
    /// The user key order; lifted to an internal-key order wherever
    /// mutations are sequenced.
    pub comparator: Arc<C>,
    /// Shared LRU cache of decoded blocks; `None` disables caching.
    pub block_cache: Option<Arc<BlockCache<Block<C>>>>,
    /// Bits per key for an optional Bloom filter; `None` disables it.
    pub filter_bits_per_key: Option<usize>,
    /// Whether reads verify each block's CRC32 trailer.
    pub verify_checksums: bool,
}

impl<C: Comparator + Clone + Default + 'static> Default for Options<C> {
    fn default() -> Self {
        Options {
            block_restart_interval: DEFAULT_BLOCK_RESTART_INTERVAL,
            block_size: DEFAULT_BLOCK_SIZE,
            comparator: Arc::new(C::default()),
            block_cache: None,
            filter_bits_per_key: None,
            verify_checksums: false,
        }
    }
}

impl<C: Comparator + Clone + 'static> Options<C> {
    /// Builds options around an explicit comparator instance, for
    /// comparators without a meaningful `Default`.
    pub fn with_comparator(comparator: Arc<C>) -> Self {
        Options {
            block_restart_interval: DEFAULT_BLOCK_RESTART_INTERVAL,
            block_size: DEFAULT_BLOCK_SIZE,
            comparator,
            block_cache: None,
            filter_bits_per_key: None,
            verify_checksums: false,
        }
    }
}
