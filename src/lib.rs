//! # kvcore
//!
//! The read/write storage core of an embeddable, ordered key-value
//! engine built on a **Log-Structured Merge Tree (LSM-tree)** layout:
//! a concurrent in-memory memtable backed by a write-ahead log, and
//! immutable, sorted on-disk SSTables read through a shared block
//! cache.
//!
//! This crate is the core only — compaction, leveling, and multi-
//! generation SSTable management are out of scope; [`store::Store`]
//! is a minimal façade that wires the pieces together end-to-end for
//! testing, with a single caller-invoked flush and no background
//! scheduler.
//!
//! ## Architecture
//!
//! ```text
//! write: WriteBatch -> log::LogWriter -> memtable::Memtable
//! read:  memtable::Memtable (newest) -> sstable::SsTableReader (older generations)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`codec`] | Varint/fixed-width byte encoding |
//! | [`slice`] | `memcmp`-style byte-slice comparison helpers |
//! | [`error`] | Crate-wide `Error`/`Result` |
//! | [`comparator`] | Pluggable key order, with separator-shortening helpers |
//! | [`internal_key`] | `user_key ‖ sequence ‖ type` packing and its comparator |
//! | [`file`] | Random-access, sequential, and writable file abstractions |
//! | [`arena`] | Bump allocator backing the skip list |
//! | [`skiplist`] | Concurrent, single-writer/many-reader skip list |
//! | [`memtable`] | In-memory staging area for recent mutations |
//! | [`sstable`] | Immutable, sorted, on-disk tables and their two-level iterator |
//! | [`cache`] | LRU cache of decoded blocks |
//! | [`batch`] | Atomic, replayable group of puts/deletes |
//! | [`log`] | 32 KiB block-framed write-ahead log |
//! | [`filter`] | Standalone double-hashed Bloom filter |
//! | [`options`] | Tunables for table layout, caching, and durability |
//! | [`store`] | Minimal end-to-end façade over the above |
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use kvcore::store::Store;
//! use kvcore::options::{Options, WriteOptions};
//! use kvcore::comparator::BytewiseComparator;
//!
//! let store: Store<BytewiseComparator> =
//!     Store::open("/tmp/my_kvcore_db", Options::default()).unwrap();
//!
//! store.put(b"hello", b"world", &WriteOptions::default()).unwrap();
//! assert_eq!(store.get(b"hello").unwrap(), Some(b"world".to_vec()));
//!
//! store.delete(b"hello", &WriteOptions::default()).unwrap();
//! assert_eq!(store.get(b"hello").unwrap(), None);
//!
//! store.put(b"a", b"1", &WriteOptions::default()).unwrap();
//! store.put(b"b", b"2", &WriteOptions::default()).unwrap();
//! let results = store.scan(b"a", None).unwrap();
//! assert_eq!(results, vec![(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec())]);
//! ```

pub mod arena;
pub mod batch;
pub mod cache;
pub mod codec;
pub mod comparator;
pub mod error;
pub mod file;
pub mod filter;
pub mod internal_key;
pub mod log;
pub mod memtable;
pub mod options;
pub mod skiplist;
pub mod slice;
pub mod sstable;
pub mod store;
