//! Sorted String Table (SSTable): the on-disk, immutable unit of storage.
//!
//! A table is a sequence of prefix-compressed data blocks, an index
//! block mapping separator keys to data-block handles, and a fixed-size
//! footer carrying a magic number and the index block's handle. Every
//! block is followed by a 5-byte trailer (`compression_type, crc32`).
//!
//! ```text
//! data_block_1 … data_block_n  index_block  footer
//! ```
//!
//! [`builder::SsTableBuilder`] writes tables forward-only from a sorted
//! stream; [`reader::SsTableReader`] opens one for point lookup
//! ([`reader::SsTableReader::find`]) and two-level iteration
//! ([`two_level_iterator::TwoLevelIterator`]).

pub mod block_builder;
pub mod block_reader;
pub mod builder;
pub mod format;
pub mod reader;
pub mod two_level_iterator;

pub use builder::{BuilderOptions, SsTableBuilder};
pub use format::{BlockHandle, Footer};
pub use reader::SsTableReader;
pub use two_level_iterator::TwoLevelIterator;
