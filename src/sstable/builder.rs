//! Builds one immutable SSTable file: data blocks, an index block, and a
//! footer, in one forward pass over sorted `(key, value)` pairs.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::comparator::Comparator;
use crate::error::{Error, Result};
use crate::file::WritableFile;
use crate::sstable::block_builder::{BlockBuilder, DEFAULT_BLOCK_SIZE, DEFAULT_RESTART_INTERVAL};
use crate::sstable::format::{block_trailer, BlockHandle, Footer};

/// Tuning knobs for a builder; mirrors [`crate::options::Options`]'s
/// block-layout fields.
#[derive(Debug, Clone, Copy)]
pub struct BuilderOptions {
    /// Entries between restart points in a data block.
    pub block_restart_interval: usize,
    /// Advisory target size per data block, in bytes.
    pub block_size: usize,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        BuilderOptions {
            block_restart_interval: DEFAULT_RESTART_INTERVAL,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

/// Streaming SSTable writer.
///
/// `Add` requires keys in strictly increasing order; any failed write
/// poisons the builder so that further calls are no-ops returning the
/// same error.
pub struct SsTableBuilder<W: WritableFile, C: Comparator> {
    file: W,
    cmp: Arc<C>,
    opts: BuilderOptions,

    data_block: BlockBuilder,
    index_block: BlockBuilder,
    pending_index_entry: bool,
    pending_handle: BlockHandle,
    last_key: Vec<u8>,
    num_entries: u64,
    offset: u64,
    failed: Option<String>,
}

impl<W: WritableFile, C: Comparator> SsTableBuilder<W, C> {
    /// Creates a builder writing into `file`, ordering keys by `cmp`.
    pub fn new(file: W, cmp: Arc<C>, opts: BuilderOptions) -> Self {
        SsTableBuilder {
            file,
            cmp,
            opts,
            data_block: BlockBuilder::new(opts.block_restart_interval),
            index_block: BlockBuilder::new(opts.block_restart_interval),
            pending_index_entry: false,
            pending_handle: BlockHandle::default(),
            last_key: Vec::new(),
            num_entries: 0,
            offset: 0,
            failed: None,
        }
    }

    fn check_failed(&self) -> Result<()> {
        if let Some(msg) = &self.failed {
            return Err(Error::io(msg.clone()));
        }
        Ok(())
    }

    /// Appends `(key, value)`. `key` must compare strictly greater than
    /// the previous key added.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_failed()?;
        if !self.last_key.is_empty()
            && self.cmp.compare(key, &self.last_key) != std::cmp::Ordering::Greater
        {
            return Err(Error::invalid_argument(
                "sstable builder requires strictly increasing keys",
            ));
        }

        if self.pending_index_entry {
            self.cmp.find_shortest_separator(&mut self.last_key, key);
            let mut index_value = Vec::new();
            self.pending_handle.encode_to(&mut index_value);
            self.index_block.add(&self.last_key, &index_value)?;
            self.pending_index_entry = false;
        }

        self.data_block.add(key, value)?;
        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.num_entries += 1;

        if self.data_block.size_estimate() >= self.opts.block_size {
            self.flush()?;
        }
        Ok(())
    }

    fn write_block(&mut self, block: &[u8]) -> Result<BlockHandle> {
        let handle = BlockHandle::new(self.offset, block.len() as u64);
        if let Err(e) = self.file.append(block) {
            self.failed = Some(e.to_string());
            return Err(e);
        }
        let trailer = block_trailer(block);
        if let Err(e) = self.file.append(&trailer) {
            self.failed = Some(e.to_string());
            return Err(e);
        }
        self.offset += block.len() as u64 + trailer.len() as u64;
        Ok(handle)
    }

    /// Finishes and writes the current data block, recording its handle
    /// as pending for the next index entry.
    pub fn flush(&mut self) -> Result<()> {
        self.check_failed()?;
        if self.data_block.is_empty() {
            return Ok(());
        }
        let block = self.data_block.finish().to_vec();
        trace!(bytes = block.len(), "flushing data block");
        self.pending_handle = self.write_block(&block)?;
        self.pending_index_entry = true;
        self.data_block.reset();
        Ok(())
    }

    /// Flushes any pending data block, writes the final index entry, the
    /// index block, and the footer.
    ///
    /// A table with no entries added at all still gets one data block
    /// (empty) and one synthetic index entry pointing at it, so every
    /// table, even an empty one, has a decodable index.
    pub fn finish(&mut self) -> Result<()> {
        self.flush()?;

        if self.num_entries == 0 && !self.pending_index_entry {
            let block = self.data_block.finish().to_vec();
            trace!(bytes = block.len(), "flushing synthetic empty data block");
            self.pending_handle = self.write_block(&block)?;
            self.pending_index_entry = true;
        }

        if self.pending_index_entry {
            let mut separator = self.last_key.clone();
            self.cmp.find_short_successor(&mut separator);
            let mut index_value = Vec::new();
            self.pending_handle.encode_to(&mut index_value);
            self.index_block.add(&separator, &index_value)?;
            self.pending_index_entry = false;
        }

        let index_block = self.index_block.finish().to_vec();
        let index_handle = self.write_block(&index_block)?;

        let footer = Footer {
            meta_index_handle: BlockHandle::default(),
            index_handle,
        };
        let encoded = footer.encode();
        if let Err(e) = self.file.append(&encoded) {
            self.failed = Some(e.to_string());
            return Err(e);
        }
        self.file.flush()?;
        debug!(entries = self.num_entries, "sstable build finished");
        Ok(())
    }

    /// Number of entries added so far.
    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::BytewiseComparator;
    use std::fs::File;
    use std::io::Read;

    struct VecFile {
        data: Vec<u8>,
    }

    impl WritableFile for VecFile {
        fn append(&mut self, data: &[u8]) -> Result<()> {
            self.data.extend_from_slice(data);
            Ok(())
        }
        fn flush(&mut self) -> Result<()> {
            Ok(())
        }
        fn sync(&mut self) -> Result<()> {
            Ok(())
        }
        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn builds_well_formed_footer() {
        let file = VecFile { data: Vec::new() };
        let mut builder = SsTableBuilder::new(file, Arc::new(BytewiseComparator), BuilderOptions::default());
        builder.add(b"a", b"1").unwrap();
        builder.add(b"b", b"2").unwrap();
        builder.finish().unwrap();

        let bytes = builder.file.data;
        let footer_bytes = &bytes[bytes.len() - crate::sstable::format::FOOTER_SIZE..];
        let footer = Footer::decode(footer_bytes).unwrap();
        assert!(footer.index_handle.size > 0);
    }

    #[test]
    fn rejects_out_of_order_add() {
        let file = VecFile { data: Vec::new() };
        let mut builder = SsTableBuilder::new(file, Arc::new(BytewiseComparator), BuilderOptions::default());
        builder.add(b"b", b"1").unwrap();
        assert!(builder.add(b"a", b"2").is_err());
    }

    #[test]
    fn empty_table_emits_synthetic_index_entry_over_an_empty_data_block() {
        let file = VecFile { data: Vec::new() };
        let mut builder = SsTableBuilder::new(file, Arc::new(BytewiseComparator), BuilderOptions::default());
        builder.finish().unwrap();

        let bytes = builder.file.data.clone();
        let footer_bytes = &bytes[bytes.len() - crate::sstable::format::FOOTER_SIZE..];
        let footer = Footer::decode(footer_bytes).unwrap();

        // The synthetic (empty) data block is written before the index.
        assert!(footer.index_handle.offset > 0);

        let index_start = footer.index_handle.offset as usize;
        let index_end = index_start + footer.index_handle.size as usize;
        let index_reader =
            crate::sstable::block_reader::BlockReader::new(bytes[index_start..index_end].to_vec(), BytewiseComparator)
                .unwrap();
        let entries: Vec<_> = index_reader.iter().collect();
        assert_eq!(entries.len(), 1, "empty table must still carry one synthetic index entry");
    }

    #[test]
    #[allow(unused_must_use)]
    fn write_against_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.sst");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .unwrap();
        struct OsFile(File);
        impl WritableFile for OsFile {
            fn append(&mut self, data: &[u8]) -> Result<()> {
                use std::io::Write;
                self.0.write_all(data)?;
                Ok(())
            }
            fn flush(&mut self) -> Result<()> {
                Ok(())
            }
            fn sync(&mut self) -> Result<()> {
                Ok(())
            }
            fn close(&mut self) -> Result<()> {
                Ok(())
            }
        }
        let mut builder =
            SsTableBuilder::new(OsFile(file), Arc::new(BytewiseComparator), BuilderOptions::default());
        for i in 0..50 {
            builder
                .add(format!("key{i:04}").as_bytes(), format!("val{i}").as_bytes())
                .unwrap();
        }
        builder.finish().unwrap();

        let mut buf = Vec::new();
        File::open(&path).unwrap().read_to_end(&mut buf).unwrap();
        assert!(buf.len() > crate::sstable::format::FOOTER_SIZE);
    }
}
