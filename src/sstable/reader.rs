//! Opens an immutable SSTable file and exposes point lookup plus a
//! two-level (index block -> data block) iterator.

use std::sync::Arc;

use tracing::trace;

use crate::cache::BlockCache;
use crate::comparator::Comparator;
use crate::error::{Error, Result};
use crate::file::RandomAccessFile;
use crate::options::Options;
use crate::sstable::block_reader::BlockReader;
use crate::sstable::format::{verify_block_trailer, BlockHandle, Footer, BLOCK_TRAILER_SIZE, FOOTER_SIZE};
use crate::sstable::two_level_iterator::TwoLevelIterator;

/// A decoded, owned block. Shared between the cache and any live
/// iterator referencing it, so both can outlive a single `fetch_block`
/// call.
pub type Block<C> = BlockReader<C>;

/// An opened, immutable SSTable.
pub struct SsTableReader<C: Comparator + Clone + 'static> {
    file: Arc<dyn RandomAccessFile>,
    cmp: Arc<C>,
    index_block: Arc<Block<C>>,
    cache: Option<Arc<BlockCache<Block<C>>>>,
    owner_id: u64,
    verify_checksums: bool,
}

impl<C: Comparator + Clone + 'static> SsTableReader<C> {
    /// Opens a table: reads the footer, validates the magic number, and
    /// decodes the index block.
    pub fn open(
        file: Arc<dyn RandomAccessFile>,
        cmp: Arc<C>,
        options: &Options<C>,
        cache: Option<Arc<BlockCache<Block<C>>>>,
    ) -> Result<Self> {
        let file_len = file.len();
        if file_len < FOOTER_SIZE as u64 {
            return Err(Error::corruption("file too small to contain a footer"));
        }
        let footer_bytes = file.read_at(file_len - FOOTER_SIZE as u64, FOOTER_SIZE)?;
        let footer = Footer::decode(&footer_bytes).map_err(|e| e.trace("sstable::reader::open"))?;

        let index_block = Arc::new(Self::read_block_uncached(
            &file,
            &cmp,
            footer.index_handle,
            options.verify_checksums,
        )?);

        let owner_id = match &cache {
            Some(c) => c.new_owner_id(),
            None => 0,
        };

        trace!(owner_id, "sstable opened");
        Ok(SsTableReader {
            file,
            cmp,
            index_block,
            cache,
            owner_id,
            verify_checksums: options.verify_checksums,
        })
    }

    fn read_block_uncached(
        file: &Arc<dyn RandomAccessFile>,
        cmp: &Arc<C>,
        handle: BlockHandle,
        verify: bool,
    ) -> Result<Block<C>> {
        let total = handle.size as usize + BLOCK_TRAILER_SIZE;
        let bytes = file.read_at(handle.offset, total)?;
        if bytes.len() != total {
            return Err(Error::corruption("short read fetching block"));
        }
        let (block_bytes, trailer) = bytes.split_at(handle.size as usize);
        if verify {
            verify_block_trailer(block_bytes, trailer)?;
        }
        BlockReader::new(block_bytes.to_vec(), (**cmp).clone())
    }

    fn fetch_block(&self, handle: BlockHandle) -> Result<Arc<Block<C>>> {
        let key = BlockCache::<Block<C>>::make_key(self.owner_id, handle.offset);
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.lookup(&key) {
                return Ok(hit);
            }
        }
        let block = Arc::new(Self::read_block_uncached(
            &self.file,
            &self.cmp,
            handle,
            self.verify_checksums,
        )?);
        if let Some(cache) = &self.cache {
            cache.insert(key, Arc::clone(&block));
        }
        Ok(block)
    }

    /// Finds `key`, fetching the candidate data block (cache hit or
    /// CRC-checked disk read) and searching within it.
    pub fn find(&self, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let Some((_, handle_bytes)) = self.index_block.find(key)? else {
            return Ok(None);
        };
        let (handle, _) = BlockHandle::decode_from(handle_bytes)?;
        let block = self.fetch_block(handle)?;
        match block.find(key)? {
            Some((k, v)) => Ok(Some((k, v.to_vec()))),
            None => Ok(None),
        }
    }

    /// Returns a two-level iterator positioned at the first entry whose
    /// key is `≥ key` (or at `end` if none).
    pub fn seek(&self, key: &[u8]) -> Result<TwoLevelIterator<'_, C>> {
        TwoLevelIterator::seek(self, key)
    }

    /// Returns a two-level iterator positioned at the first entry.
    pub fn begin(&self) -> Result<TwoLevelIterator<'_, C>> {
        TwoLevelIterator::begin(self)
    }

    pub(crate) fn index_block(&self) -> &Block<C> {
        &self.index_block
    }

    pub(crate) fn comparator(&self) -> &C {
        &self.cmp
    }

    pub(crate) fn fetch_data_block(&self, handle: BlockHandle) -> Result<Arc<Block<C>>> {
        self.fetch_block(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::BytewiseComparator;
    use crate::sstable::builder::{BuilderOptions, SsTableBuilder};
    use crate::file::WritableFile;

    struct VecFile(std::cell::RefCell<Vec<u8>>);
    impl WritableFile for &VecFile {
        fn append(&mut self, data: &[u8]) -> Result<()> {
            self.0.borrow_mut().extend_from_slice(data);
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
    impl RandomAccessFile for VecFile {
        fn read_at(&self, offset: u64, n: usize) -> Result<Vec<u8>> {
            let data = self.0.borrow();
            let offset = offset as usize;
            let end = (offset + n).min(data.len());
            Ok(data[offset..end].to_vec())
        }
        fn len(&self) -> u64 {
            self.0.borrow().len() as u64
        }
    }

    fn build_table(entries: &[(&str, &str)]) -> Arc<VecFile> {
        let backing = Arc::new(VecFile(std::cell::RefCell::new(Vec::new())));
        {
            let mut builder = SsTableBuilder::new(
                backing.as_ref(),
                Arc::new(BytewiseComparator),
                BuilderOptions::default(),
            );
            for (k, v) in entries {
                builder.add(k.as_bytes(), v.as_bytes()).unwrap();
            }
            builder.finish().unwrap();
        }
        backing
    }

    #[test]
    fn find_present_and_absent() {
        let backing = build_table(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let options = Options::<BytewiseComparator>::default();
        let reader = SsTableReader::open(
            backing.clone() as Arc<dyn RandomAccessFile>,
            Arc::new(BytewiseComparator),
            &options,
            None,
        )
        .unwrap();

        let (k, v) = reader.find(b"b").unwrap().unwrap();
        assert_eq!(k, b"b");
        assert_eq!(v, b"2");
        assert!(reader.find(b"zzz").unwrap().is_none());
    }

    #[test]
    fn iteration_matches_input() {
        let entries: Vec<(String, String)> = (0..200)
            .map(|i| (format!("key{i:05}"), format!("val{i}")))
            .collect();
        let refs: Vec<(&str, &str)> = entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let backing = build_table(&refs);
        let options = Options::<BytewiseComparator>::default();
        let reader = SsTableReader::open(
            backing as Arc<dyn RandomAccessFile>,
            Arc::new(BytewiseComparator),
            &options,
            None,
        )
        .unwrap();

        let mut it = reader.begin().unwrap();
        let mut i = 0;
        while let Some((k, v)) = it.current() {
            assert_eq!(k, entries[i].0.as_bytes());
            assert_eq!(v, entries[i].1.as_bytes());
            i += 1;
            it.advance().unwrap();
        }
        assert_eq!(i, entries.len());
    }
}
