//! A two-level iterator: an index-block iterator selects the current
//! data block, a data-block iterator walks its entries.

use std::sync::Arc;

use crate::comparator::Comparator;
use crate::error::Result;
use crate::sstable::block_reader::BlockReader;
use crate::sstable::format::BlockHandle;
use crate::sstable::reader::{Block, SsTableReader};

/// Forward iterator over an [`SsTableReader`], advancing through data
/// blocks as they're exhausted.
pub struct TwoLevelIterator<'r, C: Comparator + Clone + 'static> {
    reader: &'r SsTableReader<C>,
    index_offset: usize,
    data_block: Option<Arc<Block<C>>>,
    data_offset: usize,
    data_prev_key: Vec<u8>,
    current: Option<(Vec<u8>, Vec<u8>)>,
}

impl<'r, C: Comparator + Clone + 'static> TwoLevelIterator<'r, C> {
    /// Positions at the first entry whose key is `≥ key`.
    pub fn seek(reader: &'r SsTableReader<C>, key: &[u8]) -> Result<Self> {
        let mut it = TwoLevelIterator {
            reader,
            index_offset: 0,
            data_block: None,
            data_offset: 0,
            data_prev_key: Vec::new(),
            current: None,
        };
        // Linear scan (index blocks are small relative to data blocks) so
        // `index_offset` stays in sync with the position a later
        // `advance()` resumes from, which a binary-search `find` can't give us.
        let mut found = None;
        for (idx, (sep, handle_bytes)) in reader.index_block().iter().enumerate() {
            if reader.comparator().compare(&sep, key) != std::cmp::Ordering::Less {
                found = Some((idx, handle_bytes.to_vec()));
                break;
            }
        }
        match found {
            Some((idx, handle_bytes)) => {
                let (handle, _) = BlockHandle::decode_from(&handle_bytes)?;
                it.index_offset = idx;
                it.enter_block(handle)?;
                it.advance_within_block_to(key)?;
            }
            None => it.current = None,
        }
        Ok(it)
    }

    /// Positions at the first entry in the table.
    pub fn begin(reader: &'r SsTableReader<C>) -> Result<Self> {
        let mut it = TwoLevelIterator {
            reader,
            index_offset: 0,
            data_block: None,
            data_offset: 0,
            data_prev_key: Vec::new(),
            current: None,
        };
        let mut index_iter = reader.index_block().iter();
        if let Some((_, handle_bytes)) = index_iter.next() {
            let (handle, _) = BlockHandle::decode_from(handle_bytes)?;
            it.enter_block(handle)?;
            it.fetch_current()?;
        }
        Ok(it)
    }

    fn enter_block(&mut self, handle: BlockHandle) -> Result<()> {
        let block = self.reader.fetch_data_block(handle)?;
        self.data_block = Some(block);
        self.data_offset = 0;
        self.data_prev_key.clear();
        Ok(())
    }

    fn advance_within_block_to(&mut self, key: &[u8]) -> Result<()> {
        // Linear scan so `data_offset` stays positionally correct for a
        // later `advance()` (a binary-search `find` can't give us that).
        let block = self.data_block.clone().expect("block entered before seek");
        for (i, (k, v)) in block.iter().enumerate() {
            if self.reader.comparator().compare(&k, key) != std::cmp::Ordering::Less {
                self.data_offset = i;
                self.current = Some((k, v.to_vec()));
                return Ok(());
            }
        }
        self.current = None;
        Ok(())
    }

    fn fetch_current(&mut self) -> Result<()> {
        let block = self.data_block.clone().expect("block entered before fetch");
        let mut iter = block.iter();
        // Re-derive the iterator position from `data_offset`/`data_prev_key`
        // by walking from the start; blocks are small enough that this is
        // cheap and keeps the iterator state simple (no lifetime tangles
        // from storing a `BlockIter` borrowing `data_block` alongside it).
        let mut pos = 0;
        let mut found = None;
        for (k, v) in iter.by_ref() {
            if pos == self.data_offset {
                found = Some((k, v.to_vec()));
                break;
            }
            pos += 1;
        }
        self.current = found;
        Ok(())
    }

    /// The entry at the iterator's current position, or `None` at end.
    pub fn current(&self) -> Option<(&[u8], &[u8])> {
        self.current.as_ref().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    /// True if positioned past the last entry.
    pub fn is_end(&self) -> bool {
        self.current.is_none()
    }

    /// Advances the data-block iterator; on its end, advances the
    /// index-block iterator and fetches the next data block.
    pub fn advance(&mut self) -> Result<()> {
        if self.current.is_none() {
            return Ok(());
        }
        self.data_offset += 1;

        let block = self.data_block.clone().expect("block entered before advance");
        if self.data_offset < count_entries(&block) {
            return self.fetch_current();
        }

        // exhausted the current data block; advance to the next index entry.
        self.index_offset += 1;
        match self.reader.index_block().iter().nth(self.index_offset) {
            Some((_, handle_bytes)) => {
                let (handle, _) = BlockHandle::decode_from(handle_bytes)?;
                self.enter_block(handle)?;
                self.fetch_current()
            }
            None => {
                self.current = None;
                Ok(())
            }
        }
    }
}

fn count_entries<C: Comparator>(block: &BlockReader<C>) -> usize {
    block.iter().count()
}
