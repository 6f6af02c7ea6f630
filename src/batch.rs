//! A compact, replayable journal of puts and deletes, written atomically
//! to the log and replayed into a memtable.

use crate::codec::{get_fixed32, get_fixed64, get_varstring, put_fixed32, put_fixed64, put_varstring};
use crate::comparator::Comparator;
use crate::error::{Error, Result};
use crate::internal_key::ValueType;
use crate::memtable::Memtable;

const HEADER_LEN: usize = 8 + 4;
const TAG_VALUE: u8 = ValueType::Value as u8;
const TAG_DELETION: u8 = ValueType::Deletion as u8;

/// Receives decoded records as a batch is iterated.
pub trait Handler {
    /// A `Put` record.
    fn put(&mut self, key: &[u8], value: &[u8]);
    /// A `Delete` record.
    fn delete(&mut self, key: &[u8]);
}

/// `sequence:u64_le, count:u32_le, record*` where each record is
/// `VALUE varstring varstring` or `DELETION varstring`.
#[derive(Debug, Clone)]
pub struct WriteBatch {
    buf: Vec<u8>,
}

impl WriteBatch {
    /// Starts a new, empty batch with the given starting sequence number
    /// (the sequence the first record in the batch will be assigned).
    pub fn new(starting_sequence: u64) -> Self {
        let mut buf = Vec::with_capacity(HEADER_LEN);
        put_fixed64(&mut buf, starting_sequence);
        put_fixed32(&mut buf, 0);
        WriteBatch { buf }
    }

    /// Wraps an already-serialized batch buffer (e.g. read back from the
    /// log), validating only its header length.
    pub fn from_buffer(buf: Vec<u8>) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(Error::corruption("write batch too small"));
        }
        Ok(WriteBatch { buf })
    }

    /// The batch's starting sequence number.
    pub fn starting_sequence(&self) -> u64 {
        get_fixed64(&self.buf[..8]).expect("header validated at construction")
    }

    /// Number of records in the batch.
    pub fn count(&self) -> u32 {
        get_fixed32(&self.buf[8..12]).expect("header validated at construction")
    }

    fn set_count(&mut self, count: u32) {
        self.buf[8..12].copy_from_slice(&count.to_le_bytes());
    }

    /// Appends a put record and increments the record count.
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.buf.push(TAG_VALUE);
        put_varstring(&mut self.buf, key);
        put_varstring(&mut self.buf, value);
        let count = self.count();
        self.set_count(count + 1);
    }

    /// Appends a delete record and increments the record count.
    pub fn delete(&mut self, key: &[u8]) {
        self.buf.push(TAG_DELETION);
        put_varstring(&mut self.buf, key);
        let count = self.count();
        self.set_count(count + 1);
    }

    /// The raw serialized buffer, suitable for writing to the log.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// True if no records have been appended.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Invokes `handler.put`/`handler.delete` for each record in order.
    /// Buffers shorter than the header are `Corruption`; an unrecognized
    /// type tag is `Corruption`.
    pub fn iterate(&self, handler: &mut dyn Handler) -> Result<()> {
        if self.buf.len() < HEADER_LEN {
            return Err(Error::corruption("too small"));
        }
        let mut pos = HEADER_LEN;
        let mut seen = 0u32;
        let expected = self.count();

        while pos < self.buf.len() {
            let tag = self.buf[pos];
            pos += 1;
            match tag {
                TAG_VALUE => {
                    let (key, n1) = get_varstring(&self.buf[pos..])?;
                    pos += n1;
                    let (value, n2) = get_varstring(&self.buf[pos..])?;
                    pos += n2;
                    handler.put(key, value);
                }
                TAG_DELETION => {
                    let (key, n1) = get_varstring(&self.buf[pos..])?;
                    pos += n1;
                    handler.delete(key);
                }
                _ => return Err(Error::corruption("undefined value type")),
            }
            seen += 1;
        }

        if seen != expected {
            return Err(Error::corruption(format!(
                "batch header declares {expected} records, found {seen}"
            )));
        }
        Ok(())
    }

    /// Replays the batch into `memtable`, assigning sequence numbers
    /// starting from [`WriteBatch::starting_sequence`] and incrementing
    /// by one per record.
    pub fn insert_into<C: Comparator + 'static>(&self, memtable: &Memtable<C>) -> Result<()> {
        struct Inserter<'m, C: Comparator + 'static> {
            memtable: &'m Memtable<C>,
            seq: u64,
        }
        impl<C: Comparator + 'static> Handler for Inserter<'_, C> {
            fn put(&mut self, key: &[u8], value: &[u8]) {
                self.memtable.put(self.seq, key, value);
                self.seq += 1;
            }
            fn delete(&mut self, key: &[u8]) {
                self.memtable.delete(self.seq, key);
                self.seq += 1;
            }
        }
        let mut inserter = Inserter {
            memtable,
            seq: self.starting_sequence(),
        };
        self.iterate(&mut inserter)
    }
}
