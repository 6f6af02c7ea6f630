//! Write-ahead log: records framed into fixed 32 KiB blocks with a
//! per-fragment CRC, so a crash mid-write never corrupts anything but
//! the incomplete tail fragment.
//!
//! ```text
//! block := fragment* zero-padding?
//! fragment := crc:u32_le length:u16_le type:u8 payload[length]
//! ```
//!
//! `type` is one of [`RecordType::Full`], [`RecordType::First`],
//! [`RecordType::Middle`], [`RecordType::Last`]; the log writer never
//! splits a fragment header across a block boundary.


use crc32fast::Hasher;
use thiserror::Error as ThisError;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::file::{SequentialFile, WritableFile};

/// Size of one log block.
pub const BLOCK_SIZE: usize = 32 * 1024;
/// `crc:u32_le, length:u16_le, type:u8`.
pub const HEADER_SIZE: usize = 7;

/// A fragment's position within its parent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// The entire record fit in one fragment.
    Full = 1,
    /// The first fragment of a multi-fragment record.
    First = 2,
    /// A fragment strictly between the first and last.
    Middle = 3,
    /// The final fragment of a multi-fragment record.
    Last = 4,
}

impl RecordType {
    fn from_u8(b: u8) -> Option<RecordType> {
        match b {
            1 => Some(RecordType::Full),
            2 => Some(RecordType::First),
            3 => Some(RecordType::Middle),
            4 => Some(RecordType::Last),
            _ => None,
        }
    }
}

/// Errors specific to log reading (writing surfaces the crate-wide
/// `Error` directly, since a write failure has only one meaning: I/O).
#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum LogError {
    /// A fragment's CRC did not match its payload.
    #[error("log record checksum mismatch")]
    ChecksumMismatch,
    /// Fragments arrived out of the `First, Middle*, Last` sequence.
    #[error("log record fragments out of sequence")]
    OutOfSequence,
}

/// Writes records into 32 KiB blocks, splitting oversized records into
/// `First, Middle*, Last` fragment sequences.
pub struct LogWriter<W: WritableFile> {
    file: W,
    block_offset: usize,
}

impl<W: WritableFile> LogWriter<W> {
    /// Wraps `file` for append-only writing, starting at block offset 0
    /// (use [`LogWriter::with_offset`] when resuming a partially-written
    /// file after a rotation).
    pub fn new(file: W) -> Self {
        LogWriter {
            file,
            block_offset: 0,
        }
    }

    /// Wraps `file`, resuming at `block_offset` bytes into the current
    /// block.
    pub fn with_offset(file: W, block_offset: usize) -> Self {
        LogWriter { file, block_offset }
    }

    /// Writes `data` as one logical record, fragmenting across block
    /// boundaries as needed.
    pub fn add_record(&mut self, data: &[u8]) -> Result<()> {
        let mut left = data.len();
        let mut p = 0usize;
        let mut first = true;

        loop {
            let avail = BLOCK_SIZE - self.block_offset;
            if avail < HEADER_SIZE {
                if avail > 0 {
                    let zeros = vec![0u8; avail];
                    self.file.append(&zeros)?;
                }
                self.block_offset = 0;
                continue;
            }

            let usable = avail - HEADER_SIZE;
            let frag_len = usable.min(left);
            let record_type = match (first, frag_len == left) {
                (true, true) => RecordType::Full,
                (true, false) => RecordType::First,
                (false, true) => RecordType::Last,
                (false, false) => RecordType::Middle,
            };

            self.emit_fragment(record_type, &data[p..p + frag_len])?;

            p += frag_len;
            left -= frag_len;
            self.block_offset += HEADER_SIZE + frag_len;
            first = false;

            if left == 0 {
                break;
            }
        }

        self.file.flush()?;
        Ok(())
    }

    fn emit_fragment(&mut self, record_type: RecordType, payload: &[u8]) -> Result<()> {
        let mut hasher = Hasher::new();
        hasher.update(&[record_type as u8]);
        hasher.update(payload);
        let crc = hasher.finalize();

        let mut header = Vec::with_capacity(HEADER_SIZE);
        header.extend_from_slice(&crc.to_le_bytes());
        header.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        header.push(record_type as u8);

        trace!(len = payload.len(), ?record_type, "emitting log fragment");
        self.file.append(&header)?;
        self.file.append(payload)?;
        Ok(())
    }

    /// Requests the OS durably persist everything written so far.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync()
    }
}

/// Replays records from a log file written by [`LogWriter`].
pub struct LogReader<R: SequentialFile> {
    file: R,
    buffer: Vec<u8>,
    buffer_pos: usize,
}

impl<R: SequentialFile> LogReader<R> {
    /// Wraps `file` for sequential replay from its start.
    pub fn new(file: R) -> Self {
        LogReader {
            file,
            buffer: Vec::new(),
            buffer_pos: 0,
        }
    }

    fn fill_block(&mut self) -> Result<bool> {
        let chunk = self.file.read(BLOCK_SIZE)?;
        if chunk.is_empty() {
            return Ok(false);
        }
        self.buffer = chunk;
        self.buffer_pos = 0;
        Ok(true)
    }

    fn read_fragment(&mut self) -> Result<Option<(RecordType, Vec<u8>)>> {
        loop {
            let remaining = self.buffer.len() - self.buffer_pos;
            if remaining < HEADER_SIZE {
                // Trailing zero-pad (or a too-short leftover): silently
                // move to the next block rather than treating it as
                // corruption.
                if !self.fill_block()? {
                    return Ok(None);
                }
                continue;
            }

            let header = &self.buffer[self.buffer_pos..self.buffer_pos + HEADER_SIZE];
            let crc = u32::from_le_bytes(header[0..4].try_into().unwrap());
            let length = u16::from_le_bytes(header[4..6].try_into().unwrap()) as usize;
            let type_byte = header[6];

            if crc == 0 && length == 0 && type_byte == 0 {
                // zero padding reaching to (or past) the block tail.
                if !self.fill_block()? {
                    return Ok(None);
                }
                continue;
            }

            let Some(record_type) = RecordType::from_u8(type_byte) else {
                warn!(type_byte, "unknown log record type, treating as truncated tail");
                if !self.fill_block()? {
                    return Ok(None);
                }
                continue;
            };

            let payload_start = self.buffer_pos + HEADER_SIZE;
            let payload_end = payload_start + length;
            if payload_end > self.buffer.len() {
                return Err(Error::corruption("log fragment payload runs past block"));
            }
            let payload = self.buffer[payload_start..payload_end].to_vec();

            let mut hasher = Hasher::new();
            hasher.update(&[type_byte]);
            hasher.update(&payload);
            if hasher.finalize() != crc {
                return Err(LogError::ChecksumMismatch.into());
            }

            self.buffer_pos = payload_end;
            return Ok(Some((record_type, payload)));
        }
    }

    /// Reads and reassembles the next complete record, or `None` at
    /// end-of-file.
    pub fn read_record(&mut self) -> Result<Option<Vec<u8>>> {
        let mut record = Vec::new();
        let mut in_fragmented_record = false;

        loop {
            let Some((record_type, payload)) = self.read_fragment()? else {
                if in_fragmented_record {
                    return Err(Error::corruption("log ended mid-record"));
                }
                return Ok(None);
            };

            match record_type {
                RecordType::Full => {
                    if in_fragmented_record {
                        return Err(LogError::OutOfSequence.into());
                    }
                    return Ok(Some(payload));
                }
                RecordType::First => {
                    if in_fragmented_record {
                        return Err(LogError::OutOfSequence.into());
                    }
                    record = payload;
                    in_fragmented_record = true;
                }
                RecordType::Middle => {
                    if !in_fragmented_record {
                        return Err(LogError::OutOfSequence.into());
                    }
                    record.extend_from_slice(&payload);
                }
                RecordType::Last => {
                    if !in_fragmented_record {
                        return Err(LogError::OutOfSequence.into());
                    }
                    record.extend_from_slice(&payload);
                    return Ok(Some(record));
                }
            }
        }
    }
}

impl From<LogError> for Error {
    fn from(e: LogError) -> Self {
        Error::corruption(e.to_string())
    }
}

/// Iterates a [`LogReader`]'s records, stopping (not erroring) at a
/// corruption it cannot resynchronize past once the file is exhausted.
pub struct LogIter<R: SequentialFile> {
    reader: LogReader<R>,
}

impl<R: SequentialFile> LogIter<R> {
    /// Wraps `reader`.
    pub fn new(reader: LogReader<R>) -> Self {
        debug!("log replay starting");
        LogIter { reader }
    }
}

impl<R: SequentialFile> Iterator for LogIter<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
