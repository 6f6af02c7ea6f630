//! File abstractions: random-read, sequential-read, append-write, and a
//! factory to open them by name.
//!
//! `RandomAccessFile` implementations are memory-mapped (via `memmap2`)
//! so concurrent reads never contend on a shared file cursor.
//! `SequentialFile`/`WritableFile` wrap plain `std::fs::File` handles, the
//! way the teacher's log writer does — sequential access and appends are
//! inherently single-threaded per instance.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Thread-safe random-access reads into a named region.
pub trait RandomAccessFile: Send + Sync {
    /// Reads up to `n` bytes starting at `offset`. Returns fewer than `n`
    /// bytes only at end-of-file.
    fn read_at(&self, offset: u64, n: usize) -> Result<Vec<u8>>;

    /// Total length of the file.
    fn len(&self) -> u64;

    /// True if the file is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Forward-only, single-threaded reads with a cursor.
pub trait SequentialFile {
    /// Reads up to `n` bytes, advancing the cursor; returns fewer than
    /// `n` only at end-of-file.
    fn read(&mut self, n: usize) -> Result<Vec<u8>>;

    /// Advances the cursor by `n` bytes without returning them.
    fn skip(&mut self, n: u64) -> Result<()>;
}

/// Append-only, single-threaded writes.
pub trait WritableFile {
    /// Appends `data` to the file.
    fn append(&mut self, data: &[u8]) -> Result<()>;

    /// Flushes any in-process buffering to the OS.
    fn flush(&mut self) -> Result<()>;

    /// Requests the OS durably persist the file's contents.
    fn sync(&mut self) -> Result<()>;

    /// Closes the file, returning any final error.
    fn close(&mut self) -> Result<()>;
}

/// Opens files by name, choosing the concrete implementation.
pub trait FileFactory: Send + Sync {
    /// Opens `path` for mmap-backed random reads.
    fn open_random_access(&self, path: &Path) -> Result<Arc<dyn RandomAccessFile>>;

    /// Opens `path` for sequential reads from the start.
    fn open_sequential(&self, path: &Path) -> Result<Box<dyn SequentialFile>>;

    /// Creates (or truncates) `path` for appending.
    fn open_writable(&self, path: &Path) -> Result<Box<dyn WritableFile>>;
}

/// Production file factory: mmap-backed random reads, `std::fs`-backed
/// sequential reads and appends.
#[derive(Debug, Default, Clone)]
pub struct OsFileFactory;

impl FileFactory for OsFileFactory {
    fn open_random_access(&self, path: &Path) -> Result<Arc<dyn RandomAccessFile>> {
        trace!(path = %path.display(), "opening random-access file");
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Arc::new(MmapRandomAccessFile {
            mmap,
            path: path.to_path_buf(),
        }))
    }

    fn open_sequential(&self, path: &Path) -> Result<Box<dyn SequentialFile>> {
        trace!(path = %path.display(), "opening sequential file");
        let file = File::open(path)?;
        Ok(Box::new(OsSequentialFile { file }))
    }

    fn open_writable(&self, path: &Path) -> Result<Box<dyn WritableFile>> {
        debug!(path = %path.display(), "opening writable file");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Box::new(OsWritableFile {
            file,
            path: path.to_path_buf(),
            poisoned: false,
        }))
    }
}

struct MmapRandomAccessFile {
    mmap: Mmap,
    path: PathBuf,
}

impl RandomAccessFile for MmapRandomAccessFile {
    fn read_at(&self, offset: u64, n: usize) -> Result<Vec<u8>> {
        let offset = offset as usize;
        if offset > self.mmap.len() {
            return Err(Error::io(format!(
                "read offset {offset} past end of {} ({} bytes)",
                self.path.display(),
                self.mmap.len()
            )));
        }
        let end = (offset + n).min(self.mmap.len());
        Ok(self.mmap[offset..end].to_vec())
    }

    fn len(&self) -> u64 {
        self.mmap.len() as u64
    }
}

struct OsSequentialFile {
    file: File,
}

impl SequentialFile for OsSequentialFile {
    fn read(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        let mut total = 0;
        loop {
            let read = self.file.read(&mut buf[total..])?;
            if read == 0 {
                break;
            }
            total += read;
            if total == n {
                break;
            }
        }
        buf.truncate(total);
        Ok(buf)
    }

    fn skip(&mut self, n: u64) -> Result<()> {
        self.file.seek(SeekFrom::Current(n as i64))?;
        Ok(())
    }
}

struct OsWritableFile {
    file: File,
    path: PathBuf,
    /// Set once any append/flush/sync fails; every subsequent call fails
    /// fast with `Io` until the caller discards and reopens.
    poisoned: bool,
}

impl OsWritableFile {
    fn check_poisoned(&self) -> Result<()> {
        if self.poisoned {
            return Err(Error::io(format!(
                "writable file {} previously failed; discard and reopen",
                self.path.display()
            )));
        }
        Ok(())
    }
}

impl WritableFile for OsWritableFile {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.check_poisoned()?;
        self.file.write_all(data).inspect_err(|_| {
            self.poisoned = true;
        })?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.check_poisoned()?;
        self.file.flush().inspect_err(|_| {
            self.poisoned = true;
        })?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.check_poisoned()?;
        self.file.sync_data().inspect_err(|_| {
            self.poisoned = true;
        })?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.flush()
    }
}

impl WritableFile for Box<dyn WritableFile> {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        (**self).append(data)
    }
    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
    fn sync(&mut self) -> Result<()> {
        (**self).sync()
    }
    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

impl SequentialFile for Box<dyn SequentialFile> {
    fn read(&mut self, n: usize) -> Result<Vec<u8>> {
        (**self).read(n)
    }
    fn skip(&mut self, n: u64) -> Result<()> {
        (**self).skip(n)
    }
}
