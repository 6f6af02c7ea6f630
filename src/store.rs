//! A minimal façade wiring the core components together end-to-end:
//! `WriteBatch` -> [`crate::log::LogWriter`] -> [`crate::memtable::Memtable`]
//! for writes; the memtable (newest data first) then each on-disk
//! [`crate::sstable::SsTableReader`] (oldest-flushed last) for reads.
//!
//! There is no background flush, compaction, or leveling here — those
//! remain out-of-scope collaborators. [`Store::flush_to_sstable`] is a
//! single, caller-invoked operation.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::batch::WriteBatch;
use crate::cache::BlockCache;
use crate::comparator::Comparator;
use crate::error::Result;
use crate::file::{FileFactory, OsFileFactory};
use crate::internal_key::{pack, unpack, InternalKeyComparator, ValueType};
use crate::log::{LogIter, LogReader, LogWriter};
use crate::memtable::Memtable;
use crate::options::{Options, WriteOptions};
use crate::sstable::builder::{BuilderOptions, SsTableBuilder};
use crate::sstable::reader::{Block, SsTableReader};

const LOG_FILE_NAME: &str = "kvcore.log";

struct Generation<C: Comparator + Clone + 'static> {
    reader: Arc<SsTableReader<InternalKeyComparator<C>>>,
}

struct Mutable<C: Comparator + Clone + 'static> {
    memtable: Memtable<C>,
    log: LogWriter<Box<dyn crate::file::WritableFile>>,
    generations: Vec<Generation<C>>,
    next_sst_id: u64,
}

/// The end-to-end façade: log-backed durability, a memtable for recent
/// writes, and a flat (uncompacted) list of flushed SSTables.
pub struct Store<C: Comparator + Clone + 'static> {
    dir: PathBuf,
    options: Options<C>,
    /// A cache of decoded blocks, keyed by the internal-key comparator
    /// tables are actually read with. Sized from `options.block_cache`
    /// (which is typed over the user comparator and so can't be reused
    /// directly) once at open time.
    block_cache: Option<Arc<BlockCache<Block<InternalKeyComparator<C>>>>>,
    file_factory: Arc<dyn FileFactory>,
    next_sequence: AtomicU64,
    mutable: Mutex<Mutable<C>>,
}

impl<C: Comparator + Clone + Default + 'static> Store<C> {
    /// Opens (creating if absent) a store rooted at `dir`, replaying its
    /// write-ahead log into a fresh memtable.
    pub fn open(dir: impl AsRef<Path>, options: Options<C>) -> Result<Self> {
        Self::open_with_factory(dir, options, Arc::new(OsFileFactory))
    }
}

impl<C: Comparator + Clone + 'static> Store<C> {
    /// Like [`Store::open`], but with an injectable [`FileFactory`] (tests
    /// can swap in an in-memory one; production code uses
    /// [`OsFileFactory`]).
    pub fn open_with_factory(
        dir: impl AsRef<Path>,
        options: Options<C>,
        file_factory: Arc<dyn FileFactory>,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        info!(dir = %dir.display(), "opening store");

        let user_cmp = (*options.comparator).clone();
        let memtable = Memtable::new(user_cmp);

        let log_path = dir.join(LOG_FILE_NAME);
        let mut max_sequence = 0u64;
        if log_path.exists() {
            let seq_file = file_factory.open_sequential(&log_path)?;
            let reader = LogReader::new(seq_file);
            for record in LogIter::new(reader) {
                let record = record?;
                let batch = WriteBatch::from_buffer(record)?;
                let last_seq = batch.starting_sequence() + batch.count() as u64 - 1;
                max_sequence = max_sequence.max(last_seq);
                batch.insert_into(&memtable)?;
            }
            debug!(max_sequence, "replayed write-ahead log");
        }

        let resume_offset = if log_path.exists() {
            let existing = file_factory.open_random_access(&log_path)?;
            (existing.len() % crate::log::BLOCK_SIZE as u64) as usize
        } else {
            0
        };
        let log_writable = file_factory.open_writable(&log_path)?;
        let log = LogWriter::with_offset(log_writable, resume_offset);

        let next_sst_id = discover_next_sst_id(&dir);
        let block_cache = options
            .block_cache
            .as_ref()
            .map(|c| Arc::new(BlockCache::new(c.capacity())));

        let store = Store {
            dir,
            options,
            block_cache,
            file_factory,
            next_sequence: AtomicU64::new(max_sequence + 1),
            mutable: Mutex::new(Mutable {
                memtable,
                log,
                generations: Vec::new(),
                next_sst_id,
            }),
        };
        Ok(store)
    }

    /// Writes a single key/value pair.
    pub fn put(&self, key: &[u8], value: &[u8], write_opts: &WriteOptions) -> Result<()> {
        let mut batch = WriteBatch::new(0);
        batch.put(key, value);
        self.write_batch(batch, write_opts)
    }

    /// Writes a tombstone for `key`.
    pub fn delete(&self, key: &[u8], write_opts: &WriteOptions) -> Result<()> {
        let mut batch = WriteBatch::new(0);
        batch.delete(key);
        self.write_batch(batch, write_opts)
    }

    /// Applies a caller-built batch atomically: assigns it the next block
    /// of sequence numbers, appends it to the log, then replays it into
    /// the memtable.
    pub fn write_batch(&self, mut batch: WriteBatch, write_opts: &WriteOptions) -> Result<()> {
        let count = batch.count() as u64;
        if count == 0 {
            return Ok(());
        }
        let starting_sequence = self.next_sequence.fetch_add(count, Ordering::SeqCst);
        batch = WriteBatch::from_buffer(rewrite_starting_sequence(batch, starting_sequence))?;

        let mut guard = self.mutable.lock().unwrap();
        guard.log.add_record(batch.as_bytes())?;
        if write_opts.sync {
            guard.log.sync()?;
        }
        batch.insert_into(&guard.memtable)?;
        Ok(())
    }

    /// Looks up the newest value for `key`: the memtable first, then each
    /// flushed SSTable from most to least recently written.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let guard = self.mutable.lock().unwrap();

        let probe_seq = u64::MAX >> 8;
        let mut it = guard.memtable.find(key, probe_seq, ValueType::Value);
        if let Some(entry) = it.entry() {
            let parts = unpack(entry.internal_key).expect("valid internal key in memtable");
            if parts.user_key == key {
                return Ok(match parts.value_type {
                    ValueType::Value => Some(entry.value.to_vec()),
                    ValueType::Deletion => None,
                });
            }
        }

        for generation in &guard.generations {
            let target = pack(key, probe_seq, ValueType::Value);
            let mut seek = generation.reader.seek(&target)?;
            if let Some((ik, v)) = seek.current() {
                let parts = unpack(ik).expect("valid internal key on disk");
                if parts.user_key == key {
                    return Ok(match parts.value_type {
                        ValueType::Value => Some(v.to_vec()),
                        ValueType::Deletion => None,
                    });
                }
            }
        }

        Ok(None)
    }

    /// Collects every live (non-tombstoned) user key in `[start, end)`
    /// visible across the memtable and all flushed SSTables, newest
    /// version of each key winning. `end == None` means unbounded.
    pub fn scan(&self, start: &[u8], end: Option<&[u8]>) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let guard = self.mutable.lock().unwrap();
        let user_cmp = guard.memtable.comparator().user_comparator();

        let mut merged: Vec<(Vec<u8>, Vec<u8>, u64, ValueType)> = Vec::new();

        for entry in guard.memtable.iter() {
            let parts = unpack(entry.internal_key).expect("valid internal key in memtable");
            merged.push((
                parts.user_key.to_vec(),
                entry.value.to_vec(),
                parts.sequence,
                parts.value_type,
            ));
        }

        for generation in &guard.generations {
            let mut it = generation.reader.begin()?;
            while let Some((ik, v)) = it.current() {
                let parts = unpack(ik).expect("valid internal key on disk");
                merged.push((parts.user_key.to_vec(), v.to_vec(), parts.sequence, parts.value_type));
                it.advance()?;
            }
        }

        merged.sort_by(|a, b| {
            user_cmp
                .compare(&a.0, &b.0)
                .then_with(|| b.2.cmp(&a.2))
        });

        let mut out = Vec::new();
        let mut last_key: Option<Vec<u8>> = None;
        for (user_key, value, _, value_type) in merged {
            if user_cmp.compare(&user_key, start) == std::cmp::Ordering::Less {
                continue;
            }
            if let Some(end) = end {
                if user_cmp.compare(&user_key, end) != std::cmp::Ordering::Less {
                    continue;
                }
            }
            if last_key.as_deref() == Some(user_key.as_slice()) {
                continue; // already emitted the newest version
            }
            last_key = Some(user_key.clone());
            if value_type == ValueType::Value {
                out.push((user_key, value));
            }
        }
        Ok(out)
    }

    /// Flushes the current memtable to a new on-disk SSTable, replacing
    /// it with an empty one. The caller decides when this runs — there is
    /// no background scheduler.
    pub fn flush_to_sstable(&self) -> Result<()> {
        let mut guard = self.mutable.lock().unwrap();

        let entries: Vec<(Vec<u8>, Vec<u8>)> = guard
            .memtable
            .iter()
            .map(|e| (e.internal_key.to_vec(), e.value.to_vec()))
            .collect();
        if entries.is_empty() {
            return Ok(());
        }

        let sst_id = guard.next_sst_id;
        guard.next_sst_id += 1;
        let sst_path = self.dir.join(format!("{sst_id:06}.sst"));

        let internal_cmp = Arc::new(guard.memtable.comparator().clone());
        let file = self.file_factory.open_writable(&sst_path)?;
        let builder_opts = BuilderOptions {
            block_restart_interval: self.options.block_restart_interval,
            block_size: self.options.block_size,
        };
        let mut builder = SsTableBuilder::new(file, Arc::clone(&internal_cmp), builder_opts);
        for (k, v) in &entries {
            builder.add(k, v)?;
        }
        builder.finish()?;
        debug!(sst_id, entries = entries.len(), "flushed memtable to sstable");

        let random_access = self.file_factory.open_random_access(&sst_path)?;
        let sst_options = Options::with_comparator(Arc::clone(&internal_cmp));
        let reader = Arc::new(SsTableReader::open(
            random_access,
            internal_cmp,
            &sst_options,
            self.block_cache.clone(),
        )?);

        guard.generations.insert(0, Generation { reader });

        let user_cmp = (*self.options.comparator).clone();
        guard.memtable = Memtable::new(user_cmp);

        let new_log_path = self.dir.join(LOG_FILE_NAME);
        let log_writable = self.file_factory.open_writable(&new_log_path)?;
        guard.log = LogWriter::new(log_writable);

        Ok(())
    }
}

fn rewrite_starting_sequence(batch: WriteBatch, starting_sequence: u64) -> Vec<u8> {
    let mut buf = batch.as_bytes().to_vec();
    buf[0..8].copy_from_slice(&starting_sequence.to_le_bytes());
    buf
}

/// Scans `dir` for `NNNNNN.sst` files left by a prior process lifetime and
/// returns one past the highest id found, so a freshly opened `Store`
/// never reuses a generation filename still on disk.
fn discover_next_sst_id(dir: &Path) -> u64 {
    let mut max_id = None;
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("sst") {
            continue;
        }
        if let Some(id) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u64>().ok())
        {
            max_id = Some(max_id.map_or(id, |m: u64| m.max(id)));
        }
    }
    max_id.map_or(0, |m| m + 1)
}
