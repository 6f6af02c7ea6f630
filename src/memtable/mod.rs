//! The in-memory staging area for recent mutations: a skip list of packed
//! `(internal_key, value)` entries over a bump-allocated arena.
//!
//! Every entry is one contiguous arena allocation, laid out as
//! `varstring(internal_key) ‖ varstring(value)`. The skip list stores a
//! `(ptr, len)` handle to each allocation rather than the bytes
//! themselves, and defers ordering to the internal-key comparator lifted
//! over the decoded `internal_key` prefix of each entry.

#[cfg(test)]
mod tests;

use std::sync::Arc;

use thiserror::Error;
use tracing::trace;

use crate::arena::Arena;
use crate::codec::{get_varstring, put_varstring};
use crate::comparator::Comparator;
use crate::internal_key::{pack, InternalKeyComparator, ValueType};
use crate::skiplist::{Iter as SkipIter, SkipList};

/// Errors raised directly by the memtable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemtableError {
    /// An entry's `varstring` framing could not be decoded.
    #[error("corrupt memtable entry: {0}")]
    Corrupt(String),
}

/// A handle to one arena-backed entry: its start and total length. `Copy`
/// so the skip list can store it by value.
#[derive(Debug, Clone, Copy)]
struct EntryHandle {
    ptr: *const u8,
    len: usize,
}

// SAFETY: the pointer only ever refers into an arena allocation that
// outlives every thread that can observe the handle (the arena is boxed
// and dropped only with the owning `Memtable`); no two threads mutate
// the pointed-to bytes once written.
unsafe impl Send for EntryHandle {}
unsafe impl Sync for EntryHandle {}

impl EntryHandle {
    fn as_slice<'a>(&self) -> &'a [u8] {
        // SAFETY: every handle inserted into the skip list was produced by
        // `Memtable::add`, which allocates exactly `len` bytes from an
        // arena that outlives every reader of this memtable.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

/// A single decoded entry: the packed internal key and the value bytes,
/// both borrowed from the arena.
#[derive(Debug, Clone, Copy)]
pub struct MemtableEntry<'a> {
    /// `user_key ‖ u64_le((seq<<8)|type)`.
    pub internal_key: &'a [u8],
    /// The value bytes (empty for deletions).
    pub value: &'a [u8],
}

fn decode_entry<'a>(handle: EntryHandle) -> Result<MemtableEntry<'a>, MemtableError> {
    let bytes = handle.as_slice();
    let (internal_key, consumed) =
        get_varstring(bytes).map_err(|e| MemtableError::Corrupt(e.to_string()))?;
    let (value, _) = get_varstring(&bytes[consumed..])
        .map_err(|e| MemtableError::Corrupt(e.to_string()))?;
    Ok(MemtableEntry { internal_key, value })
}

/// A skip list of packed entries, ordered by internal key.
///
/// Self-referential by construction: `list` borrows `arena`. The arena is
/// heap-boxed so its address is stable across `Memtable` moves, and the
/// borrow's lifetime is narrowed back from `'static` at every public
/// accessor, never escaping as `'static` itself.
pub struct Memtable<C: Comparator> {
    cmp: Arc<InternalKeyComparator<C>>,
    list: SkipList<'static, EntryHandle>,
    arena: Box<Arena>,
}

impl<C: Comparator + 'static> Memtable<C> {
    /// Creates an empty memtable ordered by `user_cmp` (lifted to an
    /// internal-key order).
    pub fn new(user_cmp: C) -> Self {
        let arena = Box::new(Arena::new());
        // SAFETY: `arena`'s heap address is stable for the box's lifetime,
        // which is at least as long as `self`; `list` never outlives `self`.
        let arena_ref: &'static Arena = unsafe { &*(arena.as_ref() as *const Arena) };

        let cmp = Arc::new(InternalKeyComparator::new(Arc::new(user_cmp)));
        let list_cmp = Arc::clone(&cmp);
        let head = EntryHandle {
            ptr: std::ptr::null(),
            len: 0,
        };
        let list = SkipList::new(arena_ref, head, move |a: &EntryHandle, b: &EntryHandle| {
            let ea = decode_entry(*a).expect("corrupt memtable entry in comparator");
            let eb = decode_entry(*b).expect("corrupt memtable entry in comparator");
            list_cmp.compare(ea.internal_key, eb.internal_key)
        });

        Memtable { cmp, list, arena }
    }

    /// Adds one mutation: `seq`/`value_type` pack with `user_key` into an
    /// internal key, then `internal_key ‖ value` is written as a single
    /// arena allocation and inserted into the skip list.
    pub fn add(&self, seq: u64, value_type: ValueType, user_key: &[u8], value: &[u8]) {
        let internal_key = pack(user_key, seq, value_type);

        let mut buf = Vec::with_capacity(internal_key.len() + value.len() + 10);
        put_varstring(&mut buf, &internal_key);
        put_varstring(&mut buf, value);

        let ptr = self.arena.alloc(buf.len(), 1);
        // SAFETY: `ptr` is a fresh allocation of exactly `buf.len()` bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(buf.as_ptr(), ptr.as_ptr(), buf.len());
        }
        trace!(user_key_len = user_key.len(), seq, "memtable add");
        self.list.insert(EntryHandle {
            ptr: ptr.as_ptr(),
            len: buf.len(),
        });
    }

    /// Convenience wrapper for `add(seq, Value, key, value)`.
    pub fn put(&self, seq: u64, user_key: &[u8], value: &[u8]) {
        self.add(seq, ValueType::Value, user_key, value);
    }

    /// Convenience wrapper for `add(seq, Deletion, key, &[])`.
    pub fn delete(&self, seq: u64, user_key: &[u8]) {
        self.add(seq, ValueType::Deletion, user_key, &[]);
    }

    /// Returns an iterator positioned at the first entry whose internal
    /// key is `≥` the internal key formed from `(user_key, seq, type)`.
    /// Passing sequence number `u64::MAX >> 8` positions at the newest
    /// version of `user_key`, if any (the highest sequence sorts first).
    pub fn find(&self, user_key: &[u8], seq: u64, value_type: ValueType) -> MemtableIter<'_, C> {
        let target_key = pack(user_key, seq, value_type);
        let mut probe = Vec::new();
        put_varstring(&mut probe, &target_key);
        put_varstring(&mut probe, &[]);
        let probe_handle = EntryHandle {
            ptr: probe.as_ptr(),
            len: probe.len(),
        };
        let inner = self.list.lower_bound(&probe_handle);
        MemtableIter {
            inner,
            _probe: probe,
            _memtable: self,
        }
    }

    /// Returns an iterator over every entry, in internal-key order
    /// (newest version of each user key first).
    pub fn iter(&self) -> MemtableIter<'_, C> {
        MemtableIter {
            inner: self.list.iter(),
            _probe: Vec::new(),
            _memtable: self,
        }
    }

    /// Total bytes allocated by the arena backing this memtable; an
    /// out-of-scope scheduler uses this to decide when to flush.
    pub fn bytes_used(&self) -> usize {
        self.arena.bytes_used()
    }

    /// The comparator this memtable orders entries by.
    pub fn comparator(&self) -> &InternalKeyComparator<C> {
        &self.cmp
    }
}

/// Forward iterator over a memtable, yielding `(internal_key, value)`
/// pairs lazily decoded from each entry's arena storage.
pub struct MemtableIter<'m, C: Comparator> {
    inner: SkipIter<'m, 'static, EntryHandle>,
    _probe: Vec<u8>,
    _memtable: &'m Memtable<C>,
}

impl<'m, C: Comparator> MemtableIter<'m, C> {
    /// The current entry, or `None` at end.
    pub fn entry(&self) -> Option<MemtableEntry<'m>> {
        let handle = self.inner.key()?;
        Some(decode_entry(handle).expect("corrupt memtable entry"))
    }

    /// True if positioned past the last entry.
    pub fn is_end(&self) -> bool {
        self.inner.is_end()
    }

    /// Advances to the next entry.
    pub fn advance(&mut self) {
        self.inner.advance();
    }
}

impl<'m, C: Comparator> Iterator for MemtableIter<'m, C> {
    type Item = MemtableEntry<'m>;

    fn next(&mut self) -> Option<Self::Item> {
        let e = self.entry();
        if e.is_some() {
            self.advance();
        }
        e
    }
}
