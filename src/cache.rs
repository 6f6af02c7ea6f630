//! An LRU cache of decoded blocks, keyed by `(owner_id, block_offset)`.
//!
//! `owner_id` is handed out by [`BlockCache::new_owner_id`], a per-cache
//! monotonic counter, so that block offsets from different SSTables
//! opened against one shared cache never collide.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A 16-byte cache key: `owner_id:u64_le ‖ block_offset:u64_le`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    owner_id: u64,
    block_offset: u64,
}

struct LruEntry<V> {
    key: CacheKey,
    value: Arc<V>,
}

struct Inner<V> {
    map: HashMap<CacheKey, usize>,
    /// Doubly-linked list realized as a `Vec` slab; `order` holds live
    /// slot indices from least- to most-recently-used. Simpler than an
    /// intrusive list and fine at the entry counts this cache targets.
    entries: Vec<Option<LruEntry<V>>>,
    order: Vec<usize>,
    capacity: usize,
}

/// A coarse-mutex-guarded LRU, matching the hash-map-plus-intrusive-list
/// shape of the design this is modeled on, minus the intrusive pointers.
pub struct BlockCache<V> {
    inner: Mutex<Inner<V>>,
    next_owner_id: AtomicU64,
}

impl<V> BlockCache<V> {
    /// Creates a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        BlockCache {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                entries: Vec::new(),
                order: Vec::new(),
                capacity: capacity.max(1),
            }),
            next_owner_id: AtomicU64::new(1),
        }
    }

    /// Builds the key for `(owner_id, block_offset)`.
    pub fn make_key(owner_id: u64, block_offset: u64) -> CacheKey {
        CacheKey {
            owner_id,
            block_offset,
        }
    }

    /// Issues the next owner id for a newly opened SSTable reader.
    pub fn new_owner_id(&self) -> u64 {
        self.next_owner_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Inserts `value` under `key`, evicting the prior record for `key`
    /// if present, then the least-recently-used record if at capacity.
    pub fn insert(&self, key: CacheKey, value: Arc<V>) {
        let mut inner = self.inner.lock().unwrap();
        inner.erase(key);
        if inner.map.len() >= inner.capacity {
            inner.evict_lru();
        }
        let slot = inner.entries.len();
        inner.entries.push(Some(LruEntry { key, value }));
        inner.order.push(slot);
        inner.map.insert(key, slot);
    }

    /// Looks up `key`, moving it to most-recently-used on a hit.
    pub fn lookup(&self, key: &CacheKey) -> Option<Arc<V>> {
        let mut inner = self.inner.lock().unwrap();
        let slot = *inner.map.get(key)?;
        inner.touch(slot);
        inner.entries[slot].as_ref().map(|e| Arc::clone(&e.value))
    }

    /// Removes `key` if present.
    pub fn erase(&self, key: &CacheKey) {
        self.inner.lock().unwrap().erase(*key);
    }

    /// Current number of entries.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }

    /// True if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The maximum number of entries this cache will hold.
    pub fn capacity(&self) -> usize {
        self.inner.lock().unwrap().capacity
    }
}

impl<V> Inner<V> {
    fn touch(&mut self, slot: usize) {
        if let Some(pos) = self.order.iter().position(|&s| s == slot) {
            let s = self.order.remove(pos);
            self.order.push(s);
        }
    }

    fn erase(&mut self, key: CacheKey) {
        if let Some(slot) = self.map.remove(&key) {
            self.entries[slot] = None;
            if let Some(pos) = self.order.iter().position(|&s| s == slot) {
                self.order.remove(pos);
            }
        }
    }

    fn evict_lru(&mut self) {
        if self.order.is_empty() {
            return;
        }
        let slot = self.order.remove(0);
        if let Some(entry) = self.entries[slot].take() {
            self.map.remove(&entry.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eviction_after_capacity_plus_one() {
        let cache: BlockCache<i32> = BlockCache::new(2);
        let owner = cache.new_owner_id();
        let k1 = BlockCache::<i32>::make_key(owner, 1);
        let k2 = BlockCache::<i32>::make_key(owner, 2);
        let k3 = BlockCache::<i32>::make_key(owner, 3);

        cache.insert(k1, Arc::new(1));
        cache.insert(k2, Arc::new(2));
        cache.lookup(&k1); // k1 becomes MRU, k2 becomes LRU
        cache.insert(k3, Arc::new(3));

        assert!(cache.lookup(&k2).is_none());
        assert!(cache.lookup(&k1).is_some());
        assert!(cache.lookup(&k3).is_some());
    }

    #[test]
    fn owner_ids_are_monotonic_and_distinct() {
        let cache: BlockCache<i32> = BlockCache::new(4);
        let a = cache.new_owner_id();
        let b = cache.new_owner_id();
        assert_ne!(a, b);
    }

    #[test]
    fn insert_over_existing_key_replaces_value() {
        let cache: BlockCache<i32> = BlockCache::new(4);
        let key = BlockCache::<i32>::make_key(1, 1);
        cache.insert(key, Arc::new(10));
        cache.insert(key, Arc::new(20));
        assert_eq!(*cache.lookup(&key).unwrap(), 20);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn capacity_reports_configured_value() {
        let cache: BlockCache<i32> = BlockCache::new(7);
        assert_eq!(cache.capacity(), 7);
    }

    #[test]
    fn erase_removes_entry() {
        let cache: BlockCache<i32> = BlockCache::new(4);
        let key = BlockCache::<i32>::make_key(1, 1);
        cache.insert(key, Arc::new(10));
        cache.erase(&key);
        assert!(cache.lookup(&key).is_none());
    }
}
