//! # Sharded Indexed Map
//!
//! A single [`FastReadIndexedMap`] can address at most `max_shard_bytes` of
//! values. The sharded map strings several of them together:
//!
//! ```text
//! shards: [ shard 0 (full) ][ shard 1 (full) ][ shard 2 (3/8) ]
//!                                               ^ free cursor
//! ```
//!
//! New entries go into the shard under the cursor. When it fills up the
//! cursor moves right, and a new shard is opened only when no later shard has
//! room. A removal from a shard left of the cursor pulls the cursor back so
//! the hole gets reused first.
//!
//! Lookups scan shards in order; the map trades lookup speed for an
//! unbounded element count.

use hashbrown::HashSet;

use super::{FastReadIndexedMap, MapKey};
use crate::config::{ContainerConfig, DEFAULT_INITIAL_CAPACITY};
use crate::error::{StrataError, StrataResult};
use crate::memory::AllocHandle;
use crate::pool::Reusable;
use crate::sync::{DependencyToken, Reclaimer};

/// Keyed container composed of capacity-bounded shards.
pub struct ShardedIndexedMap<K: MapKey, V: Copy> {
    shards: Vec<FastReadIndexedMap<K, V>>,
    free_shard: usize,
    shard_capacity: usize,
    initial_capacity: usize,
    alloc: AllocHandle,
    len: usize,
}

impl<K: MapKey, V: Copy> ShardedIndexedMap<K, V> {
    /// Creates a map whose shards hold at most `max_shard_bytes` per array.
    #[must_use]
    pub fn new(alloc: AllocHandle, max_shard_bytes: usize) -> Self {
        let shard_capacity = (max_shard_bytes / Self::stride()).max(1);
        Self::with_shard_capacity(alloc, shard_capacity, DEFAULT_INITIAL_CAPACITY)
    }

    /// Creates a map with an explicit per-shard element limit.
    ///
    /// New shards start with room for `initial_capacity` entries and grow
    /// up to `shard_capacity`.
    #[must_use]
    pub fn with_shard_capacity(alloc: AllocHandle, shard_capacity: usize, initial_capacity: usize) -> Self {
        let shard_capacity = shard_capacity.max(1);
        Self {
            shards: Vec::new(),
            free_shard: 0,
            shard_capacity,
            initial_capacity: initial_capacity.min(shard_capacity),
            alloc,
            len: 0,
        }
    }

    /// Creates a map from `config.max_shard_bytes` and `config.initial_capacity`.
    #[must_use]
    pub fn from_config(alloc: AllocHandle, config: &ContainerConfig) -> Self {
        Self::with_shard_capacity(
            alloc,
            config.shard_capacity(Self::stride()),
            config.initial_capacity,
        )
    }

    /// Bytes per entry in the widest of the key and value arrays.
    #[inline]
    fn stride() -> usize {
        std::mem::size_of::<K>()
            .max(std::mem::size_of::<V>())
            .max(1)
    }

    /// Total number of entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no shard holds an entry.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of allocated shards.
    #[inline]
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Maximum entries per shard.
    #[inline]
    #[must_use]
    pub fn shard_capacity(&self) -> usize {
        self.shard_capacity
    }

    /// Shard that receives the next new entry.
    #[inline]
    #[must_use]
    pub fn free_shard_index(&self) -> usize {
        self.free_shard
    }

    /// All shards, in order.
    #[inline]
    #[must_use]
    pub fn shards(&self) -> &[FastReadIndexedMap<K, V>] {
        &self.shards
    }

    /// Every entry, shard by shard.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.shards.iter().flat_map(|shard| shard.iter())
    }

    fn owner_of(&self, key: &K) -> Option<usize> {
        self.shards.iter().position(|shard| shard.contains(key))
    }

    /// Returns true if any shard holds `key`.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.owner_of(key).is_some()
    }

    /// Copies out the value stored under `key`.
    #[must_use]
    pub fn try_get_value(&self, key: &K) -> Option<V> {
        self.shards.iter().find_map(|shard| shard.try_get_value(key))
    }

    /// Borrows the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.shards.iter().find_map(|shard| shard.get(key))
    }

    /// Mutably borrows the value stored under `key`.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let owner = self.owner_of(key)?;
        self.shards[owner].get_mut(key)
    }

    /// Inserts a key known to be absent, skipping the duplicate scan.
    ///
    /// Inserting a key that is already present leaves the map holding it in
    /// two shards; checked builds assert instead.
    pub fn add(&mut self, key: K, value: V) {
        debug_assert!(!self.contains(&key), "key already present in a shard");
        self.insert_at_cursor(key, value);
    }

    /// Inserts `value` under `key` only if no shard holds the key.
    pub fn try_add(&mut self, key: K, value: V) -> bool {
        if self.contains(&key) {
            return false;
        }
        self.insert_at_cursor(key, value)
    }

    /// Updates `key` in its owning shard, or inserts it at the cursor.
    pub fn add_or_update(&mut self, key: K, value: V) {
        match self.get_mut(&key) {
            Some(slot) => *slot = value,
            None => {
                self.insert_at_cursor(key, value);
            }
        }
    }

    /// Removes `key` from its owning shard.
    ///
    /// If that shard sits left of the cursor, the cursor moves back to it.
    pub fn try_remove(&mut self, key: &K) -> Option<V> {
        let owner = self.owner_of(key)?;
        let value = self.shards[owner].try_remove(key)?;
        self.len -= 1;
        if owner < self.free_shard {
            self.free_shard = owner;
        }
        Some(value)
    }

    /// Appends into the shard at the cursor. Returns false, leaving the
    /// count alone, if that shard already holds `key`.
    fn insert_at_cursor(&mut self, key: K, value: V) -> bool {
        while self.free_shard < self.shards.len()
            && self.shards[self.free_shard].len() >= self.shard_capacity
        {
            self.free_shard += 1;
        }

        if self.free_shard == self.shards.len() {
            tracing::debug!(
                "opening shard {} ({} entries max)",
                self.shards.len(),
                self.shard_capacity
            );
            self.shards
                .push(FastReadIndexedMap::new(self.alloc.clone(), self.initial_capacity));
        }

        let shard_capacity = self.shard_capacity;
        let shard = &mut self.shards[self.free_shard];
        if shard.len() == shard.capacity() {
            let grown = shard.capacity().saturating_mul(2).max(4).min(shard_capacity);
            shard.set_capacity(grown);
        }
        let inserted = shard.try_add(key, value);
        if inserted {
            self.len += 1;
        }
        inserted
    }

    /// Empties every shard, keeping them allocated, and resets the cursor.
    pub fn clear(&mut self) {
        self.shards.iter_mut().for_each(FastReadIndexedMap::clear);
        self.free_shard = 0;
        self.len = 0;
    }

    /// Verifies every shard plus the cross-shard invariants.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::InvariantViolation`] describing the first inconsistency.
    pub fn validate(&self) -> StrataResult<()> {
        let mut seen = HashSet::with_capacity(self.len);
        let mut total = 0;
        for (index, shard) in self.shards.iter().enumerate() {
            shard.validate()?;
            if shard.len() > self.shard_capacity {
                return Err(StrataError::InvariantViolation(format!(
                    "shard {index} holds {} entries, limit {}",
                    shard.len(),
                    self.shard_capacity
                )));
            }
            if !shard.keys().iter().all(|key| seen.insert(*key)) {
                return Err(StrataError::InvariantViolation(format!(
                    "shard {index} repeats a key held by an earlier shard"
                )));
            }
            total += shard.len();
        }
        if total != self.len {
            return Err(StrataError::InvariantViolation(format!(
                "shards hold {total} entries, map counts {}",
                self.len
            )));
        }
        Ok(())
    }

    /// Releases every shard now.
    pub fn dispose(self) {
        drop(self);
    }
}

impl<K, V> ShardedIndexedMap<K, V>
where
    K: MapKey + Send + 'static,
    V: Copy + Send + 'static,
{
    /// Defers releasing every shard until `after` completes.
    #[must_use = "the returned token tracks when the memory is released"]
    pub fn dispose_deferred(self, reclaimer: &Reclaimer, after: DependencyToken) -> DependencyToken {
        DependencyToken::combine(
            self.shards
                .into_iter()
                .map(|shard| shard.dispose_deferred(reclaimer, after.clone()))
                .collect::<Vec<_>>(),
        )
    }
}

impl<K, V> Reusable for ShardedIndexedMap<K, V>
where
    K: MapKey + Send + 'static,
    V: Copy + Send + 'static,
{
    fn reset(&mut self) {
        self.clear();
    }
}

impl<K: MapKey, V: Copy> std::fmt::Debug for ShardedIndexedMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedIndexedMap")
            .field("len", &self.len)
            .field("shards", &self.shards.len())
            .field("shard_capacity", &self.shard_capacity)
            .field("free_shard", &self.free_shard)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_map() -> ShardedIndexedMap<u32, u64> {
        ShardedIndexedMap::with_shard_capacity(AllocHandle::heap(), 4, 2)
    }

    #[test]
    fn test_shard_capacity_from_bytes() {
        let map: ShardedIndexedMap<u32, u64> = ShardedIndexedMap::new(AllocHandle::heap(), 64);
        assert_eq!(map.shard_capacity(), 8);

        let tiny: ShardedIndexedMap<u8, u8> = ShardedIndexedMap::new(AllocHandle::heap(), 0);
        assert_eq!(tiny.shard_capacity(), 1);
    }

    #[test]
    fn test_fills_shards_in_order() {
        let mut map = small_map();
        assert_eq!(map.shard_count(), 0);

        for key in 0..10 {
            assert!(map.try_add(key, u64::from(key) * 2));
        }
        assert_eq!(map.len(), 10);
        assert_eq!(map.shard_count(), 3);
        assert_eq!(map.free_shard_index(), 2);
        assert_eq!(map.shards()[0].len(), 4);
        assert_eq!(map.shards()[2].len(), 2);

        for key in 0..10 {
            assert_eq!(map.try_get_value(&key), Some(u64::from(key) * 2));
        }
        map.validate().unwrap();
    }

    #[test]
    fn test_try_add_refuses_duplicates() {
        let mut map = small_map();
        assert!(map.try_add(1, 10));
        assert!(!map.try_add(1, 20));
        assert_eq!(map.try_get_value(&1), Some(10));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_remove_retreats_cursor() {
        let mut map = small_map();
        for key in 0..9 {
            map.add(key, 0);
        }
        assert_eq!(map.free_shard_index(), 2);

        assert_eq!(map.try_remove(&1), Some(0));
        assert_eq!(map.free_shard_index(), 0);

        map.add(100, 7);
        assert_eq!(map.shards()[0].try_get_value(&100), Some(7));
        assert_eq!(map.shard_count(), 3);
        map.validate().unwrap();
    }

    #[test]
    fn test_add_or_update_in_owning_shard() {
        let mut map = small_map();
        for key in 0..6 {
            map.add(key, 1);
        }
        map.add_or_update(2, 99);
        assert_eq!(map.shards()[0].try_get_value(&2), Some(99));
        assert_eq!(map.len(), 6);

        map.add_or_update(50, 5);
        assert_eq!(map.len(), 7);
        assert_eq!(map.get(&50), Some(&5));
    }

    #[test]
    fn test_cursor_insert_of_present_key_keeps_count() {
        let mut map = small_map();
        map.add(1, 10);
        map.add(2, 20);

        assert!(!map.insert_at_cursor(1, 77));
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&1), Some(&10));
        map.validate().unwrap();
    }

    #[test]
    fn test_clear_keeps_shards() {
        let mut map = small_map();
        for key in 0..8 {
            map.add(key, 0);
        }
        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.shard_count(), 2);
        assert_eq!(map.free_shard_index(), 0);
        assert!(!map.contains(&3));

        for key in 0..8 {
            map.add(key, 1);
        }
        assert_eq!(map.shard_count(), 2);
    }

    #[test]
    fn test_iter_visits_every_entry() {
        let mut map = small_map();
        for key in 0..7 {
            map.add(key, u64::from(key));
        }
        let mut keys: Vec<u32> = map.iter().map(|(k, _)| *k).collect();
        keys.sort_unstable();
        assert_eq!(keys, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn test_deferred_dispose_combines_shards() {
        let (alloc, stats) = AllocHandle::tracking();
        let reclaimer = Reclaimer::new();
        let mut map: ShardedIndexedMap<u32, u32> = ShardedIndexedMap::with_shard_capacity(alloc, 2, 2);
        for key in 0..5 {
            map.add(key, key);
        }
        assert_eq!(map.shard_count(), 3);

        let (readers, after) = DependencyToken::pending();
        let freed = map.dispose_deferred(&reclaimer, after);
        assert!(!freed.is_complete());
        assert!(stats.live_bytes() > 0);

        readers.complete();
        reclaimer.collect();
        assert!(freed.is_complete());
        assert_eq!(stats.live_bytes(), 0);
    }
}
