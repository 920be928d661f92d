//! # Per-Key List Pool
//!
//! Maps an external key (an emitter, a chunk, a connection) to a pooled list
//! for the duration of one processing cycle:
//!
//! ```text
//! cycle n:   get_or_create_collection(k) ──► list from pool, filled
//! cycle end: recycle_spawn_data_buffers() ──► every list reset + queued
//! cycle n+1: get_or_create_collection(k) ──► same allocations reused
//! ```

use hashbrown::HashMap;

use super::{ContainerPool, PoolHandle, Reusable};
use crate::collections::MapKey;
use crate::memory::{AllocHandle, ColumnDescriptor, ErasedColumn, RawArray};
use crate::sync::{DependencyToken, Reclaimer};

/// Keyed view over a [`ContainerPool`] of lists.
pub struct PerKeyListPool<K: MapKey, L: Reusable> {
    pool: ContainerPool<L>,
    lists: HashMap<K, PoolHandle>,
}

impl<K: MapKey, L: Reusable> PerKeyListPool<K, L> {
    /// Creates a pool that builds lists with `factory`.
    #[must_use]
    pub fn new<F>(factory: F) -> Self
    where
        F: FnMut() -> L + Send + 'static,
    {
        Self::from_pool(ContainerPool::new(factory))
    }

    /// Wraps an existing container pool.
    #[must_use]
    pub fn from_pool(pool: ContainerPool<L>) -> Self {
        Self {
            pool,
            lists: HashMap::new(),
        }
    }

    /// The list registered under `key`, borrowing one from the pool if absent.
    pub fn get_or_create_collection(&mut self, key: K) -> &mut L {
        let handle = *self
            .lists
            .entry(key)
            .or_insert_with(|| self.pool.get_or_create());
        self.pool.instance_mut(handle)
    }

    /// The list registered under `key`.
    #[must_use]
    pub fn get_collection(&self, key: &K) -> Option<&L> {
        let handle = *self.lists.get(key)?;
        Some(self.pool.instance(handle))
    }

    /// The list registered under `key`, mutably.
    pub fn get_collection_mut(&mut self, key: &K) -> Option<&mut L> {
        let handle = *self.lists.get(key)?;
        Some(self.pool.instance_mut(handle))
    }

    /// Returns true if a list is registered under `key`.
    #[inline]
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.lists.contains_key(key)
    }

    /// Resets every registered list, returns it to the pool, and forgets
    /// every key. Returns the number of lists recycled.
    pub fn recycle_spawn_data_buffers(&mut self) -> usize {
        let count = self.lists.len();
        for (_, handle) in self.lists.drain() {
            self.pool.recycle(handle);
        }
        count
    }

    /// Returns the list registered under `key` to the pool.
    pub fn remove_collection(&mut self, key: &K) -> bool {
        match self.lists.remove(key) {
            Some(handle) => {
                self.pool.recycle(handle);
                true
            }
            None => false,
        }
    }

    /// Number of registered keys.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    /// Returns true if no key holds a list.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Registered keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.lists.keys()
    }

    /// The backing container pool.
    #[inline]
    #[must_use]
    pub fn pool(&self) -> &ContainerPool<L> {
        &self.pool
    }

    /// Frees every list, registered or queued.
    pub fn dispose(self) {
        drop(self);
    }

    /// Defers freeing every list until `after` completes.
    #[must_use = "the returned token tracks when the memory is released"]
    pub fn dispose_deferred(self, reclaimer: &Reclaimer, after: DependencyToken) -> DependencyToken {
        self.pool.dispose_deferred(reclaimer, after)
    }
}

impl<K: MapKey, T: Copy + Send + 'static> PerKeyListPool<K, RawArray<T>> {
    /// Pool of typed arrays, each starting with room for `capacity` elements.
    #[must_use]
    pub fn with_arrays(alloc: AllocHandle, capacity: usize) -> Self {
        Self::new(move || RawArray::with_capacity(alloc.clone(), capacity))
    }
}

impl<K: MapKey> PerKeyListPool<K, ErasedColumn> {
    /// Pool of type-erased columns laid out by `descriptor`.
    #[must_use]
    pub fn with_columns(alloc: AllocHandle, descriptor: ColumnDescriptor, capacity: usize) -> Self {
        Self::new(move || ErasedColumn::new(alloc.clone(), descriptor, capacity))
    }
}

impl<K: MapKey, L: Reusable> std::fmt::Debug for PerKeyListPool<K, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerKeyListPool")
            .field("keys", &self.lists.len())
            .field("pool", &self.pool)
            .finish()
    }
}
