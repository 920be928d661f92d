//! # Fast-Read Indexed Map
//!
//! Single-value keyed container stored as a structure of arrays:
//!
//! ```text
//! keys:   [K0, K1, K2, K3]      <- dense, slot = position
//! values: [V0, V1, V2, V3]      <- same length, same slots
//! index:  {K0:0, K1:1, K2:2, K3:3}
//! ```
//!
//! Reads are one hash lookup plus one indexed load. Values can also be
//! scanned linearly as a plain slice.
//!
//! ## Removal
//!
//! Removing `K1` moves the last entry into slot 1:
//!
//! ```text
//! keys:   [K0, K3, K2]
//! values: [V0, V3, V2]
//! index:  {K0:0, K3:1, K2:2}
//! ```
//!
//! O(1), but iteration order is unspecified after any removal.

use hashbrown::hash_map::Entry;
use hashbrown::HashMap;

use super::MapKey;
use crate::config::ContainerConfig;
use crate::error::{StrataError, StrataResult};
use crate::memory::{AllocHandle, RawArray};
use crate::pool::Reusable;
use crate::sync::{DependencyToken, Reclaimer};

/// Keyed container with parallel key and value arrays.
///
/// # Example
///
/// ```rust,ignore
/// let mut map: FastReadIndexedMap<u32, f32> = FastReadIndexedMap::new(AllocHandle::heap(), 4);
/// map.add_or_update(7, 1.5);
/// assert_eq!(map.try_get_value(&7), Some(1.5));
/// assert_eq!(map.try_remove(&7), Some(1.5));
/// assert!(!map.contains(&7));
/// ```
pub struct FastReadIndexedMap<K: MapKey, V: Copy> {
    keys: RawArray<K>,
    values: RawArray<V>,
    index: HashMap<K, usize>,
}

impl<K: MapKey, V: Copy> FastReadIndexedMap<K, V> {
    /// Creates a map with room for `capacity` entries.
    #[must_use]
    pub fn new(alloc: AllocHandle, capacity: usize) -> Self {
        Self {
            keys: RawArray::with_capacity(alloc.clone(), capacity),
            values: RawArray::with_capacity(alloc, capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Creates a map sized by `config.initial_capacity`.
    #[must_use]
    pub fn from_config(alloc: AllocHandle, config: &ContainerConfig) -> Self {
        Self::new(alloc, config.initial_capacity)
    }

    /// Number of entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if the map holds no entries.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Entries the map can hold before its arrays grow.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.keys.capacity().min(self.values.capacity())
    }

    /// Keys in slot order.
    #[inline]
    #[must_use]
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Values in slot order.
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[V] {
        &self.values
    }

    /// Values in slot order, mutable. Keys stay fixed.
    #[inline]
    pub fn values_mut(&mut self) -> &mut [V] {
        &mut self.values
    }

    /// Iterates `(key, value)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.keys.iter().zip(self.values.iter())
    }

    /// Slot currently holding `key`.
    #[inline]
    #[must_use]
    pub fn slot_of(&self, key: &K) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// Returns true if `key` is present.
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Copies out the value stored under `key`.
    #[inline]
    #[must_use]
    pub fn try_get_value(&self, key: &K) -> Option<V> {
        self.get(key).copied()
    }

    /// Borrows the value stored under `key`.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        let slot = *self.index.get(key)?;
        self.values.get(slot)
    }

    /// Mutably borrows the value stored under `key`.
    #[inline]
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let slot = *self.index.get(key)?;
        self.values.get_mut(slot)
    }

    /// Inserts `value` under `key`, overwriting in place if present.
    pub fn add_or_update(&mut self, key: K, value: V) {
        match self.index.entry(key) {
            Entry::Occupied(entry) => {
                self.values[*entry.get()] = value;
            }
            Entry::Vacant(entry) => {
                let slot = self.keys.push(key);
                self.values.push(value);
                entry.insert(slot);
            }
        }
        self.debug_check_lengths();
    }

    /// Inserts `value` under `key` only if the key is absent.
    ///
    /// Returns `false` (leaving the stored value intact) if it was present.
    pub fn try_add(&mut self, key: K, value: V) -> bool {
        let Entry::Vacant(entry) = self.index.entry(key) else {
            return false;
        };
        let slot = self.keys.push(key);
        self.values.push(value);
        entry.insert(slot);
        self.debug_check_lengths();
        true
    }

    /// Removes `key`, returning its value.
    ///
    /// The last entry moves into the freed slot.
    pub fn try_remove(&mut self, key: &K) -> Option<V> {
        let slot = self.index.remove(key)?;
        self.keys.swap_remove(slot);
        let value = self.values.swap_remove(slot);

        // A different key now lives in `slot` unless we removed the last one.
        if let Some(moved) = self.keys.get(slot) {
            if let Some(moved_slot) = self.index.get_mut(moved) {
                *moved_slot = slot;
            }
        }
        self.debug_check_lengths();
        Some(value)
    }

    /// Bulk upsert from parallel key/value slices.
    ///
    /// A key already present is removed first and then appended, so it ends up
    /// in a new slot.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::LengthMismatch`] if the slices differ in length;
    /// nothing is inserted in that case.
    pub fn add_range(&mut self, keys: &[K], values: &[V]) -> StrataResult<()> {
        check_lengths(keys.len(), values.len())?;
        self.reserve(keys.len());
        for (key, value) in keys.iter().zip(values) {
            if self.index.contains_key(key) {
                self.try_remove(key);
            }
            let slot = self.keys.push(*key);
            self.values.push(*value);
            self.index.insert_unique_unchecked(*key, slot);
        }
        self.debug_check_lengths();
        Ok(())
    }

    /// Bulk load into an empty map, validating the precondition.
    ///
    /// # Errors
    ///
    /// - [`StrataError::LengthMismatch`] if the slices differ in length
    /// - [`StrataError::NotEmpty`] if the map holds entries
    /// - [`StrataError::DuplicateKey`] if a key repeats; the map is left empty
    pub fn add_range_from_zero(&mut self, keys: &[K], values: &[V]) -> StrataResult<()> {
        check_lengths(keys.len(), values.len())?;
        if !self.is_empty() {
            return Err(StrataError::NotEmpty { len: self.len() });
        }
        self.keys.extend_from_slice(keys);
        self.values.extend_from_slice(values);
        self.index.reserve(keys.len());
        for (slot, key) in keys.iter().enumerate() {
            if self.index.insert(*key, slot).is_some() {
                self.clear();
                return Err(StrataError::DuplicateKey { position: slot });
            }
        }
        Ok(())
    }

    /// Bulk load into an empty map without checking anything.
    ///
    /// Keys and values are copied with one block copy each and index entries
    /// are inserted without probing for existing keys.
    ///
    /// Preconditions: the map is empty, `keys.len() == values.len()`, and
    /// `keys` holds no duplicates. Violating them leaves the map in an
    /// unspecified (memory-safe) state; checked builds abort instead.
    pub fn add_range_from_zero_unchecked(&mut self, keys: &[K], values: &[V]) {
        debug_assert!(self.is_empty(), "bulk load into a non-empty map");
        debug_assert_eq!(keys.len(), values.len(), "parallel input length mismatch");

        self.keys.extend_from_slice(keys);
        self.values.extend_from_slice(values);
        self.index.reserve(keys.len());
        for (slot, key) in keys.iter().enumerate() {
            self.index.insert_unique_unchecked(*key, slot);
        }
        debug_assert_eq!(self.index.len(), self.keys.len(), "duplicate key in bulk load");
    }

    /// Removes every entry, keeping the allocated arrays.
    pub fn clear(&mut self) {
        self.keys.clear();
        self.values.clear();
        self.index.clear();
    }

    /// Ensures room for `additional` more entries.
    pub fn reserve(&mut self, additional: usize) {
        self.keys.reserve(additional);
        self.values.reserve(additional);
        self.index.reserve(additional);
    }

    /// Moves both arrays to regions of exactly `capacity` slots (never below `len`).
    pub fn set_capacity(&mut self, capacity: usize) {
        self.keys.set_capacity(capacity);
        self.values.set_capacity(capacity);
        self.index.reserve(capacity.saturating_sub(self.index.len()));
    }

    /// Verifies the cross-array invariants.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::InvariantViolation`] describing the first inconsistency.
    pub fn validate(&self) -> StrataResult<()> {
        if self.keys.len() != self.values.len() {
            return Err(StrataError::InvariantViolation(format!(
                "{} keys but {} values",
                self.keys.len(),
                self.values.len()
            )));
        }
        if self.index.len() != self.keys.len() {
            return Err(StrataError::InvariantViolation(format!(
                "{} index entries for {} keys",
                self.index.len(),
                self.keys.len()
            )));
        }
        for (slot, key) in self.keys.iter().enumerate() {
            if self.index.get(key) != Some(&slot) {
                return Err(StrataError::InvariantViolation(format!(
                    "key at slot {slot} is indexed at {:?}",
                    self.index.get(key)
                )));
            }
        }
        Ok(())
    }

    /// Releases every array now.
    pub fn dispose(self) {
        drop(self);
    }

    #[inline]
    fn debug_check_lengths(&self) {
        debug_assert_eq!(self.keys.len(), self.values.len(), "key/value length mismatch");
        debug_assert_eq!(self.index.len(), self.keys.len(), "index/key length mismatch");
    }
}

impl<K, V> FastReadIndexedMap<K, V>
where
    K: MapKey + Send + 'static,
    V: Copy + Send + 'static,
{
    /// Defers releasing every array until `after` completes.
    ///
    /// One disposal per array; the returned token joins all of them.
    #[must_use = "the returned token tracks when the memory is released"]
    pub fn dispose_deferred(self, reclaimer: &Reclaimer, after: DependencyToken) -> DependencyToken {
        let Self {
            keys,
            values,
            index,
        } = self;
        DependencyToken::combine([
            keys.dispose_deferred(reclaimer, after.clone()),
            values.dispose_deferred(reclaimer, after.clone()),
            reclaimer.defer(after, index),
        ])
    }
}

impl<K, V> Reusable for FastReadIndexedMap<K, V>
where
    K: MapKey + Send + 'static,
    V: Copy + Send + 'static,
{
    fn reset(&mut self) {
        self.clear();
    }
}

impl<K: MapKey + std::fmt::Debug, V: Copy + std::fmt::Debug> std::fmt::Debug
    for FastReadIndexedMap<K, V>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

pub(crate) fn check_lengths(keys: usize, values: usize) -> StrataResult<()> {
    if keys == values {
        Ok(())
    } else {
        Err(StrataError::LengthMismatch { keys, values })
    }
}
