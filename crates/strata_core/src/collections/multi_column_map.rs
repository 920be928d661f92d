//! # Multi-Column Indexed Map
//!
//! N typed columns sharing one key array and one index:
//!
//! ```text
//! keys:     [K0,  K1,  K2 ]
//! column 0: [i0,  i1,  i2 ]   i32
//! column 1: [f0,  f1,  f2 ]   f32
//! column 2: [b0,  b1,  b2 ]   bool
//! index:    {K0:0, K1:1, K2:2}
//! ```
//!
//! Rows go in and out as tuples; columns come out as plain slices for
//! linear scans. Column access by number names the element type it expects,
//! and a wrong guess is an error instead of reinterpreted memory.

use std::any::Any;

use hashbrown::hash_map::Entry;
use hashbrown::HashMap;

use super::fast_read_map::check_lengths;
use super::MapKey;
use crate::config::ContainerConfig;
use crate::error::{StrataError, StrataResult};
use crate::memory::{AllocHandle, ColumnDescriptor, RawArray};
use crate::pool::Reusable;
use crate::sync::{DependencyToken, Reclaimer};

/// A tuple of column element types, stored as one [`RawArray`] per column.
///
/// Implemented for tuples of one to six `Copy + Send + 'static` types.
pub trait ColumnSet: Copy + Send + 'static {
    /// One array per column.
    type Storage: Send + 'static;

    /// Number of columns.
    const COUNT: usize;

    /// Allocates every column with room for `capacity` rows.
    fn allocate(alloc: &AllocHandle, capacity: usize) -> Self::Storage;

    /// Descriptor of column `column`.
    fn descriptor(column: usize) -> Option<ColumnDescriptor>;

    /// Appends one row across every column.
    fn push(storage: &mut Self::Storage, row: Self);

    /// Overwrites one row across every column.
    fn write(storage: &mut Self::Storage, slot: usize, row: Self);

    /// Reads one row across every column.
    fn read(storage: &Self::Storage, slot: usize) -> Self;

    /// Swap-back removes one row across every column.
    fn swap_remove(storage: &mut Self::Storage, slot: usize) -> Self;

    /// Length of column `column`.
    fn column_len(storage: &Self::Storage, column: usize) -> Option<usize>;

    /// Column `column` as `&RawArray<T>` behind `Any`.
    fn column(storage: &Self::Storage, column: usize) -> Option<&dyn Any>;

    /// Column `column` as `&mut RawArray<T>` behind `Any`.
    fn column_mut(storage: &mut Self::Storage, column: usize) -> Option<&mut dyn Any>;

    /// Ensures room for `additional` more rows in every column.
    fn reserve(storage: &mut Self::Storage, additional: usize);

    /// Empties every column.
    fn clear(storage: &mut Self::Storage);

    /// Defers releasing every column; returns the joined token.
    fn dispose_deferred(
        storage: Self::Storage,
        reclaimer: &Reclaimer,
        after: &DependencyToken,
    ) -> DependencyToken;
}

macro_rules! impl_column_set {
    ($count:literal => $($ty:ident : $idx:tt),+) => {
        impl<$($ty),+> ColumnSet for ($($ty,)+)
        where
            $($ty: Copy + Send + 'static,)+
        {
            type Storage = ($(RawArray<$ty>,)+);

            const COUNT: usize = $count;

            fn allocate(alloc: &AllocHandle, capacity: usize) -> Self::Storage {
                ($(RawArray::<$ty>::with_capacity(alloc.clone(), capacity),)+)
            }

            fn descriptor(column: usize) -> Option<ColumnDescriptor> {
                match column {
                    $($idx => Some(ColumnDescriptor::of::<$ty>()),)+
                    _ => None,
                }
            }

            #[inline]
            fn push(storage: &mut Self::Storage, row: Self) {
                $(storage.$idx.push(row.$idx);)+
            }

            #[inline]
            fn write(storage: &mut Self::Storage, slot: usize, row: Self) {
                $(storage.$idx[slot] = row.$idx;)+
            }

            #[inline]
            fn read(storage: &Self::Storage, slot: usize) -> Self {
                ($(storage.$idx[slot],)+)
            }

            #[inline]
            fn swap_remove(storage: &mut Self::Storage, slot: usize) -> Self {
                ($(storage.$idx.swap_remove(slot),)+)
            }

            fn column_len(storage: &Self::Storage, column: usize) -> Option<usize> {
                match column {
                    $($idx => Some(storage.$idx.len()),)+
                    _ => None,
                }
            }

            fn column(storage: &Self::Storage, column: usize) -> Option<&dyn Any> {
                match column {
                    $($idx => Some(&storage.$idx as &dyn Any),)+
                    _ => None,
                }
            }

            fn column_mut(storage: &mut Self::Storage, column: usize) -> Option<&mut dyn Any> {
                match column {
                    $($idx => Some(&mut storage.$idx as &mut dyn Any),)+
                    _ => None,
                }
            }

            fn reserve(storage: &mut Self::Storage, additional: usize) {
                $(storage.$idx.reserve(additional);)+
            }

            fn clear(storage: &mut Self::Storage) {
                $(storage.$idx.clear();)+
            }

            fn dispose_deferred(
                storage: Self::Storage,
                reclaimer: &Reclaimer,
                after: &DependencyToken,
            ) -> DependencyToken {
                DependencyToken::combine([
                    $(storage.$idx.dispose_deferred(reclaimer, after.clone()),)+
                ])
            }
        }
    };
}

impl_column_set!(1 => A: 0);
impl_column_set!(2 => A: 0, B: 1);
impl_column_set!(3 => A: 0, B: 1, C: 2);
impl_column_set!(4 => A: 0, B: 1, C: 2, D: 3);
impl_column_set!(5 => A: 0, B: 1, C: 2, D: 3, E: 4);
impl_column_set!(6 => A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);

/// Keyed container with N parallel typed columns.
///
/// # Example
///
/// ```rust,ignore
/// let mut map: MultiColumnIndexedMap<u32, (i32, f32, bool)> =
///     MultiColumnIndexedMap::new(AllocHandle::heap(), 16);
/// map.add_or_update(5, (10, 1.5, true));
/// assert_eq!(map.column::<i32>(0)?, &[10]);
/// assert!(map.column::<u64>(0).is_err());
/// ```
pub struct MultiColumnIndexedMap<K: MapKey, C: ColumnSet> {
    keys: RawArray<K>,
    columns: C::Storage,
    index: HashMap<K, usize>,
}

impl<K: MapKey, C: ColumnSet> MultiColumnIndexedMap<K, C> {
    /// Creates a map with room for `capacity` rows.
    #[must_use]
    pub fn new(alloc: AllocHandle, capacity: usize) -> Self {
        Self {
            columns: C::allocate(&alloc, capacity),
            keys: RawArray::with_capacity(alloc, capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Creates a map sized by `config.initial_capacity`.
    #[must_use]
    pub fn from_config(alloc: AllocHandle, config: &ContainerConfig) -> Self {
        Self::new(alloc, config.initial_capacity)
    }

    /// Number of rows.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if the map holds no rows.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Rows the key array can hold without growing.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.keys.capacity()
    }

    /// Number of columns.
    #[inline]
    #[must_use]
    pub const fn column_count(&self) -> usize {
        C::COUNT
    }

    /// Keys in slot order.
    #[inline]
    #[must_use]
    pub fn keys(&self) -> &[K] {
        &self.keys
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

    /// Copies out the row stored under `key`.
    #[must_use]
    pub fn try_get_value(&self, key: &K) -> Option<C> {
        let slot = *self.index.get(key)?;
        Some(C::read(&self.columns, slot))
    }

    /// Inserts `row` under `key`, overwriting every column in place if present.
    pub fn add_or_update(&mut self, key: K, row: C) {
        match self.index.entry(key) {
            Entry::Occupied(entry) => C::write(&mut self.columns, *entry.get(), row),
            Entry::Vacant(entry) => {
                let slot = self.keys.push(key);
                C::push(&mut self.columns, row);
                entry.insert(slot);
            }
        }
        self.debug_check_lengths();
    }

    /// Inserts `row` under `key` only if the key is absent.
    pub fn try_add(&mut self, key: K, row: C) -> bool {
        let Entry::Vacant(entry) = self.index.entry(key) else {
            return false;
        };
        let slot = self.keys.push(key);
        C::push(&mut self.columns, row);
        entry.insert(slot);
        self.debug_check_lengths();
        true
    }

    /// Removes `key`, returning its row. The last row moves into the freed slot.
    pub fn try_remove(&mut self, key: &K) -> Option<C> {
        let slot = self.index.remove(key)?;
        self.keys.swap_remove(slot);
        let row = C::swap_remove(&mut self.columns, slot);

        if let Some(moved) = self.keys.get(slot) {
            if let Some(moved_slot) = self.index.get_mut(moved) {
                *moved_slot = slot;
            }
        }
        self.debug_check_lengths();
        Some(row)
    }

    /// Bulk upsert; a present key is removed, then appended.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::LengthMismatch`] if the slices differ in length.
    pub fn add_range(&mut self, keys: &[K], rows: &[C]) -> StrataResult<()> {
        check_lengths(keys.len(), rows.len())?;
        self.reserve(keys.len());
        for (key, row) in keys.iter().zip(rows) {
            if self.index.contains_key(key) {
                self.try_remove(key);
            }
            let slot = self.keys.push(*key);
            C::push(&mut self.columns, *row);
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
    /// - [`StrataError::NotEmpty`] if the map holds rows
    /// - [`StrataError::DuplicateKey`] if a key repeats; the map is left empty
    pub fn add_range_from_zero(&mut self, keys: &[K], rows: &[C]) -> StrataResult<()> {
        check_lengths(keys.len(), rows.len())?;
        if !self.is_empty() {
            return Err(StrataError::NotEmpty { len: self.len() });
        }
        self.reserve(keys.len());
        self.keys.extend_from_slice(keys);
        for (slot, (key, row)) in keys.iter().zip(rows).enumerate() {
            C::push(&mut self.columns, *row);
            if self.index.insert(*key, slot).is_some() {
                self.clear();
                return Err(StrataError::DuplicateKey { position: slot });
            }
        }
        Ok(())
    }

    /// Bulk load into an empty map without checking anything.
    ///
    /// Preconditions: the map is empty, the slices have equal length, and
    /// `keys` holds no duplicates. Violating them leaves the map in an
    /// unspecified (memory-safe) state; checked builds abort instead.
    pub fn add_range_from_zero_unchecked(&mut self, keys: &[K], rows: &[C]) {
        debug_assert!(self.is_empty(), "bulk load into a non-empty map");
        debug_assert_eq!(keys.len(), rows.len(), "parallel input length mismatch");

        self.reserve(keys.len());
        self.keys.extend_from_slice(keys);
        for (slot, (key, row)) in keys.iter().zip(rows).enumerate() {
            C::push(&mut self.columns, *row);
            self.index.insert_unique_unchecked(*key, slot);
        }
        debug_assert_eq!(self.index.len(), self.keys.len(), "duplicate key in bulk load");
    }

    /// Descriptor of column `column`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::ColumnOutOfRange`] for a column past the last.
    pub fn column_descriptor(&self, column: usize) -> StrataResult<ColumnDescriptor> {
        C::descriptor(column).ok_or(StrataError::ColumnOutOfRange {
            index: column,
            count: C::COUNT,
        })
    }

    /// Views column `column` as a slice of `T`.
    ///
    /// # Errors
    ///
    /// - [`StrataError::ColumnOutOfRange`] for a column past the last
    /// - [`StrataError::StrideMismatch`] if the column does not store `T`
    pub fn column<T: Copy + 'static>(&self, column: usize) -> StrataResult<&[T]> {
        self.column_descriptor(column)?.check_type::<T>()?;
        C::column(&self.columns, column)
            .and_then(|array| array.downcast_ref::<RawArray<T>>())
            .map(RawArray::as_slice)
            .ok_or_else(|| storage_disagrees(column))
    }

    /// Views column `column` as a mutable slice of `T`.
    ///
    /// # Errors
    ///
    /// Same as [`MultiColumnIndexedMap::column`].
    pub fn column_mut<T: Copy + 'static>(&mut self, column: usize) -> StrataResult<&mut [T]> {
        self.column_descriptor(column)?.check_type::<T>()?;
        C::column_mut(&mut self.columns, column)
            .and_then(|array| array.downcast_mut::<RawArray<T>>())
            .map(RawArray::as_mut_slice)
            .ok_or_else(|| storage_disagrees(column))
    }

    /// Reads one cell: column `column` of the row stored under `key`.
    ///
    /// # Errors
    ///
    /// Same as [`MultiColumnIndexedMap::column`].
    pub fn get_in_column<T: Copy + 'static>(&self, column: usize, key: &K) -> StrataResult<Option<T>> {
        let values = self.column::<T>(column)?;
        Ok(self.slot_of(key).and_then(|slot| values.get(slot).copied()))
    }

    /// Overwrites one cell. Returns `false` if `key` is absent.
    ///
    /// # Errors
    ///
    /// Same as [`MultiColumnIndexedMap::column`].
    pub fn set_in_column<T: Copy + 'static>(
        &mut self,
        column: usize,
        key: &K,
        value: T,
    ) -> StrataResult<bool> {
        let slot = self.slot_of(key);
        let values = self.column_mut::<T>(column)?;
        match slot.and_then(|slot| values.get_mut(slot)) {
            Some(cell) => {
                *cell = value;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Removes every row, keeping the allocated columns.
    pub fn clear(&mut self) {
        self.keys.clear();
        C::clear(&mut self.columns);
        self.index.clear();
    }

    /// Ensures room for `additional` more rows.
    pub fn reserve(&mut self, additional: usize) {
        self.keys.reserve(additional);
        C::reserve(&mut self.columns, additional);
        self.index.reserve(additional);
    }

    /// Verifies the cross-array invariants.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::InvariantViolation`] describing the first inconsistency.
    pub fn validate(&self) -> StrataResult<()> {
        for column in 0..C::COUNT {
            let len = C::column_len(&self.columns, column).unwrap_or(0);
            if len != self.keys.len() {
                return Err(StrataError::InvariantViolation(format!(
                    "column {column} holds {len} rows for {} keys",
                    self.keys.len()
                )));
            }
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
        if cfg!(debug_assertions) {
            for column in 0..C::COUNT {
                debug_assert_eq!(
                    C::column_len(&self.columns, column),
                    Some(self.keys.len()),
                    "column {column} length mismatch"
                );
            }
            debug_assert_eq!(self.index.len(), self.keys.len(), "index/key length mismatch");
        }
    }
}

impl<K, C> MultiColumnIndexedMap<K, C>
where
    K: MapKey + Send + 'static,
    C: ColumnSet,
{
    /// Defers releasing the key array, every column, and the index until
    /// `after` completes. The returned token joins all of them.
    #[must_use = "the returned token tracks when the memory is released"]
    pub fn dispose_deferred(self, reclaimer: &Reclaimer, after: DependencyToken) -> DependencyToken {
        let Self {
            keys,
            columns,
            index,
        } = self;
        DependencyToken::combine([
            keys.dispose_deferred(reclaimer, after.clone()),
            C::dispose_deferred(columns, reclaimer, &after),
            reclaimer.defer(after, index),
        ])
    }
}

impl<K, C> Reusable for MultiColumnIndexedMap<K, C>
where
    K: MapKey + Send + 'static,
    C: ColumnSet,
{
    fn reset(&mut self) {
        self.clear();
    }
}

fn storage_disagrees(column: usize) -> StrataError {
    StrataError::InvariantViolation(format!(
        "column {column} storage does not match its descriptor"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    type Stats = (i32, f32, bool);

    fn stats_map() -> MultiColumnIndexedMap<u32, Stats> {
        MultiColumnIndexedMap::new(AllocHandle::heap(), 4)
    }

    #[test]
    fn test_update_path_overwrites_every_column() {
        let mut map = stats_map();
        map.add_or_update(5, (10, 1.5, true));
        map.add_or_update(5, (20, 2.5, false));

        assert_eq!(map.len(), 1);
        assert_eq!(map.column::<i32>(0).unwrap(), &[20]);
        assert_eq!(map.column::<f32>(1).unwrap(), &[2.5]);
        assert_eq!(map.column::<bool>(2).unwrap(), &[false]);
        map.validate().unwrap();
    }

    #[test]
    fn test_round_trip_per_column() {
        let mut map = stats_map();
        map.add_or_update(1, (1, 0.5, true));
        map.add_or_update(2, (2, 1.5, false));

        assert_eq!(map.try_get_value(&2), Some((2, 1.5, false)));
        assert_eq!(map.get_in_column::<i32>(0, &1).unwrap(), Some(1));
        assert_eq!(map.get_in_column::<f32>(1, &2).unwrap(), Some(1.5));
        assert_eq!(map.get_in_column::<bool>(2, &9).unwrap(), None);
    }

    #[test]
    fn test_wrong_column_type_rejected() {
        let map = stats_map();
        let err = map.column::<u32>(0).unwrap_err();
        assert!(matches!(
            err,
            StrataError::StrideMismatch {
                expected: 4,
                actual: 4,
                ..
            }
        ));
        assert!(matches!(
            map.column::<u64>(1),
            Err(StrataError::StrideMismatch { expected: 4, actual: 8, .. })
        ));
        assert_eq!(
            map.column::<i32>(3).unwrap_err(),
            StrataError::ColumnOutOfRange { index: 3, count: 3 }
        );
    }

    #[test]
    fn test_remove_keeps_columns_aligned() {
        let mut map = stats_map();
        for key in 0..4 {
            map.add_or_update(key, (key as i32 * 10, key as f32, key % 2 == 0));
        }

        assert_eq!(map.try_remove(&0), Some((0, 0.0, true)));
        assert_eq!(map.len(), 3);
        assert_eq!(map.slot_of(&3), Some(0));
        assert_eq!(map.try_get_value(&3), Some((30, 3.0, false)));
        assert_eq!(map.column::<i32>(0).unwrap()[0], 30);
        map.validate().unwrap();
    }

    #[test]
    fn test_set_in_column() {
        let mut map = stats_map();
        map.add_or_update(7, (1, 1.0, false));
        assert!(map.set_in_column(2, &7, true).unwrap());
        assert!(!map.set_in_column(2, &8, true).unwrap());
        assert!(map.set_in_column(2, &7, 1u8).is_err());
        assert_eq!(map.try_get_value(&7), Some((1, 1.0, true)));
    }

    #[test]
    fn test_bulk_loads() {
        let mut map = stats_map();
        let keys = [1, 2, 3];
        let rows = [(1, 1.0, true), (2, 2.0, false), (3, 3.0, true)];
        map.add_range_from_zero(&keys, &rows).unwrap();
        assert_eq!(map.len(), 3);

        map.add_range(&[2, 4], &[(22, 2.2, true), (4, 4.0, false)]).unwrap();
        assert_eq!(map.len(), 4);
        assert_eq!(map.try_get_value(&2), Some((22, 2.2, true)));
        map.validate().unwrap();

        assert_eq!(
            map.add_range_from_zero(&keys, &rows).unwrap_err(),
            StrataError::NotEmpty { len: 4 }
        );

        let mut fresh = stats_map();
        fresh.add_range_from_zero_unchecked(&keys, &rows);
        assert_eq!(fresh.column::<i32>(0).unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn test_duplicate_bulk_load_leaves_map_empty() {
        let mut map: MultiColumnIndexedMap<u8, (u16,)> =
            MultiColumnIndexedMap::new(AllocHandle::heap(), 2);
        let err = map.add_range_from_zero(&[1, 1], &[(1,), (2,)]).unwrap_err();
        assert_eq!(err, StrataError::DuplicateKey { position: 1 });
        assert!(map.is_empty());
        map.validate().unwrap();
    }

    #[test]
    fn test_column_mut_scan() {
        let mut map: MultiColumnIndexedMap<u32, (f32, f32)> =
            MultiColumnIndexedMap::new(AllocHandle::heap(), 8);
        for key in 0..8 {
            map.add_or_update(key, (key as f32, 1.0));
        }
        for x in map.column_mut::<f32>(0).unwrap() {
            *x += 0.5;
        }
        assert_eq!(map.try_get_value(&3), Some((3.5, 1.0)));
        assert_eq!(map.column_count(), 2);
    }

    #[test]
    fn test_deferred_dispose_joins_every_column() {
        let (alloc, stats) = AllocHandle::tracking();
        let reclaimer = Reclaimer::new();
        let map: MultiColumnIndexedMap<u32, Stats> = MultiColumnIndexedMap::new(alloc, 8);
        assert_eq!(stats.live_allocations(), 4);

        let (readers, after) = DependencyToken::pending();
        let freed = map.dispose_deferred(&reclaimer, after);
        assert_eq!(reclaimer.pending_count(), 5);

        readers.complete();
        reclaimer.collect();
        assert!(freed.is_complete());
        assert_eq!(stats.live_bytes(), 0);
    }
}
