//! # Arena-Backed Dynamic Array
//!
//! A growable array of `Copy` elements living in a region obtained from an
//! explicit [`AllocHandle`]. It is the building block of every column in the
//! indexed maps.
//!
//! - Append is amortized O(1) (geometric growth, minimum 4 slots)
//! - Removal is O(1) via swap-back
//! - Disposal is synchronous (drop) or deferred behind a dependency token

// SAFETY: This module requires unsafe to view the raw region as `[T]`.
// Elements `0..len` are always initialized; the region holds `capacity` slots.
#![allow(unsafe_code)]

use std::fmt;
use std::marker::PhantomData;
use std::mem::{align_of, size_of};
use std::ops::{Deref, DerefMut};

use super::arena::AllocHandle;
use super::buffer::RawBuffer;
use crate::error::StrataResult;
use crate::pool::Reusable;
use crate::sync::{DependencyToken, Reclaimer};

/// Smallest capacity a growing array jumps to.
const MIN_GROWTH: usize = 4;

/// Dynamic array over an explicitly allocated region.
///
/// Element order is only stable until the next [`RawArray::swap_remove`].
///
/// # Example
///
/// ```rust,ignore
/// let mut ids: RawArray<u32> = RawArray::with_capacity(AllocHandle::heap(), 4);
/// ids.push(7);
/// ids.push(9);
/// assert_eq!(ids.swap_remove(0), 7);
/// assert_eq!(&ids[..], &[9]);
/// ```
pub struct RawArray<T: Copy> {
    buffer: RawBuffer,
    len: usize,
    capacity: usize,
    _marker: PhantomData<T>,
}

impl<T: Copy> RawArray<T> {
    /// Creates an empty array. Allocates nothing.
    #[must_use]
    pub fn new(alloc: AllocHandle) -> Self {
        Self {
            buffer: RawBuffer::empty(alloc, align_of::<T>()),
            len: 0,
            capacity: if size_of::<T>() == 0 { usize::MAX } else { 0 },
            _marker: PhantomData,
        }
    }

    /// Creates an array with room for `capacity` elements.
    ///
    /// # Panics
    ///
    /// Panics on capacity overflow; aborts if the allocator fails.
    #[must_use]
    pub fn with_capacity(alloc: AllocHandle, capacity: usize) -> Self {
        let mut array = Self::new(alloc);
        array.set_capacity(capacity);
        array
    }

    /// Fallible [`RawArray::with_capacity`].
    ///
    /// # Errors
    ///
    /// Returns `CapacityOverflow` or `AllocationFailed`.
    pub fn try_with_capacity(alloc: AllocHandle, capacity: usize) -> StrataResult<Self> {
        let mut array = Self::new(alloc);
        array.try_set_capacity(capacity)?;
        Ok(array)
    }

    /// The allocator backing this array.
    #[must_use]
    pub fn allocator(&self) -> &AllocHandle {
        self.buffer.allocator()
    }

    /// Number of initialized elements.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the array holds no elements.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of elements the current region can hold.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Views the initialized elements.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: elements 0..len are initialized and the region is aligned for T
        unsafe { std::slice::from_raw_parts(self.buffer.ptr().cast::<T>(), self.len) }
    }

    /// Views the initialized elements mutably.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: elements 0..len are initialized, and &mut self is exclusive
        unsafe { std::slice::from_raw_parts_mut(self.buffer.ptr().cast::<T>(), self.len) }
    }

    /// Overwrites the element at `index`.
    ///
    /// Returns `false` if `index` is out of bounds.
    #[inline]
    pub fn set(&mut self, index: usize, value: T) -> bool {
        match self.as_mut_slice().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Appends an element, growing the region if needed.
    ///
    /// Returns the index of the new element.
    #[inline]
    pub fn push(&mut self, value: T) -> usize {
        if self.len == self.capacity {
            self.reserve(1);
        }
        // SAFETY: capacity > len after the reserve above
        unsafe { self.write_unchecked(value) }
    }

    /// Appends an element only if no growth is required.
    ///
    /// # Errors
    ///
    /// Gives the value back when the array is full.
    #[inline]
    pub fn push_within_capacity(&mut self, value: T) -> Result<usize, T> {
        if self.len == self.capacity {
            return Err(value);
        }
        // SAFETY: capacity > len checked above
        Ok(unsafe { self.write_unchecked(value) })
    }

    /// # Safety
    ///
    /// `self.len < self.capacity`.
    #[inline]
    unsafe fn write_unchecked(&mut self, value: T) -> usize {
        let index = self.len;
        std::ptr::write(self.buffer.ptr().cast::<T>().add(index), value);
        self.len += 1;
        index
    }

    /// Removes and returns the last element.
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        // SAFETY: index len (old len - 1) was initialized
        Some(unsafe { std::ptr::read(self.buffer.ptr().cast::<T>().add(self.len)) })
    }

    /// Removes the element at `index` by moving the last element into its slot.
    ///
    /// O(1). Order of the remaining elements is not preserved.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    #[inline]
    pub fn swap_remove(&mut self, index: usize) -> T {
        assert!(
            index < self.len,
            "swap_remove index {index} out of bounds for length {}",
            self.len
        );
        let last = self.len - 1;
        let slice = self.as_mut_slice();
        let removed = slice[index];
        slice[index] = slice[last];
        self.len = last;
        removed
    }

    /// Shortens the array to `len` elements. No effect if already shorter.
    #[inline]
    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }

    /// Removes every element, keeping the region.
    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Appends every element of `values` with a single copy.
    pub fn extend_from_slice(&mut self, values: &[T]) {
        self.reserve(values.len());
        // SAFETY: reserve guarantees room for values.len() more elements;
        // `values` cannot alias our region because &mut self is exclusive.
        unsafe {
            std::ptr::copy_nonoverlapping(
                values.as_ptr(),
                self.buffer.ptr().cast::<T>().add(self.len),
                values.len(),
            );
        }
        self.len += values.len();
    }

    /// Ensures room for `additional` more elements, growing geometrically.
    ///
    /// # Panics
    ///
    /// Panics on capacity overflow; aborts if the allocator fails.
    pub fn reserve(&mut self, additional: usize) {
        let required = self
            .len
            .checked_add(additional)
            .unwrap_or_else(|| panic!("capacity overflow reserving {additional} elements"));
        if required <= self.capacity {
            return;
        }
        let grown = self.capacity.saturating_mul(2).max(required).max(MIN_GROWTH);
        tracing::debug!(
            "growing {} array from {} to {} elements",
            std::any::type_name::<T>(),
            self.capacity,
            grown
        );
        self.set_capacity(grown);
    }

    /// Fallible [`RawArray::reserve`].
    ///
    /// # Errors
    ///
    /// Returns `CapacityOverflow` or `AllocationFailed`.
    pub fn try_reserve(&mut self, additional: usize) -> StrataResult<()> {
        let required = self.len.saturating_add(additional);
        if required <= self.capacity {
            return Ok(());
        }
        let grown = self.capacity.saturating_mul(2).max(required).max(MIN_GROWTH);
        self.try_set_capacity(grown)
    }

    /// Moves to a region of exactly `capacity` slots (never below `len`).
    ///
    /// # Panics
    ///
    /// Panics on capacity overflow; aborts if the allocator fails.
    pub fn set_capacity(&mut self, capacity: usize) {
        if size_of::<T>() == 0 {
            return;
        }
        let capacity = capacity.max(self.len);
        self.buffer
            .resize(size_of::<T>(), capacity, self.len * size_of::<T>());
        self.capacity = capacity;
    }

    /// Fallible [`RawArray::set_capacity`].
    ///
    /// # Errors
    ///
    /// Returns `CapacityOverflow` or `AllocationFailed`.
    pub fn try_set_capacity(&mut self, capacity: usize) -> StrataResult<()> {
        if size_of::<T>() == 0 {
            return Ok(());
        }
        let capacity = capacity.max(self.len);
        self.buffer
            .try_resize(size_of::<T>(), capacity, self.len * size_of::<T>())?;
        self.capacity = capacity;
        Ok(())
    }

    /// Releases the region now. The caller holds the only handle.
    pub fn dispose(self) {
        drop(self);
    }
}

impl<T: Copy + Send + 'static> RawArray<T> {
    /// Hands the region to `reclaimer`, to be released once `after` completes.
    ///
    /// The returned token completes when the memory has been released.
    #[must_use = "the returned token tracks when the memory is released"]
    pub fn dispose_deferred(self, reclaimer: &Reclaimer, after: DependencyToken) -> DependencyToken {
        reclaimer.defer(after, self)
    }
}

impl<T: Copy> Deref for RawArray<T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T: Copy> DerefMut for RawArray<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T: Copy + fmt::Debug> fmt::Debug for RawArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

impl<T: Copy + Send + 'static> Reusable for RawArray<T> {
    fn reset(&mut self) {
        self.clear();
    }
}

// SAFETY: RawArray owns its elements like Vec<T> does.
unsafe impl<T: Copy + Send> Send for RawArray<T> {}
// SAFETY: shared access only yields &[T].
unsafe impl<T: Copy + Sync> Sync for RawArray<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_grow() {
        let mut array: RawArray<u64> = RawArray::new(AllocHandle::heap());
        assert_eq!(array.capacity(), 0);

        for i in 0..10 {
            assert_eq!(array.push(i), i as usize);
        }
        assert_eq!(array.len(), 10);
        assert!(array.capacity() >= 10);
        assert_eq!(array[9], 9);
    }

    #[test]
    fn test_swap_remove_moves_last() {
        let mut array = RawArray::with_capacity(AllocHandle::heap(), 4);
        array.extend_from_slice(&[10, 20, 30, 40]);

        assert_eq!(array.swap_remove(1), 20);
        assert_eq!(array.as_slice(), &[10, 40, 30]);

        assert_eq!(array.swap_remove(2), 30);
        assert_eq!(array.as_slice(), &[10, 40]);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_swap_remove_out_of_bounds() {
        let mut array: RawArray<u8> = RawArray::new(AllocHandle::heap());
        array.swap_remove(0);
    }

    #[test]
    fn test_push_within_capacity() {
        let mut array = RawArray::with_capacity(AllocHandle::heap(), 1);
        assert_eq!(array.push_within_capacity(1u16), Ok(0));
        assert_eq!(array.push_within_capacity(2u16), Err(2));
    }

    #[test]
    fn test_set_capacity_never_below_len() {
        let mut array = RawArray::with_capacity(AllocHandle::heap(), 8);
        array.extend_from_slice(&[1u32, 2, 3]);
        array.set_capacity(1);
        assert_eq!(array.capacity(), 3);
        assert_eq!(array.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_drop_releases_memory() {
        let (alloc, stats) = AllocHandle::tracking();
        let mut array = RawArray::with_capacity(alloc, 16);
        array.push(1.5f32);
        assert_eq!(stats.live_bytes(), 64);

        array.dispose();
        assert_eq!(stats.live_bytes(), 0);
    }

    #[test]
    fn test_zero_sized_elements() {
        let mut array: RawArray<()> = RawArray::new(AllocHandle::heap());
        array.push(());
        array.push(());
        assert_eq!(array.len(), 2);
        array.swap_remove(0);
        assert_eq!(array.len(), 1);
    }
}
