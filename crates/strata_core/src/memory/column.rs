//! # Columns
//!
//! A column is a contiguous buffer plus the stride of its elements.
//!
//! [`ColumnDescriptor`] records what a column stores. [`ErasedColumn`] is a
//! column whose element type is only known at runtime: every typed access
//! states the type it expects and is checked against the descriptor before
//! any byte is reinterpreted.

// SAFETY: This module reads and writes stride-sized byte ranges of an owned region.
// Ranges are always bounded by `len * stride`.
#![allow(unsafe_code)]

use std::any::{type_name, TypeId};
use std::mem::{align_of, size_of};

use bytemuck::Pod;

use super::arena::AllocHandle;
use super::buffer::RawBuffer;
use crate::error::{StrataError, StrataResult};
use crate::pool::Reusable;
use crate::sync::{DependencyToken, Reclaimer};

/// Element layout and identity of one column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ColumnDescriptor {
    size: usize,
    align: usize,
    type_id: TypeId,
    type_name: &'static str,
}

impl ColumnDescriptor {
    /// Descriptor for a column of `T`.
    #[must_use]
    pub fn of<T: 'static>() -> Self {
        Self {
            size: size_of::<T>(),
            align: align_of::<T>(),
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    /// Bytes between consecutive elements.
    #[inline]
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.size
    }

    /// Alignment of every element.
    #[inline]
    #[must_use]
    pub const fn align(&self) -> usize {
        self.align
    }

    /// Name of the element type.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns true if the column stores exactly `T`.
    #[must_use]
    pub fn holds<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Checks that `T` has this column's stride and fits its alignment.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::StrideMismatch`] otherwise.
    pub fn check_stride<T: 'static>(&self) -> StrataResult<()> {
        if size_of::<T>() == self.size && self.align % align_of::<T>() == 0 {
            Ok(())
        } else {
            Err(self.mismatch::<T>())
        }
    }

    /// Checks that the column stores exactly `T`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::StrideMismatch`] otherwise.
    pub fn check_type<T: 'static>(&self) -> StrataResult<()> {
        if self.holds::<T>() {
            Ok(())
        } else {
            Err(self.mismatch::<T>())
        }
    }

    fn mismatch<T: 'static>(&self) -> StrataError {
        StrataError::StrideMismatch {
            column: self.type_name,
            requested: type_name::<T>(),
            expected: self.size,
            actual: size_of::<T>(),
        }
    }
}

/// Type-erased column: a byte buffer addressed by stride.
///
/// # Example
///
/// ```rust,ignore
/// let mut column = ErasedColumn::new(AllocHandle::heap(), ColumnDescriptor::of::<u32>(), 8);
/// column.push(7u32)?;
/// assert_eq!(column.get::<u32>(0)?, Some(7));
/// assert!(column.get::<u64>(0).is_err()); // wrong stride
/// ```
pub struct ErasedColumn {
    buffer: RawBuffer,
    descriptor: ColumnDescriptor,
    len: usize,
    capacity: usize,
}

impl ErasedColumn {
    /// Creates a column with room for `capacity` elements.
    ///
    /// # Panics
    ///
    /// Panics on capacity overflow; aborts if the allocator fails.
    #[must_use]
    pub fn new(alloc: AllocHandle, descriptor: ColumnDescriptor, capacity: usize) -> Self {
        let mut column = Self {
            buffer: RawBuffer::empty(alloc, descriptor.align),
            descriptor,
            len: 0,
            capacity: 0,
        };
        column.set_capacity(capacity);
        column
    }

    /// Creates a column for elements of `T`.
    #[must_use]
    pub fn of<T: Pod>(alloc: AllocHandle, capacity: usize) -> Self {
        Self::new(alloc, ColumnDescriptor::of::<T>(), capacity)
    }

    /// What this column stores.
    #[inline]
    #[must_use]
    pub const fn descriptor(&self) -> &ColumnDescriptor {
        &self.descriptor
    }

    /// Number of elements.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the column holds no elements.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of elements the region can hold.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Raw bytes of every element, `len * stride` long.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        // SAFETY: the first len * stride bytes were written by push/set
        unsafe { std::slice::from_raw_parts(self.buffer.ptr(), self.len * self.descriptor.size) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as in `bytes`, and &mut self is exclusive
        unsafe {
            std::slice::from_raw_parts_mut(self.buffer.ptr(), self.len * self.descriptor.size)
        }
    }

    /// Raw bytes of the element at `slot`.
    #[must_use]
    pub fn slot_bytes(&self, slot: usize) -> Option<&[u8]> {
        if slot >= self.len {
            return None;
        }
        let stride = self.descriptor.size;
        Some(&self.bytes()[slot * stride..(slot + 1) * stride])
    }

    /// Appends one element given as raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::StrideMismatch`] if `bytes` is not exactly one stride long.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> StrataResult<usize> {
        if bytes.len() != self.descriptor.size {
            return Err(StrataError::StrideMismatch {
                column: self.descriptor.type_name,
                requested: "[u8]",
                expected: self.descriptor.size,
                actual: bytes.len(),
            });
        }
        if self.len == self.capacity {
            self.reserve(1);
        }
        let slot = self.len;
        let stride = self.descriptor.size;
        // SAFETY: capacity > len, so slot * stride + stride fits in the region
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.buffer.ptr().add(slot * stride),
                stride,
            );
        }
        self.len += 1;
        Ok(slot)
    }

    /// Appends one element of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::StrideMismatch`] if `T` does not fit the column.
    pub fn push<T: Pod>(&mut self, value: T) -> StrataResult<usize> {
        self.descriptor.check_stride::<T>()?;
        self.push_bytes(bytemuck::bytes_of(&value))
    }

    /// Reads the element at `slot` as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::StrideMismatch`] if `T` does not fit the column.
    pub fn get<T: Pod>(&self, slot: usize) -> StrataResult<Option<T>> {
        self.descriptor.check_stride::<T>()?;
        Ok(self.slot_bytes(slot).map(bytemuck::pod_read_unaligned))
    }

    /// Overwrites the element at `slot`. Returns `false` if out of bounds.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::StrideMismatch`] if `T` does not fit the column.
    pub fn set<T: Pod>(&mut self, slot: usize, value: T) -> StrataResult<bool> {
        self.descriptor.check_stride::<T>()?;
        if slot >= self.len {
            return Ok(false);
        }
        let stride = self.descriptor.size;
        self.bytes_mut()[slot * stride..(slot + 1) * stride]
            .copy_from_slice(bytemuck::bytes_of(&value));
        Ok(true)
    }

    /// Views every element as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::StrideMismatch`] if `T` does not fit the column.
    pub fn as_slice<T: Pod>(&self) -> StrataResult<&[T]> {
        self.descriptor.check_stride::<T>()?;
        bytemuck::try_cast_slice(self.bytes()).map_err(|_| self.descriptor.mismatch::<T>())
    }

    /// Views every element as mutable `T`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::StrideMismatch`] if `T` does not fit the column.
    pub fn as_mut_slice<T: Pod>(&mut self) -> StrataResult<&mut [T]> {
        self.descriptor.check_stride::<T>()?;
        let descriptor = self.descriptor;
        bytemuck::try_cast_slice_mut(self.bytes_mut()).map_err(|_| descriptor.mismatch::<T>())
    }

    /// Removes the element at `slot` by moving the last element into it.
    ///
    /// # Panics
    ///
    /// Panics if `slot >= len`.
    pub fn swap_remove(&mut self, slot: usize) {
        assert!(
            slot < self.len,
            "swap_remove slot {slot} out of bounds for length {}",
            self.len
        );
        let last = self.len - 1;
        if slot != last {
            let stride = self.descriptor.size;
            self.bytes_mut()
                .copy_within(last * stride..(last + 1) * stride, slot * stride);
        }
        self.len = last;
    }

    /// Removes every element, keeping the region.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Ensures room for `additional` more elements, growing geometrically.
    pub fn reserve(&mut self, additional: usize) {
        let required = self.len.saturating_add(additional);
        if required <= self.capacity {
            return;
        }
        let grown = self.capacity.saturating_mul(2).max(required).max(4);
        tracing::debug!(
            "growing erased `{}` column from {} to {} elements",
            self.descriptor.type_name,
            self.capacity,
            grown
        );
        self.set_capacity(grown);
    }

    /// Moves to a region of exactly `capacity` slots (never below `len`).
    pub fn set_capacity(&mut self, capacity: usize) {
        let stride = self.descriptor.size;
        let capacity = capacity.max(self.len);
        if stride == 0 {
            self.capacity = usize::MAX;
            return;
        }
        self.buffer.resize(stride, capacity, self.len * stride);
        self.capacity = capacity;
    }

    /// Releases the region now.
    pub fn dispose(self) {
        drop(self);
    }

    /// Hands the region to `reclaimer`, to be released once `after` completes.
    #[must_use = "the returned token tracks when the memory is released"]
    pub fn dispose_deferred(self, reclaimer: &Reclaimer, after: DependencyToken) -> DependencyToken {
        reclaimer.defer(after, self)
    }
}

impl std::fmt::Debug for ErasedColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErasedColumn")
            .field("type", &self.descriptor.type_name)
            .field("stride", &self.descriptor.size)
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl Reusable for ErasedColumn {
    fn reset(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_checks() {
        let descriptor = ColumnDescriptor::of::<u32>();
        assert_eq!(descriptor.stride(), 4);
        assert!(descriptor.holds::<u32>());
        assert!(descriptor.check_stride::<f32>().is_ok());
        assert!(descriptor.check_type::<f32>().is_err());

        let err = descriptor.check_stride::<u64>().unwrap_err();
        assert_eq!(
            err,
            StrataError::StrideMismatch {
                column: "u32",
                requested: "u64",
                expected: 4,
                actual: 8,
            }
        );
    }

    #[test]
    fn test_push_get_set() {
        let mut column = ErasedColumn::of::<u32>(AllocHandle::heap(), 2);
        assert_eq!(column.push(10u32).unwrap(), 0);
        assert_eq!(column.push(20u32).unwrap(), 1);
        assert_eq!(column.push(30u32).unwrap(), 2);

        assert_eq!(column.get::<u32>(1).unwrap(), Some(20));
        assert_eq!(column.get::<u32>(3).unwrap(), None);
        assert!(column.set(1, 21u32).unwrap());
        assert_eq!(column.as_slice::<u32>().unwrap(), &[10, 21, 30]);
    }

    #[test]
    fn test_wrong_stride_rejected() {
        let mut column = ErasedColumn::of::<u16>(AllocHandle::heap(), 4);
        assert!(column.push(1u64).is_err());
        assert!(column.push_bytes(&[1, 2, 3]).is_err());
        assert!(column.push_bytes(&[1, 0]).is_ok());
        assert!(column.get::<u32>(0).is_err());
        assert_eq!(column.len(), 1);
    }

    #[test]
    fn test_swap_remove() {
        let mut column = ErasedColumn::of::<[u8; 3]>(AllocHandle::heap(), 4);
        column.push([1u8, 1, 1]).unwrap();
        column.push([2u8, 2, 2]).unwrap();
        column.push([3u8, 3, 3]).unwrap();

        column.swap_remove(0);
        assert_eq!(column.len(), 2);
        assert_eq!(column.get::<[u8; 3]>(0).unwrap(), Some([3, 3, 3]));
        assert_eq!(column.slot_bytes(1), Some(&[2u8, 2, 2][..]));
    }

    #[test]
    fn test_mutable_view() {
        let mut column = ErasedColumn::of::<f32>(AllocHandle::heap(), 4);
        column.push(1.0f32).unwrap();
        column.push(2.0f32).unwrap();
        for value in column.as_mut_slice::<f32>().unwrap() {
            *value *= 2.0;
        }
        assert_eq!(column.as_slice::<f32>().unwrap(), &[2.0, 4.0]);
    }
}
