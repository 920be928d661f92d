//! Untyped owned region, the common backing of typed and erased arrays.

// SAFETY: This module owns raw allocations.
// Every pointer it hands out stays inside the region it allocated.
#![allow(unsafe_code)]

use std::alloc::{handle_alloc_error, Layout};
use std::ptr::NonNull;

use super::arena::{dangling, AllocHandle};
use crate::error::{StrataError, StrataResult};

/// An owned, aligned byte region released through its allocator on drop.
pub(crate) struct RawBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
    alloc: AllocHandle,
}

impl RawBuffer {
    /// Empty region with the given alignment. Allocates nothing.
    pub(crate) fn empty(alloc: AllocHandle, align: usize) -> Self {
        Self {
            ptr: dangling(align),
            // An empty layout with a power-of-two alignment is always valid;
            // `align` comes from `align_of` or a column descriptor.
            layout: Layout::from_size_align(0, align).unwrap_or(Layout::new::<()>()),
            alloc,
        }
    }

    #[cfg(test)]
    /// Region of `elements * stride` bytes.
    pub(crate) fn try_with_elements(
        alloc: AllocHandle,
        stride: usize,
        align: usize,
        elements: usize,
    ) -> StrataResult<Self> {
        let mut buffer = Self::empty(alloc, align);
        buffer.try_resize(stride, elements, 0)?;
        Ok(buffer)
    }

    #[inline]
    pub(crate) fn ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[cfg(test)]
    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.layout.size()
    }

    #[cfg(test)]
    #[inline]
    pub(crate) fn align(&self) -> usize {
        self.layout.align()
    }

    pub(crate) fn allocator(&self) -> &AllocHandle {
        &self.alloc
    }

    /// Moves to a region of `elements * stride` bytes, keeping the first
    /// `keep_bytes` bytes of content.
    pub(crate) fn try_resize(
        &mut self,
        stride: usize,
        elements: usize,
        keep_bytes: usize,
    ) -> StrataResult<()> {
        let size = stride
            .checked_mul(elements)
            .filter(|size| *size <= isize::MAX as usize)
            .ok_or(StrataError::CapacityOverflow {
                requested: elements,
                stride,
            })?;
        let new_layout = Layout::from_size_align(size, self.layout.align()).map_err(|_| {
            StrataError::CapacityOverflow {
                requested: elements,
                stride,
            }
        })?;
        if new_layout.size() == self.layout.size() {
            return Ok(());
        }

        let new_ptr = self.alloc.allocate(new_layout)?;
        let keep = keep_bytes.min(new_layout.size()).min(self.layout.size());

        // SAFETY: both regions are live, distinct, and at least `keep` bytes long
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr.as_ptr(), new_ptr.as_ptr(), keep);
            self.alloc.deallocate(self.ptr, self.layout);
        }

        self.ptr = new_ptr;
        self.layout = new_layout;
        Ok(())
    }

    /// Infallible [`RawBuffer::try_resize`]; allocation failure aborts.
    pub(crate) fn resize(&mut self, stride: usize, elements: usize, keep_bytes: usize) {
        if let Err(err) = self.try_resize(stride, elements, keep_bytes) {
            match err {
                StrataError::AllocationFailed { size, align } => {
                    match Layout::from_size_align(size, align) {
                        Ok(layout) => handle_alloc_error(layout),
                        Err(_) => panic!("{err}"),
                    }
                }
                other => panic!("{other}"),
            }
        }
    }
}

impl Drop for RawBuffer {
    fn drop(&mut self) {
        // SAFETY: the region was allocated by `self.alloc` with `self.layout`
        unsafe {
            self.alloc.deallocate(self.ptr, self.layout);
        }
    }
}

// SAFETY: RawBuffer exclusively owns its region; the allocator handle is Send + Sync.
unsafe impl Send for RawBuffer {}
// SAFETY: shared access only hands out `*mut u8` to owners that enforce borrowing.
unsafe impl Sync for RawBuffer {}
