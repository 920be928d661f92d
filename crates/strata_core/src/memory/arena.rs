//! # Allocator Handles
//!
//! Every container is created against an explicit allocator handle. The
//! handle is cheap to clone and travels with the memory it produced, so a
//! region is always released through the allocator that created it.

// SAFETY: This module wraps the global allocator.
// All unsafe blocks forward caller-checked layouts.
#![allow(unsafe_code)]

use std::alloc::{alloc, dealloc, Layout};
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{StrataError, StrataResult};

/// Source of raw memory regions.
///
/// Regions stay valid until passed back to [`Allocator::deallocate`].
/// Implementations are never asked for zero-sized regions.
pub trait Allocator: Send + Sync {
    /// Allocates a region for `layout`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::AllocationFailed`] if the request cannot be met.
    fn allocate(&self, layout: Layout) -> StrataResult<NonNull<u8>>;

    /// Releases a region.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate` on this allocator with the same `layout`,
    /// and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// Short label used in logs.
    fn name(&self) -> &'static str;
}

/// The process-wide global allocator.
#[derive(Clone, Copy, Debug, Default)]
pub struct Heap;

impl Allocator for Heap {
    fn allocate(&self, layout: Layout) -> StrataResult<NonNull<u8>> {
        debug_assert!(layout.size() > 0, "zero-sized allocation request");
        // SAFETY: layout has non-zero size (callers never ask for empty regions)
        let ptr = unsafe { alloc(layout) };
        NonNull::new(ptr).ok_or(StrataError::AllocationFailed {
            size: layout.size(),
            align: layout.align(),
        })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        dealloc(ptr.as_ptr(), layout);
    }

    fn name(&self) -> &'static str {
        "heap"
    }
}

#[derive(Debug, Default)]
struct Counters {
    live_bytes: AtomicUsize,
    live_allocations: AtomicUsize,
    total_allocations: AtomicUsize,
}

/// Heap allocator that counts what it hands out.
///
/// Used to verify that disposal really releases every region.
#[derive(Clone, Debug, Default)]
pub struct Tracking {
    counters: Arc<Counters>,
}

impl Tracking {
    /// Returns a view on the counters of this allocator.
    #[must_use]
    pub fn stats(&self) -> AllocStats {
        AllocStats {
            counters: Arc::clone(&self.counters),
        }
    }
}

impl Allocator for Tracking {
    fn allocate(&self, layout: Layout) -> StrataResult<NonNull<u8>> {
        let ptr = Heap.allocate(layout)?;
        self.counters
            .live_bytes
            .fetch_add(layout.size(), Ordering::Relaxed);
        self.counters.live_allocations.fetch_add(1, Ordering::Relaxed);
        self.counters
            .total_allocations
            .fetch_add(1, Ordering::Relaxed);
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        Heap.deallocate(ptr, layout);
        self.counters
            .live_bytes
            .fetch_sub(layout.size(), Ordering::Relaxed);
        self.counters.live_allocations.fetch_sub(1, Ordering::Relaxed);
    }

    fn name(&self) -> &'static str {
        "tracking"
    }
}

/// Read-only view of a [`Tracking`] allocator's counters.
#[derive(Clone, Debug)]
pub struct AllocStats {
    counters: Arc<Counters>,
}

impl AllocStats {
    /// Bytes currently allocated and not yet released.
    #[must_use]
    pub fn live_bytes(&self) -> usize {
        self.counters.live_bytes.load(Ordering::Relaxed)
    }

    /// Regions currently allocated and not yet released.
    #[must_use]
    pub fn live_allocations(&self) -> usize {
        self.counters.live_allocations.load(Ordering::Relaxed)
    }

    /// Regions ever allocated.
    #[must_use]
    pub fn total_allocations(&self) -> usize {
        self.counters.total_allocations.load(Ordering::Relaxed)
    }
}

/// Shared handle to an [`Allocator`].
///
/// # Example
///
/// ```rust,ignore
/// let (alloc, stats) = AllocHandle::tracking();
/// let map: FastReadIndexedMap<u32, f32> = FastReadIndexedMap::new(alloc, 64);
/// assert!(stats.live_bytes() > 0);
/// drop(map);
/// assert_eq!(stats.live_bytes(), 0);
/// ```
#[derive(Clone)]
pub struct AllocHandle {
    inner: Arc<dyn Allocator>,
}

impl AllocHandle {
    /// Handle to the global allocator.
    #[must_use]
    pub fn heap() -> Self {
        Self::new(Heap)
    }

    /// Handle to a fresh [`Tracking`] allocator plus its counters.
    #[must_use]
    pub fn tracking() -> (Self, AllocStats) {
        let tracking = Tracking::default();
        let stats = tracking.stats();
        (Self::new(tracking), stats)
    }

    /// Wraps any allocator implementation.
    #[must_use]
    pub fn new<A: Allocator + 'static>(allocator: A) -> Self {
        Self {
            inner: Arc::new(allocator),
        }
    }

    /// Name of the underlying allocator.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.inner.name()
    }

    /// Returns true if both handles share the same allocator instance.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Allocates a region, returning a dangling aligned pointer for empty layouts.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::AllocationFailed`] if the allocator refuses.
    pub fn allocate(&self, layout: Layout) -> StrataResult<NonNull<u8>> {
        if layout.size() == 0 {
            return Ok(dangling(layout.align()));
        }
        self.inner.allocate(layout)
    }

    /// Releases a region obtained from [`AllocHandle::allocate`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate` on a handle sharing this allocator,
    /// with the same `layout`, and must not be used afterwards.
    pub unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() > 0 {
            self.inner.deallocate(ptr, layout);
        }
    }
}

impl Default for AllocHandle {
    fn default() -> Self {
        Self::heap()
    }
}

impl fmt::Debug for AllocHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AllocHandle").field(&self.name()).finish()
    }
}

/// Non-null pointer aligned to `align`, never dereferenced.
pub(crate) fn dangling(align: usize) -> NonNull<u8> {
    NonNull::new(align as *mut u8).unwrap_or(NonNull::dangling())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracking_counts() {
        let (alloc, stats) = AllocHandle::tracking();
        let layout = Layout::from_size_align(128, 16).unwrap();

        let ptr = alloc.allocate(layout).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 16, 0);
        assert_eq!(stats.live_bytes(), 128);
        assert_eq!(stats.live_allocations(), 1);

        unsafe { alloc.deallocate(ptr, layout) };
        assert_eq!(stats.live_bytes(), 0);
        assert_eq!(stats.live_allocations(), 0);
        assert_eq!(stats.total_allocations(), 1);
    }

    #[test]
    fn test_zero_sized_request_skips_allocator() {
        let (alloc, stats) = AllocHandle::tracking();
        let layout = Layout::from_size_align(0, 8).unwrap();

        let ptr = alloc.allocate(layout).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 8, 0);
        assert_eq!(stats.total_allocations(), 0);

        unsafe { alloc.deallocate(ptr, layout) };
        assert_eq!(stats.live_allocations(), 0);
    }

    #[test]
    fn test_handle_identity() {
        let a = AllocHandle::heap();
        let b = a.clone();
        let c = AllocHandle::heap();
        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
        assert_eq!(format!("{a:?}"), "AllocHandle(\"heap\")");
    }
}
