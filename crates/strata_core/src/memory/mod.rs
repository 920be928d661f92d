//! # Memory Management
//!
//! Explicit allocators, arena-backed arrays and stride-addressed columns.
//!
//! ## Design Philosophy
//!
//! Every region is obtained from an explicit allocator handle and released
//! through the same handle:
//! - No hidden allocations behind a container's back
//! - No garbage collection
//! - Release is either synchronous (drop) or deferred behind a token

mod arena;
mod buffer;
mod column;
mod raw_array;

pub use arena::{AllocHandle, AllocStats, Allocator, Heap, Tracking};
pub use column::{ColumnDescriptor, ErasedColumn};
pub use raw_array::RawArray;
