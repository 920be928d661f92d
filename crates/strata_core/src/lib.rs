//! # STRATA Core
//!
//! Structure-of-arrays keyed containers with explicit memory management:
//! - Dense parallel columns, scanned as plain slices
//! - Hash index from key to slot, O(1) swap-back removal
//! - Memory from an explicit allocator handle, released synchronously or
//!   deferred behind a dependency token
//! - Pools that recycle whole containers between processing cycles
//!
//! ## Architecture Rules
//!
//! 1. **Every column has the same length** - after every mutation
//! 2. **No holes** - slots are always `[0, len)`
//! 3. **No hidden frees** - a region a worker may still read is released
//!    only once its token completes
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_core::{AllocHandle, FastReadIndexedMap, Reclaimer, DependencyToken};
//!
//! let mut map: FastReadIndexedMap<u32, f32> = FastReadIndexedMap::new(AllocHandle::heap(), 1024);
//! map.add_or_update(7, 1.5);
//!
//! let reclaimer = Reclaimer::new();
//! let (source, readers_done) = DependencyToken::pending();
//! let freed = map.dispose_deferred(&reclaimer, readers_done);
//! source.complete();
//! reclaimer.collect();
//! assert!(freed.is_complete());
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod collections;
pub mod config;
pub mod error;
pub mod memory;
pub mod pool;
pub mod sync;

pub use collections::{ColumnSet, FastReadIndexedMap, MapKey, MultiColumnIndexedMap, ShardedIndexedMap};
pub use config::ContainerConfig;
pub use error::{StrataError, StrataResult};
pub use memory::{AllocHandle, AllocStats, Allocator, ColumnDescriptor, ErasedColumn, RawArray};
pub use pool::{ContainerPool, InstanceState, PerKeyListPool, PoolHandle, Reusable};
pub use sync::{DependencyToken, Reclaimer, TokenSource};
