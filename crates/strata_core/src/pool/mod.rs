//! # Container Pools
//!
//! Reuse of whole containers between processing cycles.
//!
//! ## Lifecycle
//!
//! ```text
//!            get_or_create            release
//!   (factory) ──────────► InUse ───────────────► Free ──┐
//!                           ▲                           │
//!                           └───────── get_or_create ───┘
//!
//!   pool.dispose() / dispose_deferred(): every instance, free or not
//! ```
//!
//! - Instances are created on demand (or up front via `pre_allocate`)
//! - Released instances are reset and queued FIFO
//! - A handle from another pool, or to a free instance, is rejected in
//!   checked builds (`debug_assertions` or feature `checked`)

mod container_pool;
mod per_key_list_pool;

pub use container_pool::{ContainerPool, InstanceState, PoolHandle};
pub use per_key_list_pool::PerKeyListPool;

/// A container that can be emptied for reuse.
///
/// `reset` must leave the container as if freshly created, apart from
/// allocated capacity.
pub trait Reusable: Send + 'static {
    /// Empties the container, keeping its allocation.
    fn reset(&mut self);
}

impl<T: Send + 'static> Reusable for Vec<T> {
    fn reset(&mut self) {
        self.clear();
    }
}
