//! # Container Pool
//!
//! Free-list pool of reusable containers.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use super::Reusable;
use crate::config::ContainerConfig;
use crate::error::{StrataError, StrataResult};
use crate::sync::{DependencyToken, Reclaimer};

/// Source of pool ids; a handle carries the id of the pool that issued it.
static NEXT_POOL_ID: AtomicU32 = AtomicU32::new(1);

/// Names one instance handed out by a [`ContainerPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PoolHandle {
    pool: u32,
    index: u32,
}

impl PoolHandle {
    /// Id of the issuing pool.
    #[inline]
    #[must_use]
    pub const fn pool_id(&self) -> u32 {
        self.pool
    }

    /// Registry index of the instance.
    #[inline]
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }
}

/// Whether a registered instance is handed out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceState {
    /// Queued for reuse.
    Free,
    /// Handed out; owned by the caller until released.
    InUse,
}

type Factory<T> = Box<dyn FnMut() -> T + Send>;

/// A pool of containers reused across processing cycles.
///
/// Every instance the pool ever created stays registered until the pool is
/// disposed, so disposing the pool frees borrowed instances as well.
///
/// # Thread Safety
///
/// Single mutator. Wrap in a mutex to share.
///
/// # Example
///
/// ```rust,ignore
/// let mut pool = ContainerPool::new(|| RawArray::<u32>::with_capacity(AllocHandle::heap(), 64));
/// let handle = pool.get_or_create();
/// pool.get_mut(handle)?.push(7);
/// pool.release(handle)?;               // reset + queued
/// let again = pool.get_or_create();    // same instance, now empty
/// ```
pub struct ContainerPool<T> {
    id: u32,
    registry: Vec<T>,
    states: Vec<InstanceState>,
    free: VecDeque<u32>,
    factory: Factory<T>,
}

impl<T: Reusable> ContainerPool<T> {
    /// Creates an empty pool that builds instances with `factory`.
    #[must_use]
    pub fn new<F>(factory: F) -> Self
    where
        F: FnMut() -> T + Send + 'static,
    {
        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("created container pool {}", id);
        Self {
            id,
            registry: Vec::new(),
            states: Vec::new(),
            free: VecDeque::new(),
            factory: Box::new(factory),
        }
    }

    /// Creates a pool and pre-allocates `config.pool_preallocate` instances.
    #[must_use]
    pub fn with_config<F>(factory: F, config: &ContainerConfig) -> Self
    where
        F: FnMut() -> T + Send + 'static,
    {
        let mut pool = Self::new(factory);
        pool.pre_allocate(config.pool_preallocate);
        pool
    }

    /// Id carried by every handle this pool issues.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Eagerly creates `count` free instances.
    pub fn pre_allocate(&mut self, count: usize) {
        self.registry.reserve(count);
        self.states.reserve(count);
        self.free.reserve(count);
        for _ in 0..count {
            let index = self.register(InstanceState::Free);
            self.free.push_back(index);
        }
    }

    /// Hands out a free instance, creating one if the queue is empty.
    pub fn get_or_create(&mut self) -> PoolHandle {
        let index = match self.free.pop_front() {
            Some(index) => {
                self.states[index as usize] = InstanceState::InUse;
                index
            }
            None => self.register(InstanceState::InUse),
        };
        PoolHandle {
            pool: self.id,
            index,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn register(&mut self, state: InstanceState) -> u32 {
        // Registry indices fit in u32: each entry is a whole container.
        let index = self.registry.len() as u32;
        self.registry.push((self.factory)());
        self.states.push(state);
        tracing::debug!("pool {} created instance {}", self.id, index);
        index
    }

    fn check_in_use(&self, handle: PoolHandle) -> StrataResult<usize> {
        let index = handle.index as usize;
        if handle.pool != self.id || index >= self.registry.len() {
            return Err(StrataError::ForeignInstance {
                pool: self.id,
                index: handle.index,
            });
        }
        match self.states[index] {
            InstanceState::InUse => Ok(index),
            InstanceState::Free => Err(StrataError::NotInUse {
                index: handle.index,
            }),
        }
    }

    /// Borrows a handed-out instance.
    ///
    /// # Errors
    ///
    /// - [`StrataError::ForeignInstance`] if this pool did not issue `handle`
    /// - [`StrataError::NotInUse`] if the instance was released
    pub fn get(&self, handle: PoolHandle) -> StrataResult<&T> {
        let index = self.check_in_use(handle)?;
        Ok(&self.registry[index])
    }

    /// Mutably borrows a handed-out instance.
    ///
    /// # Errors
    ///
    /// Same as [`ContainerPool::get`].
    pub fn get_mut(&mut self, handle: PoolHandle) -> StrataResult<&mut T> {
        let index = self.check_in_use(handle)?;
        Ok(&mut self.registry[index])
    }

    /// Resets a handed-out instance and queues it for reuse.
    ///
    /// Checked builds (`debug_assertions` or feature `checked`) verify that
    /// this pool issued `handle` and that the instance is in use; release
    /// builds skip the check and only refuse indices past the registry.
    ///
    /// # Errors
    ///
    /// - [`StrataError::ForeignInstance`] for a handle from another pool
    /// - [`StrataError::NotInUse`] for a double release
    pub fn release(&mut self, handle: PoolHandle) -> StrataResult<()> {
        #[cfg(any(debug_assertions, feature = "checked"))]
        if let Err(err) = self.check_in_use(handle) {
            tracing::warn!("rejected return to pool {}: {}", self.id, err);
            return Err(err);
        }

        if handle.index as usize >= self.registry.len() {
            return Err(StrataError::ForeignInstance {
                pool: self.id,
                index: handle.index,
            });
        }
        self.recycle(handle);
        Ok(())
    }

    /// Resets and queues an instance this crate knows to be in use.
    pub(crate) fn recycle(&mut self, handle: PoolHandle) {
        let index = handle.index as usize;
        self.registry[index].reset();
        self.states[index] = InstanceState::Free;
        self.free.push_back(handle.index);
    }

    /// Instance behind a handle this crate issued and still holds.
    pub(crate) fn instance(&self, handle: PoolHandle) -> &T {
        &self.registry[handle.index as usize]
    }

    /// Mutable instance behind a handle this crate issued and still holds.
    pub(crate) fn instance_mut(&mut self, handle: PoolHandle) -> &mut T {
        &mut self.registry[handle.index as usize]
    }

    /// State of the instance behind `handle`, or `None` for a foreign handle.
    #[must_use]
    pub fn state(&self, handle: PoolHandle) -> Option<InstanceState> {
        if handle.pool != self.id {
            return None;
        }
        self.states.get(handle.index as usize).copied()
    }

    /// Number of instances ever created.
    #[inline]
    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of instances waiting in the free queue.
    #[inline]
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Number of instances handed out.
    #[must_use]
    pub fn in_use_count(&self) -> usize {
        self.states
            .iter()
            .filter(|state| **state == InstanceState::InUse)
            .count()
    }

    /// Frees every registered instance, handed out or not.
    pub fn dispose(self) {
        drop(self);
    }

    /// Defers freeing every registered instance and the pool's bookkeeping
    /// until `after` completes. The returned token joins all of them.
    #[must_use = "the returned token tracks when the memory is released"]
    pub fn dispose_deferred(self, reclaimer: &Reclaimer, after: DependencyToken) -> DependencyToken {
        let Self {
            id,
            registry,
            states,
            free,
            factory,
        } = self;
        tracing::trace!("deferring disposal of pool {} ({} instances)", id, registry.len());

        let mut tokens: Vec<DependencyToken> = registry
            .into_iter()
            .map(|instance| reclaimer.defer(after.clone(), instance))
            .collect();
        tokens.push(reclaimer.defer(after, (states, free, factory)));
        DependencyToken::combine(tokens)
    }
}

impl<T> fmt::Debug for ContainerPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerPool")
            .field("id", &self.id)
            .field("registered", &self.registry.len())
            .field("free", &self.free.len())
            .finish_non_exhaustive()
    }
}
