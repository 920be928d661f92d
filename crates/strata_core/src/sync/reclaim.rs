//! # Deferred Reclamation
//!
//! Memory handed to the [`Reclaimer`] is released only after the dependency
//! it was deferred behind has completed. Each deferral returns a token that
//! completes once that memory is gone, so a caller can chain "free this, then
//! reuse the allocator" without ever touching a region a reader may still see.
//!
//! ```text
//!   container.dispose_deferred(&reclaimer, readers_done)
//!        │
//!        ▼
//!   ┌────────────────────────┐  collect(): readers_done complete?
//!   │ pending: [payload, ..] │ ─────────────────────────────────► drop payload
//!   └────────────────────────┘                                   complete token
//! ```
//!
//! There is no cancellation: once deferred, a payload is unreachable.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::token::{DependencyToken, TokenSource};

/// One deferred payload.
struct PendingDisposal {
    after: DependencyToken,
    payload: Box<dyn Send>,
    done: TokenSource,
}

impl PendingDisposal {
    /// Drops the payload first, then completes the token.
    fn release(self) {
        let Self { payload, done, .. } = self;
        drop(payload);
        done.complete();
    }
}

/// Queue of payloads waiting for their dependencies.
///
/// Driven by the caller: [`Reclaimer::collect`] once per processing cycle,
/// [`Reclaimer::flush`] at shutdown. Dropping the reclaimer flushes it.
#[derive(Default)]
pub struct Reclaimer {
    pending: Mutex<Vec<PendingDisposal>>,
    released: AtomicUsize,
}

impl Reclaimer {
    /// Creates an empty reclaimer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defers dropping `payload` until `after` completes.
    ///
    /// If `after` is already complete the payload is dropped immediately and
    /// a completed token is returned.
    pub fn defer<P: Send + 'static>(&self, after: DependencyToken, payload: P) -> DependencyToken {
        if after.is_complete() {
            drop(payload);
            self.released.fetch_add(1, Ordering::Relaxed);
            return DependencyToken::completed();
        }

        let (done, token) = DependencyToken::pending();
        self.pending.lock().push(PendingDisposal {
            after,
            payload: Box::new(payload),
            done,
        });
        tracing::trace!("deferred disposal of {}", std::any::type_name::<P>());
        token
    }

    /// Number of payloads still waiting.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Number of payloads released so far.
    #[must_use]
    pub fn released_count(&self) -> usize {
        self.released.load(Ordering::Relaxed)
    }

    /// Releases every payload whose dependency has completed.
    ///
    /// Returns the number of payloads released.
    pub fn collect(&self) -> usize {
        let ready = {
            let mut pending = self.pending.lock();
            let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut *pending)
                .into_iter()
                .partition(|disposal| disposal.after.is_complete());
            *pending = waiting;
            ready
        };
        self.release_all(ready)
    }

    /// Releases every payload, blocking on dependencies that are still open.
    ///
    /// Works in passes: each pass releases whatever is ready, and only a pass
    /// that leaves entries behind waits, on the oldest one. The queue stays in
    /// deferral order, and a deferral can only depend on tokens that existed
    /// before it, so the oldest entry never waits on another queued entry.
    /// Disposals chained behind each other are therefore released in order.
    ///
    /// Returns the number of payloads released.
    pub fn flush(&self) -> usize {
        let mut released = 0;
        loop {
            released += self.collect();
            let oldest = match self.pending.lock().first() {
                Some(disposal) => disposal.after.clone(),
                None => return released,
            };
            oldest.wait();
        }
    }

    fn release_all(&self, disposals: Vec<PendingDisposal>) -> usize {
        let count = disposals.len();
        if count == 0 {
            return 0;
        }
        disposals.into_iter().for_each(PendingDisposal::release);
        self.released.fetch_add(count, Ordering::Relaxed);
        tracing::trace!("released {} deferred disposals", count);
        count
    }
}

impl Drop for Reclaimer {
    fn drop(&mut self) {
        let remaining = self.pending.get_mut().len();
        if remaining > 0 {
            tracing::debug!("reclaimer dropped with {} pending disposals, flushing", remaining);
            self.flush();
        }
    }
}

impl std::fmt::Debug for Reclaimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reclaimer")
            .field("pending", &self.pending_count())
            .field("released", &self.released_count())
            .finish()
    }
}
