//! # Dependency Tokens
//!
//! A [`DependencyToken`] stands for work that may still be running: a reader
//! iterating a column on another thread, a writer filling a buffer, or a
//! deferred disposal. Tokens are cheap to clone and compose via
//! [`DependencyToken::combine`], which completes once every part completes.
//!
//! The party doing the work holds the matching [`TokenSource`]. Completing
//! it (or dropping it) releases every waiter.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Shared completion flag.
#[derive(Default)]
struct Signal {
    done: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    fn set(&self) {
        let mut done = self.done.lock();
        *done = true;
        self.cond.notify_all();
    }

    fn is_set(&self) -> bool {
        *self.done.lock()
    }

    fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.cond.wait(&mut done);
        }
    }

    fn wait_until(&self, deadline: Instant) -> bool {
        let mut done = self.done.lock();
        while !*done {
            if self.cond.wait_until(&mut done, deadline).timed_out() {
                return *done;
            }
        }
        true
    }
}

#[derive(Clone, Default)]
enum TokenState {
    #[default]
    Complete,
    Pending(Arc<Signal>),
    Joined(Arc<[DependencyToken]>),
}

/// Opaque handle for outstanding work.
///
/// # Example
///
/// ```rust,ignore
/// let (source, token) = DependencyToken::pending();
/// let reader = std::thread::spawn(move || {
///     // ... read the column ...
///     source.complete();
/// });
/// let freed = column.dispose_deferred(&reclaimer, token);
/// reader.join().unwrap();
/// reclaimer.collect();
/// assert!(freed.is_complete());
/// ```
#[derive(Clone, Default)]
#[must_use = "a dependency token should be waited on or passed to the next operation"]
pub struct DependencyToken {
    state: TokenState,
}

impl DependencyToken {
    /// A token with nothing to wait for.
    pub fn completed() -> Self {
        Self {
            state: TokenState::Complete,
        }
    }

    /// A pending token and the source that completes it.
    pub fn pending() -> (TokenSource, Self) {
        let signal = Arc::new(Signal::default());
        let token = Self {
            state: TokenState::Pending(Arc::clone(&signal)),
        };
        (TokenSource { signal }, token)
    }

    /// Joins many tokens into one that completes when all of them complete.
    ///
    /// Parts that are already complete are dropped; nested joins are flattened.
    pub fn combine<I>(tokens: I) -> Self
    where
        I: IntoIterator<Item = DependencyToken>,
    {
        let mut parts: Vec<DependencyToken> = Vec::new();
        for token in tokens {
            match token.state {
                TokenState::Complete => {}
                TokenState::Joined(inner) => parts.extend(inner.iter().cloned()),
                pending @ TokenState::Pending(_) => parts.push(Self { state: pending }),
            }
        }
        parts.retain(|part| !part.is_complete());

        match parts.len() {
            0 => Self::completed(),
            1 => parts.pop().unwrap_or_default(),
            _ => Self {
                state: TokenState::Joined(parts.into()),
            },
        }
    }

    /// Joins this token with `other`.
    pub fn join(self, other: DependencyToken) -> Self {
        Self::combine([self, other])
    }

    /// Returns true once the represented work has finished.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        match &self.state {
            TokenState::Complete => true,
            TokenState::Pending(signal) => signal.is_set(),
            TokenState::Joined(parts) => parts.iter().all(DependencyToken::is_complete),
        }
    }

    /// Blocks until the represented work has finished.
    pub fn wait(&self) {
        match &self.state {
            TokenState::Complete => {}
            TokenState::Pending(signal) => signal.wait(),
            TokenState::Joined(parts) => parts.iter().for_each(DependencyToken::wait),
        }
    }

    /// Blocks for at most `timeout`. Returns true if the work finished.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.wait_deadline(Instant::now() + timeout)
    }

    fn wait_deadline(&self, deadline: Instant) -> bool {
        match &self.state {
            TokenState::Complete => true,
            TokenState::Pending(signal) => signal.wait_until(deadline),
            TokenState::Joined(parts) => parts.iter().all(|part| part.wait_deadline(deadline)),
        }
    }
}

impl fmt::Debug for DependencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.is_complete() { "complete" } else { "pending" };
        match &self.state {
            TokenState::Joined(parts) => f
                .debug_struct("DependencyToken")
                .field("status", &status)
                .field("parts", &parts.len())
                .finish(),
            _ => f
                .debug_struct("DependencyToken")
                .field("status", &status)
                .finish(),
        }
    }
}

/// Completes a pending [`DependencyToken`].
///
/// Dropping the source completes the token as well, so a worker that exits
/// early (or panics) never leaves waiters blocked.
pub struct TokenSource {
    signal: Arc<Signal>,
}

impl TokenSource {
    /// Another token observing this source.
    pub fn token(&self) -> DependencyToken {
        DependencyToken {
            state: TokenState::Pending(Arc::clone(&self.signal)),
        }
    }

    /// Marks the work as finished.
    pub fn complete(self) {
        drop(self);
    }
}

impl Drop for TokenSource {
    fn drop(&mut self) {
        self.signal.set();
    }
}

impl fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSource")
            .field("complete", &self.signal.is_set())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_token() {
        let token = DependencyToken::completed();
        assert!(token.is_complete());
        token.wait();
    }

    #[test]
    fn test_pending_then_complete() {
        let (source, token) = DependencyToken::pending();
        assert!(!token.is_complete());
        assert!(!token.wait_timeout(Duration::from_millis(1)));

        source.complete();
        assert!(token.is_complete());
        assert!(token.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn test_drop_completes() {
        let (source, token) = DependencyToken::pending();
        drop(source);
        assert!(token.is_complete());
    }

    #[test]
    fn test_combine_waits_for_all() {
        let (a, token_a) = DependencyToken::pending();
        let (b, token_b) = DependencyToken::pending();
        let joined = DependencyToken::combine([token_a, token_b, DependencyToken::completed()]);
        assert!(!joined.is_complete());

        a.complete();
        assert!(!joined.is_complete());

        b.complete();
        assert!(joined.is_complete());
    }

    #[test]
    fn test_combine_flattens_and_skips_complete() {
        let (source, token) = DependencyToken::pending();
        let nested = DependencyToken::combine([token.clone(), token.clone()]);
        let joined = DependencyToken::combine([nested, DependencyToken::completed()]);
        assert!(format!("{joined:?}").contains("parts: 2"));

        source.complete();
        assert!(DependencyToken::combine([joined]).is_complete());
    }

    #[test]
    fn test_wait_across_threads() {
        let (source, token) = DependencyToken::pending();
        let waiter = {
            let token = token.clone();
            std::thread::spawn(move || {
                token.wait();
                true
            })
        };
        std::thread::sleep(Duration::from_millis(5));
        source.complete();
        assert!(waiter.join().unwrap());
        assert!(token.is_complete());
    }
}
