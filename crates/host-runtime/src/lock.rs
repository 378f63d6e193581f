//! The execution lock shared by the foreground and background threads.
//!
//! The lock owns the interpreter, so interpreter state can only be
//! touched while it is held. Both the background task run and the
//! foreground command dispatch go through [`ExecutionLock::with`]; there
//! is no unguarded path into the interpreter.

use std::sync::{Arc, Mutex};
use tracing::warn;

/// Cloneable handle to the interpreter behind a mutex.
#[derive(Debug)]
pub struct ExecutionLock<I> {
    inner: Arc<Mutex<I>>,
}

impl<I> Clone for ExecutionLock<I> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I> ExecutionLock<I> {
    /// Put `interpreter` behind the lock.
    pub fn new(interpreter: I) -> Self {
        Self {
            inner: Arc::new(Mutex::new(interpreter)),
        }
    }

    /// Run `f` with exclusive access to the interpreter.
    ///
    /// Keep `f` short: the other thread waits for the whole call. Never
    /// sleep toward a deadline inside it.
    pub fn with<R>(&self, f: impl FnOnce(&mut I) -> R) -> R {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                // A script panic must not wedge the other thread.
                warn!("Execution lock poisoned by a panic, continuing");
                self.inner.clear_poison();
                poisoned.into_inner()
            }
        };
        f(&mut guard)
    }

    /// Whether the lock is currently held by some thread.
    #[must_use]
    pub fn is_held(&self) -> bool {
        matches!(
            self.inner.try_lock(),
            Err(std::sync::TryLockError::WouldBlock)
        )
    }
}
