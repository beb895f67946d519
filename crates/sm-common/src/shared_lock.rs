//! Coarse shared lock guarding the subnet model.
//!
//! One mutual-exclusion region, no reader/writer split. The guard type is
//! `parking_lot::MutexGuard`, which is `!Send`, so a guard can never be
//! carried across an `.await` point in the control loop.

use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::time::Duration;

/// Cloneable handle to a value protected by a single mutex.
///
/// # Example
///
/// ```
/// use sm_common::SharedLock;
///
/// let lock = SharedLock::new(vec![1, 2, 3]);
/// let other = lock.clone();
///
/// lock.with(|v| v.push(4));
/// assert_eq!(other.with(|v| v.len()), 4);
/// ```
#[derive(Debug, Default)]
pub struct SharedLock<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> SharedLock<T> {
    /// Wraps a value in a new lock.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(value)),
        }
    }

    /// Acquires the lock, blocking the current thread.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }

    /// Attempts to acquire the lock within `timeout`.
    pub fn try_lock_for(&self, timeout: Duration) -> Option<MutexGuard<'_, T>> {
        self.inner.try_lock_for(timeout)
    }

    /// Runs `f` with the lock held and returns its result.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    /// Returns true if both handles refer to the same lock.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for SharedLock<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
