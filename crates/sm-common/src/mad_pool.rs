//! Outstanding management transaction accounting.
//!
//! The pool does not own datagrams; it only counts transactions that have
//! been issued and not yet completed or abandoned. Workers take a
//! [`MadGuard`] per transaction, and dropping the guard (on completion or
//! abandonment) releases the slot. The shutdown gate reads the count as an
//! advisory value and can wake anyone parked in [`MadPool::wait_drained`].

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::warn;

use crate::WaitStatus;

/// Counter of in-flight management transactions.
#[derive(Debug, Default)]
pub struct MadPool {
    /// Transactions issued and not yet finished
    outstanding: AtomicU32,
    /// Transactions issued since creation
    issued: AtomicU64,
    /// Transactions dropped without completing
    abandoned: AtomicU64,
    /// Set once waiters have been released for shutdown
    released: AtomicBool,
    /// Wakes drain waiters on every transition to zero and on release
    changed: Notify,
}

impl MadPool {
    /// Creates an empty pool.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Records a newly issued transaction.
    pub fn begin(self: &Arc<Self>) -> MadGuard {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        self.issued.fetch_add(1, Ordering::Relaxed);
        MadGuard {
            pool: Arc::clone(self),
            completed: false,
        }
    }

    /// Returns the number of in-flight transactions.
    pub fn outstanding(&self) -> u32 {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Returns the number of transactions issued so far.
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    /// Returns the number of transactions abandoned so far.
    pub fn abandoned(&self) -> u64 {
        self.abandoned.load(Ordering::Relaxed)
    }

    /// Returns true once [`release_waiters`](Self::release_waiters) ran.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Parks until no transaction is outstanding.
    ///
    /// Returns `Success` when the count is zero, `Timeout` when `timeout`
    /// elapses first, and `Interrupted` when the waiters were released for
    /// shutdown while transactions were still out.
    pub async fn wait_drained(&self, timeout: Option<Duration>) -> WaitStatus {
        let wait = async {
            loop {
                let notified = self.changed.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if self.outstanding() == 0 {
                    return WaitStatus::Success;
                }
                if self.is_released() {
                    return WaitStatus::Interrupted;
                }
                notified.await;
            }
        };

        match timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .unwrap_or(WaitStatus::Timeout),
            None => wait.await,
        }
    }

    /// Wakes every drain waiter so none of them can hold up process exit.
    pub fn release_waiters(&self) {
        self.released.store(true, Ordering::Release);
        self.changed.notify_waiters();
    }

    fn finish(&self, completed: bool) {
        let prev = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));

        match prev {
            Ok(1) => self.changed.notify_waiters(),
            Ok(_) => {}
            Err(_) => warn!("MAD pool counter underflow ignored"),
        }
        if !completed {
            self.abandoned.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// One outstanding transaction slot.
///
/// Call [`complete`](MadGuard::complete) when the response arrives; a guard
/// dropped without completing counts as abandoned.
#[derive(Debug)]
#[must_use = "dropping the guard immediately abandons the transaction"]
pub struct MadGuard {
    pool: Arc<MadPool>,
    completed: bool,
}

impl MadGuard {
    /// Marks the transaction as answered and releases the slot.
    pub fn complete(mut self) {
        self.completed = true;
    }
}

impl Drop for MadGuard {
    fn drop(&mut self) {
        self.pool.finish(self.completed);
    }
}
