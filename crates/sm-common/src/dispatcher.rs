//! Worker pool for fabric interaction tasks.
//!
//! Discovery and routing computations run here, off the control thread.
//! Jobs are plain closures fed through a `crossbeam_channel`; each job's
//! return value travels back over a `tokio::sync::oneshot` so the async
//! control loop can await it without blocking a runtime thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::error::{SmError, SmResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Counters for the dispatcher.
#[derive(Debug, Default)]
pub struct DispatcherStats {
    /// Jobs accepted
    pub submitted: AtomicU64,
    /// Jobs that ran to completion
    pub completed: AtomicU64,
    /// Jobs that panicked
    pub panicked: AtomicU64,
}

/// Fixed-size pool of worker threads.
///
/// Shareable behind an `Arc`; [`shutdown`](Dispatcher::shutdown) closes the
/// queue and joins the workers through interior locking.
#[derive(Debug)]
pub struct Dispatcher {
    name: String,
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stats: Arc<DispatcherStats>,
}

impl Dispatcher {
    /// Spawns `threads` workers named `<name>-<n>`.
    ///
    /// # Errors
    ///
    /// Returns an init error if `threads` is zero or a thread cannot be
    /// spawned. Workers spawned before the failure are joined.
    pub fn new(name: &str, threads: usize) -> SmResult<Self> {
        if threads == 0 {
            return Err(SmError::init("dispatcher", "worker count must be at least 1"));
        }

        let (sender, receiver) = unbounded::<Job>();
        let stats = Arc::new(DispatcherStats::default());
        let dispatcher = Self {
            name: name.to_string(),
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(Vec::with_capacity(threads)),
            stats,
        };

        for index in 0..threads {
            let receiver = receiver.clone();
            let stats = Arc::clone(&dispatcher.stats);
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", name, index))
                .spawn(move || worker_loop(receiver, stats));

            match spawned {
                Ok(handle) => dispatcher.workers.lock().push(handle),
                Err(e) => {
                    dispatcher.shutdown();
                    return Err(SmError::init(
                        "dispatcher",
                        format!("failed to spawn worker {}: {}", index, e),
                    ));
                }
            }
        }

        info!(name, threads, "Dispatcher started");
        Ok(dispatcher)
    }

    /// Queues `f` for execution on a worker.
    ///
    /// The returned handle resolves to the closure's value.
    pub fn submit<F, T>(&self, f: F) -> SmResult<DispatchHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            // The receiver may be gone if the sweep was dropped; nothing to do then.
            let _ = tx.send(f());
        });

        let sender = self.sender.lock();
        let sender = sender
            .as_ref()
            .ok_or_else(|| SmError::dispatch("dispatcher is shut down"))?;
        sender
            .send(job)
            .map_err(|_| SmError::dispatch("all workers have exited"))?;
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(DispatchHandle { rx })
    }

    /// Returns the number of live worker threads.
    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    /// Returns the dispatcher counters.
    pub fn stats(&self) -> &DispatcherStats {
        &self.stats
    }

    /// Closes the queue and joins every worker.
    ///
    /// Jobs already queued still run. Calling this twice is harmless.
    pub fn shutdown(&self) {
        let sender = self.sender.lock().take();
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        if sender.is_none() && workers.is_empty() {
            return;
        }
        drop(sender);

        for handle in workers {
            if handle.join().is_err() {
                error!(name = %self.name, "Dispatcher worker exited abnormally");
            }
        }
        info!(name = %self.name, "Dispatcher stopped");
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Pending result of a dispatched job.
#[derive(Debug)]
pub struct DispatchHandle<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> DispatchHandle<T> {
    /// Waits for the job's value.
    ///
    /// # Errors
    ///
    /// Returns a dispatch error if the job panicked or was never run.
    pub async fn join(self) -> SmResult<T> {
        self.rx
            .await
            .map_err(|_| SmError::dispatch("task ended without producing a result"))
    }
}

fn worker_loop(receiver: Receiver<Job>, stats: Arc<DispatcherStats>) {
    for job in receiver.iter() {
        match panic::catch_unwind(AssertUnwindSafe(job)) {
            Ok(()) => {
                stats.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                stats.panicked.fetch_add(1, Ordering::Relaxed);
                error!("Dispatcher task panicked");
            }
        }
    }
    debug!("Dispatcher worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[test]
    fn test_zero_workers_is_init_error() {
        let err = Dispatcher::new("test", 0).unwrap_err();
        assert!(matches!(err, SmError::Init { .. }));
    }

    #[tokio::test]
    async fn test_submit_returns_value() {
        let dispatcher = Dispatcher::new("test", 2).unwrap();
        let handle = dispatcher.submit(|| 21 * 2).unwrap();
        assert_eq!(handle.join().await.unwrap(), 42);
        assert_eq!(dispatcher.worker_count(), 2);
    }

    #[tokio::test]
    async fn test_jobs_run_off_caller_thread() {
        let dispatcher = Dispatcher::new("pool", 3).unwrap();
        let names = Arc::new(Mutex::new(HashSet::new()));

        let mut handles = Vec::new();
        for _ in 0..12 {
            let names = Arc::clone(&names);
            handles.push(
                dispatcher
                    .submit(move || {
                        let name = thread::current().name().map(str::to_string);
                        names.lock().unwrap().insert(name);
                    })
                    .unwrap(),
            );
        }
        for h in handles {
            h.join().await.unwrap();
        }

        let names = names.lock().unwrap();
        assert!(names.iter().all(|n| n.as_deref().unwrap_or("").starts_with("pool-")));
    }

    #[tokio::test]
    async fn test_panicking_job_reports_dispatch_error_and_worker_survives() {
        let dispatcher = Dispatcher::new("test", 1).unwrap();
        let bad = dispatcher.submit(|| -> u32 { panic!("boom") }).unwrap();
        assert!(matches!(bad.join().await, Err(SmError::Dispatch { .. })));

        let good = dispatcher.submit(|| 7u32).unwrap();
        assert_eq!(good.join().await.unwrap(), 7);
        assert_eq!(dispatcher.stats().panicked.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let dispatcher = Dispatcher::new("test", 1).unwrap();
        dispatcher.shutdown();
        dispatcher.shutdown();
        assert_eq!(dispatcher.worker_count(), 0);
        assert!(dispatcher.submit(|| ()).is_err());
    }
}
