//! Common control-plane primitives for the subnet manager.
//!
//! This crate provides the building blocks shared by the subnet manager
//! daemon:
//!
//! - [`SharedLock`]: The single coarse lock guarding the subnet model
//! - [`MadPool`]: Accounting of outstanding management transactions
//! - [`Dispatcher`]: Worker pool for discovery and routing work
//! - [`EngineStatus`] / [`WaitStatus`]: Two-valued and wait result types
//! - [`SmError`]: The error taxonomy for init, bind, sweep and config
//!
//! # Architecture
//!
//! The control loop owns sweep decisions and never blocks on fabric work:
//!
//! 1. Triggers (signals, timers, console, bind) request a sweep
//! 2. The sweep hands discovery and path computation to the [`Dispatcher`]
//! 3. Workers issue transactions, each tracked by a [`MadGuard`]
//! 4. Results are committed into the model under the [`SharedLock`]
//! 5. Shutdown reads [`MadPool::outstanding`] as an advisory value
//!
//! # Example
//!
//! ```ignore
//! use sm_common::{Dispatcher, MadPool, SharedLock};
//!
//! let pool = MadPool::new();
//! let dispatcher = Dispatcher::new("sm-worker", 4)?;
//! let probe = {
//!     let pool = pool.clone();
//!     dispatcher.submit(move || {
//!         let mad = pool.begin();
//!         // ... send request, wait for response ...
//!         mad.complete();
//!     })?
//! };
//! probe.join().await?;
//! ```

pub mod dispatcher;
pub mod error;
pub mod mad_pool;
pub mod shared_lock;
pub mod status;

pub use dispatcher::{DispatchHandle, Dispatcher, DispatcherStats};
pub use error::{SmError, SmResult};
pub use mad_pool::{MadGuard, MadPool};
pub use shared_lock::SharedLock;
pub use status::{EngineStatus, WaitStatus};
