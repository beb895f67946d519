//! Fabric subnet manager daemon.
//!
//! The daemon owns the fabric topology model, decides when to sweep the
//! fabric, runs the selected routing engine, and coordinates shutdown with
//! in-flight management transactions.
//!
//! # Modules
//!
//! - [`manager`]: Lifecycle (construct, init, bind, destroy)
//! - [`sweep`]: Sweep serialization, coalescing and subnet-up waits
//! - [`routing`]: Routing engine trait, registry and the `minhop` engine
//! - [`signals`]: OS signal translation into process flags
//! - [`daemon`]: The manager loop and run-once mode
//! - [`shutdown`]: Best-effort drain of outstanding transactions
//! - [`ignore_list`]: Path-equalization ignore file
//! - [`port_select`]: Choice of the local port to bind
//!
//! # Example
//!
//! ```ignore
//! let signals = SignalBridge::new();
//! let mut manager = SubnetManager::construct(Arc::clone(&signals));
//! manager.init(&options)?;
//! manager.bind(guid)?;
//! manager.sweep(true).await;
//! manager.wait_for_subnet_up(Some(Duration::from_secs(10)), true).await;
//! manager.destroy();
//! ```

pub mod config;
pub mod console;
pub mod daemon;
pub mod discovery;
pub mod ignore_list;
pub mod logging;
pub mod manager;
pub mod notify;
pub mod port_select;
pub mod routing;
pub mod shutdown;
pub mod signals;
pub mod subnet;
pub mod sweep;

pub use config::{ConsoleMode, SubnetOptions};
pub use daemon::{DaemonConfig, LoopExit, SubnetDaemon};
pub use discovery::{Discovery, DiscoveryError, DiscoveryRequest, StaticDiscovery};
pub use manager::{StatusReport, SubnetManager};
pub use routing::{MinHopEngine, RoutingEngine, RoutingEngineRegistry, SweepContext};
pub use shutdown::{shutdown_gate, ShutdownReport};
pub use signals::{ProcessSignal, SignalBridge};
pub use subnet::{ForwardingTables, IgnoredPort, SubnetModel, Topology};
pub use sweep::{SweepOrchestrator, SweepOutcome, SweepStage, SweepState};
