//! Routing engines and their registry.
//!
//! A routing engine computes forwarding tables for a staged topology. The
//! sweep orchestrator drives the engine through four operations, always on
//! a dispatcher worker and never concurrently for the same sweep:
//!
//! 1. [`RoutingEngine::build_topology`]: derive whatever path metrics the
//!    engine needs from [`SweepContext::topology`]
//! 2. [`RoutingEngine::build_forwarding_tables`]: stage tables with
//!    [`SweepContext::stage_tables`]
//! 3. [`RoutingEngine::dump_tables`]: diagnostics after a commit
//! 4. [`RoutingEngine::release`]: called once when the engine is replaced or
//!    the manager is destroyed
//!
//! Engines never see the orchestrator, so they cannot request a sweep from
//! inside one.

pub mod minhop;
pub mod registry;

use parking_lot::Mutex;
use sm_common::{EngineStatus, SharedLock};

use crate::subnet::{ForwardingTables, SubnetModel, Topology};

pub use minhop::MinHopEngine;
pub use registry::{EngineFactory, RoutingEngineRegistry, DEFAULT_ENGINE};

/// Pluggable path-computation algorithm.
pub trait RoutingEngine: Send + Sync {
    /// Registry name of the engine.
    fn name(&self) -> &str;

    /// Prepares path metrics for the staged topology.
    fn build_topology(&self, ctx: &SweepContext) -> EngineStatus;

    /// Computes and stages forwarding tables.
    fn build_forwarding_tables(&self, ctx: &SweepContext) -> EngineStatus;

    /// Emits the committed tables for diagnostics.
    fn dump_tables(&self, _ctx: &SweepContext) {}

    /// Releases engine resources.
    fn release(&self) {}
}

/// State handed to a routing engine for one sweep.
#[derive(Debug)]
pub struct SweepContext {
    heavy: bool,
    topology: Topology,
    subnet: SharedLock<SubnetModel>,
    staged: Mutex<Option<ForwardingTables>>,
}

impl SweepContext {
    pub fn new(heavy: bool, topology: Topology, subnet: SharedLock<SubnetModel>) -> Self {
        Self {
            heavy,
            topology,
            subnet,
            staged: Mutex::new(None),
        }
    }

    /// True if this sweep rediscovered the fabric.
    pub fn is_heavy(&self) -> bool {
        self.heavy
    }

    /// The topology this sweep will commit.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// The committed subnet model. Take the lock only briefly.
    pub fn subnet(&self) -> &SharedLock<SubnetModel> {
        &self.subnet
    }

    /// Stages tables for commit, replacing anything staged earlier.
    pub fn stage_tables(&self, tables: ForwardingTables) {
        *self.staged.lock() = Some(tables);
    }

    pub(crate) fn take_staged_tables(&self) -> Option<ForwardingTables> {
        self.staged.lock().take()
    }
}
