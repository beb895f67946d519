//! Subnet manager lifecycle: construct, init, bind, destroy.
//!
//! ```text
//! construct ──► init ──► bind ──► { sweep ⇄ wait } ──► destroy
//!                 │                                       ▲
//!                 └──────────── (init failed) ────────────┘
//! ```
//!
//! `destroy` consumes the manager, so it runs at most once, and it skips
//! whatever `init` never allocated.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fabric_types::PortGuid;
use sm_common::{Dispatcher, MadPool, SharedLock, SmError, SmResult, WaitStatus};
use tracing::{info, instrument};

use crate::config::SubnetOptions;
use crate::discovery::{Discovery, StaticDiscovery};
use crate::ignore_list;
use crate::routing::{RoutingEngine, RoutingEngineRegistry};
use crate::signals::SignalBridge;
use crate::subnet::SubnetModel;
use crate::sweep::{OrchestratorParts, SweepOrchestrator, SweepOutcome, SweepState};

/// Snapshot printed by the console `status` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub bound_port: Option<PortGuid>,
    pub sweep_state: SweepState,
    pub sweep_count: u64,
    pub subnet_up: bool,
    pub outstanding_mads: u32,
    pub routing_engine: Option<String>,
    pub ignored_ports: usize,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = self
            .bound_port
            .map(|g| g.to_string())
            .unwrap_or_else(|| "unbound".to_string());
        writeln!(f, "Bound port      : {}", bound)?;
        writeln!(f, "Sweep state     : {}", self.sweep_state)?;
        writeln!(f, "Sweeps          : {}", self.sweep_count)?;
        writeln!(f, "Subnet up       : {}", self.subnet_up)?;
        writeln!(f, "MADs outstanding: {}", self.outstanding_mads)?;
        writeln!(
            f,
            "Routing engine  : {}",
            self.routing_engine.as_deref().unwrap_or("none")
        )?;
        write!(f, "Ignored ports   : {}", self.ignored_ports)
    }
}

/// The daemon's singleton runtime state.
pub struct SubnetManager {
    signals: Arc<SignalBridge>,
    registry: RoutingEngineRegistry,
    discovery: Option<Arc<dyn Discovery>>,
    subnet: Option<SharedLock<SubnetModel>>,
    mads: Option<Arc<MadPool>>,
    dispatcher: Option<Arc<Dispatcher>>,
    orchestrator: Option<SweepOrchestrator>,
}

impl SubnetManager {
    /// Creates an uninitialized manager. Allocates nothing.
    pub fn construct(signals: Arc<SignalBridge>) -> Self {
        Self {
            signals,
            registry: RoutingEngineRegistry::new(),
            discovery: None,
            subnet: None,
            mads: None,
            dispatcher: None,
            orchestrator: None,
        }
    }

    /// Uses `discovery` instead of the configured static fabric.
    pub fn with_discovery(mut self, discovery: Arc<dyn Discovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Registers a routing engine factory under `name`.
    pub fn register_engine<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Arc<dyn RoutingEngine> + Send + Sync + 'static,
    {
        match &self.orchestrator {
            Some(orchestrator) => orchestrator.register_engine(name, factory),
            None => self.registry.register(name, factory),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.orchestrator.is_some()
    }

    /// Allocates the lock, pool, dispatcher and active routing engine.
    #[instrument(skip_all, fields(engine = %options.routing_engine))]
    pub fn init(&mut self, options: &SubnetOptions) -> SmResult<()> {
        if self.is_initialized() {
            return Err(SmError::init("manager", "already initialized"));
        }
        options.validate()?;

        let subnet = self
            .subnet
            .get_or_insert_with(|| SharedLock::new(SubnetModel::new()))
            .clone();
        let mads = Arc::clone(self.mads.get_or_insert_with(MadPool::new));
        let dispatcher = Arc::new(Dispatcher::new("sm-worker", options.dispatcher_threads)?);
        self.dispatcher = Some(Arc::clone(&dispatcher));

        let discovery = match &self.discovery {
            Some(discovery) => Arc::clone(discovery),
            None => {
                let topology = options
                    .topology
                    .build()
                    .map_err(|e| SmError::init("topology", e.to_string()))?;
                Arc::new(StaticDiscovery::new(topology)) as Arc<dyn Discovery>
            }
        };

        let mut engines = std::mem::take(&mut self.registry);
        engines.register_builtin();
        engines.open(&options.routing_engine);

        self.orchestrator = Some(SweepOrchestrator::new(OrchestratorParts {
            subnet,
            mads,
            dispatcher,
            discovery,
            engines,
            signals: Arc::clone(&self.signals),
            dump_tables: options.dump_tables,
        }));
        info!("Subnet manager initialized");
        Ok(())
    }

    fn orchestrator(&self, operation: &str) -> SmResult<&SweepOrchestrator> {
        self.orchestrator
            .as_ref()
            .ok_or_else(|| SmError::not_initialized(operation))
    }

    /// Records the local port. Allowed once.
    pub fn bind(&mut self, guid: PortGuid) -> SmResult<()> {
        let orchestrator = self.orchestrator("bind")?;
        if let Some(bound) = orchestrator.bound_port() {
            return Err(SmError::AlreadyBound { bound });
        }
        orchestrator.bind(guid)
    }

    pub fn bound_port(&self) -> Option<PortGuid> {
        self.orchestrator.as_ref().and_then(SweepOrchestrator::bound_port)
    }

    /// Requests a sweep. Before init or bind this does nothing.
    pub async fn sweep(&self, heavy: bool) -> SweepOutcome {
        match &self.orchestrator {
            Some(orchestrator) => orchestrator.request_sweep(heavy).await,
            None => SweepOutcome::NotBound,
        }
    }

    /// Waits for a sweep to bring the subnet up.
    pub async fn wait_for_subnet_up(
        &self,
        timeout: Option<Duration>,
        interruptible: bool,
    ) -> WaitStatus {
        match &self.orchestrator {
            Some(orchestrator) => orchestrator.wait_for_subnet_up(timeout, interruptible).await,
            None => WaitStatus::Error,
        }
    }

    /// Loads an ignore list into the subnet model.
    pub fn load_ignore_list(&self, path: &Path) -> SmResult<usize> {
        let orchestrator = self.orchestrator("load ignore list")?;
        ignore_list::apply_ignore_list(path, orchestrator.subnet())
    }

    /// Replaces the active routing engine between sweeps.
    pub fn swap_engine(&self, name: &str) -> SmResult<String> {
        self.orchestrator("swap routing engine")?.swap_engine(name)
    }

    pub fn sweep_orchestrator(&self) -> Option<&SweepOrchestrator> {
        self.orchestrator.as_ref()
    }

    pub fn subnet(&self) -> Option<&SharedLock<SubnetModel>> {
        self.subnet.as_ref()
    }

    pub fn mad_pool(&self) -> Option<&Arc<MadPool>> {
        self.mads.as_ref()
    }

    pub fn signals(&self) -> &Arc<SignalBridge> {
        &self.signals
    }

    pub fn status(&self) -> StatusReport {
        let (sweep_count, subnet_up, ignored_ports) = self
            .subnet
            .as_ref()
            .map(|s| {
                s.with(|m| (m.sweep_count(), m.is_subnet_up(), m.ignored_ports().len()))
            })
            .unwrap_or_default();

        StatusReport {
            bound_port: self.bound_port(),
            sweep_state: self
                .orchestrator
                .as_ref()
                .map(SweepOrchestrator::state)
                .unwrap_or_default(),
            sweep_count,
            subnet_up,
            outstanding_mads: self.mads.as_ref().map(|m| m.outstanding()).unwrap_or(0),
            routing_engine: self
                .orchestrator
                .as_ref()
                .and_then(SweepOrchestrator::active_engine_name),
            ignored_ports,
        }
    }

    /// Releases the routing engine and joins the dispatcher workers.
    pub fn destroy(mut self) {
        match self.orchestrator.take() {
            Some(orchestrator) => orchestrator.release_engine(),
            None => self.registry.release_active(),
        }
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.shutdown();
        }
        self.mads.take();
        self.subnet.take();
        info!("Subnet manager destroyed");
    }
}

impl fmt::Debug for SubnetManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubnetManager")
            .field("initialized", &self.is_initialized())
            .field("bound", &self.bound_port())
            .finish()
    }
}
