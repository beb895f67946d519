//! Sweep orchestration.
//!
//! Every trigger (bind, timer, console, SIGHUP) ends up in
//! [`SweepOrchestrator::request_sweep`]. At most one sweep runs at a time;
//! a request that arrives while one is running is coalesced into a single
//! follow-up sweep, and a heavy request is never downgraded by light ones.
//!
//! A sweep goes through these stages:
//!
//! 1. Discovery on a dispatcher worker, shared lock not held
//! 2. `build_topology` on the active engine
//! 3. `build_forwarding_tables` on the active engine
//! 4. Commit of topology and tables in one shared-lock critical section
//! 5. Optional `dump_tables`
//!
//! A failure in stages 1-3 aborts the sweep and leaves the committed model
//! untouched.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use fabric_types::PortGuid;
use parking_lot::Mutex;
use sm_common::{Dispatcher, EngineStatus, MadPool, SharedLock, SmError, SmResult, WaitStatus};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::discovery::{Discovery, DiscoveryRequest};
use crate::routing::{RoutingEngine, RoutingEngineRegistry, SweepContext};
use crate::signals::SignalBridge;
use crate::subnet::{SubnetModel, Topology};

/// Whether a sweep is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SweepState {
    #[default]
    Idle,
    Running,
}

impl fmt::Display for SweepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepState::Idle => write!(f, "idle"),
            SweepState::Running => write!(f, "running"),
        }
    }
}

/// Stage at which a sweep was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepStage {
    Discovery,
    BuildTopology,
    BuildForwardingTables,
}

impl SweepStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepStage::Discovery => "discovery",
            SweepStage::BuildTopology => "build_topology",
            SweepStage::BuildForwardingTables => "build_forwarding_tables",
        }
    }
}

impl fmt::Display for SweepStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a sweep request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// The last sweep driven by this call committed its results.
    Completed { heavy: bool },
    /// The last sweep driven by this call was aborted.
    Aborted { heavy: bool, stage: SweepStage },
    /// A sweep was already running; this request was folded into it.
    Coalesced,
    /// No port is bound yet, so nothing was done.
    NotBound,
}

impl SweepOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SweepOutcome::Completed { .. })
    }
}

#[derive(Debug, Default)]
struct SweepGate {
    state: SweepState,
    pending: bool,
    heavy: bool,
}

/// Resets the gate if a sweep future is dropped mid-run.
///
/// The cancelled sweep's heaviness goes back into the gate and any
/// coalesced request stays pending for the next caller.
struct RunningGuard<'a> {
    gate: &'a Mutex<SweepGate>,
    heavy: bool,
    armed: bool,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut gate = self.gate.lock();
            gate.state = SweepState::Idle;
            gate.heavy |= self.heavy;
            warn!(pending = gate.pending, "Sweep cancelled before completion");
        }
    }
}

/// Resources the orchestrator drives.
pub struct OrchestratorParts {
    pub subnet: SharedLock<SubnetModel>,
    pub mads: Arc<MadPool>,
    pub dispatcher: Arc<Dispatcher>,
    pub discovery: Arc<dyn Discovery>,
    pub engines: RoutingEngineRegistry,
    pub signals: Arc<SignalBridge>,
    pub dump_tables: bool,
}

struct Inner {
    subnet: SharedLock<SubnetModel>,
    mads: Arc<MadPool>,
    dispatcher: Arc<Dispatcher>,
    discovery: Arc<dyn Discovery>,
    engines: Mutex<RoutingEngineRegistry>,
    signals: Arc<SignalBridge>,
    dump_tables: bool,
    bound: OnceLock<PortGuid>,
    gate: Mutex<SweepGate>,
    /// Generation of successful sweeps
    up_events: watch::Sender<u64>,
    /// Highest generation already handed to a waiter
    consumed_up: AtomicU64,
}

/// Serializes sweep requests and drives the active routing engine.
///
/// Cheap to clone; all clones share one gate.
#[derive(Clone)]
pub struct SweepOrchestrator {
    inner: Arc<Inner>,
}

impl SweepOrchestrator {
    pub fn new(parts: OrchestratorParts) -> Self {
        let (up_events, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                subnet: parts.subnet,
                mads: parts.mads,
                dispatcher: parts.dispatcher,
                discovery: parts.discovery,
                engines: Mutex::new(parts.engines),
                signals: parts.signals,
                dump_tables: parts.dump_tables,
                bound: OnceLock::new(),
                gate: Mutex::new(SweepGate::default()),
                up_events,
                consumed_up: AtomicU64::new(0),
            }),
        }
    }

    /// Records the local port. Sweeps are refused until this succeeds.
    pub fn bind(&self, guid: PortGuid) -> SmResult<()> {
        if !guid.is_bindable() {
            return Err(SmError::InvalidPort { guid });
        }
        self.inner
            .bound
            .set(guid)
            .map_err(|_| SmError::AlreadyBound {
                bound: self.bound_port().unwrap_or(guid),
            })?;
        self.inner.subnet.with(|m| m.set_bound_port(guid));
        info!(port = %guid, "Bound to local port");
        Ok(())
    }

    pub fn bound_port(&self) -> Option<PortGuid> {
        self.inner.bound.get().copied()
    }

    pub fn state(&self) -> SweepState {
        self.inner.gate.lock().state
    }

    pub fn subnet(&self) -> &SharedLock<SubnetModel> {
        &self.inner.subnet
    }

    pub fn active_engine_name(&self) -> Option<String> {
        self.inner.engines.lock().active_name().map(str::to_string)
    }

    /// Requests a sweep.
    ///
    /// If none is running, the caller drives sweeps until no request is
    /// pending and gets the outcome of the last one. Otherwise the request
    /// is folded into the running cycle and `Coalesced` returns at once.
    pub async fn request_sweep(&self, heavy: bool) -> SweepOutcome {
        if self.bound_port().is_none() {
            warn!("Sweep requested before bind; ignored");
            return SweepOutcome::NotBound;
        }

        {
            let mut gate = self.inner.gate.lock();
            gate.heavy |= heavy;
            if gate.state == SweepState::Running {
                gate.pending = true;
                debug!(heavy, "Sweep in progress; request coalesced");
                return SweepOutcome::Coalesced;
            }
            gate.state = SweepState::Running;
        }

        let mut guard = RunningGuard {
            gate: &self.inner.gate,
            heavy: false,
            armed: true,
        };
        loop {
            let requested_heavy = {
                let mut gate = self.inner.gate.lock();
                gate.pending = false;
                std::mem::take(&mut gate.heavy)
            };
            let forced = self.inner.subnet.with(SubnetModel::take_force_heavy_sweep);
            guard.heavy = requested_heavy || forced;
            let outcome = self.sweep_once(guard.heavy).await;

            {
                let mut gate = self.inner.gate.lock();
                if !gate.pending {
                    gate.state = SweepState::Idle;
                    guard.armed = false;
                    return outcome;
                }
            }
            debug!("Running coalesced sweep");
        }
    }

    #[instrument(skip(self), fields(engine = tracing::field::Empty))]
    async fn sweep_once(&self, heavy: bool) -> SweepOutcome {
        let Some(bound_port) = self.bound_port() else {
            return SweepOutcome::NotBound;
        };
        let active = self.inner.engines.lock().active();
        let Some(engine) = active else {
            error!("No routing engine active");
            return self.abort(heavy, SweepStage::BuildTopology);
        };
        tracing::Span::current().record("engine", engine.name());
        info!(heavy, "Sweep started");

        let topology = match self.discover(heavy, bound_port).await {
            Ok(topology) => topology,
            Err(e) => {
                error!(error = %e, "Discovery failed; subnet model unchanged");
                return self.abort(heavy, SweepStage::Discovery);
            }
        };

        let ctx = Arc::new(SweepContext::new(heavy, topology, self.inner.subnet.clone()));
        for stage in [SweepStage::BuildTopology, SweepStage::BuildForwardingTables] {
            if let Err(e) = self.run_stage(&engine, &ctx, stage).await {
                error!(error = %e, "Sweep aborted; subnet model unchanged");
                return self.abort(heavy, stage);
            }
        }

        let tables = ctx.take_staged_tables().unwrap_or_default();
        let entries = tables.entry_count();
        let topology = ctx.topology().clone();
        let sweeps = self.inner.subnet.with(|model| {
            model.commit(topology, tables, heavy);
            model.sweep_count()
        });

        if self.inner.dump_tables {
            self.dump(&engine, &ctx).await;
        }

        self.inner.up_events.send_modify(|generation| *generation += 1);
        info!(heavy, entries, sweeps, "Sweep completed; subnet up");
        SweepOutcome::Completed { heavy }
    }

    /// Nothing staged by an aborted sweep is trusted later, so the next
    /// sweep rediscovers the fabric.
    fn abort(&self, heavy: bool, stage: SweepStage) -> SweepOutcome {
        self.inner.subnet.with(SubnetModel::request_heavy_sweep);
        SweepOutcome::Aborted { heavy, stage }
    }

    async fn discover(&self, heavy: bool, bound_port: PortGuid) -> SmResult<Topology> {
        let discovery = Arc::clone(&self.inner.discovery);
        let mads = Arc::clone(&self.inner.mads);
        let request = DiscoveryRequest { heavy, bound_port };

        let staged = self
            .inner
            .dispatcher
            .submit(move || discovery.discover(&request, &mads))?
            .join()
            .await?
            .map_err(|e| SmError::dispatch(format!("discovery: {}", e)))?;

        Ok(match staged {
            Some(topology) => topology,
            None => self.inner.subnet.with(|m| m.topology().clone()),
        })
    }

    async fn run_stage(
        &self,
        engine: &Arc<dyn RoutingEngine>,
        ctx: &Arc<SweepContext>,
        stage: SweepStage,
    ) -> SmResult<()> {
        let job_engine = Arc::clone(engine);
        let job_ctx = Arc::clone(ctx);
        let status = self
            .inner
            .dispatcher
            .submit(move || match stage {
                SweepStage::BuildForwardingTables => job_engine.build_forwarding_tables(&job_ctx),
                _ => job_engine.build_topology(&job_ctx),
            })?
            .join()
            .await
            .unwrap_or(EngineStatus::Failure);

        match status {
            EngineStatus::Success => Ok(()),
            EngineStatus::Failure => Err(SmError::engine(engine.name(), stage.as_str())),
        }
    }

    async fn dump(&self, engine: &Arc<dyn RoutingEngine>, ctx: &Arc<SweepContext>) {
        let engine = Arc::clone(engine);
        let ctx = Arc::clone(ctx);
        let dumped = match self.inner.dispatcher.submit(move || engine.dump_tables(&ctx)) {
            Ok(handle) => handle.join().await,
            Err(e) => Err(e),
        };
        if let Err(e) = dumped {
            warn!(error = %e, "Table dump failed");
        }
    }

    /// Waits for a sweep to bring the subnet up.
    ///
    /// The up event latches and auto-resets: a sweep that completed before
    /// the call satisfies exactly one waiter. When `interruptible`, any
    /// raised signal ends the wait with `Interrupted`.
    pub async fn wait_for_subnet_up(
        &self,
        timeout: Option<Duration>,
        interruptible: bool,
    ) -> WaitStatus {
        if self.bound_port().is_none() {
            warn!("Waiting for subnet up before bind");
        }

        let mut up_rx = self.inner.up_events.subscribe();
        let mut signal_rx = self.inner.signals.subscribe();

        let wait = async {
            loop {
                let generation = *up_rx.borrow_and_update();
                let consumed = self.inner.consumed_up.load(Ordering::Acquire);
                if generation > consumed {
                    if self
                        .inner
                        .consumed_up
                        .compare_exchange(consumed, generation, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return WaitStatus::Success;
                    }
                    continue;
                }

                tokio::select! {
                    changed = up_rx.changed() => {
                        if changed.is_err() {
                            return WaitStatus::Error;
                        }
                    }
                    changed = signal_rx.changed(), if interruptible => {
                        return match changed {
                            Ok(()) => WaitStatus::Interrupted,
                            Err(_) => WaitStatus::Error,
                        };
                    }
                }
            }
        };

        match timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .unwrap_or(WaitStatus::Timeout),
            None => wait.await,
        }
    }

    /// Replaces the active routing engine.
    ///
    /// The outgoing engine is released after the swap. Refused while a
    /// sweep is running; the next sweep is forced heavy.
    pub fn swap_engine(&self, name: &str) -> SmResult<String> {
        let gate = self.inner.gate.lock();
        if gate.state == SweepState::Running {
            return Err(SmError::sweep_in_progress("swap routing engine"));
        }

        let mut engines = self.inner.engines.lock();
        let engine = engines.select(name);
        let selected = engine.name().to_string();
        engines.swap(engine);
        drop(engines);
        drop(gate);

        self.inner.subnet.with(SubnetModel::request_heavy_sweep);
        info!(engine = %selected, "Routing engine swapped");
        Ok(selected)
    }

    /// Registers an engine factory on the live registry.
    pub fn register_engine<F>(&self, name: &str, factory: F)
    where
        F: Fn() -> Arc<dyn RoutingEngine> + Send + Sync + 'static,
    {
        self.inner.engines.lock().register(name, factory);
    }

    /// Releases the active engine. Used on destroy.
    pub(crate) fn release_engine(&self) {
        self.inner.engines.lock().release_active();
    }
}

impl fmt::Debug for SweepOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SweepOrchestrator")
            .field("bound", &self.bound_port())
            .field("state", &self.state())
            .field("engine", &self.active_engine_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::StaticDiscovery;
    use crate::subnet::{Link, Node};
    use fabric_types::{Lid, NodeKind, PortNum};
    use std::sync::atomic::AtomicUsize;

    struct ScriptedEngine {
        fail_topology: bool,
        fail_tables: bool,
        delay: Duration,
        runs: Arc<AtomicUsize>,
        heavy_runs: Arc<AtomicUsize>,
    }

    impl RoutingEngine for ScriptedEngine {
        fn name(&self) -> &str {
            "scripted"
        }

        fn build_topology(&self, ctx: &SweepContext) -> EngineStatus {
            std::thread::sleep(self.delay);
            self.runs.fetch_add(1, Ordering::SeqCst);
            if ctx.is_heavy() {
                self.heavy_runs.fetch_add(1, Ordering::SeqCst);
            }
            EngineStatus::from(!self.fail_topology)
        }

        fn build_forwarding_tables(&self, ctx: &SweepContext) -> EngineStatus {
            let mut tables = crate::subnet::ForwardingTables::new();
            tables.set(PortGuid::new(1), Lid::new(2).unwrap(), PortNum::new(1));
            ctx.stage_tables(tables);
            EngineStatus::from(!self.fail_tables)
        }
    }

    fn fabric() -> Topology {
        let mut t = Topology::new();
        for (guid, lid, kind, ports) in [(1u64, 1u16, NodeKind::Switch, 2u8), (2, 2, NodeKind::Ca, 1)] {
            t.add_node(Node {
                guid: PortGuid::new(guid),
                lid: Lid::new(lid).unwrap(),
                kind,
                num_ports: ports,
                description: String::new(),
            })
            .unwrap();
        }
        t.add_link(Link {
            a: PortGuid::new(1),
            a_port: PortNum::new(1),
            b: PortGuid::new(2),
            b_port: PortNum::new(1),
        })
        .unwrap();
        t
    }

    struct Harness {
        orch: SweepOrchestrator,
        runs: Arc<AtomicUsize>,
        heavy_runs: Arc<AtomicUsize>,
        signals: Arc<SignalBridge>,
    }

    fn harness(fail_topology: bool, fail_tables: bool, delay: Duration) -> Harness {
        let runs = Arc::new(AtomicUsize::new(0));
        let heavy_runs = Arc::new(AtomicUsize::new(0));
        let mut engines = RoutingEngineRegistry::with_builtin();
        {
            let runs = Arc::clone(&runs);
            let heavy_runs = Arc::clone(&heavy_runs);
            engines.register("scripted", move || {
                Arc::new(ScriptedEngine {
                    fail_topology,
                    fail_tables,
                    delay,
                    runs: Arc::clone(&runs),
                    heavy_runs: Arc::clone(&heavy_runs),
                }) as Arc<dyn RoutingEngine>
            });
        }
        engines.open("scripted");

        let signals = SignalBridge::new();
        let orch = SweepOrchestrator::new(OrchestratorParts {
            subnet: SharedLock::new(SubnetModel::new()),
            mads: MadPool::new(),
            dispatcher: Arc::new(Dispatcher::new("sweep-test", 2).unwrap()),
            discovery: Arc::new(StaticDiscovery::new(fabric())),
            engines,
            signals: Arc::clone(&signals),
            dump_tables: true,
        });
        Harness {
            orch,
            runs,
            heavy_runs,
            signals,
        }
    }

    /// Fails its first `build_topology` and records the staged node count
    /// of every call.
    #[derive(Default)]
    struct FailsOnce {
        failed: std::sync::atomic::AtomicBool,
        seen: Mutex<Vec<usize>>,
    }

    impl RoutingEngine for FailsOnce {
        fn name(&self) -> &str {
            "fails-once"
        }

        fn build_topology(&self, ctx: &SweepContext) -> EngineStatus {
            self.seen.lock().push(ctx.topology().len());
            EngineStatus::from(self.failed.swap(true, Ordering::SeqCst))
        }

        fn build_forwarding_tables(&self, _ctx: &SweepContext) -> EngineStatus {
            EngineStatus::Success
        }
    }

    fn orchestrator_with(engine: Arc<dyn RoutingEngine>) -> SweepOrchestrator {
        let mut engines = RoutingEngineRegistry::new();
        let name = engine.name().to_string();
        engines.register(&name, move || Arc::clone(&engine));
        engines.open(&name);

        SweepOrchestrator::new(OrchestratorParts {
            subnet: SharedLock::new(SubnetModel::new()),
            mads: MadPool::new(),
            dispatcher: Arc::new(Dispatcher::new("sweep-test", 2).unwrap()),
            discovery: Arc::new(StaticDiscovery::new(fabric())),
            engines,
            signals: SignalBridge::new(),
            dump_tables: false,
        })
    }

    #[tokio::test]
    async fn test_sweep_before_bind_is_refused() {
        let h = harness(false, false, Duration::ZERO);
        assert_eq!(h.orch.request_sweep(true).await, SweepOutcome::NotBound);
        assert_eq!(h.runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_bind_rules() {
        let h = harness(false, false, Duration::ZERO);
        assert!(matches!(
            h.orch.bind(PortGuid::UNRESOLVED),
            Err(SmError::InvalidPort { .. })
        ));
        h.orch.bind(PortGuid::new(2)).unwrap();
        let err = h.orch.bind(PortGuid::new(3)).unwrap_err();
        assert!(matches!(err, SmError::AlreadyBound { bound } if bound == PortGuid::new(2)));
        assert_eq!(h.orch.subnet().with(|m| m.bound_port()), Some(PortGuid::new(2)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_successful_sweep_commits() {
        let h = harness(false, false, Duration::ZERO);
        h.orch.bind(PortGuid::new(2)).unwrap();

        let outcome = h.orch.request_sweep(false).await;
        assert_eq!(outcome, SweepOutcome::Completed { heavy: false });
        assert_eq!(h.orch.state(), SweepState::Idle);
        h.orch.subnet().with(|m| {
            assert!(m.is_subnet_up());
            assert_eq!(m.sweep_count(), 1);
            assert_eq!(m.topology().len(), 2);
            assert_eq!(m.tables().entry_count(), 1);
        });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_engine_failure_leaves_model_unchanged() {
        for (fail_topology, fail_tables, stage) in [
            (true, false, SweepStage::BuildTopology),
            (false, true, SweepStage::BuildForwardingTables),
        ] {
            let h = harness(fail_topology, fail_tables, Duration::ZERO);
            h.orch.bind(PortGuid::new(2)).unwrap();

            let outcome = h.orch.request_sweep(true).await;
            assert_eq!(outcome, SweepOutcome::Aborted { heavy: true, stage });
            assert_eq!(h.orch.state(), SweepState::Idle);
            h.orch.subnet().with(|m| {
                assert!(!m.is_subnet_up());
                assert_eq!(m.sweep_count(), 0);
                assert!(m.topology().is_empty());
                assert!(m.tables().is_empty());
            });
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_coalesce_and_keep_heavy() {
        let h = harness(false, false, Duration::from_millis(100));
        h.orch.bind(PortGuid::new(2)).unwrap();

        let driver = {
            let orch = h.orch.clone();
            tokio::spawn(async move { orch.request_sweep(false).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(h.orch.state(), SweepState::Running);

        assert_eq!(h.orch.request_sweep(false).await, SweepOutcome::Coalesced);
        assert_eq!(h.orch.request_sweep(true).await, SweepOutcome::Coalesced);
        assert_eq!(h.orch.request_sweep(false).await, SweepOutcome::Coalesced);

        let outcome = driver.await.unwrap();
        assert_eq!(outcome, SweepOutcome::Completed { heavy: true });
        assert_eq!(h.runs.load(Ordering::SeqCst), 2);
        assert_eq!(h.heavy_runs.load(Ordering::SeqCst), 1);
        assert_eq!(h.orch.state(), SweepState::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_wait_times_out_without_sweep() {
        let h = harness(false, false, Duration::ZERO);
        h.orch.bind(PortGuid::new(2)).unwrap();

        let start = std::time::Instant::now();
        let status = h.orch.wait_for_subnet_up(Some(Duration::from_millis(100)), false).await;
        assert_eq!(status, WaitStatus::Timeout);
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_wait_latches_one_success() {
        let h = harness(false, false, Duration::ZERO);
        h.orch.bind(PortGuid::new(2)).unwrap();
        h.orch.request_sweep(false).await;

        let first = h.orch.wait_for_subnet_up(Some(Duration::from_millis(50)), false).await;
        let second = h.orch.wait_for_subnet_up(Some(Duration::from_millis(50)), false).await;
        assert_eq!(first, WaitStatus::Success);
        assert_eq!(second, WaitStatus::Timeout);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_sweep_does_not_satisfy_wait() {
        let h = harness(true, false, Duration::ZERO);
        h.orch.bind(PortGuid::new(2)).unwrap();
        h.orch.request_sweep(true).await;

        let status = h.orch.wait_for_subnet_up(Some(Duration::from_millis(50)), false).await;
        assert_eq!(status, WaitStatus::Timeout);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_interruptible_wait_ends_on_signal() {
        let h = harness(false, false, Duration::ZERO);
        h.orch.bind(PortGuid::new(2)).unwrap();

        let waiter = {
            let orch = h.orch.clone();
            tokio::spawn(async move {
                orch.wait_for_subnet_up(Some(Duration::from_secs(5)), true).await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.signals.raise(crate::signals::ProcessSignal::HangUp);
        assert_eq!(waiter.await.unwrap(), WaitStatus::Interrupted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_swap_engine_rules() {
        let h = harness(false, false, Duration::from_millis(100));
        h.orch.bind(PortGuid::new(2)).unwrap();

        let driver = {
            let orch = h.orch.clone();
            tokio::spawn(async move { orch.request_sweep(false).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(matches!(
            h.orch.swap_engine("minhop"),
            Err(SmError::SweepInProgress { .. })
        ));
        driver.await.unwrap();

        assert_eq!(h.orch.swap_engine("no-such-engine").unwrap(), "minhop");
        assert_eq!(h.orch.active_engine_name().as_deref(), Some("minhop"));
        assert!(h.orch.subnet().with(|m| m.take_force_heavy_sweep()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sweep_after_abort_rediscovers() {
        let engine = Arc::new(FailsOnce::default());
        let orch = orchestrator_with(Arc::clone(&engine) as Arc<dyn RoutingEngine>);
        orch.bind(PortGuid::new(2)).unwrap();

        let first = orch.request_sweep(true).await;
        assert_eq!(
            first,
            SweepOutcome::Aborted {
                heavy: true,
                stage: SweepStage::BuildTopology
            }
        );

        let second = orch.request_sweep(false).await;
        assert_eq!(second, SweepOutcome::Completed { heavy: true });
        assert_eq!(*engine.seen.lock(), vec![2, 2]);
        orch.subnet().with(|m| {
            assert!(m.is_subnet_up());
            assert_eq!(m.topology().len(), 2);
        });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancelled_sweep_keeps_coalesced_heavy_request() {
        let h = harness(false, false, Duration::from_millis(100));
        h.orch.bind(PortGuid::new(2)).unwrap();

        let driver = {
            let orch = h.orch.clone();
            tokio::spawn(async move {
                tokio::time::timeout(Duration::from_millis(50), orch.request_sweep(false)).await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(h.orch.request_sweep(true).await, SweepOutcome::Coalesced);
        assert!(driver.await.unwrap().is_err());
        assert_eq!(h.orch.state(), SweepState::Idle);

        let outcome = h.orch.request_sweep(false).await;
        assert_eq!(outcome, SweepOutcome::Completed { heavy: true });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_interruptible_wait_times_out_without_signal() {
        let h = harness(false, false, Duration::ZERO);
        h.orch.bind(PortGuid::new(2)).unwrap();

        let start = std::time::Instant::now();
        let status = h.orch.wait_for_subnet_up(Some(Duration::from_millis(100)), true).await;
        assert_eq!(status, WaitStatus::Timeout);
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert!(!h.signals.terminate_requested());
    }
}
