//! subnetmgrd entry point.
//!
//! Startup order matters: the handled signals are blocked before the tokio
//! runtime spawns any thread, and unblocked on the main thread only after
//! the manager is bound and the handlers are installed.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use fabric_types::PortGuid;
use nix::sys::signal::SigSet;
use tracing::{error, info, warn};

use subnetmgrd::config::{ConsoleMode, SubnetOptions};
use subnetmgrd::console::Console;
use subnetmgrd::daemon::{DaemonConfig, SubnetDaemon};
use subnetmgrd::logging::{self, LogHandle, LogReopen};
use subnetmgrd::manager::SubnetManager;
use subnetmgrd::notify::SystemdNotifier;
use subnetmgrd::port_select::{resolve_bind_guid, PortChooser, StdinChooser};
use subnetmgrd::shutdown::shutdown_gate;
use subnetmgrd::signals::{self, SignalBridge};

const DEFAULT_CONFIG: &str = "subnetmgrd.toml";

/// Fabric subnet manager
#[derive(Parser, Debug)]
#[command(name = "subnetmgrd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short = 'F', long)]
    config: Option<PathBuf>,

    /// Local port GUID to bind (hex); 0 picks the first usable port
    #[arg(short = 'g', long)]
    guid: Option<PortGuid>,

    /// Routing engine name
    #[arg(short = 'R', long)]
    routing_engine: Option<String>,

    /// File of "<guid> <port>" lines to leave out of path equalization
    #[arg(short = 'i', long)]
    ignore_guids: Option<PathBuf>,

    /// Exit once the subnet is up
    #[arg(short = 'o', long)]
    once: bool,

    /// Seconds between light sweeps (0 disables)
    #[arg(short = 's', long)]
    sweep_interval: Option<u64>,

    /// Console mode (off, local)
    #[arg(short = 'C', long)]
    console: Option<ConsoleMode>,

    /// Log file (default stderr)
    #[arg(short = 'f', long)]
    log_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Write the effective options to the config file (default ./subnetmgrd.toml)
    #[arg(short = 'c', long)]
    cache_options: bool,
}

impl Args {
    fn options(&self) -> anyhow::Result<SubnetOptions> {
        let mut options = match &self.config {
            Some(path) => SubnetOptions::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => SubnetOptions::default(),
        };

        if let Some(guid) = self.guid {
            options.guid = guid;
        }
        if let Some(engine) = &self.routing_engine {
            options.routing_engine = engine.clone();
        }
        if let Some(path) = &self.ignore_guids {
            options.ignore_guids_file = Some(path.clone());
        }
        if self.once {
            options.run_once = true;
        }
        if let Some(secs) = self.sweep_interval {
            options.sweep_interval_secs = secs;
        }
        if let Some(console) = self.console {
            options.console = console;
        }
        if let Some(path) = &self.log_file {
            options.log_file = Some(path.clone());
        }
        if let Some(level) = &self.log_level {
            options.log_level = level.clone();
        }
        Ok(options)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let options = match args.options() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("subnetmgrd: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let log = match logging::init_logging(&options.log_level, options.log_file.as_deref()) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("subnetmgrd: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.cache_options {
        let path = args
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
        match options.write(&path) {
            Ok(()) => info!(path = %path.display(), "Options cached"),
            Err(e) => warn!(error = %e, "Cannot cache options"),
        }
    }

    let saved_mask = match signals::block_signals() {
        Ok(mask) => mask,
        Err(e) => {
            error!(error = %e, "Cannot block signals");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("subnetmgrd-rt")
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Cannot start runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(options, log, saved_mask)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(options: SubnetOptions, log: LogHandle, saved_mask: SigSet) -> anyhow::Result<()> {
    info!("====================================================================");
    info!("Starting subnetmgrd {}", env!("CARGO_PKG_VERSION"));
    info!("====================================================================");

    let bridge = SignalBridge::new();
    let mut manager = SubnetManager::construct(Arc::clone(&bridge));

    if let Err(e) = manager.init(&options) {
        manager.destroy();
        return Err(e).context("subnet manager init failed");
    }

    if let Err(e) = bind(&mut manager, &options) {
        manager.destroy();
        return Err(e);
    }

    if let Some(path) = &options.ignore_guids_file {
        if let Err(e) = manager.load_ignore_list(path) {
            manager.destroy();
            return Err(e).context("ignore list rejected");
        }
    }

    let forwarder = match bridge.install() {
        Ok(forwarder) => forwarder,
        Err(e) => {
            manager.destroy();
            return Err(e).context("installing signal handlers");
        }
    };
    if let Err(e) = signals::restore_signals(&saved_mask) {
        forwarder.abort();
        manager.destroy();
        return Err(e).context("unblocking signals");
    }

    let notifier = SystemdNotifier::new();
    let console = match options.console {
        ConsoleMode::Local => Console::spawn_local(),
        ConsoleMode::Off => Console::disabled(),
    };

    let outcome = manager.sweep(true).await;
    info!(?outcome, "Initial sweep");
    if let Err(e) = notifier.notify_ready() {
        warn!(error = %e, "READY notification failed");
    }

    let mut daemon = SubnetDaemon::new(
        DaemonConfig::from(&options),
        Arc::clone(&bridge),
        console,
        Arc::new(log) as Arc<dyn LogReopen>,
        notifier.clone(),
    );
    let exit = daemon.run(&manager).await;
    info!(?exit, "Manager loop finished");

    if let Err(e) = notifier.notify_stopping() {
        warn!(error = %e, "STOPPING notification failed");
    }
    if let Some(mads) = manager.mad_pool() {
        shutdown_gate(mads, options.shutdown_grace()).await;
    }
    manager.destroy();
    forwarder.abort();
    info!("Exiting SM");
    Ok(())
}

fn bind(manager: &mut SubnetManager, options: &SubnetOptions) -> anyhow::Result<()> {
    let mut stdin_chooser = StdinChooser;
    let chooser: Option<&mut dyn PortChooser> =
        if options.console == ConsoleMode::Off && std::io::stdin().is_terminal() {
            Some(&mut stdin_chooser)
        } else {
            None
        };

    let guid = resolve_bind_guid(options.guid, &options.local_ports, chooser)
        .context("selecting local port")?;
    manager
        .bind(guid)
        .with_context(|| format!("bind to {} failed; perhaps another instance is running", guid))
}
