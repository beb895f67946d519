//! The manager loop.
//!
//! Wakes on signals, console commands, the poll tick, and the periodic
//! sweep timer. After each wake the process flags are handled in priority
//! order: terminate, heavy resweep, log reopen. A pending terminate skips
//! the rest.

use std::future;
use std::sync::Arc;
use std::time::Duration;

use sm_common::WaitStatus;
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::SubnetOptions;
use crate::console::{Console, ConsoleCommand, HELP};
use crate::logging::LogReopen;
use crate::manager::SubnetManager;
use crate::notify::SystemdNotifier;
use crate::signals::SignalBridge;
use crate::sweep::SweepOutcome;

/// Configuration for the manager loop.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Wake-up period when nothing else happens
    pub poll_interval: Duration,
    /// Period of light sweeps; `None` disables them
    pub sweep_interval: Option<Duration>,
    /// Exit once the subnet is up
    pub run_once: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            sweep_interval: Some(Duration::from_secs(10)),
            run_once: false,
        }
    }
}

impl From<&SubnetOptions> for DaemonConfig {
    fn from(options: &SubnetOptions) -> Self {
        Self {
            poll_interval: options.poll_interval(),
            sweep_interval: options.sweep_interval(),
            run_once: options.run_once,
        }
    }
}

/// Why the loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Terminated,
    SubnetUp,
    WaitFailed,
}

enum Wake {
    Signal,
    Command(ConsoleCommand),
    Poll,
    Periodic,
}

/// Drives a bound [`SubnetManager`] until termination.
pub struct SubnetDaemon {
    config: DaemonConfig,
    signals: Arc<SignalBridge>,
    console: Console,
    log: Arc<dyn LogReopen>,
    notifier: SystemdNotifier,
}

impl SubnetDaemon {
    pub fn new(
        config: DaemonConfig,
        signals: Arc<SignalBridge>,
        console: Console,
        log: Arc<dyn LogReopen>,
        notifier: SystemdNotifier,
    ) -> Self {
        Self {
            config,
            signals,
            console,
            log,
            notifier,
        }
    }

    /// Runs the loop selected by the configuration.
    pub async fn run(&mut self, manager: &SubnetManager) -> LoopExit {
        if self.config.run_once {
            self.run_once(manager).await
        } else {
            self.run_loop(manager).await
        }
    }

    /// Serves sweeps until terminate is requested.
    pub async fn run_loop(&mut self, manager: &SubnetManager) -> LoopExit {
        let mut signal_rx = self.signals.subscribe();
        let mut poll = time::interval_at(
            time::Instant::now() + self.config.poll_interval,
            self.config.poll_interval,
        );
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut resweep = self.config.sweep_interval.map(|period| {
            let mut timer = time::interval_at(time::Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        });

        info!("Manager loop running");
        while !self.signals.terminate_requested() {
            let wake = tokio::select! {
                Ok(()) = signal_rx.changed() => Wake::Signal,
                command = self.console.next() => Wake::Command(command),
                _ = poll.tick() => Wake::Poll,
                _ = next_tick(&mut resweep) => Wake::Periodic,
            };

            if !self.process_flags(manager).await {
                break;
            }
            match wake {
                Wake::Command(command) => self.handle_command(manager, command).await,
                Wake::Periodic => {
                    debug!("Periodic sweep");
                    self.sweep(manager, false).await;
                }
                Wake::Signal | Wake::Poll => {}
            }
        }
        LoopExit::Terminated
    }

    /// Waits for the subnet to come up, then returns.
    pub async fn run_once(&mut self, manager: &SubnetManager) -> LoopExit {
        let period = self
            .config
            .sweep_interval
            .unwrap_or(self.config.poll_interval);

        while !self.signals.terminate_requested() {
            match manager.wait_for_subnet_up(Some(period), true).await.check() {
                Ok(WaitStatus::Success) => {
                    info!("Subnet up; run-once complete");
                    return LoopExit::SubnetUp;
                }
                Ok(WaitStatus::Interrupted) => {
                    if !self.process_flags(manager).await {
                        break;
                    }
                }
                Ok(_) => debug!("Still waiting for subnet up"),
                Err(e) => {
                    error!(error = %e, "Waiting for subnet up failed");
                    return LoopExit::WaitFailed;
                }
            }
        }
        LoopExit::Terminated
    }

    /// Handles pending flags. Returns false once terminate is requested.
    pub async fn process_flags(&mut self, manager: &SubnetManager) -> bool {
        if self.signals.terminate_requested() {
            return false;
        }
        if self.signals.take_heavy_resweep() {
            info!("Heavy resweep requested");
            self.sweep(manager, true).await;
            if self.signals.terminate_requested() {
                return false;
            }
        }
        if self.signals.take_log_reopen() {
            if let Err(e) = self.log.reopen() {
                warn!(error = %e, "Log reopen failed");
            }
        }
        true
    }

    async fn sweep(&self, manager: &SubnetManager, heavy: bool) -> SweepOutcome {
        let outcome = manager.sweep(heavy).await;
        if let SweepOutcome::Completed { .. } = outcome {
            let status = manager.status();
            let message = format!("Subnet up, {} sweeps", status.sweep_count);
            if let Err(e) = self.notifier.notify_status(&message) {
                debug!(error = %e, "Status notification failed");
            }
        }
        outcome
    }

    async fn handle_command(&self, manager: &SubnetManager, command: ConsoleCommand) {
        match command {
            ConsoleCommand::Resweep { heavy } => {
                let outcome = self.sweep(manager, heavy).await;
                info!(?outcome, "Console resweep");
            }
            ConsoleCommand::Status => info!("\n{}", manager.status()),
            ConsoleCommand::Help => info!("\n{}", HELP),
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}
