//! OS signal translation into cooperative process flags.
//!
//! | Signal           | Effect                                   |
//! |------------------|------------------------------------------|
//! | SIGINT, SIGTERM  | terminate (sticky, first one reported)   |
//! | SIGHUP           | heavy resweep requested                  |
//! | SIGUSR1          | log reopen requested                     |
//!
//! The four signals are blocked with [`block_signals`] before any thread is
//! spawned, so every runtime and dispatcher thread inherits the mask. Once
//! [`SignalBridge::install`] has registered the handlers, the main thread
//! calls [`restore_signals`] and becomes the only thread that takes delivery.
//! Every raised signal also bumps an event counter that the manager loop and
//! interruptible waits watch.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nix::sys::signal::{pthread_sigmask, SigSet, SigmaskHow, Signal};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Signals the bridge understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessSignal {
    Interrupt,
    Terminate,
    HangUp,
    User1,
}

impl ProcessSignal {
    pub const ALL: [ProcessSignal; 4] = [
        ProcessSignal::Interrupt,
        ProcessSignal::Terminate,
        ProcessSignal::HangUp,
        ProcessSignal::User1,
    ];

    pub fn is_terminate(&self) -> bool {
        matches!(self, ProcessSignal::Interrupt | ProcessSignal::Terminate)
    }

    fn os_signal(&self) -> Signal {
        match self {
            ProcessSignal::Interrupt => Signal::SIGINT,
            ProcessSignal::Terminate => Signal::SIGTERM,
            ProcessSignal::HangUp => Signal::SIGHUP,
            ProcessSignal::User1 => Signal::SIGUSR1,
        }
    }
}

impl fmt::Display for ProcessSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.os_signal().as_str())
    }
}

/// Process-wide flags written by signal delivery and consumed by the
/// manager loop.
#[derive(Debug)]
pub struct SignalBridge {
    terminate: AtomicBool,
    heavy_resweep: AtomicBool,
    log_reopen: AtomicBool,
    events: watch::Sender<u64>,
}

impl SignalBridge {
    pub fn new() -> Arc<Self> {
        let (events, _) = watch::channel(0);
        Arc::new(Self {
            terminate: AtomicBool::new(false),
            heavy_resweep: AtomicBool::new(false),
            log_reopen: AtomicBool::new(false),
            events,
        })
    }

    /// Records a delivered signal.
    ///
    /// Returns true if this is the first termination request.
    pub fn raise(&self, sig: ProcessSignal) -> bool {
        let first = match sig {
            ProcessSignal::Interrupt | ProcessSignal::Terminate => {
                !self.terminate.swap(true, Ordering::AcqRel)
            }
            ProcessSignal::HangUp => {
                self.heavy_resweep.store(true, Ordering::Release);
                false
            }
            ProcessSignal::User1 => {
                self.log_reopen.store(true, Ordering::Release);
                false
            }
        };
        self.events.send_modify(|n| *n = n.wrapping_add(1));
        first
    }

    /// Requests termination from inside the process.
    pub fn request_terminate(&self) -> bool {
        self.raise(ProcessSignal::Terminate)
    }

    pub fn terminate_requested(&self) -> bool {
        self.terminate.load(Ordering::Acquire)
    }

    /// Returns and clears the heavy resweep flag.
    pub fn take_heavy_resweep(&self) -> bool {
        self.heavy_resweep.swap(false, Ordering::AcqRel)
    }

    /// Returns and clears the log reopen flag.
    pub fn take_log_reopen(&self) -> bool {
        self.log_reopen.swap(false, Ordering::AcqRel)
    }

    /// Receiver that changes on every raised signal.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.events.subscribe()
    }

    /// Registers the OS handlers and spawns the forwarding task.
    ///
    /// Must be called from within the tokio runtime.
    pub fn install(self: &Arc<Self>) -> io::Result<JoinHandle<()>> {
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sighup = signal(SignalKind::hangup())?;
        let mut sigusr1 = signal(SignalKind::user_defined1())?;
        let bridge = Arc::clone(self);

        Ok(tokio::spawn(async move {
            loop {
                let sig = tokio::select! {
                    Some(()) = sigint.recv() => ProcessSignal::Interrupt,
                    Some(()) = sigterm.recv() => ProcessSignal::Terminate,
                    Some(()) = sighup.recv() => ProcessSignal::HangUp,
                    Some(()) = sigusr1.recv() => ProcessSignal::User1,
                    else => break,
                };

                if bridge.raise(sig) {
                    warn!(signal = %sig, "Got signal, exiting...");
                } else {
                    debug!(signal = %sig, "Signal received");
                }
            }
        }))
    }
}

fn handled_set() -> SigSet {
    let mut set = SigSet::empty();
    for sig in ProcessSignal::ALL {
        set.add(sig.os_signal());
    }
    set
}

/// Blocks the handled signals on the calling thread and returns the
/// previous mask.
pub fn block_signals() -> nix::Result<SigSet> {
    let mut previous = SigSet::empty();
    pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&handled_set()), Some(&mut previous))?;
    debug!("Termination and control signals blocked");
    Ok(previous)
}

/// Restores a mask saved by [`block_signals`] on the calling thread.
pub fn restore_signals(previous: &SigSet) -> nix::Result<()> {
    pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(previous), None)?;
    info!("Signal handlers active");
    Ok(())
}
