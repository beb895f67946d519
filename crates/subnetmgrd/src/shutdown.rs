//! Shutdown gate.
//!
//! Outstanding management transactions never block exit. The gate gives
//! them a bounded grace period, reports what is still out, and wakes anyone
//! waiting on the pool so no thread stays parked.

use std::time::Duration;

use sm_common::{MadPool, WaitStatus};
use tracing::{info, warn};

/// What the gate observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Transactions still out when exit was forced
    pub outstanding: u32,
    pub drained: bool,
}

/// Runs the gate. Waits at most `grace`.
pub async fn shutdown_gate(mads: &MadPool, grace: Duration) -> ShutdownReport {
    if mads.outstanding() > 0 && !grace.is_zero() {
        let status = mads.wait_drained(Some(grace)).await;
        if status != WaitStatus::Success {
            info!(status = %status, "Grace period ended with transactions out");
        }
    }

    let outstanding = mads.outstanding();
    if outstanding > 0 {
        warn!("There are still {} MADs out. Forcing the exit", outstanding);
    }
    mads.release_waiters();

    ShutdownReport {
        outstanding,
        drained: outstanding == 0,
    }
}
