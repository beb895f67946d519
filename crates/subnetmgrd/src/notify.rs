//! Systemd service notification.

use sd_notify::NotifyState;
use sm_common::SmResult;
use tracing::{debug, info};

/// Sends READY / STATUS / STOPPING to systemd when started with
/// `Type=notify`. Every call is a no-op without `NOTIFY_SOCKET`.
#[derive(Clone, Debug)]
pub struct SystemdNotifier {
    enabled: bool,
}

impl SystemdNotifier {
    pub fn new() -> Self {
        let enabled = std::env::var_os("NOTIFY_SOCKET").is_some();
        if enabled {
            info!("Systemd notification socket detected");
        }
        Self { enabled }
    }

    /// A notifier that never sends anything.
    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn send(&self, state: &[NotifyState<'_>]) -> SmResult<()> {
        if !self.enabled {
            return Ok(());
        }
        sd_notify::notify(false, state)?;
        Ok(())
    }

    pub fn notify_ready(&self) -> SmResult<()> {
        self.send(&[NotifyState::Ready])?;
        debug!("Sent READY notification");
        Ok(())
    }

    pub fn notify_status(&self, message: &str) -> SmResult<()> {
        self.send(&[NotifyState::Status(message)])
    }

    pub fn notify_stopping(&self) -> SmResult<()> {
        self.send(&[NotifyState::Stopping])
    }
}

impl Default for SystemdNotifier {
    fn default() -> Self {
        Self::new()
    }
}
