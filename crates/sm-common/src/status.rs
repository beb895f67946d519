//! Routing engine and wait status types.

use std::fmt;

use crate::{SmError, SmResult};

/// Two-valued result of a routing engine callback.
///
/// Engines never return rich errors; a failure aborts the current sweep
/// without committing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineStatus {
    /// Callback completed
    Success,
    /// Callback failed
    Failure,
}

impl EngineStatus {
    /// Returns true if the callback completed.
    pub fn is_success(&self) -> bool {
        matches!(self, EngineStatus::Success)
    }

    /// Returns true if the callback failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, EngineStatus::Failure)
    }
}

impl From<bool> for EngineStatus {
    fn from(ok: bool) -> Self {
        if ok {
            EngineStatus::Success
        } else {
            EngineStatus::Failure
        }
    }
}

/// Outcome of waiting for the subnet to come up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitStatus {
    /// A sweep produced an up subnet
    Success,
    /// The wait period elapsed
    Timeout,
    /// An external signal arrived during an interruptible wait
    Interrupted,
    /// The wait primitive failed
    Error,
}

impl WaitStatus {
    /// Returns the status name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitStatus::Success => "success",
            WaitStatus::Timeout => "timeout",
            WaitStatus::Interrupted => "interrupted",
            WaitStatus::Error => "error",
        }
    }

    /// Converts a primitive failure into [`SmError::Wait`].
    ///
    /// Timeout and interruption are ordinary outcomes and pass through.
    pub fn check(self) -> SmResult<WaitStatus> {
        match self {
            WaitStatus::Error => Err(SmError::wait("wait primitive failed")),
            status => Ok(status),
        }
    }
}

impl fmt::Display for WaitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_status_classification() {
        assert!(EngineStatus::Success.is_success());
        assert!(!EngineStatus::Success.is_failure());
        assert!(EngineStatus::Failure.is_failure());
    }

    #[test]
    fn test_engine_status_from_bool() {
        assert_eq!(EngineStatus::from(true), EngineStatus::Success);
        assert_eq!(EngineStatus::from(false), EngineStatus::Failure);
    }

    #[test]
    fn test_wait_status_display() {
        assert_eq!(WaitStatus::Timeout.to_string(), "timeout");
        assert_eq!(WaitStatus::Interrupted.as_str(), "interrupted");
    }

    #[test]
    fn test_wait_status_check() {
        assert_eq!(WaitStatus::Timeout.check().unwrap(), WaitStatus::Timeout);
        assert_eq!(WaitStatus::Interrupted.check().unwrap(), WaitStatus::Interrupted);
        assert!(matches!(WaitStatus::Error.check(), Err(SmError::Wait { .. })));
    }
}
