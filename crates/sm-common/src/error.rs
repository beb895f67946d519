//! Error types for subnet manager operations.
//!
//! This module defines the error taxonomy shared by the subnet manager
//! crates. All errors implement `std::error::Error` via `thiserror`.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use fabric_types::PortGuid;

/// Result type alias for subnet manager operations.
pub type SmResult<T> = Result<T, SmError>;

/// Errors that can occur in the subnet manager control plane.
#[derive(Debug, Error)]
pub enum SmError {
    /// A sub-resource failed to allocate during `init`.
    #[error("Initialization failed: {component}: {message}")]
    Init {
        /// The component that failed (e.g., "dispatcher", "options").
        component: String,
        /// Error message.
        message: String,
    },

    /// `bind` was called on an instance that is already bound.
    #[error("Already bound to port {bound}")]
    AlreadyBound {
        /// The port recorded by the first successful bind.
        bound: PortGuid,
    },

    /// `bind` was given a GUID that does not identify a port.
    #[error("Invalid port GUID {guid}")]
    InvalidPort {
        /// The rejected GUID.
        guid: PortGuid,
    },

    /// An operation requires a successful `init` first.
    #[error("Instance not initialized: {operation}")]
    NotInitialized {
        /// The operation that was attempted.
        operation: String,
    },

    /// A routing engine callback reported failure.
    #[error("Routing engine '{engine}' failed in {stage}")]
    EngineOperation {
        /// The engine name.
        engine: String,
        /// The callback that failed.
        stage: String,
    },

    /// A configuration or input file could not be parsed.
    #[error("Parse error in {}:{line}: {message}", path.display())]
    ConfigParse {
        /// The file being parsed.
        path: PathBuf,
        /// 1-based line number (0 when the whole file is at fault).
        line: usize,
        /// Error message.
        message: String,
    },

    /// The wait primitive itself failed.
    #[error("Wait failed: {message}")]
    Wait {
        /// Error message.
        message: String,
    },

    /// The operation is not allowed while a sweep is running.
    #[error("Sweep in progress: {operation} rejected")]
    SweepInProgress {
        /// The rejected operation.
        operation: String,
    },

    /// A task could not be handed to, or did not return from, the dispatcher.
    #[error("Dispatcher error: {message}")]
    Dispatch {
        /// Error message.
        message: String,
    },

    /// Underlying IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl SmError {
    /// Creates an init error.
    pub fn init(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Init {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Creates a not-initialized error.
    pub fn not_initialized(operation: impl Into<String>) -> Self {
        Self::NotInitialized {
            operation: operation.into(),
        }
    }

    /// Creates an engine operation error.
    pub fn engine(engine: impl Into<String>, stage: impl Into<String>) -> Self {
        Self::EngineOperation {
            engine: engine.into(),
            stage: stage.into(),
        }
    }

    /// Creates a parse error for a specific line of a file.
    pub fn config_parse(
        path: impl Into<PathBuf>,
        line: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::ConfigParse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    /// Creates a wait error.
    pub fn wait(message: impl Into<String>) -> Self {
        Self::Wait {
            message: message.into(),
        }
    }

    /// Creates a sweep-in-progress error.
    pub fn sweep_in_progress(operation: impl Into<String>) -> Self {
        Self::SweepInProgress {
            operation: operation.into(),
        }
    }

    /// Creates a dispatcher error.
    pub fn dispatch(message: impl Into<String>) -> Self {
        Self::Dispatch {
            message: message.into(),
        }
    }

    /// Returns true if this error must terminate the startup sequence.
    ///
    /// Engine failures are swallowed at the sweep boundary and never
    /// stop the daemon.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            SmError::EngineOperation { .. } | SmError::SweepInProgress { .. }
        )
    }
}
