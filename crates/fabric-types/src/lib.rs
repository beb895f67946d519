//! Common fabric types for subnet management.
//!
//! This crate provides type-safe representations of the identifiers used
//! throughout the subnet manager control plane:
//!
//! - [`PortGuid`]: 64-bit fabric port identifiers
//! - [`Lid`]: Local identifiers assigned to ports
//! - [`PortNum`]: Physical port numbers on a node
//! - [`LinkState`]: Port link state classifications
//! - [`NodeKind`]: Switch / channel adapter / router classification

mod guid;
mod lid;
mod port;

pub use guid::PortGuid;
pub use lid::{Lid, PortNum};
pub use port::{LinkState, NodeKind};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid port GUID format: {0}")]
    InvalidGuid(String),

    #[error("invalid LID: {0} (must be 1-49151)")]
    InvalidLid(u16),

    #[error("invalid port number: {0}")]
    InvalidPortNum(String),

    #[error("invalid link state: {0}")]
    InvalidLinkState(String),

    #[error("invalid node kind: {0}")]
    InvalidNodeKind(String),
}
