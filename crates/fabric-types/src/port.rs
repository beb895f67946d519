//! Port and node classification types.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Link state of a fabric port.
///
/// Ordered so that `state > LinkState::Down` means "physically connected".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    /// Port is down (default for unknown ports).
    #[default]
    Down,
    /// Link trained, waiting for the subnet manager.
    Init,
    /// Subnet manager configured the port.
    Armed,
    /// Port forwards traffic.
    Active,
}

impl LinkState {
    /// Returns true if the link is above Down.
    pub fn is_connected(&self) -> bool {
        *self > LinkState::Down
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkState::Down => "DOWN",
            LinkState::Init => "INIT",
            LinkState::Armed => "ARMED",
            LinkState::Active => "ACTIVE",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for LinkState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "down" => Ok(LinkState::Down),
            "init" => Ok(LinkState::Init),
            "armed" => Ok(LinkState::Armed),
            "active" => Ok(LinkState::Active),
            _ => Err(ParseError::InvalidLinkState(s.to_string())),
        }
    }
}

/// Kind of fabric node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Switch: owns a forwarding table.
    Switch,
    /// Channel adapter (host endpoint).
    Ca,
    /// Router.
    Router,
}

impl NodeKind {
    /// Returns true if the node forwards packets through a unicast table.
    pub const fn is_switch(&self) -> bool {
        matches!(self, NodeKind::Switch)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Switch => write!(f, "switch"),
            NodeKind::Ca => write!(f, "ca"),
            NodeKind::Router => write!(f, "router"),
        }
    }
}

impl FromStr for NodeKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "switch" | "sw" => Ok(NodeKind::Switch),
            "ca" | "hca" => Ok(NodeKind::Ca),
            "router" => Ok(NodeKind::Router),
            _ => Err(ParseError::InvalidNodeKind(s.to_string())),
        }
    }
}
