//! Fabric discovery collaborator.
//!
//! Discovery runs on a dispatcher worker without the shared lock held. It
//! returns a freshly staged [`Topology`], or `None` when a light sweep found
//! nothing that requires replacing the committed one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fabric_types::PortGuid;
use sm_common::MadPool;
use thiserror::Error;
use tracing::debug;

use crate::subnet::Topology;

/// Discovery failures. Any of them aborts the sweep.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("Local port {0} is not part of the fabric")]
    LocalPortMissing(PortGuid),

    #[error("No response from {0}")]
    Unreachable(PortGuid),

    #[error("Transport failure: {0}")]
    Transport(String),
}

/// Parameters of one discovery pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryRequest {
    pub heavy: bool,
    pub bound_port: PortGuid,
}

/// Source of fabric topology.
pub trait Discovery: Send + Sync {
    /// Probes the fabric.
    ///
    /// Every management transaction issued must be accounted in `mads`.
    fn discover(
        &self,
        request: &DiscoveryRequest,
        mads: &Arc<MadPool>,
    ) -> Result<Option<Topology>, DiscoveryError>;
}

/// Discovery over a fabric described in configuration.
///
/// A heavy pass, or the first pass, probes every node. Later light passes
/// only probe the local port and report the topology as unchanged.
#[derive(Debug)]
pub struct StaticDiscovery {
    topology: Topology,
    served: AtomicBool,
}

impl StaticDiscovery {
    pub fn new(topology: Topology) -> Self {
        Self {
            topology,
            served: AtomicBool::new(false),
        }
    }
}

impl Discovery for StaticDiscovery {
    fn discover(
        &self,
        request: &DiscoveryRequest,
        mads: &Arc<MadPool>,
    ) -> Result<Option<Topology>, DiscoveryError> {
        if !self.topology.is_empty() && self.topology.node(request.bound_port).is_none() {
            return Err(DiscoveryError::LocalPortMissing(request.bound_port));
        }

        if !request.heavy && self.served.load(Ordering::Acquire) {
            mads.begin().complete();
            debug!("Light discovery: fabric unchanged");
            return Ok(None);
        }

        for node in self.topology.nodes() {
            mads.begin().complete();
            debug!(guid = %node.guid, lid = %node.lid, kind = %node.kind, "Probed node");
        }
        self.served.store(true, Ordering::Release);
        Ok(Some(self.topology.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subnet::Node;
    use fabric_types::{Lid, NodeKind};

    fn fabric() -> Topology {
        let mut topo = Topology::new();
        for (guid, lid) in [(1u64, 1u16), (2, 2), (3, 3)] {
            topo.add_node(Node {
                guid: PortGuid::new(guid),
                lid: Lid::new(lid).unwrap(),
                kind: NodeKind::Ca,
                num_ports: 1,
                description: String::new(),
            })
            .unwrap();
        }
        topo
    }

    #[test]
    fn test_first_pass_probes_every_node() {
        let mads = MadPool::new();
        let discovery = StaticDiscovery::new(fabric());
        let request = DiscoveryRequest {
            heavy: false,
            bound_port: PortGuid::new(1),
        };

        let topo = discovery.discover(&request, &mads).unwrap();
        assert_eq!(topo.map(|t| t.len()), Some(3));
        assert_eq!(mads.issued(), 3);
        assert_eq!(mads.outstanding(), 0);

        assert_eq!(discovery.discover(&request, &mads).unwrap(), None);
        assert_eq!(mads.issued(), 4);
    }

    #[test]
    fn test_heavy_pass_always_rediscovers() {
        let mads = MadPool::new();
        let discovery = StaticDiscovery::new(fabric());
        let request = DiscoveryRequest {
            heavy: true,
            bound_port: PortGuid::new(2),
        };
        assert!(discovery.discover(&request, &mads).unwrap().is_some());
        assert!(discovery.discover(&request, &mads).unwrap().is_some());
    }

    #[test]
    fn test_unknown_local_port() {
        let mads = MadPool::new();
        let discovery = StaticDiscovery::new(fabric());
        let request = DiscoveryRequest {
            heavy: true,
            bound_port: PortGuid::new(9),
        };
        assert_eq!(
            discovery.discover(&request, &mads),
            Err(DiscoveryError::LocalPortMissing(PortGuid::new(9)))
        );
    }
}
