//! Subnet model: topology, forwarding tables, and sweep bookkeeping.
//!
//! Everything here is plain data. Concurrency is handled by wrapping the
//! [`SubnetModel`] in a [`SharedLock`](sm_common::SharedLock); sweeps build a
//! fresh [`Topology`] and [`ForwardingTables`] outside the lock and commit
//! them in one step.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use fabric_types::{Lid, NodeKind, PortGuid, PortNum};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while assembling a topology.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("Duplicate node {0}")]
    DuplicateNode(PortGuid),

    #[error("LID {lid} assigned to both {first} and {second}")]
    DuplicateLid {
        lid: Lid,
        first: PortGuid,
        second: PortGuid,
    },

    #[error("Link references unknown node {0}")]
    UnknownNode(PortGuid),

    #[error("Port {port} out of range on {guid} ({num_ports} ports)")]
    PortOutOfRange {
        guid: PortGuid,
        port: PortNum,
        num_ports: u8,
    },

    #[error("Port {port} on {guid} is already linked")]
    PortInUse { guid: PortGuid, port: PortNum },

    #[error("Node {0} cannot link to itself")]
    SelfLink(PortGuid),
}

fn default_num_ports() -> u8 {
    1
}

/// A fabric node as seen by discovery.
///
/// Each node is addressed by a single port GUID and LID; switch ports are
/// numbered from 1 to `num_ports`, port 0 being the management port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub guid: PortGuid,
    pub lid: Lid,
    pub kind: NodeKind,
    #[serde(default = "default_num_ports")]
    pub num_ports: u8,
    #[serde(default)]
    pub description: String,
}

/// A cable between two node ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub a: PortGuid,
    pub a_port: PortNum,
    pub b: PortGuid,
    pub b_port: PortNum,
}

/// Static description of a fabric, as written in configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyDescription {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl TopologyDescription {
    /// Validates the description and builds a [`Topology`] from it.
    pub fn build(&self) -> Result<Topology, TopologyError> {
        let mut topology = Topology::new();
        for node in &self.nodes {
            topology.add_node(node.clone())?;
        }
        for link in &self.links {
            topology.add_link(*link)?;
        }
        Ok(topology)
    }
}

/// Validated fabric graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    nodes: BTreeMap<PortGuid, Node>,
    links: Vec<Link>,
    used_ports: BTreeSet<(PortGuid, PortNum)>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node; GUIDs and LIDs must be unique.
    pub fn add_node(&mut self, node: Node) -> Result<(), TopologyError> {
        if self.nodes.contains_key(&node.guid) {
            return Err(TopologyError::DuplicateNode(node.guid));
        }
        if let Some(other) = self.nodes.values().find(|n| n.lid == node.lid) {
            return Err(TopologyError::DuplicateLid {
                lid: node.lid,
                first: other.guid,
                second: node.guid,
            });
        }
        self.nodes.insert(node.guid, node);
        Ok(())
    }

    /// Adds a link between two known nodes on free, in-range ports.
    pub fn add_link(&mut self, link: Link) -> Result<(), TopologyError> {
        if link.a == link.b {
            return Err(TopologyError::SelfLink(link.a));
        }
        for (guid, port) in [(link.a, link.a_port), (link.b, link.b_port)] {
            let node = self
                .nodes
                .get(&guid)
                .ok_or(TopologyError::UnknownNode(guid))?;
            if port.as_u8() == 0 || port.as_u8() > node.num_ports {
                return Err(TopologyError::PortOutOfRange {
                    guid,
                    port,
                    num_ports: node.num_ports,
                });
            }
            if self.used_ports.contains(&(guid, port)) {
                return Err(TopologyError::PortInUse { guid, port });
            }
        }
        self.used_ports.insert((link.a, link.a_port));
        self.used_ports.insert((link.b, link.b_port));
        self.links.push(link);
        Ok(())
    }

    pub fn node(&self, guid: PortGuid) -> Option<&Node> {
        self.nodes.get(&guid)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn switches(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|n| n.kind.is_switch())
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns `(local port, remote node)` for every link on `guid`.
    pub fn neighbors(&self, guid: PortGuid) -> Vec<(PortNum, PortGuid)> {
        let mut out: Vec<_> = self
            .links
            .iter()
            .filter_map(|l| {
                if l.a == guid {
                    Some((l.a_port, l.b))
                } else if l.b == guid {
                    Some((l.b_port, l.a))
                } else {
                    None
                }
            })
            .collect();
        out.sort();
        out
    }

    /// Port through which traffic addressed to `guid` enters the node.
    ///
    /// Port 0 for switches, the lowest linked port for end nodes.
    pub fn attach_port(&self, guid: PortGuid) -> PortNum {
        match self.nodes.get(&guid) {
            Some(node) if !node.kind.is_switch() => self
                .neighbors(guid)
                .first()
                .map(|(port, _)| *port)
                .unwrap_or_default(),
            _ => PortNum::new(0),
        }
    }
}

/// Per-switch linear forwarding tables: destination LID to out port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardingTables {
    switches: BTreeMap<PortGuid, BTreeMap<Lid, PortNum>>,
}

impl ForwardingTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, switch: PortGuid, lid: Lid, port: PortNum) {
        self.switches.entry(switch).or_default().insert(lid, port);
    }

    pub fn get(&self, switch: PortGuid, lid: Lid) -> Option<PortNum> {
        self.switches.get(&switch)?.get(&lid).copied()
    }

    pub fn switch(&self, switch: PortGuid) -> Option<&BTreeMap<Lid, PortNum>> {
        self.switches.get(&switch)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PortGuid, &BTreeMap<Lid, PortNum>)> {
        self.switches.iter()
    }

    pub fn switch_count(&self) -> usize {
        self.switches.len()
    }

    pub fn entry_count(&self) -> usize {
        self.switches.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.switches.is_empty()
    }
}

/// A port excluded from path equalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IgnoredPort {
    pub guid: PortGuid,
    pub port: PortNum,
}

impl fmt::Display for IgnoredPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} port {}", self.guid, self.port)
    }
}

/// The mutable subnet aggregate guarded by the shared lock.
#[derive(Debug, Default)]
pub struct SubnetModel {
    topology: Topology,
    tables: ForwardingTables,
    ignored: BTreeSet<IgnoredPort>,
    bound_port: Option<PortGuid>,
    subnet_up: bool,
    sweep_count: u64,
    last_sweep_heavy: bool,
    force_heavy_sweep: bool,
}

impl SubnetModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn tables(&self) -> &ForwardingTables {
        &self.tables
    }

    pub fn bound_port(&self) -> Option<PortGuid> {
        self.bound_port
    }

    pub fn set_bound_port(&mut self, guid: PortGuid) {
        self.bound_port = Some(guid);
    }

    pub fn is_subnet_up(&self) -> bool {
        self.subnet_up
    }

    pub fn sweep_count(&self) -> u64 {
        self.sweep_count
    }

    pub fn last_sweep_heavy(&self) -> bool {
        self.last_sweep_heavy
    }

    /// Installs the results of a successful sweep.
    pub fn commit(&mut self, topology: Topology, tables: ForwardingTables, heavy: bool) {
        self.topology = topology;
        self.tables = tables;
        self.subnet_up = true;
        self.sweep_count += 1;
        self.last_sweep_heavy = heavy;
    }

    pub fn ignored_ports(&self) -> &BTreeSet<IgnoredPort> {
        &self.ignored
    }

    pub fn is_port_ignored(&self, guid: PortGuid, port: PortNum) -> bool {
        self.ignored.contains(&IgnoredPort { guid, port })
    }

    /// Adds ignored ports and returns how many were new.
    ///
    /// Any change forces the next sweep to be heavy.
    pub fn apply_ignored_ports(&mut self, ports: impl IntoIterator<Item = IgnoredPort>) -> usize {
        let before = self.ignored.len();
        self.ignored.extend(ports);
        let added = self.ignored.len() - before;
        if added > 0 {
            self.force_heavy_sweep = true;
        }
        added
    }

    /// Makes the next sweep heavy regardless of how it was requested.
    pub fn request_heavy_sweep(&mut self) {
        self.force_heavy_sweep = true;
    }

    pub fn take_force_heavy_sweep(&mut self) -> bool {
        std::mem::take(&mut self.force_heavy_sweep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn node(guid: u64, lid: u16, kind: NodeKind, num_ports: u8) -> Node {
        Node {
            guid: PortGuid::new(guid),
            lid: Lid::new(lid).unwrap(),
            kind,
            num_ports,
            description: String::new(),
        }
    }

    fn link(a: u64, a_port: u8, b: u64, b_port: u8) -> Link {
        Link {
            a: PortGuid::new(a),
            a_port: PortNum::new(a_port),
            b: PortGuid::new(b),
            b_port: PortNum::new(b_port),
        }
    }

    #[test]
    fn test_build_valid_description() {
        let desc = TopologyDescription {
            nodes: vec![
                node(1, 1, NodeKind::Switch, 4),
                node(2, 2, NodeKind::Ca, 1),
            ],
            links: vec![link(1, 1, 2, 1)],
        };
        let topo = desc.build().unwrap();
        assert_eq!(topo.len(), 2);
        assert_eq!(topo.switches().count(), 1);
        assert_eq!(
            topo.neighbors(PortGuid::new(1)),
            vec![(PortNum::new(1), PortGuid::new(2))]
        );
        assert_eq!(topo.attach_port(PortGuid::new(2)), PortNum::new(1));
        assert_eq!(topo.attach_port(PortGuid::new(1)), PortNum::new(0));
    }

    #[test]
    fn test_duplicate_lid_rejected() {
        let mut topo = Topology::new();
        topo.add_node(node(1, 5, NodeKind::Switch, 2)).unwrap();
        let err = topo.add_node(node(2, 5, NodeKind::Ca, 1)).unwrap_err();
        assert!(matches!(err, TopologyError::DuplicateLid { .. }));
    }

    #[test]
    fn test_link_validation() {
        let mut topo = Topology::new();
        topo.add_node(node(1, 1, NodeKind::Switch, 2)).unwrap();
        topo.add_node(node(2, 2, NodeKind::Ca, 1)).unwrap();

        assert_eq!(
            topo.add_link(link(1, 1, 3, 1)),
            Err(TopologyError::UnknownNode(PortGuid::new(3)))
        );
        assert!(matches!(
            topo.add_link(link(1, 3, 2, 1)),
            Err(TopologyError::PortOutOfRange { .. })
        ));
        assert_eq!(
            topo.add_link(link(1, 1, 1, 2)),
            Err(TopologyError::SelfLink(PortGuid::new(1)))
        );
        topo.add_link(link(1, 1, 2, 1)).unwrap();
        assert!(matches!(
            topo.add_link(link(1, 2, 2, 1)),
            Err(TopologyError::PortInUse { .. })
        ));
    }

    #[test]
    fn test_commit_updates_bookkeeping() {
        let mut model = SubnetModel::new();
        assert!(!model.is_subnet_up());

        let mut tables = ForwardingTables::new();
        tables.set(PortGuid::new(1), Lid::new(2).unwrap(), PortNum::new(3));
        model.commit(Topology::new(), tables, true);

        assert!(model.is_subnet_up());
        assert_eq!(model.sweep_count(), 1);
        assert!(model.last_sweep_heavy());
        assert_eq!(
            model.tables().get(PortGuid::new(1), Lid::new(2).unwrap()),
            Some(PortNum::new(3))
        );
        assert_eq!(model.tables().entry_count(), 1);
    }

    #[test]
    fn test_ignored_ports_force_heavy_sweep() {
        let mut model = SubnetModel::new();
        let port = IgnoredPort {
            guid: PortGuid::new(0xabc),
            port: PortNum::new(1),
        };
        assert_eq!(model.apply_ignored_ports([port, port]), 1);
        assert!(model.is_port_ignored(PortGuid::new(0xabc), PortNum::new(1)));
        assert!(model.take_force_heavy_sweep());
        assert!(!model.take_force_heavy_sweep());

        assert_eq!(model.apply_ignored_ports([port]), 0);
        assert!(!model.take_force_heavy_sweep());
    }
}
