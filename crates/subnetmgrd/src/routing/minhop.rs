//! Minimum-hop routing.
//!
//! For every switch and destination LID the engine keeps the set of out
//! ports lying on a shortest path, then picks the least used one. Ignored
//! destination ports still get routes but do not count toward port usage.

use std::collections::{BTreeMap, HashMap, VecDeque};

use fabric_types::{Lid, PortGuid, PortNum};
use parking_lot::Mutex;
use sm_common::EngineStatus;
use tracing::{debug, info, warn};

use super::{RoutingEngine, SweepContext};
use crate::subnet::{ForwardingTables, IgnoredPort, Topology};

/// Shortest-path candidates for one switch: destination LID to
/// `(hops, ports)`.
type Candidates = BTreeMap<Lid, (u32, Vec<PortNum>)>;

#[derive(Debug, Default)]
struct HopMatrix {
    switches: BTreeMap<PortGuid, Candidates>,
    /// Destinations excluded from port usage balancing
    unbalanced: Vec<Lid>,
}

/// The default routing engine.
#[derive(Debug, Default)]
pub struct MinHopEngine {
    matrix: Mutex<Option<HopMatrix>>,
}

impl MinHopEngine {
    pub const NAME: &'static str = "minhop";

    pub fn new() -> Self {
        Self::default()
    }
}

/// Hop distances from `start`, moving only through switches.
fn hops_from(topology: &Topology, start: PortGuid) -> HashMap<PortGuid, u32> {
    let mut dist = HashMap::new();
    let mut queue = VecDeque::new();
    dist.insert(start, 0);
    queue.push_back(start);

    while let Some(guid) = queue.pop_front() {
        let here = dist[&guid];
        let transit = guid == start || topology.node(guid).is_some_and(|n| n.kind.is_switch());
        if !transit {
            continue;
        }
        for (_, next) in topology.neighbors(guid) {
            if !dist.contains_key(&next) {
                dist.insert(next, here + 1);
                queue.push_back(next);
            }
        }
    }
    dist
}

fn build_matrix(topology: &Topology, ignored: &[IgnoredPort]) -> HopMatrix {
    let distances: HashMap<PortGuid, HashMap<PortGuid, u32>> = topology
        .switches()
        .map(|sw| (sw.guid, hops_from(topology, sw.guid)))
        .collect();

    let mut matrix = HopMatrix::default();
    for dest in topology.nodes() {
        let port = topology.attach_port(dest.guid);
        if ignored.contains(&IgnoredPort {
            guid: dest.guid,
            port,
        }) {
            matrix.unbalanced.push(dest.lid);
        }
    }

    for switch in topology.switches() {
        let mut candidates = Candidates::new();
        for dest in topology.nodes() {
            if dest.guid == switch.guid {
                candidates.insert(dest.lid, (0, vec![PortNum::new(0)]));
                continue;
            }

            let mut best: Option<(u32, Vec<PortNum>)> = None;
            for (port, next) in topology.neighbors(switch.guid) {
                let hops = if next == dest.guid {
                    Some(1)
                } else {
                    distances
                        .get(&next)
                        .and_then(|d| d.get(&dest.guid))
                        .map(|h| h + 1)
                };
                let Some(hops) = hops else { continue };
                best = match best.take() {
                    Some((min, mut ports)) if hops == min => {
                        ports.push(port);
                        Some((min, ports))
                    }
                    Some((min, ports)) if hops > min => Some((min, ports)),
                    _ => Some((hops, vec![port])),
                };
            }
            if let Some(entry) = best {
                candidates.insert(dest.lid, entry);
            }
        }
        matrix.switches.insert(switch.guid, candidates);
    }
    matrix
}

impl RoutingEngine for MinHopEngine {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn build_topology(&self, ctx: &SweepContext) -> EngineStatus {
        let topology = ctx.topology();
        if topology.is_empty() {
            warn!("minhop: empty topology");
            return EngineStatus::Failure;
        }
        if topology.switches().next().is_none() {
            warn!("minhop: no switches to route");
            return EngineStatus::Failure;
        }

        let ignored: Vec<IgnoredPort> = ctx
            .subnet()
            .with(|model| model.ignored_ports().iter().copied().collect());
        let matrix = build_matrix(topology, &ignored);
        debug!(
            switches = matrix.switches.len(),
            unbalanced = matrix.unbalanced.len(),
            "minhop: hop matrix built"
        );
        *self.matrix.lock() = Some(matrix);
        EngineStatus::Success
    }

    fn build_forwarding_tables(&self, ctx: &SweepContext) -> EngineStatus {
        let Some(matrix) = self.matrix.lock().take() else {
            warn!("minhop: forwarding tables requested before hop matrix");
            return EngineStatus::Failure;
        };

        let mut tables = ForwardingTables::new();
        for (switch, candidates) in &matrix.switches {
            let mut usage: HashMap<PortNum, u32> = HashMap::new();
            for (lid, (_, ports)) in candidates {
                let Some(&port) = ports
                    .iter()
                    .min_by_key(|p| (usage.get(*p).copied().unwrap_or(0), **p))
                else {
                    continue;
                };
                tables.set(*switch, *lid, port);
                if port.as_u8() != 0 && !matrix.unbalanced.contains(lid) {
                    *usage.entry(port).or_insert(0) += 1;
                }
            }
        }

        info!(
            switches = tables.switch_count(),
            entries = tables.entry_count(),
            heavy = ctx.is_heavy(),
            "minhop: forwarding tables computed"
        );
        ctx.stage_tables(tables);
        EngineStatus::Success
    }

    fn dump_tables(&self, ctx: &SweepContext) {
        ctx.subnet().with(|model| {
            for (switch, entries) in model.tables().iter() {
                for (lid, port) in entries {
                    debug!(switch = %switch, lid = %lid, port = %port, "LFT entry");
                }
            }
        });
    }

    fn release(&self) {
        self.matrix.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subnet::{Link, Node, SubnetModel};
    use fabric_types::NodeKind;
    use pretty_assertions::assert_eq;
    use sm_common::SharedLock;

    fn guid(n: u64) -> PortGuid {
        PortGuid::new(n)
    }

    fn lid(n: u16) -> Lid {
        Lid::new(n).unwrap()
    }

    fn add(topo: &mut Topology, g: u64, l: u16, kind: NodeKind, ports: u8) {
        topo.add_node(Node {
            guid: guid(g),
            lid: lid(l),
            kind,
            num_ports: ports,
            description: String::new(),
        })
        .unwrap();
    }

    fn connect(topo: &mut Topology, a: u64, ap: u8, b: u64, bp: u8) {
        topo.add_link(Link {
            a: guid(a),
            a_port: PortNum::new(ap),
            b: guid(b),
            b_port: PortNum::new(bp),
        })
        .unwrap();
    }

    /// Two switches joined by two parallel cables, two hosts on each.
    ///
    /// ```text
    /// h10 -1- s1 =2,3= s2 -1- h20
    ///          \-4- h11        \-4- h21
    /// ```
    fn dual_link_fabric() -> Topology {
        let mut t = Topology::new();
        add(&mut t, 1, 1, NodeKind::Switch, 4);
        add(&mut t, 2, 2, NodeKind::Switch, 4);
        add(&mut t, 10, 10, NodeKind::Ca, 1);
        add(&mut t, 11, 11, NodeKind::Ca, 1);
        add(&mut t, 20, 20, NodeKind::Ca, 1);
        add(&mut t, 21, 21, NodeKind::Ca, 1);
        connect(&mut t, 1, 1, 10, 1);
        connect(&mut t, 1, 4, 11, 1);
        connect(&mut t, 1, 2, 2, 2);
        connect(&mut t, 1, 3, 2, 3);
        connect(&mut t, 2, 1, 20, 1);
        connect(&mut t, 2, 4, 21, 1);
        t
    }

    fn run(engine: &MinHopEngine, ctx: &SweepContext) -> ForwardingTables {
        assert_eq!(engine.build_topology(ctx), EngineStatus::Success);
        assert_eq!(engine.build_forwarding_tables(ctx), EngineStatus::Success);
        ctx.take_staged_tables().unwrap()
    }

    #[test]
    fn test_routes_direct_and_transit() {
        let ctx = SweepContext::new(true, dual_link_fabric(), SharedLock::new(SubnetModel::new()));
        let tables = run(&MinHopEngine::new(), &ctx);

        assert_eq!(tables.get(guid(1), lid(1)), Some(PortNum::new(0)));
        assert_eq!(tables.get(guid(1), lid(10)), Some(PortNum::new(1)));
        assert_eq!(tables.get(guid(1), lid(11)), Some(PortNum::new(4)));
        assert_eq!(tables.get(guid(2), lid(20)), Some(PortNum::new(1)));
        assert_eq!(tables.switch_count(), 2);
        assert_eq!(tables.entry_count(), 12);
    }

    #[test]
    fn test_parallel_links_are_balanced() {
        let ctx = SweepContext::new(true, dual_link_fabric(), SharedLock::new(SubnetModel::new()));
        let tables = run(&MinHopEngine::new(), &ctx);

        // s1 reaches s2, h20 and h21 over ports 2 and 3
        let ports: Vec<_> = [2, 20, 21]
            .iter()
            .map(|l| tables.get(guid(1), lid(*l)).unwrap().as_u8())
            .collect();
        assert_eq!(ports, vec![2, 3, 2]);
    }

    #[test]
    fn test_ignored_destination_not_counted() {
        let subnet = SharedLock::new(SubnetModel::new());
        subnet.with(|m| {
            m.apply_ignored_ports([IgnoredPort {
                guid: guid(2),
                port: PortNum::new(0),
            }])
        });
        let ctx = SweepContext::new(true, dual_link_fabric(), subnet);
        let tables = run(&MinHopEngine::new(), &ctx);

        // s2 itself no longer consumes port 2, so h20 takes it
        let ports: Vec<_> = [2, 20, 21]
            .iter()
            .map(|l| tables.get(guid(1), lid(*l)).unwrap().as_u8())
            .collect();
        assert_eq!(ports, vec![2, 2, 3]);
    }

    #[test]
    fn test_empty_topology_fails() {
        let engine = MinHopEngine::new();
        let ctx = SweepContext::new(false, Topology::new(), SharedLock::new(SubnetModel::new()));
        assert_eq!(engine.build_topology(&ctx), EngineStatus::Failure);
        assert_eq!(engine.build_forwarding_tables(&ctx), EngineStatus::Failure);
        assert!(ctx.take_staged_tables().is_none());
    }

    #[test]
    fn test_unreachable_destination_has_no_entry() {
        let mut t = dual_link_fabric();
        add(&mut t, 30, 30, NodeKind::Ca, 1);
        let ctx = SweepContext::new(true, t, SharedLock::new(SubnetModel::new()));
        let tables = run(&MinHopEngine::new(), &ctx);
        assert_eq!(tables.get(guid(1), lid(30)), None);
    }
}
