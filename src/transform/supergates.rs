use std::collections::{BTreeMap, BTreeSet, VecDeque};

use log::{debug, info};
use petgraph::algo::{dominators, toposort};
use petgraph::graphmap::DiGraphMap;
use petgraph::stable_graph::NodeIndex;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};

use crate::transform::limit_fanin;
use crate::{BlackBox, Circuit, Error, NodeKind, Result};

/// A maximal single-output region of a circuit
///
/// The fanin of a supergate can reconverge inside it, but not outside of it.
#[derive(Debug, Clone)]
pub struct Supergate {
    /// Output node
    pub root: String,
    /// All nodes, inputs included
    pub nodes: BTreeSet<String>,
    /// Nodes driven from outside the supergate
    pub inputs: BTreeSet<String>,
    /// The supergate as a standalone circuit, with the root as only output
    pub circuit: Circuit,
}

impl Supergate {
    /// Nodes computed by the supergate
    pub fn internal_nodes(&self) -> BTreeSet<String> {
        self.nodes.difference(&self.inputs).cloned().collect()
    }
}

/// Supergates of the fanin cone of an output, from the dominator tree of the cone
fn cone_supergates(c: &Circuit, output: &str) -> Result<Vec<Supergate>> {
    let mut cone = c.transitive_fanin([output])?;
    cone.insert(output.to_string());
    let mut co = c.subcircuit(&cone, false)?;
    for n in &cone {
        co.set_output(n, n == output)?;
    }
    let root = co.idx(output)?;

    // Edges are reversed, and forward edges are kept except those into the output
    let mut g: DiGraphMap<NodeIndex, ()> = DiGraphMap::new();
    g.add_node(root);
    for e in co.graph.edge_references() {
        let (u, v) = (e.source(), e.target());
        g.add_edge(v, u, ());
        if v != root {
            g.add_edge(u, v, ());
        }
    }
    let doms = dominators::simple_fast(&g, root);
    let mut children: BTreeMap<NodeIndex, BTreeSet<NodeIndex>> = BTreeMap::new();
    for i in g.nodes() {
        if let Some(d) = doms.immediate_dominator(i) {
            children.entry(d).or_default().insert(i);
        }
    }
    let no_children = BTreeSet::new();
    let children_of = |i: NodeIndex| children.get(&i).unwrap_or(&no_children);

    let mut ret = Vec::new();
    let mut frontier = VecDeque::from([root]);
    while let Some(node) = frontier.pop_front() {
        let mut sg = BTreeSet::from([node]);
        let mut fanins: VecDeque<NodeIndex> = children_of(node).iter().copied().collect();
        while let Some(fi) = fanins.pop_front() {
            sg.insert(fi);
            let ch = children_of(fi);
            if ch.len() > 1 {
                frontier.push_back(fi);
            } else {
                fanins.extend(ch.iter().copied());
            }
        }
        let root_name = co.node(node).name.clone();
        let mut circuit = co.subcircuit(co.names_of(sg), true)?;
        circuit.set_name(format!("sg_{}", root_name));
        for o in circuit.outputs() {
            circuit.set_output(&o, o == root_name)?;
        }
        circuit.set_output(&root_name, true)?;
        ret.push(Supergate {
            root: root_name,
            nodes: circuit.nodes(),
            inputs: circuit.inputs(),
            circuit,
        });
    }
    Ok(ret)
}

/// Cover of the circuit by supergates, in topological order
///
/// Gates are limited to two fanins first. Supergates are computed in the fanin cone of
/// each output and kept if they compute a node that no other supergate computes.
pub fn supergates(c: &Circuit) -> Result<Vec<Supergate>> {
    c.check_no_blackboxes()?;
    let l = limit_fanin(c, 2)?;
    let mut all: BTreeMap<(String, BTreeSet<String>), Supergate> = BTreeMap::new();
    for o in l.outputs() {
        for sg in cone_supergates(&l, &o)? {
            all.entry((sg.root.clone(), sg.nodes.clone())).or_insert(sg);
        }
    }
    let all: Vec<Supergate> = all.into_values().collect();
    debug!("{} candidate supergates in {}", all.len(), c.name());

    // Minimal cover, one supergate per root
    let internal: Vec<BTreeSet<String>> = all.iter().map(|s| s.internal_nodes()).collect();
    let mut kept: BTreeMap<String, (Supergate, BTreeSet<String>)> = BTreeMap::new();
    for (i, sg) in all.iter().enumerate() {
        let others: BTreeSet<&String> = internal
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .flat_map(|(_, s)| s.iter())
            .collect();
        if internal[i].iter().any(|n| !others.contains(n)) {
            kept.insert(sg.root.clone(), (sg.clone(), internal[i].clone()));
        }
    }
    let kept: Vec<(Supergate, BTreeSet<String>)> = kept.into_values().collect();

    // A supergate depends on those computing its inputs
    let mut g: DiGraphMap<usize, ()> = DiGraphMap::new();
    for i in 0..kept.len() {
        g.add_node(i);
        for j in 0..kept.len() {
            if i != j && kept[i].0.inputs.iter().any(|n| kept[j].1.contains(n)) {
                g.add_edge(j, i, ());
            }
        }
    }
    let order = toposort(&g, None)
        .map_err(|cycle| Error::CycleDetected(kept[cycle.node_id()].0.root.clone()))?;
    let mut slots: Vec<Option<Supergate>> = kept.into_iter().map(|(s, _)| Some(s)).collect();
    let ret: Vec<Supergate> = order.into_iter().filter_map(|i| slots[i].take()).collect();
    info!("Covered {} with {} supergates", c.name(), ret.len());
    Ok(ret)
}

/// Circuit connecting the supergates of `c` as blackbox instances
///
/// Each supergate becomes an instance `sg_{root}` whose ports are named after the nodes they
/// connect to. Returns the circuit and the supergate of each instance.
pub fn supercircuit(c: &Circuit) -> Result<(Circuit, BTreeMap<String, Supergate>)> {
    let sgs = supergates(c)?;
    let mut superc = Circuit::new(format!("{}_supergates", c.name()));
    for i in c.inputs() {
        superc.add(&i, NodeKind::Input)?;
    }
    for o in c.outputs() {
        if superc.contains(&o) {
            superc.set_output(&o, true)?;
        } else {
            superc.add(&o, NodeKind::Buf)?;
            superc.set_output(&o, true)?;
        }
    }

    let mut map = BTreeMap::new();
    for sg in sgs {
        if sg.inputs.contains(&sg.root) {
            // An input seen as an output
            continue;
        }
        let name = format!("sg_{}", sg.root);
        let bb = BlackBox::new(&name, &sg.inputs, [&sg.root]);
        let mut connections = BTreeMap::new();
        for n in sg.inputs.iter().chain([&sg.root]) {
            if !superc.contains(n) {
                superc.add(n, NodeKind::Buf)?;
            }
            connections.insert(n.clone(), n.clone());
        }
        superc.add_blackbox(&bb, &name, &connections)?;
        map.insert(name, sg);
    }
    Ok((superc, map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeOpts;

    fn tree() -> Circuit {
        let mut c = Circuit::new("tree");
        for i in ["a", "b", "c", "d"] {
            c.add(i, NodeKind::Input).unwrap();
        }
        c.add_with("x", NodeKind::Or, NodeOpts::new().fanin(["a", "b"]))
            .unwrap();
        c.add_with("y", NodeKind::Or, NodeOpts::new().fanin(["c", "d"]))
            .unwrap();
        c.add_with("o", NodeKind::And, NodeOpts::new().fanin(["x", "y"]).output(true))
            .unwrap();
        c
    }

    #[test]
    fn test_tree() {
        let sgs = supergates(&tree()).unwrap();
        let roots: Vec<&str> = sgs.iter().map(|s| s.root.as_str()).collect();
        assert_eq!(roots.len(), 3);
        assert_eq!(roots[2], "o");
        assert_eq!(sgs[2].inputs, BTreeSet::from(["x".to_string(), "y".to_string()]));
        for sg in &sgs {
            assert_eq!(sg.circuit.outputs(), BTreeSet::from([sg.root.clone()]));
        }
    }

    #[test]
    fn test_reconvergence() {
        let mut c = Circuit::new("reconv");
        for i in ["a", "b", "c"] {
            c.add(i, NodeKind::Input).unwrap();
        }
        c.add_with("x", NodeKind::Or, NodeOpts::new().fanin(["a", "b"]))
            .unwrap();
        c.add_with("y", NodeKind::Or, NodeOpts::new().fanin(["b", "c"]))
            .unwrap();
        c.add_with("o", NodeKind::And, NodeOpts::new().fanin(["x", "y"]).output(true))
            .unwrap();
        let sgs = supergates(&c).unwrap();
        assert_eq!(sgs.len(), 1);
        assert_eq!(sgs[0].root, "o");
        assert_eq!(sgs[0].inputs, c.inputs());
    }

    #[test]
    fn test_cover() {
        let mut c = Circuit::new("shared");
        for i in ["a", "b", "c"] {
            c.add(i, NodeKind::Input).unwrap();
        }
        c.add_with("x", NodeKind::And, NodeOpts::new().fanin(["a", "b"]))
            .unwrap();
        c.add_with("o1", NodeKind::Or, NodeOpts::new().fanin(["x", "c"]).output(true))
            .unwrap();
        c.add_with("o2", NodeKind::Xor, NodeOpts::new().fanin(["x", "c"]).output(true))
            .unwrap();
        let sgs = supergates(&c).unwrap();
        assert_eq!(sgs.len(), 3);
        assert_eq!(sgs[0].root, "x");
        let mut covered = BTreeSet::new();
        for (i, sg) in sgs.iter().enumerate() {
            covered.extend(sg.internal_nodes());
            // Inputs come from primary inputs or earlier supergates
            for n in &sg.inputs {
                assert!(
                    c.inputs().contains(n)
                        || sgs[..i].iter().any(|s| s.internal_nodes().contains(n)),
                    "{} is not computed before {}",
                    n,
                    sg.root
                );
            }
        }
        assert_eq!(covered, c.filter_kind(&[NodeKind::And, NodeKind::Or, NodeKind::Xor]));
    }

    #[test]
    fn test_supercircuit() {
        let (superc, map) = supercircuit(&tree()).unwrap();
        assert_eq!(superc.blackboxes().len(), 3);
        assert_eq!(map.len(), 3);
        assert_eq!(map["sg_o"].root, "o");
        assert_eq!(superc.fanin(["o"]).unwrap(), BTreeSet::from(["sg_o.o".to_string()]));
        assert_eq!(superc.fanin(["sg_o.x"]).unwrap(), BTreeSet::from(["x".to_string()]));
        assert_eq!(superc.outputs(), BTreeSet::from(["o".to_string()]));
    }
}
