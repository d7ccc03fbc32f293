use std::collections::{BTreeMap, BTreeSet};

use fxhash::FxHashMap;
use log::{debug, info};
use petgraph::algo::has_path_connecting;
use petgraph::stable_graph::NodeIndex;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;

use crate::transform::expose_registers;
use crate::{Circuit, Error, NodeKind, Result};

/// Order of the nodes obtained by greedy source and sink removal
///
/// Edges going backward in this order form a small feedback arc set.
fn greedy_order(c: &Circuit) -> Vec<NodeIndex> {
    let g = &c.graph;
    let mut remaining: BTreeSet<NodeIndex> = g.node_indices().collect();
    let mut in_deg: FxHashMap<NodeIndex, isize> = FxHashMap::default();
    let mut out_deg: FxHashMap<NodeIndex, isize> = FxHashMap::default();
    for e in g.edge_references() {
        if e.source() != e.target() {
            *out_deg.entry(e.source()).or_default() += 1;
            *in_deg.entry(e.target()).or_default() += 1;
        }
    }
    let degree = |m: &FxHashMap<NodeIndex, isize>, i: NodeIndex| m.get(&i).copied().unwrap_or(0);

    let mut s1 = Vec::new();
    let mut s2 = Vec::new();
    let remove = |i: NodeIndex,
                  remaining: &mut BTreeSet<NodeIndex>,
                  in_deg: &mut FxHashMap<NodeIndex, isize>,
                  out_deg: &mut FxHashMap<NodeIndex, isize>| {
        remaining.remove(&i);
        for j in g.neighbors_directed(i, Direction::Outgoing) {
            if j != i {
                *in_deg.entry(j).or_default() -= 1;
            }
        }
        for j in g.neighbors_directed(i, Direction::Incoming) {
            if j != i {
                *out_deg.entry(j).or_default() -= 1;
            }
        }
    };

    while !remaining.is_empty() {
        loop {
            let sinks: Vec<NodeIndex> = remaining
                .iter()
                .copied()
                .filter(|&i| degree(&out_deg, i) == 0)
                .collect();
            if sinks.is_empty() {
                break;
            }
            for i in sinks {
                remove(i, &mut remaining, &mut in_deg, &mut out_deg);
                s2.push(i);
            }
        }
        loop {
            let sources: Vec<NodeIndex> = remaining
                .iter()
                .copied()
                .filter(|&i| degree(&in_deg, i) == 0)
                .collect();
            if sources.is_empty() {
                break;
            }
            for i in sources {
                remove(i, &mut remaining, &mut in_deg, &mut out_deg);
                s1.push(i);
            }
        }
        let best = remaining
            .iter()
            .copied()
            .fold(None, |best: Option<(NodeIndex, isize)>, i| {
                let delta = degree(&out_deg, i) - degree(&in_deg, i);
                match best {
                    Some((_, d)) if d >= delta => best,
                    _ => Some((i, delta)),
                }
            });
        if let Some((i, _)) = best {
            remove(i, &mut remaining, &mut in_deg, &mut out_deg);
            s1.push(i);
        }
    }
    s2.reverse();
    s1.extend(s2);
    s1
}

/// Sources of the edges that close a cycle
fn feedback_nodes(c: &Circuit) -> BTreeSet<NodeIndex> {
    let order = greedy_order(c);
    let pos: FxHashMap<NodeIndex, usize> = order.iter().enumerate().map(|(p, &i)| (i, p)).collect();
    let mut ret = BTreeSet::new();
    for e in c.graph.edge_references() {
        let (u, v) = (e.source(), e.target());
        if pos[&u] >= pos[&v] && has_path_connecting(&c.graph, v, u, None) {
            ret.insert(u);
        }
    }
    ret
}

/// Remove the cycles of a circuit by replicating it
///
/// Registers are exposed first. The fanout of every node closing a cycle is cut and fed from
/// a new input `aux_in_n`; the cut circuit is copied once more than there are cut nodes, as
/// `c0`, `c1`, ..., each copy feeding the cut inputs of the next. Inputs are shared and the
/// outputs are taken from the last copy.
pub fn acyclic_unroll(c: &Circuit) -> Result<Circuit> {
    c.check_no_blackboxes()?;
    let mut e = expose_registers(c);
    let outputs = c.outputs();
    for n in e.outputs() {
        if !outputs.contains(&n) {
            e.set_output(&n, false)?;
        }
    }
    if !e.is_cyclic() {
        return Ok(e);
    }
    let feedback = feedback_nodes(&e);

    let mut t = e.clone();
    let mut cuts = BTreeMap::new();
    for &f in &feedback {
        let name = e.node(f).name.clone();
        let fanout = t.fanout([&name])?;
        t.disconnect([&name], &fanout)?;
        let aux = t.uid(&format!("aux_in_{}", name));
        t.add(&aux, NodeKind::Input)?;
        t.connect([&aux], &fanout)?;
        cuts.insert(name, aux);
    }
    if t.is_cyclic() {
        return Err(Error::UnrollFailed(format!(
            "{} is still cyclic after cutting {} nodes",
            c.name(),
            feedback.len()
        )));
    }
    let t = t.strip_outputs();
    debug!("Cut {} feedback nodes in {}", cuts.len(), c.name());

    let aux_names: BTreeSet<&String> = cuts.values().collect();
    let mut r = Circuit::new(format!("{}_acyclic", c.name()));
    let mut connections = BTreeMap::new();
    for i in t.inputs() {
        if !aux_names.contains(&i) {
            r.add(&i, NodeKind::Input)?;
            connections.insert(i.clone(), i);
        }
    }
    let mut prev: Option<BTreeMap<String, String>> = None;
    for itr in 0..=cuts.len() {
        let names = r.embed(&t, &format!("c{}", itr), &connections)?;
        if let Some(prev) = &prev {
            for (f, aux) in &cuts {
                r.set_kind(&names[aux], NodeKind::Buf)?;
                r.connect([&prev[f]], [&names[aux]])?;
            }
        }
        prev = Some(names);
    }

    let last = prev.unwrap_or_default();
    for o in outputs {
        if connections.contains_key(&o) {
            r.set_output(&o, true)?;
        } else {
            r.add_with(
                &o,
                NodeKind::Buf,
                crate::NodeOpts::new().fanin([&last[&o]]).output(true),
            )?;
        }
    }
    if r.is_cyclic() {
        return Err(Error::UnrollFailed(format!(
            "{} is still cyclic after unrolling",
            c.name()
        )));
    }
    info!(
        "Acyclic unrolling of {}: {} feedback nodes, {} copies, {} nodes",
        c.name(),
        cuts.len(),
        cuts.len() + 1,
        r.nb_nodes()
    );
    Ok(r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeOpts;
    use test_log::test;

    /// Two cross-coupled gates and an output
    fn latch_loop() -> Circuit {
        let mut c = Circuit::new("loop");
        c.add("a", NodeKind::Input).unwrap();
        c.add("b", NodeKind::Input).unwrap();
        c.add("x", NodeKind::Nand).unwrap();
        c.add_with("y", NodeKind::Nand, NodeOpts::new().fanin(["b", "x"]).output(true))
            .unwrap();
        c.connect(["a", "y"], ["x"]).unwrap();
        c.add_with("o", NodeKind::Output, NodeOpts::new().fanin(["x"]))
            .unwrap();
        c
    }

    #[test]
    fn test_acyclic_unroll() {
        let c = latch_loop();
        assert!(c.is_cyclic());
        let r = acyclic_unroll(&c).unwrap();
        assert!(!r.is_cyclic());
        assert_eq!(r.outputs(), c.outputs());
        assert_eq!(r.inputs().len(), c.inputs().len() + 1);
        assert!(r.contains("c1_x"));
    }

    #[test]
    fn test_self_loop() {
        let mut c = Circuit::new("self");
        c.add("a", NodeKind::Input).unwrap();
        c.add_with("x", NodeKind::Or, NodeOpts::new().fanin(["a"]).output(true))
            .unwrap();
        c.connect(["x"], ["x"]).unwrap();
        let r = acyclic_unroll(&c).unwrap();
        assert!(!r.is_cyclic());
        assert_eq!(r.outputs(), c.outputs());
        assert_eq!(r.fanin(["c1_aux_in_x"]).unwrap(), BTreeSet::from(["c0_x".to_string()]));
    }

    #[test]
    fn test_acyclic_passthrough() {
        let mut c = Circuit::new("seq");
        c.add("a", NodeKind::Input).unwrap();
        c.add("x", NodeKind::Xor).unwrap();
        c.add_with("q", NodeKind::Ff, NodeOpts::new().fanin(["x"]).fanout(["x"]).output(true))
            .unwrap();
        c.connect(["a"], ["x"]).unwrap();
        let r = acyclic_unroll(&c).unwrap();
        assert!(!r.is_cyclic());
        assert_eq!(r.outputs(), c.outputs());
    }
}
