use std::collections::{BTreeMap, BTreeSet};

use log::info;
use petgraph::stable_graph::NodeIndex;

use crate::{Circuit, Error, NodeKind, NodeOpts, Result};

/// Cut the circuit at its registers
///
/// Each register `q` becomes an input and its data node `d[q]` becomes a buffer marked as
/// output (a constant zero if it had no driver). Reset, set and clock nodes are removed.
pub fn expose_registers(c: &Circuit) -> Circuit {
    let mut ret = c.clone();
    for q in c.registers() {
        let Some(&qi) = ret.names.get(&q) else {
            continue;
        };
        for k in ret.node(qi).kind.register_aux() {
            let Some(&a) = ret.names.get(&k.aux_name(&q)) else {
                continue;
            };
            if *k == NodeKind::D {
                if let Some(e) = ret.graph.find_edge(a, qi) {
                    ret.graph.remove_edge(e);
                }
                let driven = ret.preds(a).next().is_some();
                let n = &mut ret.graph[a];
                n.kind = if driven {
                    NodeKind::Buf
                } else {
                    NodeKind::Const0
                };
                n.output = true;
            } else {
                ret.remove_index(a);
            }
        }
        ret.graph[qi].kind = NodeKind::Input;
    }
    ret
}

/// Longest combinational path from a startpoint to each node, in edges
fn fanin_depths(c: &Circuit) -> Result<BTreeMap<NodeIndex, usize>> {
    let mut depth = BTreeMap::new();
    for i in c.comb_order()? {
        let d = c
            .preds(i)
            .filter_map(|j| depth.get(&j))
            .map(|d: &usize| d + 1)
            .max()
            .unwrap_or(0);
        depth.insert(i, d);
    }
    Ok(depth)
}

/// Pipeline a combinational circuit with `stages` levels of flip-flops
///
/// Flip-flops are inserted after the nodes found at evenly spaced depths, all clocked by
/// `clk`, which is added as an input if missing.
pub fn insert_registers(c: &Circuit, stages: usize, clk: &str) -> Result<Circuit> {
    if !c.is_comb() {
        return Err(Error::Precondition(format!(
            "{} already has registers",
            c.name()
        )));
    }
    if stages == 0 {
        return Ok(c.clone());
    }
    let depths = fanin_depths(c)?;
    let max_depth = depths.values().copied().max().unwrap_or(0);
    let step = ((max_depth as f64) / (stages as f64 + 1.0)).round().max(1.0) as usize;

    let mut levels: BTreeMap<usize, BTreeSet<String>> = BTreeMap::new();
    for (&i, &d) in &depths {
        levels
            .entry(d)
            .or_default()
            .insert(c.node(i).name.clone());
    }

    let mut ret = c.clone();
    if !ret.contains(clk) {
        ret.add(clk, NodeKind::Input)?;
    }
    let mut nb_inserted = 0;
    for level in (step..max_depth).step_by(step).take(stages) {
        for n in levels.get(&level).into_iter().flatten() {
            let fanout = ret.fanout([n])?;
            if fanout.is_empty() {
                continue;
            }
            ret.disconnect([n], &fanout)?;
            let q = ret.uid(&format!("{}_cg_insert_reg_q_{}", n, level));
            ret.add_with(
                &q,
                NodeKind::Ff,
                NodeOpts::new().fanin([n]).fanout(&fanout).clk(clk),
            )?;
            nb_inserted += 1;
        }
    }
    info!(
        "Inserted {} registers in {} (max depth {}, step {})",
        nb_inserted,
        c.name(),
        max_depth,
        step
    );
    Ok(ret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::generators::adder;

    fn counter() -> Circuit {
        let mut c = Circuit::new("counter");
        c.add("en", NodeKind::Input).unwrap();
        c.add("clk", NodeKind::Input).unwrap();
        c.add("x", NodeKind::Xor).unwrap();
        c.add_with(
            "q",
            NodeKind::Ff,
            NodeOpts::new().fanin(["x"]).fanout(["x"]).clk("clk").output(true),
        )
        .unwrap();
        c.connect(["en"], ["x"]).unwrap();
        c
    }

    #[test]
    fn test_expose() {
        let c = counter();
        let e = expose_registers(&c);
        assert!(e.is_comb());
        assert!(!e.is_cyclic());
        assert_eq!(e.kind("q").unwrap(), NodeKind::Input);
        assert_eq!(e.kind("d[q]").unwrap(), NodeKind::Buf);
        assert!(e.outputs().contains("d[q]"));
        assert!(e.outputs().contains("q"));
        assert!(!e.contains("clk[q]"));
        assert!(!e.contains("r[q]"));
        assert_eq!(e.fanin(["d[q]"]).unwrap(), BTreeSet::from(["x".to_string()]));
        // The original is untouched
        assert_eq!(c.kind("q").unwrap(), NodeKind::Ff);
    }

    #[test]
    fn test_insert() {
        let c = adder::ripple_carry(4, false, true).unwrap();
        let p = insert_registers(&c, 2, "clk").unwrap();
        assert!(!p.ffs().is_empty());
        assert_eq!(p.kind("clk").unwrap(), NodeKind::Input);
        assert_eq!(p.outputs(), c.outputs());
        assert!(!p.has_combinational_loop());
        assert!(insert_registers(&p, 1, "clk").is_err());
    }
}
