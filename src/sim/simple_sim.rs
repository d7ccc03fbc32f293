use std::collections::BTreeMap;

use fxhash::FxHashMap;
use petgraph::stable_graph::NodeIndex;

use crate::{Circuit, Error, NodeKind, Result};

/// Structure for simulation based directly on the graph representation
///
/// Each value is a 64-bit word, holding 64 independent patterns.
pub struct SimpleSimulator<'a> {
    circuit: &'a Circuit,
    order: Vec<NodeIndex>,
    node_values: FxHashMap<NodeIndex, u64>,
    state: FxHashMap<NodeIndex, u64>,
}

impl<'a> SimpleSimulator<'a> {
    /// Prepare the simulation of a circuit without combinational loops
    pub fn from_circuit(circuit: &'a Circuit) -> Result<SimpleSimulator<'a>> {
        let order = circuit.comb_order()?;
        Ok(SimpleSimulator {
            circuit,
            order,
            node_values: FxHashMap::default(),
            state: FxHashMap::default(),
        })
    }

    /// Run one step per element of `input_values`, registers starting at zero
    pub fn run(
        &mut self,
        input_values: &[BTreeMap<String, u64>],
    ) -> Result<Vec<BTreeMap<String, u64>>> {
        self.reset();
        let mut ret = Vec::new();
        for (i, v) in input_values.iter().enumerate() {
            if i != 0 {
                self.run_registers();
            }
            self.run_comb(v)?;
            ret.push(self.get_values());
        }
        Ok(ret)
    }

    fn reset(&mut self) {
        self.node_values.clear();
        self.state.clear();
    }

    fn get_value(&self, i: NodeIndex) -> u64 {
        self.node_values.get(&i).copied().unwrap_or(0)
    }

    fn get_values(&self) -> BTreeMap<String, u64> {
        self.order
            .iter()
            .map(|&i| (self.circuit.node(i).name.clone(), self.get_value(i)))
            .collect()
    }

    /// Value of the auxiliary node of a register, zero if it is undriven
    fn aux_value(&self, q: &str, kind: NodeKind) -> u64 {
        self.circuit
            .names
            .get(&kind.aux_name(q))
            .map(|&i| self.get_value(i))
            .unwrap_or(0)
    }

    /// Clock every register: flip-flops load their data input, reset has priority;
    /// latches are handled the same way, with set below reset
    fn run_registers(&mut self) {
        let mut next = FxHashMap::default();
        for &i in &self.order {
            let n = self.circuit.node(i);
            if !n.kind.is_register() {
                continue;
            }
            let d = self.aux_value(&n.name, NodeKind::D);
            let r = self.aux_value(&n.name, NodeKind::R);
            let s = self.aux_value(&n.name, NodeKind::S);
            next.insert(i, !r & (s | d));
        }
        self.state = next;
    }

    fn run_comb(&mut self, inputs: &BTreeMap<String, u64>) -> Result<()> {
        use NodeKind::*;
        for idx in 0..self.order.len() {
            let i = self.order[idx];
            let n = self.circuit.node(i);
            let fanin: Vec<u64> = self.circuit.preds(i).map(|j| self.get_value(j)).collect();
            let val = match n.kind {
                Input | BbOutput => *inputs.get(&n.name).ok_or_else(|| {
                    Error::Precondition(format!("no simulation value for '{}'", n.name))
                })?,
                Ff | Lat => inputs
                    .get(&n.name)
                    .copied()
                    .unwrap_or_else(|| self.state.get(&i).copied().unwrap_or(0)),
                Const0 => 0,
                Const1 => !0,
                And | Nand | Or | Nor | Xor | Xnor if fanin.is_empty() => {
                    return Err(Error::UnsupportedGateKind {
                        node: n.name.clone(),
                        kind: n.kind,
                    });
                }
                And => compute_and(&fanin, false, false),
                Nand => compute_and(&fanin, false, true),
                Or => compute_and(&fanin, true, true),
                Nor => compute_and(&fanin, true, false),
                Xor => compute_xor(&fanin, false),
                Xnor => compute_xor(&fanin, true),
                D | R | S | Clk | BbInput => fanin.first().copied().unwrap_or(0),
                Buf | Output | Not => {
                    let v = *fanin.first().ok_or_else(|| Error::UnsupportedGateKind {
                        node: n.name.clone(),
                        kind: n.kind,
                    })?;
                    if n.kind == Not {
                        !v
                    } else {
                        v
                    }
                }
            };
            self.node_values.insert(i, val);
        }
        Ok(())
    }
}

fn compute_and(v: &[u64], inv_in: bool, inv_out: bool) -> u64 {
    let inv_in = if inv_in { !0 } else { 0 };
    let mut ret = !0u64;
    for s in v {
        ret &= s ^ inv_in;
    }
    if inv_out {
        !ret
    } else {
        ret
    }
}

fn compute_xor(v: &[u64], inv_out: bool) -> u64 {
    let mut ret = 0u64;
    for s in v {
        ret ^= s;
    }
    if inv_out {
        !ret
    } else {
        ret
    }
}
