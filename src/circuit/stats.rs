//! Compute circuit statistics
//!
//! ```
//! # use circuitgraph::Circuit;
//! # let c = Circuit::new("empty");
//! use circuitgraph::circuit::stats::stats;
//! let stats = stats(&c);
//!
//! // Check that there is no Xor gate
//! assert_eq!(stats.nb_xor, 0);
//!
//! // Show the statistics
//! println!("{}", stats);
//! ```

use std::collections::BTreeMap;
use std::fmt;

use crate::{Circuit, NodeKind};

/// Number of inputs, outputs and gates in a circuit
#[derive(Clone, Debug, Default)]
pub struct CircuitStats {
    /// Number of inputs
    pub nb_inputs: usize,
    /// Number of outputs
    pub nb_outputs: usize,
    /// Number of And and Nand gates
    pub nb_and: usize,
    /// Number of Or and Nor gates
    pub nb_or: usize,
    /// Number of Xor and Xnor gates
    pub nb_xor: usize,
    /// Arity of the multi-input gates
    pub gate_arity: Vec<usize>,
    /// Number of Buf
    pub nb_buf: usize,
    /// Number of Not
    pub nb_not: usize,
    /// Number of constants
    pub nb_const: usize,
    /// Number of flip-flops
    pub nb_ff: usize,
    /// Number of latches
    pub nb_lat: usize,
    /// Number of blackbox instances
    pub nb_blackboxes: usize,
    /// Number of edges
    pub nb_edges: usize,
}

impl CircuitStats {
    /// Total number of logic gates, excluding registers
    pub fn nb_gates(&self) -> usize {
        self.nb_and + self.nb_or + self.nb_xor + self.nb_buf + self.nb_not
    }

    /// Record a new multi-input gate
    fn add_gate(&mut self, sz: usize) {
        while self.gate_arity.len() <= sz {
            self.gate_arity.push(0);
        }
        self.gate_arity[sz] += 1;
    }
}

impl fmt::Display for CircuitStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Stats:")?;
        writeln!(f, "  Inputs: {}", self.nb_inputs)?;
        writeln!(f, "  Outputs: {}", self.nb_outputs)?;
        writeln!(f, "  Gates: {}", self.nb_gates())?;
        if self.nb_and != 0 {
            writeln!(f, "  And: {}", self.nb_and)?;
        }
        if self.nb_or != 0 {
            writeln!(f, "  Or: {}", self.nb_or)?;
        }
        if self.nb_xor != 0 {
            writeln!(f, "  Xor: {}", self.nb_xor)?;
        }
        for (i, nb) in self.gate_arity.iter().enumerate() {
            if *nb != 0 {
                writeln!(f, "    {}-input: {}", i, nb)?;
            }
        }
        if self.nb_buf != 0 {
            writeln!(f, "  Buf: {}", self.nb_buf)?;
        }
        if self.nb_not != 0 {
            writeln!(f, "  Not: {}", self.nb_not)?;
        }
        if self.nb_const != 0 {
            writeln!(f, "  Constants: {}", self.nb_const)?;
        }
        if self.nb_ff != 0 {
            writeln!(f, "  Flip-flops: {}", self.nb_ff)?;
        }
        if self.nb_lat != 0 {
            writeln!(f, "  Latches: {}", self.nb_lat)?;
        }
        if self.nb_blackboxes != 0 {
            writeln!(f, "  Blackboxes: {}", self.nb_blackboxes)?;
        }
        write!(f, "  Edges: {}", self.nb_edges)
    }
}

/// Compute the statistics of the circuit
pub fn stats(c: &Circuit) -> CircuitStats {
    use NodeKind::*;
    let mut ret = CircuitStats {
        nb_inputs: c.inputs().len(),
        nb_outputs: c.outputs().len(),
        nb_blackboxes: c.blackboxes().len(),
        nb_edges: c.nb_edges(),
        ..Default::default()
    };
    for i in c.graph.node_indices() {
        let kind = c.node(i).kind;
        if kind.is_gate() {
            ret.add_gate(c.preds(i).count());
        }
        match kind {
            And | Nand => ret.nb_and += 1,
            Or | Nor => ret.nb_or += 1,
            Xor | Xnor => ret.nb_xor += 1,
            Buf | Output => ret.nb_buf += 1,
            Not => ret.nb_not += 1,
            Const0 | Const1 => ret.nb_const += 1,
            Ff => ret.nb_ff += 1,
            Lat => ret.nb_lat += 1,
            Input | D | R | S | Clk | BbInput | BbOutput => (),
        }
    }
    ret
}

/// Number of nodes of each kind
pub fn kind_counts(c: &Circuit) -> BTreeMap<NodeKind, usize> {
    let mut ret = BTreeMap::new();
    for n in c.node_weights() {
        *ret.entry(n.kind).or_insert(0) += 1;
    }
    ret
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::generators::adder;

    #[test]
    fn test_adder_stats() {
        let c = adder::full_adder().unwrap();
        let s = stats(&c);
        assert_eq!(s.nb_inputs, 3);
        assert_eq!(s.nb_outputs, 2);
        assert!(s.nb_xor >= 2);
        assert_eq!(s.nb_ff, 0);
        assert!(s.to_string().contains("Inputs: 3"));
        assert_eq!(kind_counts(&c)[&NodeKind::Input], 3);
    }
}
