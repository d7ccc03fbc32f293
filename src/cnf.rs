//! Tseitin encoding of a circuit into a CNF formula
//!
//! Every node gets a variable; gates add the clauses that tie their variable to the
//! variables of their drivers. Startpoints and undriven register inputs are left free.

use std::borrow::Borrow;
use std::collections::BTreeMap;

use fxhash::FxHashMap;
use log::debug;
use rustsat::types::{Clause, Lit, Var};

use crate::{Circuit, Error, NodeKind, Result};

/// Build a clause from literals
pub(crate) fn clause<I: IntoIterator<Item = Lit>>(lits: I) -> Clause {
    let mut c = Clause::new();
    for l in lits {
        c.add(l);
    }
    c
}

/// Mapping between node names and formula variables
///
/// Auxiliary variables created by the encoding have a name for display but cannot be
/// looked up.
#[derive(Debug, Clone, Default)]
pub struct VarMap {
    by_name: FxHashMap<String, Var>,
    names: Vec<String>,
}

impl VarMap {
    /// Number of variables
    pub fn nb_vars(&self) -> u32 {
        self.names.len() as u32
    }

    /// Variable of a node, if any
    pub fn var(&self, name: &str) -> Option<Var> {
        self.by_name.get(name).copied()
    }

    /// Literal stating that a node takes the value `value`
    pub fn lit(&self, name: &str, value: bool) -> Result<Lit> {
        let v = self
            .var(name)
            .ok_or_else(|| Error::UnknownNode(name.to_string()))?;
        Ok(if value { v.pos_lit() } else { v.neg_lit() })
    }

    /// Name of a variable
    pub fn name(&self, v: Var) -> Option<&str> {
        self.names.get(v.idx()).map(|s| s.as_str())
    }

    /// Node variables, in creation order
    pub fn iter(&self) -> impl Iterator<Item = (&str, Var)> + '_ {
        self.names
            .iter()
            .enumerate()
            .filter_map(|(i, n)| self.by_name.get(n).filter(|v| v.idx() == i))
            .map(|v| (self.names[v.idx()].as_str(), *v))
    }

    fn add(&mut self, name: &str) -> Var {
        let v = self.fresh(name.to_string());
        self.by_name.insert(name.to_string(), v);
        v
    }

    fn fresh(&mut self, display: String) -> Var {
        let v = Var::new(self.names.len() as u32);
        self.names.push(display);
        v
    }
}

/// An xor constraint: the exclusive or of the literals is true
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XorConstraint {
    /// Literals of the constraint
    pub lits: Vec<Lit>,
}

/// A CNF formula obtained from a circuit, with optional native xor constraints
#[derive(Debug, Clone, Default)]
pub struct Formula {
    /// Clauses of the formula
    pub clauses: Vec<Clause>,
    /// Native xor constraints, only used with [`CnfOptions::xor_as_constraints`]
    pub xors: Vec<XorConstraint>,
    /// Variables of the nodes
    pub var_map: VarMap,
}

impl Formula {
    /// Number of variables
    pub fn nb_vars(&self) -> u32 {
        self.var_map.nb_vars()
    }

    /// Force nodes to the given values with unit clauses
    pub fn add_assumptions<I, S, B>(&mut self, assumptions: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, B)>,
        S: AsRef<str>,
        B: Borrow<bool>,
    {
        for (n, b) in assumptions {
            let l = self.var_map.lit(n.as_ref(), *b.borrow())?;
            self.clauses.push(clause([l]));
        }
        Ok(())
    }

    /// Node values from a full assignment of the variables
    pub fn decode(&self, assignment: &[bool]) -> BTreeMap<String, bool> {
        self.var_map
            .iter()
            .map(|(n, v)| (n.to_string(), assignment.get(v.idx()).copied().unwrap_or(false)))
            .collect()
    }

    fn add_clause<I: IntoIterator<Item = Lit>>(&mut self, lits: I) {
        self.clauses.push(clause(lits));
    }

    /// out <=> a
    fn add_buf(&mut self, out: Lit, a: Lit) {
        self.add_clause([!out, a]);
        self.add_clause([out, !a]);
    }

    /// out <=> and(fanin)
    fn add_and(&mut self, out: Lit, fanin: &[Lit]) {
        for &f in fanin {
            self.add_clause([!out, f]);
        }
        self.add_clause(std::iter::once(out).chain(fanin.iter().map(|&f| !f)));
    }

    /// out <=> a ^ b
    fn add_xor(&mut self, out: Lit, a: Lit, b: Lit) {
        self.add_clause([!out, !a, !b]);
        self.add_clause([!out, a, b]);
        self.add_clause([out, !a, b]);
        self.add_clause([out, a, !b]);
    }
}

/// Options of the encoding
#[derive(Debug, Clone, Default)]
pub struct CnfOptions {
    /// Encode xor and xnor gates as native xor constraints instead of clauses
    pub xor_as_constraints: bool,
}

impl CnfOptions {
    /// Set whether xor gates become native xor constraints
    pub fn with_xor_constraints(mut self, xor_as_constraints: bool) -> Self {
        self.xor_as_constraints = xor_as_constraints;
        self
    }
}

/// Encode a circuit into a CNF formula
pub fn compile(c: &Circuit) -> Result<Formula> {
    compile_with(c, &CnfOptions::default())
}

/// Encode a circuit into a CNF formula, with nodes forced to the given values
pub fn compile_assuming<I, S, B>(c: &Circuit, assumptions: I) -> Result<Formula>
where
    I: IntoIterator<Item = (S, B)>,
    S: AsRef<str>,
    B: Borrow<bool>,
{
    let mut f = compile(c)?;
    f.add_assumptions(assumptions)?;
    Ok(f)
}

/// Encode a circuit into a CNF formula with custom options
pub fn compile_with(c: &Circuit, opts: &CnfOptions) -> Result<Formula> {
    use NodeKind::*;
    if let Some(n) = c.node_weights().find(|n| n.kind.is_blackbox_pin()) {
        return Err(Error::BlackboxPresent(format!(
            "{} (pin '{}')",
            c.name(),
            n.name
        )));
    }
    let mut f = Formula::default();
    for n in c.node_weights() {
        f.var_map.add(&n.name);
    }
    for i in c.graph.node_indices() {
        let n = c.node(i);
        let out = f.var_map.lit(&n.name, true)?;
        let fanin = c
            .preds(i)
            .map(|j| f.var_map.lit(&c.node(j).name, true))
            .collect::<Result<Vec<Lit>>>()?;
        let unsupported = || Error::UnsupportedGateKind {
            node: n.name.clone(),
            kind: n.kind,
        };
        match n.kind {
            Input | Ff | Lat => (),
            Const0 => f.add_clause([!out]),
            Const1 => f.add_clause([out]),
            D | R | S | Clk => {
                if let Some(&a) = fanin.first() {
                    f.add_buf(out, a);
                }
            }
            Buf | Output | Not => {
                let a = *fanin.first().ok_or_else(unsupported)?;
                f.add_buf(out, if n.kind == Not { !a } else { a });
            }
            And | Nand | Or | Nor | Xor | Xnor if fanin.is_empty() => return Err(unsupported()),
            And | Nand | Or | Nor | Xor | Xnor if fanin.len() == 1 => {
                let a = fanin[0];
                f.add_buf(out, if n.kind.is_inverted() { !a } else { a });
            }
            And => f.add_and(out, &fanin),
            Nand => f.add_and(!out, &fanin),
            Or => {
                let inv: Vec<Lit> = fanin.iter().map(|&l| !l).collect();
                f.add_and(!out, &inv);
            }
            Nor => {
                let inv: Vec<Lit> = fanin.iter().map(|&l| !l).collect();
                f.add_and(out, &inv);
            }
            Xor | Xnor if opts.xor_as_constraints => {
                let head = if n.kind == Xor { !out } else { out };
                let lits = std::iter::once(head).chain(fanin).collect();
                f.xors.push(XorConstraint { lits });
            }
            Xor | Xnor => {
                let mut pending = fanin;
                while pending.len() > 2 {
                    let (Some(b), Some(a)) = (pending.pop(), pending.pop()) else {
                        break;
                    };
                    let display = format!(
                        "xor_{}_{}",
                        f.var_map.name(a.var()).unwrap_or_default(),
                        f.var_map.name(b.var()).unwrap_or_default()
                    );
                    let x = f.var_map.fresh(display).pos_lit();
                    f.add_xor(x, a, b);
                    pending.insert(0, x);
                }
                let (a, b) = (pending[0], pending[1]);
                if n.kind == Xor {
                    f.add_xor(out, a, b);
                } else {
                    let inv = f.var_map.fresh(format!("xor_inv_{}", n.name)).pos_lit();
                    f.add_xor(inv, a, b);
                    f.add_buf(out, !inv);
                }
            }
            BbInput | BbOutput => return Err(Error::BlackboxPresent(c.name().to_string())),
        }
    }
    debug!(
        "Encoded {} into {} variables, {} clauses and {} xor constraints",
        c.name(),
        f.nb_vars(),
        f.clauses.len(),
        f.xors.len()
    );
    Ok(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeOpts;

    /// Evaluate the clauses under a full assignment
    fn satisfied(f: &Formula, assignment: &[bool]) -> bool {
        let val = |l: &Lit| assignment[l.var().idx()] != l.is_neg();
        f.clauses.iter().all(|c| c.iter().any(val))
            && f.xors
                .iter()
                .all(|x| x.lits.iter().filter(|l| val(l)).count() % 2 == 1)
    }

    /// Number of assignments satisfying the formula, by brute force
    fn brute_force_count(f: &Formula) -> usize {
        let nb = f.nb_vars() as usize;
        (0..1usize << nb)
            .filter(|x| {
                let a: Vec<bool> = (0..nb).map(|i| (x >> i) & 1 == 1).collect();
                satisfied(f, &a)
            })
            .count()
    }

    fn gate(kind: NodeKind, width: usize) -> Circuit {
        let mut c = Circuit::new("gate");
        let inputs: Vec<String> = (0..width).map(|i| format!("i{}", i)).collect();
        for i in &inputs {
            c.add(i, NodeKind::Input).unwrap();
        }
        c.add_with("o", kind, NodeOpts::new().fanin(&inputs).output(true))
            .unwrap();
        c
    }

    #[test]
    fn test_gate_counts() {
        use NodeKind::*;
        for kind in [And, Nand, Or, Nor, Xor, Xnor] {
            for width in 1..=4 {
                let f = compile(&gate(kind, width)).unwrap();
                // Auxiliary variables are functionally defined: one model per input pattern
                assert_eq!(brute_force_count(&f), 1 << width, "{} {}", kind, width);
            }
        }
    }

    #[test]
    fn test_gate_semantics() {
        use NodeKind::*;
        for kind in [And, Nand, Or, Nor, Xor, Xnor] {
            let f = compile(&gate(kind, 3)).unwrap();
            let nb = f.nb_vars() as usize;
            for x in 0..1usize << nb {
                let a: Vec<bool> = (0..nb).map(|i| (x >> i) & 1 == 1).collect();
                if !satisfied(&f, &a) {
                    continue;
                }
                let v = f.decode(&a);
                let ins = [v["i0"], v["i1"], v["i2"]];
                let expected = match kind {
                    And => ins.iter().all(|b| *b),
                    Nand => !ins.iter().all(|b| *b),
                    Or => ins.iter().any(|b| *b),
                    Nor => !ins.iter().any(|b| *b),
                    Xor => ins.iter().filter(|b| **b).count() % 2 == 1,
                    _ => ins.iter().filter(|b| **b).count() % 2 == 0,
                };
                assert_eq!(v["o"], expected, "{}", kind);
            }
        }
    }

    #[test]
    fn test_xor_constraints() {
        let opts = CnfOptions::default().with_xor_constraints(true);
        let f = compile_with(&gate(NodeKind::Xnor, 3), &opts).unwrap();
        assert_eq!(f.xors.len(), 1);
        assert!(f.clauses.is_empty());
        assert_eq!(f.nb_vars(), 4);
        assert_eq!(brute_force_count(&f), 8);
    }

    #[test]
    fn test_constants_and_assumptions() {
        let mut c = Circuit::new("c");
        c.add("z", NodeKind::Const0).unwrap();
        c.add("a", NodeKind::Input).unwrap();
        c.add_with("o", NodeKind::Or, NodeOpts::new().fanin(["z", "a"]))
            .unwrap();
        let mut f = compile(&c).unwrap();
        assert_eq!(brute_force_count(&f), 2);
        f.add_assumptions([("o", true)]).unwrap();
        assert_eq!(brute_force_count(&f), 1);
        assert!(f.add_assumptions([("missing", true)]).is_err());
    }

    #[test]
    fn test_unsupported() {
        let mut c = Circuit::new("c");
        c.add("o", NodeKind::And).unwrap();
        assert!(matches!(
            compile(&c),
            Err(Error::UnsupportedGateKind { kind: NodeKind::And, .. })
        ));
        let mut c = Circuit::new("c");
        c.add("b", NodeKind::Buf).unwrap();
        assert!(compile(&c).is_err());
    }

    #[test]
    fn test_registers_are_free() {
        let mut c = Circuit::new("c");
        c.add("a", NodeKind::Input).unwrap();
        c.add_with("q", NodeKind::Ff, NodeOpts::new().fanin(["a"]))
            .unwrap();
        let f = compile(&c).unwrap();
        // a, q, clk[q] and r[q] are free, d[q] follows a
        assert_eq!(brute_force_count(&f), 16);
    }
}
