//! Satisfiability and model counting on circuits
//!
//! Circuits are encoded with [`crate::cnf`] and handed to a [`SatBackend`], Kissat by
//! default. Approximate counting calls the external `approxmc` tool.

mod approxmc;

use std::borrow::Borrow;
use std::collections::BTreeMap;

use log::{debug, info};
use num_bigint::BigUint;
use rustsat::solvers::{Solve, SolverResult};
use rustsat::types::{Clause, TernaryVal, Var};
use rustsat_kissat::Kissat;

use crate::cnf::{clause, compile, compile_with, CnfOptions, Formula};
use crate::{Circuit, Error, Result};

pub use approxmc::ApproxMcConfig;

/// A SAT solver usable to solve formulas built from circuits
pub trait SatBackend {
    /// Solve a formula over variables `0..nb_vars`; return a full assignment if satisfiable
    fn solve(&mut self, nb_vars: u32, clauses: &[Clause]) -> Result<Option<Vec<bool>>>;
}

/// The Kissat solver, through rustsat
///
/// Kissat is not incremental, so a fresh solver is created for each call.
#[derive(Debug, Clone, Copy, Default)]
pub struct KissatBackend;

fn backend_error<E: std::fmt::Display>(e: E) -> Error {
    Error::Backend(e.to_string())
}

impl SatBackend for KissatBackend {
    fn solve(&mut self, nb_vars: u32, clauses: &[Clause]) -> Result<Option<Vec<bool>>> {
        let mut solver = Kissat::default();
        for c in clauses {
            solver.add_clause(c.clone()).map_err(backend_error)?;
        }
        match solver.solve().map_err(backend_error)? {
            SolverResult::Sat => {
                let mut ret = Vec::with_capacity(nb_vars as usize);
                for i in 0..nb_vars {
                    let v = solver
                        .lit_val(Var::new(i).pos_lit())
                        .map_err(backend_error)?;
                    ret.push(v == TernaryVal::True);
                }
                Ok(Some(ret))
            }
            SolverResult::Unsat => Ok(None),
            SolverResult::Interrupted => Err(Error::Backend("solver was interrupted".to_string())),
        }
    }
}

/// Find values for all nodes satisfying the circuit and the assumptions
///
/// Returns `None` if the assumptions cannot be satisfied.
///
/// ```
/// # use circuitgraph::{Circuit, NodeKind, NodeOpts};
/// use circuitgraph::sat::solve;
/// let mut c = Circuit::new("and");
/// c.add("a", NodeKind::Input).unwrap();
/// c.add("b", NodeKind::Input).unwrap();
/// c.add_with("x", NodeKind::And, NodeOpts::new().fanin(["a", "b"])).unwrap();
/// let model = solve(&c, [("x", true)]).unwrap().unwrap();
/// assert!(model["a"] && model["b"]);
/// ```
pub fn solve<I, S, B>(c: &Circuit, assumptions: I) -> Result<Option<BTreeMap<String, bool>>>
where
    I: IntoIterator<Item = (S, B)>,
    S: AsRef<str>,
    B: Borrow<bool>,
{
    solve_with(c, assumptions, &mut KissatBackend)
}

/// Same as [`solve`], with a custom solver
pub fn solve_with<I, S, B>(
    c: &Circuit,
    assumptions: I,
    backend: &mut dyn SatBackend,
) -> Result<Option<BTreeMap<String, bool>>>
where
    I: IntoIterator<Item = (S, B)>,
    S: AsRef<str>,
    B: Borrow<bool>,
{
    let mut f = compile(c)?;
    f.add_assumptions(assumptions)?;
    debug!("Solving {}", c.name());
    solve_formula_with(&f, backend)
}

/// Solve an encoded formula; return the value of every node if satisfiable
pub fn solve_formula(f: &Formula) -> Result<Option<BTreeMap<String, bool>>> {
    solve_formula_with(f, &mut KissatBackend)
}

/// Same as [`solve_formula`], with a custom solver
pub fn solve_formula_with(
    f: &Formula,
    backend: &mut dyn SatBackend,
) -> Result<Option<BTreeMap<String, bool>>> {
    if !f.xors.is_empty() {
        return Err(Error::Precondition(
            "native xor constraints are only supported by model counters".to_string(),
        ));
    }
    let assignment = backend.solve(f.nb_vars(), &f.clauses)?;
    Ok(assignment.map(|a| f.decode(&a)))
}

/// Exact number of assignments of the startpoints satisfying the circuit and the assumptions
///
/// Models are enumerated one by one with blocking clauses: only usable on small circuits.
pub fn count_models<I, S, B>(c: &Circuit, assumptions: I) -> Result<BigUint>
where
    I: IntoIterator<Item = (S, B)>,
    S: AsRef<str>,
    B: Borrow<bool>,
{
    let mut f = compile(c)?;
    f.add_assumptions(assumptions)?;
    let startpoints = c.startpoints();
    let mut backend = KissatBackend;
    let mut count = BigUint::from(0u32);
    while let Some(model) = solve_formula_with(&f, &mut backend)? {
        count += 1u32;
        if startpoints.is_empty() {
            break;
        }
        let blocking = startpoints
            .iter()
            .map(|n| f.var_map.lit(n, !model[n]))
            .collect::<Result<Vec<_>>>()?;
        f.clauses.push(clause(blocking));
    }
    debug!("{} has {} models", c.name(), count);
    Ok(count)
}

/// Approximate number of assignments of the startpoints satisfying the circuit and the
/// assumptions, using `approxmc`
pub fn approx_count_models<I, S, B>(
    c: &Circuit,
    assumptions: I,
    config: &ApproxMcConfig,
) -> Result<BigUint>
where
    I: IntoIterator<Item = (S, B)>,
    S: AsRef<str>,
    B: Borrow<bool>,
{
    let opts = CnfOptions::default().with_xor_constraints(config.use_xor_clauses);
    let mut f = compile_with(c, &opts)?;
    f.add_assumptions(assumptions)?;
    let sampling = c
        .startpoints()
        .iter()
        .map(|n| f.var_map.lit(n, true).map(|l| l.var()))
        .collect::<Result<Vec<_>>>()?;
    info!(
        "Approximate model count of {} over {} startpoints",
        c.name(),
        sampling.len()
    );
    config.count(&f, &sampling)
}
