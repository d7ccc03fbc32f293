use std::collections::{BTreeMap, BTreeSet};

use log::info;

use crate::transform::expose_registers;
use crate::{Circuit, Error, NodeKind, NodeOpts, Result};

/// Build a miter comparing two circuits
///
/// Both circuits are embedded with prefixes `c0` and `c1`, after their registers are exposed.
/// Startpoints are shared under their own name; each endpoint `e` is compared by a xor gate
/// `dif_e`, and the single output `sat` is true when any endpoint differs.
///
/// Startpoints default to the inputs shared by both circuits, endpoints to the shared
/// endpoints. Without `c1`, the circuit is compared with itself.
pub fn miter(
    c0: &Circuit,
    c1: Option<&Circuit>,
    startpoints: Option<&BTreeSet<String>>,
    endpoints: Option<&BTreeSet<String>>,
) -> Result<Circuit> {
    Ok(miter_with_difs(c0, c1, startpoints, endpoints)?.0)
}

/// Build a miter comparing two circuits, see [`miter`]
///
/// Also returns the name of the comparison node of each endpoint, which is `dif_e` unless
/// the name was already taken.
pub fn miter_with_difs(
    c0: &Circuit,
    c1: Option<&Circuit>,
    startpoints: Option<&BTreeSet<String>>,
    endpoints: Option<&BTreeSet<String>>,
) -> Result<(Circuit, BTreeMap<String, String>)> {
    let c1 = c1.unwrap_or(c0);
    c0.check_no_blackboxes()?;
    c1.check_no_blackboxes()?;
    let e0 = expose_registers(c0);
    let e1 = expose_registers(c1);

    let startpoints = match startpoints {
        Some(s) => {
            for n in s {
                for e in [&e0, &e1] {
                    if e.kind(n)? != NodeKind::Input {
                        return Err(Error::Precondition(format!(
                            "'{}' is not a startpoint of {}",
                            n,
                            e.name()
                        )));
                    }
                }
            }
            s.clone()
        }
        None => e0
            .startpoints()
            .intersection(&e1.startpoints())
            .cloned()
            .collect(),
    };
    let endpoints = match endpoints {
        Some(s) => {
            for n in s {
                e0.idx(n)?;
                e1.idx(n)?;
            }
            s.clone()
        }
        None => e0
            .endpoints()
            .intersection(&e1.endpoints())
            .cloned()
            .collect(),
    };
    if endpoints.is_empty() {
        return Err(Error::Precondition(format!(
            "{} and {} have no endpoint to compare",
            c0.name(),
            c1.name()
        )));
    }

    let mut m = Circuit::new(format!("miter_{}_{}", c0.name(), c1.name()));
    let mut connections = BTreeMap::new();
    for n in &startpoints {
        m.add(n, NodeKind::Input)?;
        connections.insert(n.clone(), n.clone());
    }
    let names0 = m.embed(&e0, "c0", &connections)?;
    let names1 = m.embed(&e1, "c1", &connections)?;

    let sat_kind = if endpoints.len() > 1 {
        NodeKind::Or
    } else {
        NodeKind::Buf
    };
    m.add_with("sat", sat_kind, NodeOpts::new().output(true))?;
    let mut difs = BTreeMap::new();
    for n in &endpoints {
        let dif = m.uid(&format!("dif_{}", n));
        m.add_with(
            &dif,
            NodeKind::Xor,
            NodeOpts::new()
                .fanin([&names0[n], &names1[n]])
                .fanout(["sat"]),
        )?;
        difs.insert(n.clone(), dif);
    }
    info!(
        "Built miter of {} and {}: {} startpoints, {} endpoints, {} nodes",
        c0.name(),
        c1.name(),
        startpoints.len(),
        endpoints.len(),
        m.nb_nodes()
    );
    Ok((m, difs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sat::solve;
    use crate::sim::simulate_comb;
    use test_log::test;

    fn and_circuit() -> Circuit {
        let mut c = Circuit::new("and");
        c.add("a", NodeKind::Input).unwrap();
        c.add("b", NodeKind::Input).unwrap();
        c.add("c", NodeKind::Input).unwrap();
        c.add_with("x", NodeKind::And, NodeOpts::new().fanin(["a", "b"]))
            .unwrap();
        c.add_with("y", NodeKind::Xor, NodeOpts::new().fanin(["x", "c"]).output(true))
            .unwrap();
        c.add_with("z", NodeKind::Nor, NodeOpts::new().fanin(["x", "c"]).output(true))
            .unwrap();
        c
    }

    #[test]
    fn test_self_miter() {
        let c = and_circuit();
        let m = miter(&c, None, None, None).unwrap();
        assert_eq!(m.outputs(), BTreeSet::from(["sat".to_string()]));
        assert_eq!(m.inputs(), c.inputs());
        assert!(solve(&m, [("sat", true)]).unwrap().is_none());
        assert!(solve(&m, [("sat", false)]).unwrap().is_some());
    }

    #[test]
    fn test_mutated_miter() {
        let c0 = and_circuit();
        let mut c1 = c0.clone();
        c1.set_kind("x", NodeKind::Or).unwrap();
        let m = miter(&c0, Some(&c1), None, None).unwrap();
        let model = solve(&m, [("sat", true)]).unwrap().unwrap();
        let inputs: BTreeMap<String, bool> = c0
            .inputs()
            .into_iter()
            .map(|i| {
                let v = model[&i];
                (i, v)
            })
            .collect();
        let v0 = simulate_comb(&c0, &inputs).unwrap();
        let v1 = simulate_comb(&c1, &inputs).unwrap();
        assert!(c0.outputs().iter().any(|o| v0[o] != v1[o]));
    }

    #[test]
    fn test_sequential_miter() {
        let mut c = Circuit::new("seq");
        c.add("a", NodeKind::Input).unwrap();
        c.add("x", NodeKind::And).unwrap();
        c.add_with("q", NodeKind::Ff, NodeOpts::new().fanin(["x"]).fanout(["x"]))
            .unwrap();
        c.connect(["a"], ["x"]).unwrap();
        let m = miter(&c, None, None, None).unwrap();
        // The register is a shared startpoint, its data input an endpoint
        assert!(m.inputs().contains("q"));
        assert!(m.contains("dif_d[q]"));
        assert!(solve(&m, [("sat", true)]).unwrap().is_none());
    }

    #[test]
    fn test_miter_difs() {
        // A startpoint named like a comparison node pushes it to another name
        let mut c = Circuit::new("clash");
        c.add("dif_o", NodeKind::Input).unwrap();
        c.add("a", NodeKind::Input).unwrap();
        c.add_with("o", NodeKind::And, NodeOpts::new().fanin(["a", "dif_o"]).output(true))
            .unwrap();
        let mut d = c.clone();
        d.set_kind("o", NodeKind::Or).unwrap();
        let (m, difs) = miter_with_difs(&c, Some(&d), None, None).unwrap();
        assert_eq!(difs.len(), 1);
        let dif = &difs["o"];
        assert_ne!(dif, "dif_o");
        assert_eq!(m.kind("dif_o").unwrap(), NodeKind::Input);
        assert_eq!(m.kind(dif).unwrap(), NodeKind::Xor);
        let model = solve(&m, [("sat", true)]).unwrap().unwrap();
        assert!(model[dif]);
        assert_ne!(model["a"], model["dif_o"]);
    }

    #[test]
    fn test_miter_errors() {
        let c = and_circuit();
        let sp = BTreeSet::from(["x".to_string()]);
        assert!(matches!(
            miter(&c, None, Some(&sp), None),
            Err(Error::Precondition(_))
        ));
        let mut other = Circuit::new("other");
        other.add("a", NodeKind::Input).unwrap();
        assert!(miter(&c, Some(&other), None, None).is_err());
    }
}
