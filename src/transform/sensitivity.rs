use std::collections::{BTreeMap, BTreeSet};

use log::info;

use crate::circuit::generators::{clog2, popcount::popcount};
use crate::transform::miter;
use crate::{Circuit, Error, NodeKind, NodeOpts, Result};

/// Build a miter where node `n` is inverted in the second copy
///
/// The output `sat` is true for the input patterns where flipping `n` changes an endpoint.
/// With `endpoints`, only the fanin of these endpoints is kept and compared.
pub fn sensitization_transform(
    c: &Circuit,
    n: &str,
    endpoints: Option<&BTreeSet<String>>,
) -> Result<Circuit> {
    c.check_no_blackboxes()?;
    c.idx(n)?;
    let (sub, name) = match endpoints {
        Some(endpoints) => {
            let mut cone = c.transitive_fanin(endpoints)?;
            if !cone.contains(n) && !endpoints.contains(n) {
                return Err(Error::Precondition(format!(
                    "'{}' is not in the fanin of the endpoints",
                    n
                )));
            }
            cone.extend(endpoints.iter().cloned());
            let mut sub = c.subcircuit(&cone, false)?;
            for m in &cone {
                sub.set_output(m, endpoints.contains(m))?;
            }
            let names: Vec<&str> = endpoints.iter().map(|s| s.as_str()).collect();
            let name = format!("{}_sensitize_{}_to_{}", c.name(), n, names.join("_"));
            (sub, name)
        }
        None => (c.clone(), format!("{}_sensitize_{}", c.name(), n)),
    };

    let mut m = miter(&sub, None, None, None)?;
    m.set_name(name);

    // Flip the node in the second copy
    let n0 = format!("c0_{}", n);
    let n1 = format!("c1_{}", n);
    let fanin = m.fanin([&n1])?;
    m.disconnect(&fanin, [&n1])?;
    m.set_kind(&n1, NodeKind::Not)?;
    m.connect([&n0], [&n1])?;
    Ok(m)
}

/// Build a circuit computing the sensitivity of `n`
///
/// The fanin cone of `n` is copied once as is, with prefix `orig`, and once per startpoint `s`
/// with `s` inverted, with prefix `inv_s`. Outputs `dif_out_s` are high when flipping `s`
/// changes `n`, and their number is given in binary on outputs `sen_out_i`, least
/// significant first.
pub fn sensitivity_transform(c: &Circuit, n: &str) -> Result<Circuit> {
    c.check_no_blackboxes()?;
    let startpoints: Vec<String> = c.startpoints_of([n])?.into_iter().collect();
    if startpoints.is_empty() {
        return Err(Error::Precondition(format!("'{}' has no startpoints", n)));
    }

    let mut cone = c.transitive_fanin([n])?;
    cone.insert(n.to_string());
    let mut sub = c.subcircuit(&cone, false)?;
    for m in &cone {
        sub.set_output(m, m == n)?;
    }

    let mut sen = Circuit::new(format!("{}_sensitivity_{}", c.name(), n));
    let mut connections = BTreeMap::new();
    for s in &startpoints {
        sen.add(s, NodeKind::Input)?;
        connections.insert(s.clone(), s.clone());
    }
    let orig = sen.embed(&sub, "orig", &connections)?;

    let mut difs = BTreeMap::new();
    for (i, s0) in startpoints.iter().enumerate() {
        let mut flipped = connections.clone();
        flipped.remove(s0);
        let inv = sen.embed(&sub, &format!("inv_{}", s0), &flipped)?;
        let inv_s0 = &inv[s0];
        sen.set_kind(inv_s0, NodeKind::Not)?;
        sen.connect([s0], [inv_s0])?;

        let dif = sen.uid(&format!("dif_out_{}", s0));
        sen.add_with(
            &dif,
            NodeKind::Xor,
            NodeOpts::new()
                .fanin([&orig[n], &inv[n]])
                .output(true),
        )?;
        difs.insert(format!("in_{}", i), dif);
    }

    let pc = sen.embed(&popcount(startpoints.len())?, "pc", &difs)?;
    for o in 0..clog2(startpoints.len() + 1) {
        let out = sen.uid(&format!("sen_out_{}", o));
        sen.add_with(
            &out,
            NodeKind::Buf,
            NodeOpts::new()
                .fanin([&pc[&format!("out_{}", o)]])
                .output(true),
        )?;
    }
    info!(
        "Built sensitivity circuit of {} in {}: {} startpoints, {} nodes",
        n,
        c.name(),
        startpoints.len(),
        sen.nb_nodes()
    );
    Ok(sen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sat::solve;
    use crate::sim::simulate_comb;
    use test_log::test;

    fn circuit() -> Circuit {
        let mut c = Circuit::new("c");
        for i in ["a", "b", "c", "d"] {
            c.add(i, NodeKind::Input).unwrap();
        }
        c.add_with("x", NodeKind::And, NodeOpts::new().fanin(["a", "b"]))
            .unwrap();
        c.add_with("y", NodeKind::Xor, NodeOpts::new().fanin(["x", "c"]))
            .unwrap();
        c.add_with("z", NodeKind::Or, NodeOpts::new().fanin(["y", "d"]))
            .unwrap();
        c.add_with("o", NodeKind::Output, NodeOpts::new().fanin(["z"]))
            .unwrap();
        c.add_with("p", NodeKind::Nand, NodeOpts::new().fanin(["b", "d"]).output(true))
            .unwrap();
        c
    }

    fn pattern(names: &[&str], x: usize) -> BTreeMap<String, bool> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.to_string(), (x >> i) & 1 == 1))
            .collect()
    }

    /// Compare the sensitivity circuit of `n` to brute force flipping on every pattern
    fn check_popcount(c: &Circuit, n: &str) {
        let startpoints: Vec<String> = c.startpoints_of([n]).unwrap().into_iter().collect();
        let names: Vec<&str> = startpoints.iter().map(|s| s.as_str()).collect();
        let nb_bits = clog2(names.len() + 1);
        let sen = sensitivity_transform(c, n).unwrap();
        // Simulate the cone only, so that registers are free values
        let mut cone = c.transitive_fanin([n]).unwrap();
        cone.insert(n.to_string());
        let c = &c.subcircuit(&cone, false).unwrap();
        assert_eq!(
            sen.outputs().iter().filter(|o| o.starts_with("sen_out_")).count(),
            nb_bits
        );
        for x in 0..1 << names.len() {
            let base = pattern(&names, x);
            let v = simulate_comb(c, &base).unwrap()[n];
            let mut expected = 0;
            for i in 0..names.len() {
                let flipped = pattern(&names, x ^ (1 << i));
                if simulate_comb(c, &flipped).unwrap()[n] != v {
                    expected += 1;
                }
            }
            let out = simulate_comb(&sen, &base).unwrap();
            let mut count = 0;
            for o in 0..nb_bits {
                if out[&format!("sen_out_{}", o)] {
                    count |= 1 << o;
                }
            }
            assert_eq!(count, expected, "{} on pattern {}", n, x);
        }
    }

    #[test]
    fn test_sensitivity_popcount() {
        check_popcount(&circuit(), "z");
        check_popcount(&circuit(), "p");
    }

    #[test]
    fn test_sensitivity_popcount_wide() {
        let mut c = Circuit::new("wide");
        for i in 0..8 {
            c.add(&format!("i{}", i), NodeKind::Input).unwrap();
        }
        c.add_with("g1", NodeKind::And, NodeOpts::new().fanin(["i0", "i1"]))
            .unwrap();
        c.add_with("g2", NodeKind::Xor, NodeOpts::new().fanin(["i2", "i3", "i4"]))
            .unwrap();
        c.add_with("g3", NodeKind::Or, NodeOpts::new().fanin(["i5", "i6"]))
            .unwrap();
        c.add_with("g4", NodeKind::Nand, NodeOpts::new().fanin(["g1", "g2"]))
            .unwrap();
        c.add_with("w", NodeKind::Xor, NodeOpts::new().fanin(["g4", "g3", "i7"]).output(true))
            .unwrap();
        // 8 startpoints need 4 output bits
        check_popcount(&c, "w");
    }

    #[test]
    fn test_sensitivity_popcount_register() {
        let mut c = Circuit::new("seq");
        for i in ["a", "b"] {
            c.add(i, NodeKind::Input).unwrap();
        }
        c.add_with("x", NodeKind::Xor, NodeOpts::new().fanin(["a", "b"]))
            .unwrap();
        c.add_with("q", NodeKind::Ff, NodeOpts::new().fanin(["x"]))
            .unwrap();
        c.add_with("o", NodeKind::And, NodeOpts::new().fanin(["q", "a"]).output(true))
            .unwrap();
        assert_eq!(
            c.startpoints_of(["o"]).unwrap(),
            BTreeSet::from(["a".to_string(), "q".to_string()])
        );
        check_popcount(&c, "o");
    }

    #[test]
    fn test_sensitivity_errors() {
        let mut c = circuit();
        c.add("k", NodeKind::Const1).unwrap();
        assert!(matches!(
            sensitivity_transform(&c, "k"),
            Err(Error::Precondition(_))
        ));
        assert!(sensitivity_transform(&c, "missing").is_err());
    }

    #[test]
    fn test_sensitization() {
        let c = circuit();
        let m = sensitization_transform(&c, "x", None).unwrap();
        assert!(m.contains("c0_x"));
        assert_eq!(m.kind("c1_x").unwrap(), NodeKind::Not);
        let model = solve(&m, [("sat", true)]).unwrap().unwrap();
        // Flipping x is only visible through z when d is low
        assert!(!model["d"]);

        let endpoints = BTreeSet::from(["p".to_string()]);
        assert!(sensitization_transform(&c, "x", Some(&endpoints)).is_err());
        let m = sensitization_transform(&c, "b", Some(&endpoints)).unwrap();
        assert_eq!(m.name(), "c_sensitize_b_to_p");
        let model = solve(&m, [("sat", true)]).unwrap().unwrap();
        assert!(model["d"]);
    }
}
