//! Analysis of circuit properties with SAT solving, model counting and simulation
//!
//! Functions taking an `approx` parameter count models exactly by enumeration when it is
//! `None`, and call `approxmc` with the given configuration otherwise.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info};
use num_bigint::BigUint;

use crate::circuit::generators::clog2;
use crate::sat::{approx_count_models, count_models, solve, ApproxMcConfig};
use crate::sim::{random_words, simulate_comb_multi};
use crate::transform::{sensitivity_transform, sensitization_transform, supergates};
use crate::{Circuit, Error, Result};

/// Count the models of a circuit with `sat` true
fn count_sat(c: &Circuit, n: &str, approx: Option<&ApproxMcConfig>) -> Result<BigUint> {
    match approx {
        Some(config) => approx_count_models(c, [(n, true)], config),
        None => count_models(c, [(n, true)]),
    }
}

/// Fraction of the `2^nb_bits` assignments given by a model count
fn ratio(count: &BigUint, nb_bits: usize) -> f64 {
    let count: f64 = count.to_string().parse().unwrap_or(f64::INFINITY);
    count / 2f64.powi(nb_bits as i32)
}

/// Find startpoint values for which flipping `n` changes an output
///
/// Returns `None` if `n` cannot be observed under the assumptions.
pub fn sensitize(
    c: &Circuit,
    n: &str,
    assumptions: &BTreeMap<String, bool>,
) -> Result<Option<BTreeMap<String, bool>>> {
    let s = sensitization_transform(c, n, None)?;
    let mut all = assumptions.clone();
    all.insert("sat".to_string(), true);
    let Some(model) = solve(&s, &all)? else {
        return Ok(None);
    };
    let startpoints = s.startpoints();
    Ok(Some(
        model
            .into_iter()
            .filter(|(k, _)| startpoints.contains(k))
            .collect(),
    ))
}

/// Maximum number of startpoints of `n` that change its value when flipped alone
///
/// Found by descending search on the output of the sensitivity circuit.
pub fn sensitivity(c: &Circuit, n: &str) -> Result<usize> {
    if c.kind(n)?.is_startpoint() {
        return Ok(1);
    }
    let startpoints = c.startpoints_of([n])?;
    if startpoints.is_empty() {
        return Ok(0);
    }
    let s = sensitivity_transform(c, n)?;
    let nb_bits = clog2(startpoints.len() + 1);
    let mut sen = startpoints.len();
    while sen > 0 {
        let assumptions: Vec<(String, bool)> = (0..nb_bits)
            .map(|i| (format!("sen_out_{}", i), (sen >> i) & 1 == 1))
            .collect();
        if solve(&s, assumptions)?.is_some() {
            break;
        }
        sen -= 1;
    }
    debug!("Sensitivity of {} is {}", n, sen);
    Ok(sen)
}

/// Probability that flipping startpoint `s` changes `n`, over uniform startpoint values
pub fn influence(
    c: &Circuit,
    n: &str,
    s: &str,
    approx: Option<&ApproxMcConfig>,
) -> Result<f64> {
    let startpoints = c.startpoints_of([n])?;
    if !startpoints.contains(s) {
        return Err(Error::Precondition(format!(
            "'{}' is not a startpoint of '{}'",
            s, n
        )));
    }
    let endpoints = BTreeSet::from([n.to_string()]);
    let m = sensitization_transform(c, s, Some(&endpoints))?;
    let count = count_sat(&m, "sat", approx)?;
    Ok(ratio(&count, startpoints.len()))
}

/// Influence of each startpoint of `n`, computed on the supergates of its fanin cone
///
/// Influences are computed exactly inside each supergate, then multiplied along the chain
/// of supergates from the startpoint to `n`. The inputs of a supergate are treated as
/// uniform and independent, so the result is exact only when the cone is fanout-free.
pub fn supergate_influences(
    c: &Circuit,
    n: &str,
    approx: Option<&ApproxMcConfig>,
) -> Result<BTreeMap<String, f64>> {
    if c.kind(n)?.is_startpoint() {
        return Ok(BTreeMap::from([(n.to_string(), 1.0)]));
    }
    let mut cone = c.transitive_fanin([n])?;
    cone.insert(n.to_string());
    let mut c_n = c.subcircuit(&cone, false)?;
    for m in &cone {
        c_n.set_output(m, m == n)?;
    }
    let sgs = supergates(&c_n)?;

    // Influence of each supergate input on its root, and the root each input drives
    let mut sg_influences: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
    let mut input_map: BTreeMap<String, String> = BTreeMap::new();
    for sg in &sgs {
        if sg.inputs.contains(&sg.root) {
            continue;
        }
        if !sg_influences.contains_key(&sg.root) {
            let mut infs = BTreeMap::new();
            for s in sg.circuit.startpoints_of([&sg.root])? {
                let inf = influence(&sg.circuit, &sg.root, &s, approx)?;
                infs.insert(s, inf);
            }
            sg_influences.insert(sg.root.clone(), infs);
        }
        for s in &sg.inputs {
            input_map.insert(s.clone(), sg.root.clone());
        }
    }
    debug!(
        "Influences on {} from {} supergates",
        n,
        sg_influences.len()
    );

    let mut ret = BTreeMap::new();
    for s in c.startpoints_of([n])? {
        let mut inf = 1.0;
        let mut cur = s.clone();
        let mut steps = 0;
        while cur != n {
            if steps > sgs.len() {
                return Err(Error::CycleDetected(cur));
            }
            let root = input_map.get(&cur).ok_or_else(|| {
                Error::Precondition(format!("'{}' does not drive any supergate of '{}'", cur, n))
            })?;
            inf *= sg_influences[root].get(&cur).copied().unwrap_or(0.0);
            cur = root.clone();
            steps += 1;
        }
        ret.insert(s, inf);
    }
    Ok(ret)
}

/// Sum of the influences of all startpoints of `n`
///
/// With `use_supergates`, the influences are computed by [`supergate_influences`].
pub fn avg_sensitivity(
    c: &Circuit,
    n: &str,
    approx: Option<&ApproxMcConfig>,
    use_supergates: bool,
) -> Result<f64> {
    let total = if use_supergates {
        supergate_influences(c, n, approx)?.values().sum()
    } else {
        let mut total = 0.0;
        for s in c.startpoints_of([n])? {
            total += influence(c, n, &s, approx)?;
        }
        total
    };
    info!("Average sensitivity of {}: {}", n, total);
    Ok(total)
}

/// Probability of `n` being true, over uniform startpoint values
pub fn signal_probability(c: &Circuit, n: &str, approx: Option<&ApproxMcConfig>) -> Result<f64> {
    let mut cone = c.transitive_fanin([n])?;
    cone.insert(n.to_string());
    let sub = c.subcircuit(&cone, false)?;
    let count = count_sat(&sub, n, approx)?;
    Ok(ratio(&count, sub.startpoints().len()))
}

/// Estimate the probability of `n` being true by random simulation
pub fn simulated_signal_probability(
    c: &Circuit,
    n: &str,
    nb_samples: usize,
    seed: u64,
) -> Result<f64> {
    c.idx(n)?;
    if nb_samples == 0 {
        return Err(Error::Precondition(
            "Signal probability needs at least one sample".to_string(),
        ));
    }
    let startpoints = c.startpoints();
    let mut ones = 0;
    let mut remaining = nb_samples;
    let mut word = 0;
    while remaining > 0 {
        let values = random_words(&startpoints, seed.wrapping_add(word));
        let v = simulate_comb_multi(c, &values)?[n];
        let nb = remaining.min(64);
        let mask = if nb == 64 { !0u64 } else { (1u64 << nb) - 1 };
        ones += (v & mask).count_ones() as usize;
        remaining -= nb;
        word += 1;
    }
    Ok(ones as f64 / nb_samples as f64)
}

/// Logic level of each node: 0 for inputs and nodes without fanin, one more than their
/// deepest fanin otherwise
pub fn levelize(c: &Circuit) -> Result<BTreeMap<String, usize>> {
    let mut levels: BTreeMap<String, usize> = BTreeMap::new();
    for n in c.topo_sort()? {
        let level = c
            .fanin([&n])?
            .iter()
            .filter_map(|f| levels.get(f))
            .map(|l| l + 1)
            .max()
            .unwrap_or(0);
        levels.insert(n, level);
    }
    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NodeKind, NodeOpts};
    use test_log::test;

    fn circuit() -> Circuit {
        let mut c = Circuit::new("c");
        for i in ["a", "b", "c"] {
            c.add(i, NodeKind::Input).unwrap();
        }
        c.add_with("x", NodeKind::And, NodeOpts::new().fanin(["a", "b"]))
            .unwrap();
        c.add_with("o", NodeKind::Or, NodeOpts::new().fanin(["x", "c"]).output(true))
            .unwrap();
        c.add_with("and3", NodeKind::And, NodeOpts::new().fanin(["a", "b", "c"]))
            .unwrap();
        c.add_with("n", NodeKind::Not, NodeOpts::new().fanin(["o"]))
            .unwrap();
        c
    }

    #[test]
    fn test_sensitize() {
        let c = circuit();
        let v = sensitize(&c, "a", &BTreeMap::new()).unwrap().unwrap();
        assert!(v["b"]);
        assert!(!v["c"]);
        let forced = BTreeMap::from([("c".to_string(), true)]);
        assert_eq!(sensitize(&c, "a", &forced).unwrap(), None);
    }

    #[test]
    fn test_sensitivity() {
        let c = circuit();
        assert_eq!(sensitivity(&c, "and3").unwrap(), 3);
        assert_eq!(sensitivity(&c, "x").unwrap(), 2);
        assert_eq!(sensitivity(&c, "a").unwrap(), 1);
    }

    #[test]
    fn test_influence() {
        let c = circuit();
        assert_eq!(influence(&c, "x", "a", None).unwrap(), 0.5);
        // a changes o only when b is high and c is low
        assert_eq!(influence(&c, "o", "a", None).unwrap(), 0.25);
        assert_eq!(avg_sensitivity(&c, "x", None, false).unwrap(), 1.0);
        assert!(influence(&c, "x", "c", None).is_err());
    }

    #[test]
    fn test_sequential_cone() {
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
        // The register cuts the cone: b is not a startpoint of o
        assert_eq!(sensitivity(&c, "o").unwrap(), 2);
        assert_eq!(influence(&c, "o", "q", None).unwrap(), 0.5);
        assert_eq!(influence(&c, "o", "a", None).unwrap(), 0.5);
        assert!(influence(&c, "o", "b", None).is_err());
        assert_eq!(avg_sensitivity(&c, "o", None, false).unwrap(), 1.0);
        assert_eq!(avg_sensitivity(&c, "o", None, true).unwrap(), 1.0);
    }

    #[test]
    fn test_supergate_influences() {
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
        c.add_with("p", NodeKind::Not, NodeOpts::new().fanin(["x"]).output(true))
            .unwrap();

        // Exact on a fanout-free cone, even if the circuit has other outputs
        let infs = supergate_influences(&c, "o", None).unwrap();
        assert_eq!(infs.len(), 4);
        for s in ["a", "b", "c", "d"] {
            assert_eq!(infs[s], influence(&c, "o", s, None).unwrap());
        }
        assert_eq!(infs["a"], 0.375);
        assert_eq!(
            avg_sensitivity(&c, "o", None, true).unwrap(),
            avg_sensitivity(&c, "o", None, false).unwrap()
        );

        let infs = supergate_influences(&c, "a", None).unwrap();
        assert_eq!(infs, BTreeMap::from([("a".to_string(), 1.0)]));
    }

    #[test]
    fn test_signal_probability() {
        let c = circuit();
        assert_eq!(signal_probability(&c, "x", None).unwrap(), 0.25);
        assert_eq!(signal_probability(&c, "o", None).unwrap(), 0.625);
        assert_eq!(signal_probability(&c, "n", None).unwrap(), 0.375);
        let p = simulated_signal_probability(&c, "o", 6400, 1).unwrap();
        assert!((p - 0.625).abs() < 0.05, "{}", p);
    }

    #[test]
    fn test_levelize() {
        let c = circuit();
        let levels = levelize(&c).unwrap();
        assert_eq!(levels["a"], 0);
        assert_eq!(levels["x"], 1);
        assert_eq!(levels["o"], 2);
        assert_eq!(levels["n"], 3);
        assert_eq!(levels["and3"], 1);
    }
}
