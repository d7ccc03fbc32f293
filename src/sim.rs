//! Simulation of a circuit. Values are simulated 64 patterns at a time.

mod simple_sim;

use std::collections::BTreeMap;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::{Circuit, Result};

pub use simple_sim::SimpleSimulator;

fn bool_to_multi(values: &BTreeMap<String, bool>) -> BTreeMap<String, u64> {
    values
        .iter()
        .map(|(k, b)| (k.clone(), if *b { !0 } else { 0 }))
        .collect()
}

fn multi_to_bool(values: &BTreeMap<String, u64>) -> BTreeMap<String, bool> {
    values.iter().map(|(k, b)| (k.clone(), *b & 1 != 0)).collect()
}

/// Simulate a circuit over multiple clock cycles; return the value of every node at each cycle
///
/// Registers start at zero. Inputs need a value at every cycle.
pub fn simulate(
    c: &Circuit,
    input_values: &[BTreeMap<String, bool>],
) -> Result<Vec<BTreeMap<String, bool>>> {
    let multi_input: Vec<_> = input_values.iter().map(bool_to_multi).collect();
    let multi_ret = simulate_multi(c, &multi_input)?;
    Ok(multi_ret.iter().map(multi_to_bool).collect())
}

/// Simulate a single cycle; return the value of every node
///
/// Registers take the value given for them, or zero.
pub fn simulate_comb(
    c: &Circuit,
    input_values: &BTreeMap<String, bool>,
) -> Result<BTreeMap<String, bool>> {
    let ret = simulate_comb_multi(c, &bool_to_multi(input_values))?;
    Ok(multi_to_bool(&ret))
}

/// Simulate a single cycle with 64 patterns per word; return the value of every node
pub fn simulate_comb_multi(
    c: &Circuit,
    input_values: &BTreeMap<String, u64>,
) -> Result<BTreeMap<String, u64>> {
    let mut ret = simulate_multi(c, std::slice::from_ref(input_values))?;
    Ok(ret.pop().unwrap_or_default())
}

/// Simulate multiple cycles with 64 patterns per word; return the value of every node
pub fn simulate_multi(
    c: &Circuit,
    input_values: &[BTreeMap<String, u64>],
) -> Result<Vec<BTreeMap<String, u64>>> {
    let mut sim = SimpleSimulator::from_circuit(c)?;
    sim.run(input_values)
}

/// Random 64-pattern words for the given nodes
pub fn random_words<I, S>(names: I, seed: u64) -> BTreeMap<String, u64>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut rng = SmallRng::seed_from_u64(seed);
    names
        .into_iter()
        .map(|n| (n.as_ref().to_string(), rng.gen()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NodeKind, NodeOpts};

    #[test]
    fn test_comb() {
        let mut c = Circuit::new("c");
        c.add("a", NodeKind::Input).unwrap();
        c.add("b", NodeKind::Input).unwrap();
        for (n, k) in [
            ("and", NodeKind::And),
            ("nand", NodeKind::Nand),
            ("or", NodeKind::Or),
            ("nor", NodeKind::Nor),
            ("xor", NodeKind::Xor),
            ("xnor", NodeKind::Xnor),
        ] {
            c.add_with(n, k, NodeOpts::new().fanin(["a", "b"]))
                .unwrap();
        }
        c.add_with("not", NodeKind::Not, NodeOpts::new().fanin(["a"]))
            .unwrap();
        for a in [false, true] {
            for b in [false, true] {
                let v = BTreeMap::from([("a".to_string(), a), ("b".to_string(), b)]);
                let r = simulate_comb(&c, &v).unwrap();
                assert_eq!(r["and"], a && b);
                assert_eq!(r["nand"], !(a && b));
                assert_eq!(r["or"], a || b);
                assert_eq!(r["nor"], !(a || b));
                assert_eq!(r["xor"], a ^ b);
                assert_eq!(r["xnor"], !(a ^ b));
                assert_eq!(r["not"], !a);
            }
        }
        assert!(simulate_comb(&c, &BTreeMap::new()).is_err());
    }

    #[test]
    fn test_seq() {
        // Toggle flip-flop: q' = q ^ en
        let mut c = Circuit::new("toggle");
        c.add("en", NodeKind::Input).unwrap();
        c.add("x", NodeKind::Xor).unwrap();
        c.add_with("q", NodeKind::Ff, NodeOpts::new().fanin(["x"]).fanout(["x"]))
            .unwrap();
        c.connect(["en"], ["x"]).unwrap();
        let inputs: Vec<_> = [true, true, false, true]
            .iter()
            .map(|&b| BTreeMap::from([("en".to_string(), b)]))
            .collect();
        let r = simulate(&c, &inputs).unwrap();
        let q: Vec<bool> = r.iter().map(|v| v["q"]).collect();
        assert_eq!(q, [false, true, false, false]);
    }
}
