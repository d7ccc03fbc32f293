use std::collections::{BTreeMap, BTreeSet};

use log::info;

use crate::transform::expose_registers;
use crate::{Circuit, Error, NodeKind, Result};

/// Options for time-frame unrolling
#[derive(Debug, Clone)]
pub struct UnrollOptions {
    /// Inserted in the name of the io of each frame, as `{io}_{prefix}_{frame}`
    pub prefix: String,
    /// Value of state inputs in the first frame; others are free inputs
    pub initial_values: BTreeMap<String, bool>,
    /// Remove the inputs without fanout before unrolling
    pub remove_unloaded: bool,
    /// Keep the next-state signals of each frame as outputs
    pub flop_outputs: bool,
}

impl Default for UnrollOptions {
    fn default() -> Self {
        UnrollOptions {
            prefix: "cg_unroll".to_string(),
            initial_values: BTreeMap::new(),
            remove_unloaded: true,
            flop_outputs: false,
        }
    }
}

impl UnrollOptions {
    /// Set the naming prefix
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    /// Set the initial value of a state input
    pub fn with_initial_value(mut self, state: &str, value: bool) -> Self {
        self.initial_values.insert(state.to_string(), value);
        self
    }

    /// Whether unloaded inputs are removed
    pub fn with_remove_unloaded(mut self, remove_unloaded: bool) -> Self {
        self.remove_unloaded = remove_unloaded;
        self
    }

    /// Whether next-state signals are kept as outputs
    pub fn with_flop_outputs(mut self, flop_outputs: bool) -> Self {
        self.flop_outputs = flop_outputs;
        self
    }
}

/// Copy a combinational circuit `n` times, feeding state from one frame to the next
///
/// For each pair `(k, v)` of `state_io`, output `k` of frame `i - 1` drives input `v` of
/// frame `i`. In the first frame `v` is a free input, or a constant if it has an initial
/// value. Returns the unrolled circuit and, for each io of `c`, its name in each frame.
pub fn unroll(
    c: &Circuit,
    n: usize,
    state_io: &BTreeMap<String, String>,
    opts: &UnrollOptions,
) -> Result<(Circuit, BTreeMap<String, Vec<String>>)> {
    c.check_no_blackboxes()?;
    if n < 1 {
        return Err(Error::Precondition(format!(
            "Number of frames must be at least 1, got {}",
            n
        )));
    }
    let inputs = c.inputs();
    let outputs = c.outputs();
    for (k, v) in state_io {
        if !outputs.contains(k) {
            return Err(Error::Precondition(format!(
                "Next-state '{}' is not an output of {}",
                k,
                c.name()
            )));
        }
        if !inputs.contains(v) {
            return Err(Error::Precondition(format!(
                "State '{}' is not an input of {}",
                v,
                c.name()
            )));
        }
    }
    let state_values: BTreeSet<&String> = state_io.values().collect();
    for s in opts.initial_values.keys() {
        if !state_values.contains(s) {
            return Err(Error::Precondition(format!(
                "Initial value given for '{}', which is not a state input",
                s
            )));
        }
    }

    let io: BTreeSet<&String> = inputs.iter().chain(outputs.iter()).collect();
    let mut u = Circuit::new(format!("{}_unrolled", c.name()));
    let mut io_map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for itr in 0..n {
        let mut connections = BTreeMap::new();
        for &i in &io {
            let is_state = state_values.contains(i);
            let kind = if is_state && itr == 0 {
                match opts.initial_values.get(i) {
                    Some(true) => NodeKind::Const1,
                    Some(false) => NodeKind::Const0,
                    None => NodeKind::Input,
                }
            } else if inputs.contains(i) && !is_state {
                NodeKind::Input
            } else {
                NodeKind::Buf
            };
            let name = u.uid(&format!("{}_{}_{}", i, opts.prefix, itr));
            u.add(&name, kind)?;
            u.set_output(&name, outputs.contains(i))?;
            connections.insert(i.clone(), name.clone());
            io_map.entry(i.clone()).or_default().push(name);
        }
        u.embed(c, &format!("unrolled_{}", itr), &connections)?;

        if itr > 0 {
            for (k, v) in state_io {
                let prev = &io_map[k][itr - 1];
                let cur = &io_map[v][itr];
                u.connect([prev], [cur])?;
            }
        }
    }
    info!(
        "Unrolled {} over {} frames: {} nodes",
        c.name(),
        n,
        u.nb_nodes()
    );
    Ok((u, io_map))
}

/// Unroll a sequential circuit over `n` clock cycles
///
/// Registers are exposed, then each register `q` is fed by the data signal `d[q]` of the
/// previous frame. Initial values are given by register name.
pub fn sequential_unroll(
    c: &Circuit,
    n: usize,
    opts: &UnrollOptions,
) -> Result<(Circuit, BTreeMap<String, Vec<String>>)> {
    c.check_no_blackboxes()?;
    let registers = c.registers();
    let mut e = expose_registers(c);
    let state_io: BTreeMap<String, String> = registers
        .iter()
        .map(|q| (NodeKind::D.aux_name(q), q.clone()))
        .collect();
    if opts.remove_unloaded {
        let unloaded: Vec<String> = e
            .inputs()
            .into_iter()
            .filter(|i| !registers.contains(i))
            .filter(|i| e.nb_fanout(i).is_ok_and(|f| f == 0) && !e.is_output(i).unwrap_or(false))
            .collect();
        e.remove(&unloaded)?;
    }
    let (mut u, io_map) = unroll(&e, n, &state_io, opts)?;
    for d in state_io.keys() {
        for name in &io_map[d] {
            u.set_output(name, opts.flop_outputs)?;
        }
    }
    Ok((u, io_map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{simulate, simulate_comb};
    use crate::NodeOpts;
    use test_log::test;

    /// A single-bit accumulator: q' = q ^ a, o = q & b
    fn accumulator() -> Circuit {
        let mut c = Circuit::new("acc");
        c.add("a", NodeKind::Input).unwrap();
        c.add("b", NodeKind::Input).unwrap();
        c.add("clk", NodeKind::Input).unwrap();
        c.add("x", NodeKind::Xor).unwrap();
        c.add_with(
            "q",
            NodeKind::Ff,
            NodeOpts::new().fanin(["x"]).fanout(["x"]).clk("clk"),
        )
        .unwrap();
        c.connect(["a"], ["x"]).unwrap();
        c.add_with("o", NodeKind::And, NodeOpts::new().fanin(["q", "b"]).output(true))
            .unwrap();
        c
    }

    #[test]
    fn test_unroll_single() {
        let c = accumulator();
        let (u, io_map) = sequential_unroll(&c, 1, &UnrollOptions::default()).unwrap();
        assert_eq!(io_map["q"], ["q_cg_unroll_0"]);
        assert_eq!(u.kind("q_cg_unroll_0").unwrap(), NodeKind::Input);
        assert!(!u.contains("clk_cg_unroll_0"));
        assert!(!u.outputs().contains("d[q]_cg_unroll_0"));
        assert!(u.outputs().contains("o_cg_unroll_0"));
        assert!(u.is_comb());
    }

    #[test]
    fn test_unroll_chain() {
        let c = accumulator();
        let opts = UnrollOptions::default()
            .with_initial_value("q", false)
            .with_flop_outputs(true);
        let (u, io_map) = sequential_unroll(&c, 3, &opts).unwrap();
        assert_eq!(u.kind("q_cg_unroll_0").unwrap(), NodeKind::Const0);
        assert_eq!(
            u.fanin(["q_cg_unroll_1"]).unwrap(),
            BTreeSet::from(["d[q]_cg_unroll_0".to_string()])
        );
        assert_eq!(
            u.fanin(["q_cg_unroll_2"]).unwrap(),
            BTreeSet::from(["d[q]_cg_unroll_1".to_string()])
        );
        assert!(u.outputs().contains("d[q]_cg_unroll_2"));
        assert!(!u.is_cyclic());

        // Compare against cycle-accurate simulation
        let a = [true, false, true];
        let b = [true, true, true];
        let mut frames = BTreeMap::new();
        let mut cycles = Vec::new();
        for i in 0..3 {
            frames.insert(io_map["a"][i].clone(), a[i]);
            frames.insert(io_map["b"][i].clone(), b[i]);
            cycles.push(BTreeMap::from([
                ("a".to_string(), a[i]),
                ("b".to_string(), b[i]),
                ("clk".to_string(), false),
            ]));
        }
        let unrolled = simulate_comb(&u, &frames).unwrap();
        let seq = simulate(&c, &cycles).unwrap();
        for i in 0..3 {
            assert_eq!(unrolled[&io_map["o"][i]], seq[i]["o"], "cycle {}", i);
        }
    }

    #[test]
    fn test_unroll_errors() {
        let c = accumulator();
        assert!(matches!(
            sequential_unroll(&c, 0, &UnrollOptions::default()),
            Err(Error::Precondition(_))
        ));
        let e = expose_registers(&c);
        let bad = BTreeMap::from([("a".to_string(), "q".to_string())]);
        assert!(unroll(&e, 2, &bad, &UnrollOptions::default()).is_err());
        let opts = UnrollOptions::default().with_initial_value("a", true);
        assert!(sequential_unroll(&c, 2, &opts).is_err());
    }
}
