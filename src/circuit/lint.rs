//! Structural checks on a circuit

use std::fmt;

use crate::{Circuit, Error, NodeKind, Result};

/// Problem found on a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LintIssue {
    /// A node that requires a driver has none
    Undriven(String),
    /// A single-driver node has several drivers
    MultipleDrivers(String),
    /// A multi-input gate has a single fanin
    SingleInputGate(String),
    /// A node drives nothing and is not an output
    Unloaded(String),
    /// A blackbox pin has no instance, or an instance pin is missing
    DanglingPin(String),
    /// A combinational loop goes through this node
    CombinationalLoop(String),
}

impl fmt::Display for LintIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use LintIssue::*;
        match self {
            Undriven(n) => write!(f, "'{}' is undriven", n),
            MultipleDrivers(n) => write!(f, "'{}' has multiple drivers", n),
            SingleInputGate(n) => write!(f, "'{}' is a gate with a single input", n),
            Unloaded(n) => write!(f, "'{}' is unloaded", n),
            DanglingPin(n) => write!(f, "blackbox pin '{}' has no instance", n),
            CombinationalLoop(n) => write!(f, "combinational loop through '{}'", n),
        }
    }
}

/// Which checks to run
#[derive(Debug, Clone)]
pub struct LintOptions {
    /// Report nodes without drivers
    pub undriven: bool,
    /// Report gates with a single input
    pub single_input: bool,
    /// Report nodes that drive nothing
    pub unloaded: bool,
}

impl Default for LintOptions {
    fn default() -> Self {
        LintOptions {
            undriven: true,
            single_input: true,
            unloaded: false,
        }
    }
}

impl Circuit {
    /// Run structural checks and return the problems found
    pub fn lint(&self, opts: &LintOptions) -> Vec<LintIssue> {
        let mut ret = Vec::new();
        let pins: Vec<&String> = self
            .blackboxes
            .values()
            .flat_map(|bb| bb.pins.values())
            .collect();
        for bb in self.blackboxes.values() {
            for pin in bb.pins.values() {
                if !self.contains(pin) {
                    ret.push(LintIssue::DanglingPin(pin.clone()));
                }
            }
        }
        for i in self.graph.node_indices() {
            let n = self.node(i);
            let nb_fanin = self.preds(i).count();
            let name = || n.name.clone();
            // Control inputs of registers are optional
            let optional_driver = matches!(n.kind, NodeKind::R | NodeKind::S | NodeKind::Clk);
            if opts.undriven && nb_fanin == 0 && !n.kind.is_source() && !optional_driver {
                ret.push(LintIssue::Undriven(name()));
            }
            if n.kind.max_fanin() == Some(1) && nb_fanin > 1 {
                ret.push(LintIssue::MultipleDrivers(name()));
            }
            if opts.single_input && n.kind.is_gate() && nb_fanin == 1 {
                ret.push(LintIssue::SingleInputGate(name()));
            }
            if opts.unloaded
                && !n.output
                && n.kind != NodeKind::Output
                && n.kind != NodeKind::BbInput
                && self.succs(i).next().is_none()
            {
                ret.push(LintIssue::Unloaded(name()));
            }
            if n.kind.is_blackbox_pin() && !pins.contains(&&n.name) {
                ret.push(LintIssue::DanglingPin(name()));
            }
        }
        if let Err(Error::CycleDetected(n)) = self.comb_order() {
            ret.push(LintIssue::CombinationalLoop(n));
        }
        ret
    }

    /// Check that the circuit is complete: every node has the drivers it needs
    pub fn check(&self) -> Result<()> {
        let opts = LintOptions {
            undriven: true,
            single_input: false,
            unloaded: false,
        };
        match self.lint(&opts).into_iter().next() {
            None => Ok(()),
            Some(LintIssue::CombinationalLoop(n)) => Err(Error::CycleDetected(n)),
            Some(issue) => Err(Error::Precondition(issue.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeOpts;

    #[test]
    fn test_lint() {
        let mut c = Circuit::new("lint");
        c.add("a", NodeKind::Input).unwrap();
        c.add_with("x", NodeKind::And, NodeOpts::new().fanin(["a"]))
            .unwrap();
        c.add("y", NodeKind::Buf).unwrap();
        c.add_with("q", NodeKind::Ff, NodeOpts::new().fanin(["x"]))
            .unwrap();
        let issues = c.lint(&LintOptions::default());
        assert!(issues.contains(&LintIssue::SingleInputGate("x".to_string())));
        assert!(issues.contains(&LintIssue::Undriven("y".to_string())));
        assert_eq!(issues.len(), 2);
        assert!(c.check().is_err());

        let opts = LintOptions {
            unloaded: true,
            ..Default::default()
        };
        let issues = c.lint(&opts);
        assert!(issues.contains(&LintIssue::Unloaded("q".to_string())));
        assert!(issues.contains(&LintIssue::Unloaded("y".to_string())));
    }

    #[test]
    fn test_check_loop() {
        let mut c = Circuit::new("loop");
        c.add("a", NodeKind::Input).unwrap();
        c.add_with("x", NodeKind::And, NodeOpts::new().fanin(["a"]))
            .unwrap();
        c.add_with("y", NodeKind::Or, NodeOpts::new().fanin(["x", "a"]).fanout(["x"]))
            .unwrap();
        assert!(matches!(c.check(), Err(Error::CycleDetected(_))));
    }
}
