//! Graph traversals: transitive fanin/fanout, depths, cycles and cuts

use std::collections::{BTreeSet, VecDeque};

use fxhash::{FxHashMap, FxHashSet};
use petgraph::stable_graph::NodeIndex;

use crate::{Circuit, Error, NodeKind, Result};

/// Nodes where a transitive traversal stops
///
/// Stop nodes are included in the result but never expanded, unless they are where the
/// traversal starts.
#[derive(Debug, Clone, Default)]
pub struct Stops {
    /// Kinds to stop at
    pub kinds: Vec<NodeKind>,
    /// Names to stop at
    pub names: BTreeSet<String>,
}

impl Stops {
    /// Stop at registers, the default for transitive fanin
    pub fn fanin() -> Self {
        Stops {
            kinds: vec![NodeKind::Ff, NodeKind::Lat],
            names: BTreeSet::new(),
        }
    }

    /// Stop at register data inputs, the default for transitive fanout
    pub fn fanout() -> Self {
        Stops {
            kinds: vec![NodeKind::D],
            names: BTreeSet::new(),
        }
    }

    /// Do not stop anywhere
    pub fn none() -> Self {
        Stops::default()
    }

    /// Also stop at these nodes
    pub fn with_names<I, S>(mut self, ns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.names
            .extend(ns.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    fn stops(&self, c: &Circuit, i: NodeIndex) -> bool {
        let n = c.node(i);
        self.kinds.contains(&n.kind) || self.names.contains(&n.name)
    }
}

/// Which side of the graph to explore
#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Fanin,
    Fanout,
}

impl Circuit {
    fn neighbors(&self, i: NodeIndex, side: Side) -> Vec<NodeIndex> {
        match side {
            Side::Fanin => self.preds(i).collect(),
            Side::Fanout => self.succs(i).collect(),
        }
    }

    fn transitive(&self, start: &[NodeIndex], stops: &Stops, side: Side) -> FxHashSet<NodeIndex> {
        let mut visited = FxHashSet::default();
        let mut stack: Vec<NodeIndex> = start.to_vec();
        let mut expanded: FxHashSet<NodeIndex> = stack.iter().copied().collect();
        while let Some(i) = stack.pop() {
            for j in self.neighbors(i, side) {
                visited.insert(j);
                if !stops.stops(self, j) && expanded.insert(j) {
                    stack.push(j);
                }
            }
        }
        visited
    }

    pub(crate) fn transitive_fanin_idx(&self, start: &[NodeIndex], stops: &Stops) -> FxHashSet<NodeIndex> {
        self.transitive(start, stops, Side::Fanin)
    }

    pub(crate) fn transitive_fanout_idx(&self, start: &[NodeIndex], stops: &Stops) -> FxHashSet<NodeIndex> {
        self.transitive(start, stops, Side::Fanout)
    }

    /// All nodes reachable backward from the nodes, stopping at registers
    ///
    /// The nodes themselves are always expanded, even if they are registers, and are only
    /// included if they are on a cycle.
    pub fn transitive_fanin<I, S>(&self, ns: I) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.transitive_fanin_with(ns, &Stops::fanin())
    }

    /// All nodes reachable backward from the nodes, with custom stops
    pub fn transitive_fanin_with<I, S>(&self, ns: I, stops: &Stops) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let start = self.indices(ns)?;
        Ok(self.names_of(self.transitive_fanin_idx(&start, stops)))
    }

    /// All nodes reachable forward from the nodes, stopping at register data inputs
    ///
    /// The nodes themselves are always expanded and are only included if they are on a cycle.
    pub fn transitive_fanout<I, S>(&self, ns: I) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.transitive_fanout_with(ns, &Stops::fanout())
    }

    /// All nodes reachable forward from the nodes, with custom stops
    pub fn transitive_fanout_with<I, S>(&self, ns: I, stops: &Stops) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let start = self.indices(ns)?;
        Ok(self.names_of(self.transitive_fanout_idx(&start, stops)))
    }

    fn is_endpoint(&self, i: NodeIndex) -> bool {
        let n = self.node(i);
        n.output || matches!(n.kind, NodeKind::Output | NodeKind::D | NodeKind::BbInput)
    }

    /// All startpoints: inputs, registers and blackbox outputs
    pub fn startpoints(&self) -> BTreeSet<String> {
        self.filter_kind(&[
            NodeKind::Input,
            NodeKind::Ff,
            NodeKind::Lat,
            NodeKind::BbOutput,
        ])
    }

    /// All endpoints: outputs, register data inputs and blackbox inputs
    pub fn endpoints(&self) -> BTreeSet<String> {
        self.names_of(self.graph.node_indices().filter(|&i| self.is_endpoint(i)))
    }

    pub(crate) fn startpoints_idx(&self, start: &[NodeIndex]) -> BTreeSet<String> {
        let stops = Stops::fanin();
        // A register is its own startpoint
        let expand: Vec<NodeIndex> = start
            .iter()
            .copied()
            .filter(|&i| !stops.stops(self, i))
            .collect();
        let tfi = self.transitive_fanin_idx(&expand, &stops);
        self.names_of(
            tfi.into_iter()
                .chain(start.iter().copied())
                .filter(|&i| self.node(i).kind.is_startpoint()),
        )
    }

    /// Startpoints in the transitive fanin of the nodes, including the nodes themselves
    pub fn startpoints_of<I, S>(&self, ns: I) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let start = self.indices(ns)?;
        Ok(self.startpoints_idx(&start))
    }

    /// Endpoints in the transitive fanout of the nodes, including the nodes themselves
    pub fn endpoints_of<I, S>(&self, ns: I) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let start = self.indices(ns)?;
        let stops = Stops::fanout();
        let expand: Vec<NodeIndex> = start
            .iter()
            .copied()
            .filter(|&i| !stops.stops(self, i))
            .collect();
        let tfo = self.transitive_fanout_idx(&expand, &stops);
        Ok(self.names_of(
            tfo.into_iter()
                .chain(start.iter().copied())
                .filter(|&i| self.is_endpoint(i)),
        ))
    }

    /// Length in edges of the longest (or shortest) path from the nodes back to a startpoint
    pub fn fanin_depth<I, S>(&self, ns: I, shortest: bool) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let start = self.indices(ns)?;
        self.depth(&start, Side::Fanin, shortest)
    }

    /// Length in edges of the longest (or shortest) path from the nodes to an endpoint
    pub fn fanout_depth<I, S>(&self, ns: I, shortest: bool) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let start = self.indices(ns)?;
        self.depth(&start, Side::Fanout, shortest)
    }

    /// Combinational depth of the nodes, measured back to their startpoints
    pub fn comb_depth<I, S>(&self, ns: I, shortest: bool) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.fanin_depth(ns, shortest)
    }

    /// Depth of each start node, by depth-first search with an explicit stack
    ///
    /// Stop nodes have depth 0 unless they are start nodes.
    fn depth(&self, start: &[NodeIndex], side: Side, shortest: bool) -> Result<usize> {
        let stops = match side {
            Side::Fanin => Stops::fanin(),
            Side::Fanout => Stops::fanout(),
        };
        let mut memo: FxHashMap<NodeIndex, usize> = FxHashMap::default();
        let mut on_path = FxHashSet::default();
        let mut ret: Option<usize> = None;
        for &s in start {
            let mut stack = vec![(s, false)];
            while let Some((i, done)) = stack.pop() {
                let neighbors = self.neighbors(i, side);
                if done {
                    on_path.remove(&i);
                    let d = neighbors
                        .iter()
                        .map(|j| {
                            if stops.stops(self, *j) {
                                1
                            } else {
                                memo.get(j).copied().unwrap_or(0) + 1
                            }
                        })
                        .reduce(|a, b| if shortest { a.min(b) } else { a.max(b) })
                        .unwrap_or(0);
                    memo.insert(i, d);
                    continue;
                }
                if memo.contains_key(&i) {
                    continue;
                }
                on_path.insert(i);
                stack.push((i, true));
                for j in neighbors {
                    if stops.stops(self, j) || memo.contains_key(&j) {
                        continue;
                    }
                    if on_path.contains(&j) {
                        return Err(Error::CycleDetected(self.node(j).name.clone()));
                    }
                    stack.push((j, false));
                }
            }
            let d = memo.get(&s).copied().unwrap_or(0);
            if stops.stops(self, s) {
                // Only valid as a start node
                memo.remove(&s);
            }
            ret = Some(match ret {
                None => d,
                Some(r) if shortest => r.min(d),
                Some(r) => r.max(d),
            });
        }
        Ok(ret.unwrap_or(0))
    }

    /// Returns whether the graph contains a cycle, registers included
    pub fn is_cyclic(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }

    /// Returns whether the graph contains a cycle that does not go through a register
    pub fn has_combinational_loop(&self) -> bool {
        self.comb_order().is_err()
    }

    /// Nodes in topological order, with edges into registers ignored
    ///
    /// Fails if the circuit has a combinational loop.
    pub(crate) fn comb_order(&self) -> Result<Vec<NodeIndex>> {
        let mut nb_pending: FxHashMap<NodeIndex, usize> = FxHashMap::default();
        let mut queue = VecDeque::new();
        for i in self.graph.node_indices() {
            let nb = if self.node(i).kind.is_register() {
                0
            } else {
                self.preds(i).count()
            };
            if nb == 0 {
                queue.push_back(i);
            } else {
                nb_pending.insert(i, nb);
            }
        }
        let mut order = Vec::with_capacity(self.nb_nodes());
        while let Some(i) = queue.pop_front() {
            order.push(i);
            for j in self.succs(i) {
                if let Some(nb) = nb_pending.get_mut(&j) {
                    *nb -= 1;
                    if *nb == 0 {
                        nb_pending.remove(&j);
                        queue.push_back(j);
                    }
                }
            }
        }
        match nb_pending.keys().next() {
            Some(&i) => Err(Error::CycleDetected(self.node(i).name.clone())),
            None => Ok(order),
        }
    }

    /// Node names in topological order over the full graph
    pub fn topo_sort(&self) -> Result<Vec<String>> {
        let order = petgraph::algo::toposort(&self.graph, None)
            .map_err(|c| Error::CycleDetected(self.node(c.node_id()).name.clone()))?;
        Ok(order
            .into_iter()
            .map(|i| self.node(i).name.clone())
            .collect())
    }

    /// Nodes with several fanouts whose transitive fanouts meet again
    pub fn reconvergent_fanout_nodes(&self) -> BTreeSet<String> {
        let stops = Stops::fanout();
        let mut ret = BTreeSet::new();
        for i in self.graph.node_indices() {
            let fo: Vec<NodeIndex> = self.succs(i).collect();
            if fo.len() < 2 {
                continue;
            }
            let cones: Vec<FxHashSet<NodeIndex>> = fo
                .iter()
                .map(|&f| {
                    let mut s = if stops.stops(self, f) {
                        FxHashSet::default()
                    } else {
                        self.transitive_fanout_idx(&[f], &stops)
                    };
                    s.insert(f);
                    s
                })
                .collect();
            let reconverges = (0..cones.len())
                .any(|a| (a + 1..cones.len()).any(|b| !cones[a].is_disjoint(&cones[b])));
            if reconverges {
                ret.insert(self.node(i).name.clone());
            }
        }
        ret
    }

    /// Cuts of at most `k` nodes in the combinational fanin of a node
    ///
    /// Startpoints and registers are leaves. Each node is also a trivial cut of itself.
    pub fn kcuts(&self, n: &str, k: usize) -> Result<BTreeSet<BTreeSet<String>>> {
        let root = self.idx(n)?;
        let mut memo: FxHashMap<NodeIndex, BTreeSet<BTreeSet<NodeIndex>>> = FxHashMap::default();
        let mut on_path = FxHashSet::default();
        let mut stack = vec![(root, false)];
        while let Some((i, done)) = stack.pop() {
            let is_leaf = self.node(i).kind.is_register() || self.preds(i).next().is_none();
            if done {
                on_path.remove(&i);
                let mut cuts: BTreeSet<BTreeSet<NodeIndex>> = BTreeSet::new();
                if !is_leaf {
                    cuts.insert(BTreeSet::new());
                    for j in self.preds(i) {
                        let Some(fanin_cuts) = memo.get(&j) else {
                            continue;
                        };
                        let mut merged = BTreeSet::new();
                        for a in &cuts {
                            for b in fanin_cuts {
                                let m: BTreeSet<NodeIndex> = a.union(b).copied().collect();
                                if m.len() <= k {
                                    merged.insert(m);
                                }
                            }
                        }
                        cuts = merged;
                    }
                }
                cuts.insert(BTreeSet::from([i]));
                memo.insert(i, cuts);
                continue;
            }
            if memo.contains_key(&i) {
                continue;
            }
            on_path.insert(i);
            stack.push((i, true));
            if !is_leaf {
                for j in self.preds(i) {
                    if memo.contains_key(&j) {
                        continue;
                    }
                    if on_path.contains(&j) {
                        return Err(Error::CycleDetected(self.node(j).name.clone()));
                    }
                    stack.push((j, false));
                }
            }
        }
        Ok(memo
            .remove(&root)
            .unwrap_or_default()
            .into_iter()
            .map(|c| self.names_of(c))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeOpts;

    fn set(v: &[&str]) -> BTreeSet<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    /// a, b -> x = and(a, b) -> y = or(x, b) ; q = ff(y) -> z = not(q)
    fn circuit() -> Circuit {
        let mut c = Circuit::new("c");
        c.add("a", NodeKind::Input).unwrap();
        c.add("b", NodeKind::Input).unwrap();
        c.add_with("x", NodeKind::And, NodeOpts::new().fanin(["a", "b"]))
            .unwrap();
        c.add_with("y", NodeKind::Or, NodeOpts::new().fanin(["x", "b"]).output(true))
            .unwrap();
        c.add_with("q", NodeKind::Ff, NodeOpts::new().fanin(["y"]))
            .unwrap();
        c.add_with("z", NodeKind::Not, NodeOpts::new().fanin(["q"]).output(true))
            .unwrap();
        c
    }

    #[test]
    fn test_transitive_fanin() {
        let c = circuit();
        assert_eq!(c.transitive_fanin(["y"]).unwrap(), set(&["a", "b", "x"]));
        assert_eq!(c.transitive_fanin(["z"]).unwrap(), set(&["q"]));
        assert_eq!(
            c.transitive_fanin(["d[q]"]).unwrap(),
            set(&["a", "b", "x", "y"])
        );
        // Start nodes are expanded even when they are registers
        assert_eq!(
            c.transitive_fanin(["q"]).unwrap(),
            set(&["a", "b", "x", "y", "d[q]", "r[q]", "clk[q]"])
        );
        assert_eq!(c.startpoints_of(["q"]).unwrap(), set(&["q"]));
        assert_eq!(
            c.transitive_fanin_with(["z"], &Stops::none()).unwrap(),
            set(&["a", "b", "x", "y", "q", "d[q]", "r[q]", "clk[q]"])
        );
        for n in c.nodes() {
            let tfi = c.transitive_fanin([&n]).unwrap();
            assert!(!tfi.contains(&n));
            let mut closure = tfi.clone();
            closure.insert(n.clone());
            if c.kind(&n).unwrap().is_register() {
                continue;
            }
            assert_eq!(c.transitive_fanin(&closure).unwrap(), tfi);
        }
    }

    #[test]
    fn test_transitive_fanout() {
        let c = circuit();
        assert_eq!(c.transitive_fanout(["a"]).unwrap(), set(&["x", "y", "d[q]"]));
        assert_eq!(c.transitive_fanout(["q"]).unwrap(), set(&["z"]));
        assert_eq!(c.endpoints_of(["a"]).unwrap(), set(&["y", "d[q]"]));
        assert_eq!(c.startpoints_of(["z"]).unwrap(), set(&["q"]));
        assert_eq!(c.startpoints_of(["d[q]"]).unwrap(), set(&["a", "b"]));
    }

    #[test]
    fn test_depth() {
        let c = circuit();
        assert_eq!(c.comb_depth(["y"], false).unwrap(), 2);
        assert_eq!(c.comb_depth(["y"], true).unwrap(), 1);
        assert_eq!(c.fanout_depth(["a"], false).unwrap(), 3);
        assert_eq!(c.fanout_depth(["b"], true).unwrap(), 2);
        assert_eq!(c.fanin_depth(["q"], false).unwrap(), 4);
        assert_eq!(c.fanin_depth(["q"], true).unwrap(), 1);
        assert_eq!(c.fanout_depth(["d[q]"], false).unwrap(), 2);
        assert_eq!(c.comb_depth(["z", "y"], false).unwrap(), 2);
    }

    #[test]
    fn test_deep_chain() {
        let nb = 100_000;
        let mut c = Circuit::new("chain");
        let mut prev = c.add("in_0", NodeKind::Input).unwrap();
        for i in 1..nb {
            let inp = c.add(&format!("in_{}", i), NodeKind::Input).unwrap();
            prev = c
                .add_with(
                    &format!("x_{}", i),
                    NodeKind::And,
                    NodeOpts::new().fanin([&prev, &inp]),
                )
                .unwrap();
        }
        assert_eq!(c.comb_depth([&prev], false).unwrap(), nb - 1);
        assert_eq!(c.comb_depth([&prev], true).unwrap(), 1);
        assert_eq!(c.fanout_depth(["in_0"], false).unwrap(), nb - 1);
        let cuts = c.kcuts(&prev, 2).unwrap();
        let x = format!("x_{}", nb - 2);
        let inp = format!("in_{}", nb - 1);
        assert_eq!(
            cuts,
            BTreeSet::from([set(&[prev.as_str()]), set(&[x.as_str(), inp.as_str()])])
        );
    }

    #[test]
    fn test_cycles() {
        let mut c = circuit();
        assert!(!c.has_combinational_loop());
        assert!(!c.is_cyclic());
        c.connect(["z"], ["x"]).unwrap();
        assert!(c.is_cyclic());
        assert!(!c.has_combinational_loop());
        assert!(c.topo_sort().is_err());
        c.connect(["y"], ["x"]).unwrap();
        assert!(c.has_combinational_loop());
        assert!(c.transitive_fanin(["x"]).unwrap().contains("x"));
    }

    #[test]
    fn test_reconvergence_and_cuts() {
        let c = circuit();
        assert_eq!(c.reconvergent_fanout_nodes(), set(&["b"]));
        // Paths through a register do not reconverge
        let mut d = circuit();
        d.add_with("w", NodeKind::And, NodeOpts::new().fanin(["y", "z"]))
            .unwrap();
        assert_eq!(d.reconvergent_fanout_nodes(), set(&["b"]));
        let cuts = c.kcuts("y", 2).unwrap();
        assert!(cuts.contains(&set(&["x", "b"])));
        assert!(cuts.contains(&set(&["a", "b"])));
        assert!(cuts.contains(&set(&["y"])));
        assert_eq!(cuts.len(), 3);
    }
}
