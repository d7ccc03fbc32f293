use std::collections::{BTreeMap, BTreeSet};

use fxhash::{FxHashMap, FxHashSet};
use itertools::Itertools;
use log::debug;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;

use crate::circuit::blackbox::BlackBoxInstance;
use crate::circuit::kind::{parse_aux_name, NodeKind};
use crate::{Error, Result};

/// A named node of the graph
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    pub(crate) output: bool,
}

/// Optional connections given when adding a node
///
/// For registers, `fanin` drives the data input `d[name]`, and `clk`, `r` and `s`
/// drive the corresponding auxiliary nodes.
#[derive(Debug, Clone, Default)]
pub struct NodeOpts {
    /// Drivers of the node
    pub fanin: Vec<String>,
    /// Nodes driven by the node
    pub fanout: Vec<String>,
    /// Whether the node is a circuit output
    pub output: bool,
    /// Clock driver, for registers
    pub clk: Option<String>,
    /// Reset driver, for registers
    pub r: Option<String>,
    /// Set driver, for latches
    pub s: Option<String>,
}

impl NodeOpts {
    /// Create empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the drivers of the node
    pub fn fanin<I, S>(mut self, ns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.fanin = ns.into_iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    /// Set the nodes driven by the node
    pub fn fanout<I, S>(mut self, ns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.fanout = ns.into_iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    /// Mark the node as an output
    pub fn output(mut self, output: bool) -> Self {
        self.output = output;
        self
    }

    /// Set the clock driver
    pub fn clk(mut self, n: &str) -> Self {
        self.clk = Some(n.to_string());
        self
    }

    /// Set the reset driver
    pub fn reset(mut self, n: &str) -> Self {
        self.r = Some(n.to_string());
        self
    }

    /// Set the set driver
    pub fn set(mut self, n: &str) -> Self {
        self.s = Some(n.to_string());
        self
    }
}

/// Check that a name is a legal node identifier
pub(crate) fn check_name(name: &str) -> Result<()> {
    let legal = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && !name
            .chars()
            .any(|c| c.is_whitespace() || "(),;=".contains(c));
    if legal {
        Ok(())
    } else {
        Err(Error::InvalidName(name.to_string()))
    }
}

/// Representation of a Boolean or sequential circuit as a directed graph of named nodes
///
/// An edge `u -> v` means that `u` drives `v`. Flip-flops and latches are macro-expanded
/// into the register node itself and its auxiliary inputs `d[q]`, `r[q]`, `clk[q]`
/// (and `s[q]` for latches), which always exist together.
///
/// ```
/// # use circuitgraph::{Circuit, NodeKind, NodeOpts};
/// let mut c = Circuit::new("example");
/// c.add("a", NodeKind::Input).unwrap();
/// c.add("b", NodeKind::Input).unwrap();
/// c.add_with("x", NodeKind::And, NodeOpts::new().fanin(["a", "b"]).output(true))
///     .unwrap();
/// assert_eq!(c.fanin(["x"]).unwrap().len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Circuit {
    name: String,
    pub(crate) graph: StableDiGraph<Node, ()>,
    pub(crate) names: FxHashMap<String, NodeIndex>,
    pub(crate) blackboxes: BTreeMap<String, BlackBoxInstance>,
}

impl Circuit {
    /// Create a new empty circuit
    pub fn new(name: impl Into<String>) -> Self {
        Circuit {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Name of the circuit
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the circuit
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Return the number of nodes
    pub fn nb_nodes(&self) -> usize {
        self.graph.node_count()
    }

    /// Return the number of edges
    pub fn nb_edges(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns whether a node with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub(crate) fn idx(&self, name: &str) -> Result<NodeIndex> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownNode(name.to_string()))
    }

    pub(crate) fn indices<I, S>(&self, ns: I) -> Result<Vec<NodeIndex>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ns.into_iter().map(|n| self.idx(n.as_ref())).collect()
    }

    pub(crate) fn node(&self, i: NodeIndex) -> &Node {
        &self.graph[i]
    }

    pub(crate) fn node_weights(&self) -> impl Iterator<Item = &Node> + '_ {
        self.graph.node_indices().map(|i| &self.graph[i])
    }

    pub(crate) fn names_of<I: IntoIterator<Item = NodeIndex>>(&self, it: I) -> BTreeSet<String> {
        it.into_iter()
            .map(|i| self.graph[i].name.clone())
            .collect()
    }

    pub(crate) fn preds(&self, i: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(i, Direction::Incoming)
    }

    pub(crate) fn succs(&self, i: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(i, Direction::Outgoing)
    }

    /// Kind of a node
    pub fn kind(&self, name: &str) -> Result<NodeKind> {
        Ok(self.graph[self.idx(name)?].kind)
    }

    /// Returns whether a node is a circuit output
    pub fn is_output(&self, name: &str) -> Result<bool> {
        let n = &self.graph[self.idx(name)?];
        Ok(n.output || n.kind == NodeKind::Output)
    }

    /// Mark or unmark a node as a circuit output
    pub fn set_output(&mut self, name: &str, output: bool) -> Result<()> {
        let i = self.idx(name)?;
        self.graph[i].output = output;
        Ok(())
    }

    /// All node names
    pub fn nodes(&self) -> BTreeSet<String> {
        self.names.keys().cloned().collect()
    }

    /// Names of the nodes whose kind is in `kinds`
    pub fn filter_kind(&self, kinds: &[NodeKind]) -> BTreeSet<String> {
        self.node_weights()
            .filter(|n| kinds.contains(&n.kind))
            .map(|n| n.name.clone())
            .collect()
    }

    /// Primary inputs
    pub fn inputs(&self) -> BTreeSet<String> {
        self.filter_kind(&[NodeKind::Input])
    }

    /// Circuit outputs, either marked or of kind output
    pub fn outputs(&self) -> BTreeSet<String> {
        self.node_weights()
            .filter(|n| n.output || n.kind == NodeKind::Output)
            .map(|n| n.name.clone())
            .collect()
    }

    /// Flip-flops
    pub fn ffs(&self) -> BTreeSet<String> {
        self.filter_kind(&[NodeKind::Ff])
    }

    /// Latches
    pub fn lats(&self) -> BTreeSet<String> {
        self.filter_kind(&[NodeKind::Lat])
    }

    /// Flip-flops and latches
    pub fn registers(&self) -> BTreeSet<String> {
        self.filter_kind(&[NodeKind::Ff, NodeKind::Lat])
    }

    /// Returns whether the circuit has no register
    pub fn is_comb(&self) -> bool {
        self.node_weights().all(|n| !n.kind.is_register())
    }

    /// All edges as (driver, driven) pairs, sorted
    pub fn edges(&self) -> Vec<(String, String)> {
        self.graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(u, v)| (self.graph[u].name.clone(), self.graph[v].name.clone()))
            .sorted()
            .collect()
    }

    /// Number of drivers of a node
    pub fn nb_fanin(&self, name: &str) -> Result<usize> {
        Ok(self.preds(self.idx(name)?).count())
    }

    /// Number of nodes driven by a node
    pub fn nb_fanout(&self, name: &str) -> Result<usize> {
        Ok(self.succs(self.idx(name)?).count())
    }

    /// Return a name derived from `base` that is not used in the circuit
    ///
    /// The name itself is returned if it is free, then `base_0`, `base_1`, ...
    pub fn uid(&self, base: &str) -> String {
        if !self.contains(base) {
            return base.to_string();
        }
        let mut i = 0;
        loop {
            let n = format!("{}_{}", base, i);
            if !self.contains(&n) {
                return n;
            }
            i += 1;
        }
    }

    /// Auxiliary nodes of a register
    pub(crate) fn aux_nodes(&self, q: NodeIndex) -> Vec<NodeIndex> {
        let n = &self.graph[q];
        n.kind
            .register_aux()
            .iter()
            .filter_map(|k| self.names.get(&k.aux_name(&n.name)).copied())
            .collect()
    }

    /// Register owning an auxiliary node
    pub(crate) fn aux_owner(&self, i: NodeIndex) -> Option<NodeIndex> {
        let (_, q) = parse_aux_name(&self.graph[i].name)?;
        self.names.get(q).copied()
    }

    /// Insert a node without any check
    pub(crate) fn insert_node(&mut self, name: String, kind: NodeKind, output: bool) -> NodeIndex {
        let i = self.graph.add_node(Node {
            name: name.clone(),
            kind,
            output,
        });
        self.names.insert(name, i);
        i
    }

    /// Insert an edge without any check
    pub(crate) fn insert_edge(&mut self, u: NodeIndex, v: NodeIndex) {
        self.graph.update_edge(u, v, ());
    }

    pub(crate) fn remove_index(&mut self, i: NodeIndex) {
        if let Some(n) = self.graph.remove_node(i) {
            self.names.remove(&n.name);
        }
    }

    /// Add a node without connections
    pub fn add(&mut self, name: &str, kind: NodeKind) -> Result<String> {
        self.add_with(name, kind, NodeOpts::default())
    }

    /// Add a node with its connections
    ///
    /// Flip-flops and latches are created together with their auxiliary nodes. All arguments
    /// are checked before the circuit is modified. Adding a node that already exists with the
    /// same kind only adds the new connections.
    pub fn add_with(&mut self, name: &str, kind: NodeKind, opts: NodeOpts) -> Result<String> {
        use NodeKind::*;
        check_name(name)?;
        if parse_aux_name(name).is_some() {
            return Err(Error::InvalidName(name.to_string()));
        }
        if kind.is_register_aux() || kind.is_blackbox_pin() {
            return Err(Error::Precondition(format!(
                "nodes of kind {} are created with their register or blackbox instance",
                kind
            )));
        }
        let has_controls = opts.clk.is_some() || opts.r.is_some() || opts.s.is_some();
        if has_controls && !kind.is_register() {
            return Err(Error::Precondition(format!(
                "'{}' of kind {} cannot have clock, reset or set drivers",
                name, kind
            )));
        }
        if kind == Ff && opts.s.is_some() {
            return Err(Error::Precondition(format!(
                "flip-flop '{}' has no set input",
                name
            )));
        }
        if let Some(&i) = self.names.get(name) {
            let existing = self.graph[i].kind;
            if existing != kind {
                return Err(Error::DuplicateName {
                    name: name.to_string(),
                    existing,
                });
            }
        }
        let fanin = self.indices(&opts.fanin)?;
        let fanout = self.indices(&opts.fanout)?;
        let controls = [(Clk, &opts.clk), (R, &opts.r), (S, &opts.s)]
            .into_iter()
            .filter_map(|(k, n)| n.as_ref().map(|n| (k, n)))
            .map(|(k, n)| self.idx(n).map(|i| (k, i)))
            .collect::<Result<Vec<_>>>()?;

        let mut created = Vec::new();
        let q = match self.names.get(name) {
            Some(&i) => i,
            None => {
                let i = self.insert_node(name.to_string(), kind, false);
                created.push(i);
                for k in kind.register_aux() {
                    let a = self.insert_node(k.aux_name(name), *k, false);
                    self.insert_edge(a, i);
                    created.push(a);
                }
                i
            }
        };
        let data = if kind.is_register() {
            self.names[&D.aux_name(name)]
        } else {
            q
        };
        let mut pairs: Vec<(NodeIndex, NodeIndex)> = fanin.iter().map(|&u| (u, data)).collect();
        for (k, u) in controls {
            pairs.push((u, self.names[&k.aux_name(name)]));
        }
        pairs.extend(fanout.iter().map(|&v| (q, v)));
        if let Err(e) = self.check_edges(&pairs) {
            for i in created {
                self.remove_index(i);
            }
            return Err(e);
        }
        for (u, v) in pairs {
            self.insert_edge(u, v);
        }
        if opts.output {
            self.graph[q].output = true;
        }
        Ok(name.to_string())
    }

    /// Check that the edges can be added without breaking the connection rules
    pub(crate) fn check_edges(&self, pairs: &[(NodeIndex, NodeIndex)]) -> Result<()> {
        use NodeKind::*;
        let mut added_in: FxHashMap<NodeIndex, usize> = FxHashMap::default();
        let mut added_out: FxHashMap<NodeIndex, usize> = FxHashMap::default();
        for &(u, v) in pairs.iter().unique() {
            if self.graph.find_edge(u, v).is_some() {
                continue;
            }
            let (un, vn) = (&self.graph[u], &self.graph[v]);
            let illegal_driver = match un.kind {
                BbInput | Output | D | R | S | Clk => true,
                BbOutput => vn.kind != Buf,
                _ => false,
            };
            if illegal_driver {
                return Err(Error::Precondition(format!(
                    "'{}' of kind {} cannot drive '{}' of kind {}",
                    un.name, un.kind, vn.name, vn.kind
                )));
            }
            if vn.kind.is_register() {
                return Err(Error::Precondition(format!(
                    "register '{}' is driven through its auxiliary nodes",
                    vn.name
                )));
            }
            *added_in.entry(v).or_default() += 1;
            *added_out.entry(u).or_default() += 1;
        }
        for (v, nb) in added_in {
            let vn = &self.graph[v];
            let total = self.preds(v).count() + nb;
            if let Some(m) = vn.kind.max_fanin() {
                if total > m {
                    return Err(Error::InvalidArity {
                        node: vn.name.clone(),
                        kind: vn.kind,
                        got: total,
                    });
                }
            }
        }
        for (u, nb) in added_out {
            let un = &self.graph[u];
            if un.kind == BbOutput && self.succs(u).count() + nb > 1 {
                return Err(Error::Precondition(format!(
                    "blackbox output '{}' can only drive a single buffer",
                    un.name
                )));
            }
        }
        Ok(())
    }

    /// Change the kind of a logic node
    ///
    /// Registers, their auxiliary nodes and blackbox pins keep their kind.
    pub fn set_kind(&mut self, name: &str, kind: NodeKind) -> Result<()> {
        let i = self.idx(name)?;
        let old = self.graph[i].kind;
        if old == kind {
            return Ok(());
        }
        let fixed = |k: NodeKind| k.is_register() || k.is_register_aux() || k.is_blackbox_pin();
        if fixed(old) || fixed(kind) {
            return Err(Error::Precondition(format!(
                "cannot change '{}' from {} to {}",
                name, old, kind
            )));
        }
        let nb_fanin = self.preds(i).count();
        if kind.max_fanin().is_some_and(|m| nb_fanin > m) {
            return Err(Error::InvalidArity {
                node: name.to_string(),
                kind,
                got: nb_fanin,
            });
        }
        if kind == NodeKind::Output && self.succs(i).next().is_some() {
            return Err(Error::Precondition(format!(
                "output sink '{}' cannot drive other nodes",
                name
            )));
        }
        self.graph[i].kind = kind;
        Ok(())
    }

    /// Remove nodes and their edges
    ///
    /// Removing a register removes its auxiliary nodes as well. Auxiliary nodes cannot be
    /// removed on their own, and blackbox pins are removed with their instance.
    pub fn remove<I, S>(&mut self, ns: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let requested: FxHashSet<NodeIndex> = self.indices(ns)?.into_iter().collect();
        let mut to_remove = Vec::new();
        for &i in &requested {
            let n = &self.graph[i];
            if n.kind.is_register_aux() {
                if self
                    .aux_owner(i)
                    .is_some_and(|q| requested.contains(&q))
                {
                    continue;
                }
                return Err(Error::Precondition(format!(
                    "auxiliary node '{}' is removed with its register",
                    n.name
                )));
            }
            if n.kind.is_blackbox_pin() {
                return Err(Error::Precondition(format!(
                    "blackbox pin '{}' is removed with its instance",
                    n.name
                )));
            }
            to_remove.push(i);
            to_remove.extend(self.aux_nodes(i));
        }
        for i in to_remove {
            self.remove_index(i);
        }
        Ok(())
    }

    /// Connect every node of `us` to every node of `vs`
    ///
    /// Existing edges are left untouched. No edge is added if any of them is illegal.
    pub fn connect<I, J, S, T>(&mut self, us: I, vs: J) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let us = self.indices(us)?;
        let vs = self.indices(vs)?;
        let pairs = us
            .iter()
            .cartesian_product(vs.iter())
            .map(|(&u, &v)| (u, v))
            .collect::<Vec<_>>();
        self.check_edges(&pairs)?;
        for (u, v) in pairs {
            self.insert_edge(u, v);
        }
        Ok(())
    }

    /// Remove the edges from every node of `us` to every node of `vs`
    pub fn disconnect<I, J, S, T>(&mut self, us: I, vs: J) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let us = self.indices(us)?;
        let vs = self.indices(vs)?;
        let mut edges = Vec::new();
        for (&u, &v) in us.iter().cartesian_product(vs.iter()) {
            if self.graph[v].kind.is_register() && self.aux_owner(u) == Some(v) {
                return Err(Error::Precondition(format!(
                    "cannot disconnect '{}' from its register",
                    self.graph[u].name
                )));
            }
            if let Some(e) = self.graph.find_edge(u, v) {
                edges.push(e);
            }
        }
        for e in edges {
            self.graph.remove_edge(e);
        }
        Ok(())
    }

    /// Drivers of the nodes
    pub fn fanin<I, S>(&self, ns: I) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let idx = self.indices(ns)?;
        Ok(self.names_of(idx.into_iter().flat_map(|i| self.preds(i))))
    }

    /// Nodes driven by the nodes
    pub fn fanout<I, S>(&self, ns: I) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let idx = self.indices(ns)?;
        Ok(self.names_of(idx.into_iter().flat_map(|i| self.succs(i))))
    }

    /// Remove nodes that drive nothing and are not outputs, until none is left
    ///
    /// Inputs are kept unless `inputs` is set. Returns the removed nodes.
    pub fn remove_unloaded(&mut self, inputs: bool) -> BTreeSet<String> {
        let mut removed = BTreeSet::new();
        loop {
            let unloaded: Vec<NodeIndex> = self
                .graph
                .node_indices()
                .filter(|&i| {
                    let n = &self.graph[i];
                    !n.output
                        && n.kind != NodeKind::Output
                        && !n.kind.is_register_aux()
                        && !n.kind.is_blackbox_pin()
                        && (inputs || n.kind != NodeKind::Input)
                        && self.succs(i).next().is_none()
                })
                .collect();
            if unloaded.is_empty() {
                break;
            }
            for i in unloaded {
                removed.insert(self.graph[i].name.clone());
                for a in self.aux_nodes(i) {
                    self.remove_index(a);
                }
                self.remove_index(i);
            }
        }
        debug!("Removed {} unloaded nodes from {}", removed.len(), self.name);
        removed
    }
}
