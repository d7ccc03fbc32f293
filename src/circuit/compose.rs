//! Composition of circuits: embedding, extraction and renaming

use std::collections::{BTreeMap, BTreeSet};

use fxhash::FxHashSet;
use log::debug;
use petgraph::stable_graph::NodeIndex;

use crate::circuit::blackbox::{pin_name, BlackBoxInstance};
use crate::circuit::circuit::check_name;
use crate::{Circuit, Error, NodeKind, Result};

impl Circuit {
    /// Blackbox instance and port of each pin node
    fn pin_owners(&self) -> BTreeMap<&str, (&str, &str)> {
        let mut ret = BTreeMap::new();
        for (inst, bb) in &self.blackboxes {
            for (port, pin) in &bb.pins {
                ret.insert(pin.as_str(), (inst.as_str(), port.as_str()));
            }
        }
        ret
    }

    /// New name of every node, given how to rename nodes and instances
    ///
    /// Auxiliary nodes follow their register and pins follow their instance.
    fn renamed<F, G>(&self, node_name: F, instance_name: G) -> BTreeMap<String, String>
    where
        F: Fn(&str) -> String,
        G: Fn(&str) -> String,
    {
        let pins = self.pin_owners();
        let mut ret = BTreeMap::new();
        for n in self.node_weights() {
            let new_name = if let Some((inst, port)) = pins.get(n.name.as_str()) {
                pin_name(&instance_name(inst), port)
            } else if let Some(q) = self
                .aux_owner_name(&n.name)
                .filter(|_| n.kind.is_register_aux())
            {
                n.kind.aux_name(&node_name(q))
            } else {
                node_name(&n.name)
            };
            ret.insert(n.name.clone(), new_name);
        }
        ret
    }

    fn aux_owner_name<'a>(&self, name: &'a str) -> Option<&'a str> {
        let i = *self.names.get(name)?;
        self.aux_owner(i)?;
        crate::circuit::kind::parse_aux_name(name).map(|(_, q)| q)
    }

    /// Names given to the nodes of this circuit when embedded with a prefix
    pub fn embedded_names(&self, prefix: &str) -> BTreeMap<String, String> {
        self.renamed(
            |n| format!("{}_{}", prefix, n),
            |i| format!("{}_{}", prefix, i),
        )
    }

    /// Copy the blackbox instances with renamed instances and pins
    fn renamed_blackboxes<G>(
        &self,
        names: &BTreeMap<String, String>,
        instance_name: G,
    ) -> BTreeMap<String, BlackBoxInstance>
    where
        G: Fn(&str) -> String,
    {
        self.blackboxes
            .iter()
            .map(|(inst, bb)| {
                let pins = bb
                    .pins
                    .iter()
                    .map(|(port, pin)| (port.clone(), names[pin].clone()))
                    .collect();
                (
                    instance_name(inst),
                    BlackBoxInstance {
                        blackbox: bb.blackbox.clone(),
                        pins,
                    },
                )
            })
            .collect()
    }

    /// Splice another circuit into this one
    ///
    /// Every node `n` of `other` is copied as `prefix_n`. Each connection maps a node of
    /// `other` to a node of this circuit: a connected input becomes a buffer driven by the
    /// mapped node, a connected output drives the mapped node. Outputs of `other` are not
    /// outputs of this circuit. Returns the name of each copied node.
    pub fn embed(
        &mut self,
        other: &Circuit,
        prefix: &str,
        connections: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>> {
        let names = other.embedded_names(prefix);
        for n in names.values() {
            check_name(n)?;
            if let Some(&i) = self.names.get(n) {
                return Err(Error::DuplicateName {
                    name: n.clone(),
                    existing: self.node(i).kind,
                });
            }
        }
        let mut conn_edges = Vec::new();
        for (k, v) in connections {
            let kind = other.kind(k)?;
            let is_input = kind == NodeKind::Input;
            if !is_input && !other.is_output(k)? {
                return Err(Error::Precondition(format!(
                    "'{}' is not an input or output of {}",
                    k,
                    other.name()
                )));
            }
            conn_edges.push((k, self.idx(v)?, is_input));
        }

        let mut created = Vec::new();
        for n in other.node_weights() {
            let kind = match n.kind {
                NodeKind::Input if connections.contains_key(&n.name) => NodeKind::Buf,
                NodeKind::Output => NodeKind::Buf,
                k => k,
            };
            created.push(self.insert_node(names[&n.name].clone(), kind, false));
        }
        for e in other.graph.edge_indices() {
            if let Some((u, v)) = other.graph.edge_endpoints(e) {
                let u = self.names[&names[&other.node(u).name]];
                let v = self.names[&names[&other.node(v).name]];
                self.insert_edge(u, v);
            }
        }
        let pairs = conn_edges
            .into_iter()
            .map(|(k, v, is_input)| {
                let n = self.names[&names[k]];
                if is_input {
                    (v, n)
                } else {
                    (n, v)
                }
            })
            .collect::<Vec<_>>();
        if let Err(e) = self.check_edges(&pairs) {
            for i in created {
                self.remove_index(i);
            }
            return Err(e);
        }
        for (u, v) in pairs {
            self.insert_edge(u, v);
        }
        let instances = other.renamed_blackboxes(&names, |i| format!("{}_{}", prefix, i));
        self.blackboxes.extend(instances);
        debug!(
            "Embedded {} ({} nodes) into {} as {}",
            other.name(),
            other.nb_nodes(),
            self.name(),
            prefix
        );
        Ok(names)
    }

    /// Copy of the circuit with renamed nodes
    ///
    /// Nodes missing from the map keep their name. Auxiliary nodes are renamed with their
    /// register and cannot be renamed directly, nor can blackbox pins.
    pub fn relabel(&self, map: &BTreeMap<String, String>) -> Result<Circuit> {
        for k in map.keys() {
            let kind = self.kind(k)?;
            if kind.is_register_aux() || kind.is_blackbox_pin() {
                return Err(Error::Precondition(format!(
                    "'{}' of kind {} cannot be renamed directly",
                    k, kind
                )));
            }
        }
        let names = self.renamed(
            |n| map.get(n).cloned().unwrap_or_else(|| n.to_string()),
            |i| i.to_string(),
        );
        let mut seen = BTreeSet::new();
        for n in names.values() {
            check_name(n)?;
            if !seen.insert(n) {
                return Err(Error::DuplicateName {
                    name: n.clone(),
                    existing: self.kind(n).unwrap_or(NodeKind::Buf),
                });
            }
        }
        let mut c = Circuit::new(self.name());
        for n in self.node_weights() {
            c.insert_node(names[&n.name].clone(), n.kind, n.output);
        }
        for e in self.graph.edge_indices() {
            if let Some((u, v)) = self.graph.edge_endpoints(e) {
                let u = c.names[&names[&self.node(u).name]];
                let v = c.names[&names[&self.node(v).name]];
                c.insert_edge(u, v);
            }
        }
        c.blackboxes = self.renamed_blackboxes(&names, |i| i.to_string());
        Ok(c)
    }

    /// Extract the subgraph induced by a set of nodes
    ///
    /// Registers whose auxiliary nodes are not all selected become inputs, and selected
    /// auxiliary nodes without their register become buffers. Blackbox pins are kept only
    /// if the whole instance is selected.
    /// With `modify_io`, nodes without fanin become inputs and nodes without fanout become outputs.
    pub fn subcircuit<I, S>(&self, ns: I, modify_io: bool) -> Result<Circuit>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let selected: FxHashSet<NodeIndex> = self.indices(ns)?.into_iter().collect();
        let full_instances: BTreeMap<&str, bool> = self
            .blackboxes
            .iter()
            .map(|(inst, bb)| {
                let full = bb
                    .pins
                    .values()
                    .all(|p| self.names.get(p).is_some_and(|i| selected.contains(i)));
                (inst.as_str(), full)
            })
            .collect();
        let pins = self.pin_owners();

        let mut c = Circuit::new(self.name());
        for &i in &selected {
            let n = self.node(i);
            let kind = match n.kind {
                k if k.is_register() => {
                    if self.aux_nodes(i).iter().all(|a| selected.contains(a)) {
                        k
                    } else {
                        NodeKind::Input
                    }
                }
                k if k.is_register_aux() => {
                    if self.aux_owner(i).is_some_and(|q| selected.contains(&q)) {
                        k
                    } else {
                        NodeKind::Buf
                    }
                }
                k if k.is_blackbox_pin() => {
                    let full = pins
                        .get(n.name.as_str())
                        .is_some_and(|(inst, _)| full_instances[inst]);
                    match (full, k) {
                        (true, k) => k,
                        (false, NodeKind::BbInput) => NodeKind::Buf,
                        (false, _) => NodeKind::Input,
                    }
                }
                k => k,
            };
            c.insert_node(n.name.clone(), kind, n.output);
        }
        for &i in &selected {
            for j in self.succs(i) {
                if selected.contains(&j) {
                    let u = c.names[&self.node(i).name];
                    let v = c.names[&self.node(j).name];
                    // A register turned into an input loses its auxiliary edges
                    if c.node(v).kind != NodeKind::Input {
                        c.insert_edge(u, v);
                    }
                }
            }
        }
        for (inst, bb) in &self.blackboxes {
            if full_instances[inst.as_str()] {
                c.blackboxes.insert(inst.clone(), bb.clone());
            }
        }
        if modify_io {
            let indices: Vec<NodeIndex> = c.graph.node_indices().collect();
            for i in indices {
                let kind = c.node(i).kind;
                let no_fanin = c.preds(i).next().is_none();
                let no_fanout = c.succs(i).next().is_none();
                if no_fanin
                    && !kind.is_source()
                    && !kind.is_register()
                    && !kind.is_register_aux()
                {
                    c.graph[i].kind = NodeKind::Input;
                }
                if no_fanout && !kind.is_register_aux() && kind != NodeKind::BbInput {
                    c.graph[i].output = true;
                }
            }
        }
        Ok(c)
    }

    /// Copy of the circuit where inputs become buffers to be driven by other logic
    pub fn strip_inputs(&self) -> Circuit {
        let mut c = self.clone();
        for i in self.graph.node_indices() {
            if c.graph[i].kind == NodeKind::Input {
                c.graph[i].kind = NodeKind::Buf;
            }
        }
        c
    }

    /// Copy of the circuit without outputs; output sinks become buffers
    pub fn strip_outputs(&self) -> Circuit {
        let mut c = self.clone();
        for i in self.graph.node_indices() {
            let n = &mut c.graph[i];
            n.output = false;
            if n.kind == NodeKind::Output {
                n.kind = NodeKind::Buf;
            }
        }
        c
    }

    /// Copy of the circuit without inputs and outputs
    pub fn strip_io(&self) -> Circuit {
        self.strip_inputs().strip_outputs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeOpts;

    fn seq() -> Circuit {
        let mut c = Circuit::new("seq");
        c.add("a", NodeKind::Input).unwrap();
        c.add_with("x", NodeKind::Xor, NodeOpts::new().fanin(["a"]).output(true))
            .unwrap();
        c.add_with("q", NodeKind::Ff, NodeOpts::new().fanin(["x"]).fanout(["x"]))
            .unwrap();
        c
    }

    #[test]
    fn test_embed() {
        let s = seq();
        let mut c = Circuit::new("top");
        c.add("i", NodeKind::Input).unwrap();
        let conn = BTreeMap::from([("a".to_string(), "i".to_string())]);
        let names = c.embed(&s, "u", &conn).unwrap();
        assert_eq!(names["q"], "u_q");
        assert_eq!(names["d[q]"], "d[u_q]");
        assert_eq!(c.kind("u_a").unwrap(), NodeKind::Buf);
        assert_eq!(c.kind("clk[u_q]").unwrap(), NodeKind::Clk);
        assert!(c.outputs().is_empty());
        assert_eq!(c.nb_edges(), s.nb_edges() + 1);
        // Second embedding with the same prefix collides
        assert!(matches!(
            c.embed(&s, "u", &BTreeMap::new()),
            Err(Error::DuplicateName { .. })
        ));
        assert_eq!(c.nb_nodes(), s.nb_nodes() + 1);
    }

    #[test]
    fn test_relabel() {
        let s = seq();
        let map = BTreeMap::from([("q".to_string(), "state".to_string())]);
        let r = s.relabel(&map).unwrap();
        assert!(r.contains("state"));
        assert!(r.contains("d[state]"));
        assert!(!r.contains("d[q]"));
        assert_eq!(r.nb_edges(), s.nb_edges());
        assert!(r.is_output("x").unwrap());

        let bad = BTreeMap::from([("q".to_string(), "a".to_string())]);
        assert!(s.relabel(&bad).is_err());
        let aux = BTreeMap::from([("d[q]".to_string(), "y".to_string())]);
        assert!(s.relabel(&aux).is_err());
    }

    #[test]
    fn test_subcircuit() {
        let s = seq();
        let sub = s.subcircuit(["x", "q"], false).unwrap();
        assert_eq!(sub.kind("q").unwrap(), NodeKind::Input);
        assert_eq!(sub.nb_edges(), 1);

        let sub = s.subcircuit(["x", "d[q]"], true).unwrap();
        assert_eq!(sub.kind("d[q]").unwrap(), NodeKind::Buf);
        assert_eq!(sub.kind("x").unwrap(), NodeKind::Input);
        assert!(sub.is_output("d[q]").unwrap());
    }

    #[test]
    fn test_strip_io() {
        let s = seq().strip_io();
        assert!(s.inputs().is_empty());
        assert!(s.outputs().is_empty());
        assert_eq!(s.kind("a").unwrap(), NodeKind::Buf);
    }
}
