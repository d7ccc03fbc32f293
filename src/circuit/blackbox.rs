//! Opaque macro instances inside a circuit

use std::collections::BTreeMap;

use log::debug;

use crate::circuit::circuit::check_name;
use crate::{Circuit, Error, NodeKind, Result};

/// Definition of an opaque macro with named input and output ports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlackBox {
    name: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl BlackBox {
    /// Create a new blackbox definition
    pub fn new<I, J, S, T>(name: &str, inputs: I, outputs: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        BlackBox {
            name: name.to_string(),
            inputs: inputs.into_iter().map(|s| s.as_ref().to_string()).collect(),
            outputs: outputs.into_iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }

    /// Name of the definition
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Input ports, in order
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Output ports, in order
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Returns whether the port is an input port
    pub fn is_input(&self, port: &str) -> bool {
        self.inputs.iter().any(|p| p == port)
    }

    /// Returns whether the port is an output port
    pub fn is_output(&self, port: &str) -> bool {
        self.outputs.iter().any(|p| p == port)
    }

    fn ports(&self) -> impl Iterator<Item = &String> {
        self.inputs.iter().chain(self.outputs.iter())
    }
}

/// An instance of a blackbox in a circuit
#[derive(Debug, Clone)]
pub struct BlackBoxInstance {
    pub(crate) blackbox: BlackBox,
    pub(crate) pins: BTreeMap<String, String>,
}

impl BlackBoxInstance {
    /// Definition of the instance
    pub fn blackbox(&self) -> &BlackBox {
        &self.blackbox
    }

    /// Pin node for each port
    pub fn pins(&self) -> &BTreeMap<String, String> {
        &self.pins
    }

    /// Pin node of a port
    pub fn pin(&self, port: &str) -> Option<&str> {
        self.pins.get(port).map(|s| s.as_str())
    }
}

/// Name of the pin node for a port of an instance
pub(crate) fn pin_name(instance: &str, port: &str) -> String {
    format!("{}.{}", instance, port)
}

impl Circuit {
    /// Blackbox instances, by instance name
    pub fn blackboxes(&self) -> &BTreeMap<String, BlackBoxInstance> {
        &self.blackboxes
    }

    /// Returns whether the circuit contains blackbox instances
    pub fn has_blackboxes(&self) -> bool {
        !self.blackboxes.is_empty()
    }

    /// Fail if the circuit contains blackbox instances
    pub fn check_no_blackboxes(&self) -> Result<()> {
        if self.has_blackboxes() {
            Err(Error::BlackboxPresent(self.name().to_string()))
        } else {
            Ok(())
        }
    }

    /// Instantiate a blackbox
    ///
    /// Pins are created as `instance.port`. Each connection maps a port to a node:
    /// input ports are driven by the node, output ports drive the node, which must be a buffer.
    pub fn add_blackbox(
        &mut self,
        blackbox: &BlackBox,
        instance: &str,
        connections: &BTreeMap<String, String>,
    ) -> Result<()> {
        check_name(instance)?;
        if self.blackboxes.contains_key(instance) {
            return Err(Error::DuplicateName {
                name: instance.to_string(),
                existing: NodeKind::BbInput,
            });
        }
        for port in blackbox.ports() {
            let pin = pin_name(instance, port);
            check_name(&pin)?;
            if let Some(&i) = self.names.get(&pin) {
                return Err(Error::DuplicateName {
                    name: pin,
                    existing: self.node(i).kind,
                });
            }
        }
        for port in connections.keys() {
            if !blackbox.is_input(port) && !blackbox.is_output(port) {
                return Err(Error::MissingBlackboxPin {
                    instance: instance.to_string(),
                    pin: port.clone(),
                });
            }
        }
        let targets = connections
            .iter()
            .map(|(port, n)| self.idx(n).map(|i| (port, i)))
            .collect::<Result<Vec<_>>>()?;

        let mut pins = BTreeMap::new();
        let mut created = Vec::new();
        for port in &blackbox.inputs {
            let pin = pin_name(instance, port);
            created.push(self.insert_node(pin.clone(), NodeKind::BbInput, false));
            pins.insert(port.clone(), pin);
        }
        for port in &blackbox.outputs {
            let pin = pin_name(instance, port);
            created.push(self.insert_node(pin.clone(), NodeKind::BbOutput, false));
            pins.insert(port.clone(), pin);
        }
        let pairs = targets
            .into_iter()
            .map(|(port, n)| {
                let p = self.names[&pins[port]];
                if blackbox.is_input(port) {
                    (n, p)
                } else {
                    (p, n)
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
        self.blackboxes.insert(
            instance.to_string(),
            BlackBoxInstance {
                blackbox: blackbox.clone(),
                pins,
            },
        );
        Ok(())
    }

    /// Remove a blackbox instance and its pins
    pub fn remove_blackbox(&mut self, instance: &str) -> Result<BlackBoxInstance> {
        let inst = self
            .blackboxes
            .remove(instance)
            .ok_or_else(|| Error::UnknownNode(instance.to_string()))?;
        for pin in inst.pins.values() {
            if let Some(&i) = self.names.get(pin) {
                self.remove_index(i);
            }
        }
        Ok(inst)
    }

    /// Replace a blackbox instance by a circuit implementing it
    ///
    /// The circuit must have an input for each input port and an output for each output port,
    /// with the same names. It is embedded with the instance name as prefix.
    pub fn fill_blackbox(&mut self, instance: &str, implementation: &Circuit) -> Result<()> {
        let inst = self
            .blackboxes
            .get(instance)
            .ok_or_else(|| Error::UnknownNode(instance.to_string()))?
            .clone();
        let bb = &inst.blackbox;
        let inputs = implementation.inputs();
        let outputs = implementation.outputs();
        for port in bb.inputs() {
            if !inputs.contains(port) {
                return Err(Error::MissingBlackboxPin {
                    instance: instance.to_string(),
                    pin: port.clone(),
                });
            }
        }
        for port in bb.outputs() {
            if !outputs.contains(port) {
                return Err(Error::MissingBlackboxPin {
                    instance: instance.to_string(),
                    pin: port.clone(),
                });
            }
        }

        // Record the pin connections before removing the instance
        let mut connections = BTreeMap::new();
        for port in bb.inputs() {
            let pin = self.idx(&inst.pins[port])?;
            if let Some(driver) = self.preds(pin).next() {
                connections.insert(port.clone(), self.node(driver).name.clone());
            }
        }
        let mut loads = Vec::new();
        for port in bb.outputs() {
            let pin = self.idx(&inst.pins[port])?;
            for load in self.succs(pin) {
                loads.push((port.clone(), self.node(load).name.clone()));
            }
        }

        // Check that the embedded names are free before modifying the circuit
        let embedded_names = implementation.embedded_names(instance);
        let pin_names: Vec<&String> = inst.pins.values().collect();
        for n in embedded_names.values() {
            if self.contains(n) && !pin_names.contains(&n) {
                return Err(Error::DuplicateName {
                    name: n.clone(),
                    existing: self.kind(n)?,
                });
            }
        }

        self.remove_blackbox(instance)?;
        let map = self.embed(implementation, instance, &connections)?;
        for (port, load) in loads {
            self.connect([&map[&port]], [&load])?;
        }
        debug!(
            "Filled blackbox {} with circuit {}",
            instance,
            implementation.name()
        );
        Ok(())
    }

    /// Copy of the circuit where blackbox pins become circuit IO
    ///
    /// Output pins of the instances become inputs, input pins become outputs.
    pub fn strip_blackboxes(&self) -> Circuit {
        let mut c = self.clone();
        let instances = std::mem::take(&mut c.blackboxes);
        for inst in instances.values() {
            for pin in inst.pins.values() {
                if let Some(&i) = c.names.get(pin) {
                    let n = &mut c.graph[i];
                    n.kind = match n.kind {
                        NodeKind::BbOutput => NodeKind::Input,
                        _ => {
                            n.output = true;
                            NodeKind::Buf
                        }
                    };
                }
            }
        }
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeOpts;

    fn bb() -> BlackBox {
        BlackBox::new("and2", ["a", "b"], ["y"])
    }

    fn host() -> Circuit {
        let mut c = Circuit::new("host");
        c.add("i0", NodeKind::Input).unwrap();
        c.add("i1", NodeKind::Input).unwrap();
        c.add_with("o", NodeKind::Buf, NodeOpts::new().output(true))
            .unwrap();
        let conn = BTreeMap::from([
            ("a".to_string(), "i0".to_string()),
            ("b".to_string(), "i1".to_string()),
            ("y".to_string(), "o".to_string()),
        ]);
        c.add_blackbox(&bb(), "u0", &conn).unwrap();
        c
    }

    #[test]
    fn test_add_blackbox() {
        let c = host();
        assert_eq!(c.kind("u0.a").unwrap(), NodeKind::BbInput);
        assert_eq!(c.kind("u0.y").unwrap(), NodeKind::BbOutput);
        assert_eq!(c.fanin(["o"]).unwrap().len(), 1);
        assert!(c.check_no_blackboxes().is_err());
        assert_eq!(c.blackboxes()["u0"].pin("y"), Some("u0.y"));
    }

    #[test]
    fn test_blackbox_rules() {
        let mut c = host();
        assert!(c.connect(["u0.a"], ["o"]).is_err());
        c.add("x", NodeKind::And).unwrap();
        assert!(c.connect(["u0.y"], ["x"]).is_err());
        let bad = BTreeMap::from([("z".to_string(), "i0".to_string())]);
        assert!(matches!(
            c.add_blackbox(&bb(), "u1", &bad),
            Err(Error::MissingBlackboxPin { .. })
        ));
        assert!(!c.contains("u1.a"));
    }

    #[test]
    fn test_fill_blackbox() {
        let mut c = host();
        let mut imp = Circuit::new("and2");
        imp.add("a", NodeKind::Input).unwrap();
        imp.add("b", NodeKind::Input).unwrap();
        imp.add_with("y", NodeKind::And, NodeOpts::new().fanin(["a", "b"]).output(true))
            .unwrap();
        c.fill_blackbox("u0", &imp).unwrap();
        assert!(!c.has_blackboxes());
        assert!(!c.contains("u0.a"));
        assert_eq!(c.kind("u0_y").unwrap(), NodeKind::And);
        assert_eq!(c.fanin(["o"]).unwrap().into_iter().collect::<Vec<_>>(), ["u0_y"]);
        assert_eq!(c.kind("u0_a").unwrap(), NodeKind::Buf);
        assert_eq!(c.outputs().len(), 1);
    }

    #[test]
    fn test_strip_blackboxes() {
        let c = host().strip_blackboxes();
        assert!(!c.has_blackboxes());
        assert_eq!(c.kind("u0.y").unwrap(), NodeKind::Input);
        assert_eq!(c.kind("u0.a").unwrap(), NodeKind::Buf);
        assert!(c.is_output("u0.b").unwrap());
    }
}
