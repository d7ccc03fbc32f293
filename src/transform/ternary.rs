use std::collections::BTreeMap;

use log::info;

use crate::circuit::NodeKind::*;
use crate::{Circuit, Error, NodeOpts, Result};

/// Encode the circuit with ternary values
///
/// Each node `n` gets a second node, usually `n_X`, that is high when the value of `n` is
/// unknown. When it is low, the value of `n` is valid. Unknown values enter through the
/// X inputs created for each input. Returns the encoded circuit and the X node of each node.
pub fn ternary(c: &Circuit) -> Result<(Circuit, BTreeMap<String, String>)> {
    c.check_no_blackboxes()?;
    let mut t = c.clone();
    let mut mapping = BTreeMap::new();

    // Create the X nodes; auxiliary nodes come with their register
    for n in c.node_weights() {
        if n.kind.is_register_aux() {
            continue;
        }
        let x = t.uid(&format!("{}_X", n.name));
        let kind = match n.kind {
            And | Nand | Or | Nor => And,
            Xor | Xnor => Or,
            Buf | Not | Output => Buf,
            Const0 | Const1 => Const0,
            Input => Input,
            Ff => Ff,
            Lat => Lat,
            k => {
                return Err(Error::UnsupportedGateKind {
                    node: n.name.clone(),
                    kind: k,
                })
            }
        };
        t.add_with(&x, kind, NodeOpts::new().output(c.is_output(&n.name)?))?;
        if n.kind.is_register() {
            for k in n.kind.register_aux() {
                mapping.insert(k.aux_name(&n.name), k.aux_name(&x));
            }
        }
        mapping.insert(n.name.clone(), x);
    }

    // Connect them
    for i in c.graph.node_indices() {
        let n = c.node(i);
        let x = &mapping[&n.name];
        let fanin: Vec<&String> = c.preds(i).map(|j| &c.node(j).name).collect();
        let fanin_x: Vec<&String> = fanin.iter().map(|f| &mapping[*f]).collect();
        match n.kind {
            And | Nand | Or | Nor => {
                let x_in_fi = t.uid(&format!("{}_x_in_fi", n.name));
                t.add_with(
                    &x_in_fi,
                    Or,
                    NodeOpts::new().fanin(&fanin_x).fanout([x]),
                )?;
                let and_family = matches!(n.kind, And | Nand);
                let controlled = if and_family {
                    format!("{}_0_not_in_fi", n.name)
                } else {
                    format!("{}_1_not_in_fi", n.name)
                };
                let controlled = t.uid(&controlled);
                t.add_with(&controlled, Nor, NodeOpts::new().fanout([x]))?;
                for (f, fx) in fanin.iter().zip(&fanin_x) {
                    if and_family {
                        // Definite 0 on the fanin
                        let is_0 = t.uid(&format!("{}_is_0", f));
                        t.add_with(
                            &is_0,
                            Nor,
                            NodeOpts::new().fanin([f, fx]).fanout([&controlled]),
                        )?;
                    } else {
                        // Definite 1 on the fanin
                        let not_x = t.uid(&format!("{}_not_x", f));
                        t.add_with(&not_x, Not, NodeOpts::new().fanin([fx]))?;
                        let is_1 = t.uid(&format!("{}_is_1", f));
                        t.add_with(
                            &is_1,
                            And,
                            NodeOpts::new().fanin([*f, &not_x]).fanout([&controlled]),
                        )?;
                    }
                }
            }
            Xor | Xnor | Buf | Not | Output | D => {
                t.connect(&fanin_x, [x])?;
            }
            R | S | Clk => {
                // Controls of the X register are shared with the original one
                t.connect(&fanin, [x])?;
            }
            _ => (),
        }
    }
    info!(
        "Ternary encoding of {}: {} nodes to {} nodes",
        c.name(),
        c.nb_nodes(),
        t.nb_nodes()
    );
    Ok((t, mapping))
}
