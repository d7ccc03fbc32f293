//! Circuit generators and templates

/// Number of bits needed to represent `n` different values
pub fn clog2(n: usize) -> usize {
    if n <= 1 {
        0
    } else {
        (usize::BITS - (n - 1).leading_zeros()) as usize
    }
}

/// Adder generators
pub mod adder {
    use std::collections::BTreeMap;

    use crate::{Circuit, NodeKind, NodeOpts, Result};

    fn conn(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// An And/Xor half adder with inputs `x`, `y` and outputs `c`, `s`
    pub fn half_adder() -> Result<Circuit> {
        let mut c = Circuit::new("half_adder");
        c.add("x", NodeKind::Input)?;
        c.add("y", NodeKind::Input)?;
        let io = NodeOpts::new().fanin(["x", "y"]).output(true);
        c.add_with("c", NodeKind::And, io.clone())?;
        c.add_with("s", NodeKind::Xor, io)?;
        Ok(c)
    }

    /// A full adder built from two half adders, with inputs `x`, `y`, `cin` and outputs `cout`, `s`
    pub fn full_adder() -> Result<Circuit> {
        let mut c = Circuit::new("full_adder");
        c.add("x", NodeKind::Input)?;
        c.add("y", NodeKind::Input)?;
        c.add("cin", NodeKind::Input)?;
        let ha = half_adder()?;
        c.embed(&ha, "x_y_ha", &conn(&[("x", "x"), ("y", "y")]))?;
        c.embed(&ha, "cin_s_ha", &conn(&[("x", "x_y_ha_s"), ("y", "cin")]))?;
        c.add_with(
            "cout",
            NodeKind::Or,
            NodeOpts::new()
                .fanin(["x_y_ha_c", "cin_s_ha_c"])
                .output(true),
        )?;
        c.add_with(
            "s",
            NodeKind::Buf,
            NodeOpts::new().fanin(["cin_s_ha_s"]).output(true),
        )?;
        Ok(c)
    }

    /// A ripple-carry adder with inputs `a_i`, `b_i` and outputs `out_i`
    ///
    /// Optionally adds a carry input `cin` and a carry output `cout`.
    pub fn ripple_carry(width: usize, carry_in: bool, carry_out: bool) -> Result<Circuit> {
        let mut c = Circuit::new("adder");
        let cin_kind = if carry_in {
            NodeKind::Input
        } else {
            NodeKind::Const0
        };
        let mut carry = c.add("cin", cin_kind)?;
        let fa = full_adder()?;
        for bit in 0..width {
            let a = c.add(&format!("a_{}", bit), NodeKind::Input)?;
            let b = c.add(&format!("b_{}", bit), NodeKind::Input)?;
            let out = c.add_with(
                &format!("out_{}", bit),
                NodeKind::Buf,
                NodeOpts::new().output(true),
            )?;
            let prefix = format!("fa_{}", bit);
            c.embed(
                &fa,
                &prefix,
                &conn(&[
                    ("x", a.as_str()),
                    ("y", b.as_str()),
                    ("cin", carry.as_str()),
                    ("s", out.as_str()),
                ]),
            )?;
            carry = format!("{}_cout", prefix);
        }
        if carry_out {
            c.add_with(
                "cout",
                NodeKind::Buf,
                NodeOpts::new().fanin([&carry]).output(true),
            )?;
        }
        Ok(c)
    }
}

/// Multiplexer generators
pub mod mux {
    use crate::circuit::generators::clog2;
    use crate::{Circuit, NodeKind, NodeOpts, Result};

    /// A `w`-input multiplexer with data inputs `in_i`, select inputs `sel_j` and output `out`
    pub fn mux(w: usize) -> Result<Circuit> {
        let mut c = Circuit::new("mux");
        for i in 0..w {
            c.add(&format!("in_{}", i), NodeKind::Input)?;
        }
        let nb_sel = clog2(w);
        for j in 0..nb_sel {
            let sel = c.add(&format!("sel_{}", j), NodeKind::Input)?;
            c.add_with(
                &format!("not_sel_{}", j),
                NodeKind::Not,
                NodeOpts::new().fanin([&sel]),
            )?;
        }
        c.add_with("out", NodeKind::Or, NodeOpts::new().output(true))?;
        for i in 0..w {
            let mut fanin: Vec<String> = (0..nb_sel)
                .rev()
                .map(|j| {
                    if (i >> j) & 1 == 1 {
                        format!("sel_{}", j)
                    } else {
                        format!("not_sel_{}", j)
                    }
                })
                .collect();
            fanin.push(format!("in_{}", i));
            c.add_with(
                &format!("and_{}", i),
                NodeKind::And,
                NodeOpts::new().fanin(fanin).fanout(["out"]),
            )?;
        }
        Ok(c)
    }
}

/// Population count generators
pub mod popcount {
    use std::collections::{BTreeMap, VecDeque};

    use crate::circuit::generators::{adder, clog2};
    use crate::{Circuit, NodeKind, NodeOpts, Result};

    /// A circuit counting the ones among inputs `in_i`, with binary outputs `out_j`
    ///
    /// Built as a tree of ripple-carry adders. There are `clog2(w + 1)` outputs, least
    /// significant first.
    pub fn popcount(w: usize) -> Result<Circuit> {
        let mut c = Circuit::new("popcount");
        let mut ps: VecDeque<Vec<String>> = VecDeque::new();
        for i in 0..w {
            ps.push_back(vec![c.add(&format!("in_{}", i), NodeKind::Input)?]);
        }
        c.add("tie0", NodeKind::Const0)?;

        let mut i = 0;
        while ps.len() > 1 {
            let (Some(mut ns), Some(mut ms)) = (ps.pop_front(), ps.pop_front()) else {
                break;
            };
            let aw = ns.len().max(ms.len());
            ns.resize(aw, "tie0".to_string());
            ms.resize(aw, "tie0".to_string());

            let prefix = format!("add_{}", i);
            let mut connections = BTreeMap::new();
            for (j, (n, m)) in ns.iter().zip(ms.iter()).enumerate() {
                connections.insert(format!("a_{}", j), n.clone());
                connections.insert(format!("b_{}", j), m.clone());
            }
            let names = c.embed(&adder::ripple_carry(aw, false, true)?, &prefix, &connections)?;
            let mut sum: Vec<String> = (0..aw).map(|j| names[&format!("out_{}", j)].clone()).collect();
            sum.push(names["cout"].clone());
            ps.push_back(sum);
            i += 1;
        }

        let bits = ps.pop_front().unwrap_or_else(|| vec!["tie0".to_string()]);
        let nb_out = clog2(w + 1).max(1);
        for (j, b) in bits.iter().take(nb_out).enumerate() {
            c.add_with(
                &format!("out_{}", j),
                NodeKind::Buf,
                NodeOpts::new().fanin([b]).output(true),
            )?;
        }
        if c.nb_fanout("tie0")? == 0 {
            c.remove(["tie0"])?;
        }
        Ok(c)
    }
}
