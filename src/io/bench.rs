//! IO for .bench (ISCAS) files

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read, Write};

use crate::{Circuit, Error, NodeKind, Result};

/// A gate statement `name = KIND(fanin, ...)`, or `name = gnd`
struct Statement {
    line: usize,
    name: String,
    kind: NodeKind,
    fanin: Vec<String>,
}

fn parse_error(line: usize, message: String) -> Error {
    Error::Parse { line, message }
}

fn parse_kind(line: usize, s: &str) -> Result<NodeKind> {
    use NodeKind::*;
    let kind: NodeKind = s.parse().map_err(|e| parse_error(line, e))?;
    match kind {
        And | Nand | Or | Nor | Xor | Xnor | Buf | Not | Ff | Const0 | Const1 => Ok(kind),
        _ => Err(parse_error(line, format!("Unsupported gate type {}", s))),
    }
}

fn parse_statement(line: usize, t: &str) -> Result<Statement> {
    let (lhs, rhs) = t
        .split_once('=')
        .ok_or_else(|| parse_error(line, format!("Expected an assignment: {}", t)))?;
    let name = lhs.trim().to_string();
    let rhs = rhs.trim();
    let (kind, fanin) = match rhs.split_once('(') {
        Some((kind, args)) => {
            let args = args
                .trim_end()
                .strip_suffix(')')
                .ok_or_else(|| parse_error(line, format!("Missing parenthesis: {}", t)))?;
            let fanin: Vec<String> = args
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            (parse_kind(line, kind.trim())?, fanin)
        }
        // ABC-style constants
        None => (parse_kind(line, rhs)?, Vec::new()),
    };
    let expected = match kind {
        NodeKind::Buf | NodeKind::Not | NodeKind::Ff => Some(1),
        NodeKind::Const0 | NodeKind::Const1 => Some(0),
        _ => None,
    };
    if expected.is_some_and(|e| e != fanin.len()) {
        return Err(parse_error(
            line,
            format!("{} takes {} inputs, got {}", kind, expected.unwrap_or(0), fanin.len()),
        ));
    }
    Ok(Statement {
        line,
        name,
        kind,
        fanin,
    })
}

/// Read a circuit in .bench format, as used by the ISCAS benchmarks
///
/// These files describe the design with simple statements like:
/// ```text
///     # This is a comment
///     INPUT(i0)
///     INPUT(i1)
///     x0 = AND(i0, i1)
///     x1 = NAND(x0, i1)
///     x2 = OR(x0, i0)
///     x3 = NOR(i0, x1)
///     x4 = XOR(x3, x2)
///     x5 = BUF(x4)
///     x6 = NOT(x5)
///     x7 = gnd
///     x8 = vdd
///     x9 = DFF(x6)
///     OUTPUT(x0)
/// ```
/// Flip-flops have no explicit clock. Signals `gnd` and `vdd` are constants unless defined.
pub fn read_bench<R: Read>(r: R, name: &str) -> Result<Circuit> {
    let mut c = Circuit::new(name);
    let mut statements = Vec::new();
    let mut outputs = Vec::new();
    for (i, l) in BufReader::new(r).lines().enumerate() {
        let line = i + 1;
        let s = l?;
        let t = s.trim();
        if t.is_empty() || t.starts_with('#') {
            continue;
        }
        if t.contains('=') {
            statements.push(parse_statement(line, t)?);
            continue;
        }
        let parts: Vec<&str> = t
            .split(['(', ')'])
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if parts.len() != 2 {
            return Err(parse_error(line, format!("Invalid statement: {}", t)));
        }
        match parts[0].to_uppercase().as_str() {
            "INPUT" | "PINPUT" => {
                if c.contains(parts[1]) {
                    return Err(parse_error(line, format!("Input {} is redefined", parts[1])));
                }
                c.add(parts[1], NodeKind::Input)
                    .map_err(|e| parse_error(line, e.to_string()))?;
            }
            "OUTPUT" | "POUTPUT" => outputs.push((line, parts[1].to_string())),
            _ => return Err(parse_error(line, format!("Unknown keyword {}", parts[0]))),
        }
    }

    // Create all nodes first, as statements may appear in any order
    for s in &statements {
        if c.contains(&s.name) {
            return Err(parse_error(s.line, format!("Signal {} is redefined", s.name)));
        }
        c.add(&s.name, s.kind)
            .map_err(|e| parse_error(s.line, e.to_string()))?;
    }
    for (constant, kind) in [("gnd", NodeKind::Const0), ("vdd", NodeKind::Const1)] {
        let used = statements.iter().any(|s| s.fanin.iter().any(|f| f == constant));
        if used && !c.contains(constant) {
            c.add(constant, kind)?;
        }
    }
    for s in &statements {
        for f in &s.fanin {
            if !c.contains(f) {
                return Err(parse_error(
                    s.line,
                    format!("Gate input {} is not generated anywhere", f),
                ));
            }
        }
        let target = if s.kind == NodeKind::Ff {
            NodeKind::D.aux_name(&s.name)
        } else {
            s.name.clone()
        };
        c.connect(&s.fanin, [&target])
            .map_err(|e| parse_error(s.line, e.to_string()))?;
    }
    for (line, o) in outputs {
        c.set_output(&o, true).map_err(|_| {
            parse_error(line, format!("Output {} is not generated anywhere", o))
        })?;
    }
    Ok(c)
}

fn bench_kind(kind: NodeKind) -> Option<&'static str> {
    use NodeKind::*;
    match kind {
        And => Some("AND"),
        Nand => Some("NAND"),
        Or => Some("OR"),
        Nor => Some("NOR"),
        Xor => Some("XOR"),
        Xnor => Some("XNOR"),
        Buf | Output => Some("BUF"),
        Not => Some("NOT"),
        Ff => Some("DFF"),
        _ => None,
    }
}

/// Write a circuit in .bench format, as used by the ISCAS benchmarks
///
/// Flip-flops are written without their clock. Blackboxes, latches and flip-flops with a
/// reset cannot be represented.
pub fn write_bench<W: Write>(w: &mut W, c: &Circuit) -> Result<()> {
    c.check_no_blackboxes()?;
    if let Some(l) = c.lats().into_iter().next() {
        return Err(Error::Precondition(format!(
            "latch '{}' cannot be written to a .bench file",
            l
        )));
    }
    let mut gates = BTreeMap::new();
    for n in c.node_weights() {
        if n.kind == NodeKind::Ff {
            if c.nb_fanin(&NodeKind::R.aux_name(&n.name))? > 0 {
                return Err(Error::Precondition(format!(
                    "flip-flop '{}' with a reset cannot be written to a .bench file",
                    n.name
                )));
            }
            let d = c.fanin([NodeKind::D.aux_name(&n.name)])?;
            let d = d.into_iter().next().unwrap_or_else(|| "gnd".to_string());
            gates.insert(n.name.clone(), format!("DFF({})", d));
        } else if n.kind == NodeKind::Const0 {
            gates.insert(n.name.clone(), "gnd".to_string());
        } else if n.kind == NodeKind::Const1 {
            gates.insert(n.name.clone(), "vdd".to_string());
        } else if let Some(k) = bench_kind(n.kind) {
            let fanin: Vec<String> = c.fanin([&n.name])?.into_iter().collect();
            gates.insert(n.name.clone(), format!("{}({})", k, fanin.join(", ")));
        }
    }

    writeln!(w, "# .bench (ISCAS) file")?;
    writeln!(w, "# Generated by circuitgraph from {}", c.name())?;
    for i in c.inputs() {
        writeln!(w, "INPUT({})", i)?;
    }
    writeln!(w)?;
    for o in c.outputs() {
        writeln!(w, "OUTPUT({})", o)?;
    }
    writeln!(w)?;
    for (n, g) in gates {
        writeln!(w, "{} = {}", n, g)?;
    }
    Ok(())
}
