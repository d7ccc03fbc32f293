use std::fmt;
use std::str::FromStr;

/// Kind of a node in a circuit
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub enum NodeKind {
    /// Primary input
    Input,
    /// Output sink, fed by exactly one driver
    Output,
    /// Constant zero
    Const0,
    /// Constant one
    Const1,
    /// N-input And
    And,
    /// N-input Nand
    Nand,
    /// N-input Or
    Or,
    /// N-input Nor
    Nor,
    /// N-input Xor
    Xor,
    /// N-input Xnor
    Xnor,
    /// Inverter
    Not,
    /// Buffer
    Buf,
    /// Flip-flop
    Ff,
    /// Latch
    Lat,
    /// Data input of a register
    D,
    /// Reset input of a register
    R,
    /// Set input of a latch
    S,
    /// Clock input of a register
    Clk,
    /// Input pin of a blackbox instance
    BbInput,
    /// Output pin of a blackbox instance
    BbOutput,
}

impl NodeKind {
    /// All node kinds
    pub const ALL: [NodeKind; 20] = [
        NodeKind::Input,
        NodeKind::Output,
        NodeKind::Const0,
        NodeKind::Const1,
        NodeKind::And,
        NodeKind::Nand,
        NodeKind::Or,
        NodeKind::Nor,
        NodeKind::Xor,
        NodeKind::Xnor,
        NodeKind::Not,
        NodeKind::Buf,
        NodeKind::Ff,
        NodeKind::Lat,
        NodeKind::D,
        NodeKind::R,
        NodeKind::S,
        NodeKind::Clk,
        NodeKind::BbInput,
        NodeKind::BbOutput,
    ];

    /// Name of the kind, as used in file formats and messages
    pub fn as_str(self) -> &'static str {
        use NodeKind::*;
        match self {
            Input => "input",
            Output => "output",
            Const0 => "0",
            Const1 => "1",
            And => "and",
            Nand => "nand",
            Or => "or",
            Nor => "nor",
            Xor => "xor",
            Xnor => "xnor",
            Not => "not",
            Buf => "buf",
            Ff => "ff",
            Lat => "lat",
            D => "d",
            R => "r",
            S => "s",
            Clk => "clk",
            BbInput => "bb_input",
            BbOutput => "bb_output",
        }
    }

    /// Returns whether the kind is a multi-input logic gate
    pub fn is_gate(self) -> bool {
        use NodeKind::*;
        matches!(self, And | Nand | Or | Nor | Xor | Xnor)
    }

    /// Returns whether the kind is a constant
    pub fn is_const(self) -> bool {
        matches!(self, NodeKind::Const0 | NodeKind::Const1)
    }

    /// Returns whether the kind is a flip-flop or a latch
    pub fn is_register(self) -> bool {
        matches!(self, NodeKind::Ff | NodeKind::Lat)
    }

    /// Returns whether the kind is an auxiliary input of a register
    pub fn is_register_aux(self) -> bool {
        use NodeKind::*;
        matches!(self, D | R | S | Clk)
    }

    /// Returns whether the kind is a blackbox pin
    pub fn is_blackbox_pin(self) -> bool {
        matches!(self, NodeKind::BbInput | NodeKind::BbOutput)
    }

    /// Returns whether the output of the gate is inverted compared to its positive form
    pub fn is_inverted(self) -> bool {
        use NodeKind::*;
        matches!(self, Nand | Nor | Xnor | Not)
    }

    /// Positive form of a gate: Nand to And, Nor to Or, Xnor to Xor, Not to Buf
    pub fn positive(self) -> NodeKind {
        use NodeKind::*;
        match self {
            Nand => And,
            Nor => Or,
            Xnor => Xor,
            Not => Buf,
            k => k,
        }
    }

    /// Returns whether the kind takes no fanin
    pub fn is_source(self) -> bool {
        use NodeKind::*;
        matches!(self, Input | Const0 | Const1 | BbOutput)
    }

    /// Maximum number of fanins allowed, if bounded
    ///
    /// Registers are driven through their auxiliary nodes, one for each role.
    pub fn max_fanin(self) -> Option<usize> {
        use NodeKind::*;
        match self {
            Input | Const0 | Const1 | BbOutput => Some(0),
            Output | Not | Buf | D | R | S | Clk | BbInput => Some(1),
            Ff => Some(3),
            Lat => Some(4),
            And | Nand | Or | Nor | Xor | Xnor => None,
        }
    }

    /// Returns whether a node of this kind is a startpoint: its value is not computed from its fanin in the current time frame
    pub fn is_startpoint(self) -> bool {
        use NodeKind::*;
        matches!(self, Input | Ff | Lat | BbOutput)
    }

    /// Name of the auxiliary node for register q
    pub fn aux_name(self, q: &str) -> String {
        format!("{}[{}]", self.as_str(), q)
    }

    /// Auxiliary node kinds created with a register of this kind
    pub fn register_aux(self) -> &'static [NodeKind] {
        use NodeKind::*;
        match self {
            Ff => &[D, R, Clk],
            Lat => &[D, R, S, Clk],
            _ => &[],
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "0" | "const0" | "gnd" => Ok(NodeKind::Const0),
            "1" | "const1" | "vdd" => Ok(NodeKind::Const1),
            "buff" => Ok(NodeKind::Buf),
            "dff" => Ok(NodeKind::Ff),
            _ => NodeKind::ALL
                .iter()
                .find(|k| k.as_str() == lower)
                .copied()
                .ok_or_else(|| format!("Unknown node kind {}", s)),
        }
    }
}

/// Split an auxiliary node name `kind[q]` into its kind and register name
pub(crate) fn parse_aux_name(name: &str) -> Option<(NodeKind, &str)> {
    let open = name.find('[')?;
    let inner = name[open + 1..].strip_suffix(']')?;
    let kind = match &name[..open] {
        "d" => NodeKind::D,
        "r" => NodeKind::R,
        "s" => NodeKind::S,
        "clk" => NodeKind::Clk,
        _ => return None,
    };
    Some((kind, inner))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kind() {
        for k in NodeKind::ALL {
            assert_eq!(k.as_str().parse::<NodeKind>(), Ok(k));
        }
        assert_eq!("BUFF".parse::<NodeKind>(), Ok(NodeKind::Buf));
        assert_eq!("DFF".parse::<NodeKind>(), Ok(NodeKind::Ff));
        assert!("mux".parse::<NodeKind>().is_err());
    }

    #[test]
    fn test_aux_names() {
        assert_eq!(NodeKind::D.aux_name("q"), "d[q]");
        assert_eq!(parse_aux_name("clk[a_b]"), Some((NodeKind::Clk, "a_b")));
        assert_eq!(parse_aux_name("x[q]"), None);
        assert_eq!(parse_aux_name("d[q"), None);
    }
}
