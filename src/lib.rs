//! Circuit graphs, structural transforms and SAT-based analysis
//!
//! This crate represents gate-level netlists as graphs of named nodes, and provides tools
//! to transform them and to analyze them with a SAT solver or a model counter.
//!
//! # Usage
//!
//! Circuitgraph features [equivalence checking](https://en.wikipedia.org/wiki/Formal_equivalence_checking)
//! with miters, sequential unrolling, and SAT-based analyses such as
//! [sensitivity and influence](https://en.wikipedia.org/wiki/Analysis_of_Boolean_functions)
//! of the signals of a circuit.
//!
//! ```bash
//! # Show available commands
//! # At the moment, only .bench files are supported
//! circuitgraph help
//! # Show statistics and structural issues
//! circuitgraph show mydesign.bench
//! # Check equivalence between two designs
//! circuitgraph equiv mydesign.bench other.bench
//! # Unroll a sequential design over 4 clock cycles
//! circuitgraph unroll mydesign.bench -c 4 -o unrolled.bench
//! # Influence of each input on a signal
//! circuitgraph influence mydesign.bench out_0
//! ```
//!
//! # Development
//!
//! ## Datastructures
//!
//! `Circuit` is a directed graph where each node is identified by a unique name.
//! Each node has a [`NodeKind`], that may be a logic gate, an input, a constant, a register or
//! a blackbox pin. Any node may additionally be marked as an output.
//! Inversions are explicit: there is no complemented edge.
//!
//! Registers are represented by several nodes, created and removed together:
//! a flip-flop `q` has auxiliary nodes `d[q]`, `r[q]` and `clk[q]` driving it.
//! This keeps the graph simple, as a register is just a node whose fanin is
//! its data, reset and clock signals.
//!
//! For example, here is a full adder circuit:
//! ```
//! # use circuitgraph::{Circuit, NodeKind, NodeOpts};
//! let mut c = Circuit::new("full_adder");
//! for i in ["a", "b", "cin"] {
//!     c.add(i, NodeKind::Input).unwrap();
//! }
//! c.add_with("s", NodeKind::Xor, NodeOpts::new().fanin(["a", "b", "cin"]).output(true))
//!     .unwrap();
//! c.add_with("ab", NodeKind::And, NodeOpts::new().fanin(["a", "b"])).unwrap();
//! c.add_with("ac", NodeKind::And, NodeOpts::new().fanin(["a", "cin"])).unwrap();
//! c.add_with("bc", NodeKind::And, NodeOpts::new().fanin(["b", "cin"])).unwrap();
//! c.add_with("cout", NodeKind::Or, NodeOpts::new().fanin(["ab", "ac", "bc"]).output(true))
//!     .unwrap();
//! ```
//!
//! Transformations never modify their input, and return a new circuit.
//! Analyses build the circuits they need with these transformations, translate them to
//! CNF and call [Kissat](https://github.com/arminbiere/kissat), or
//! [approxmc](https://github.com/meelgroup/approxmc) for approximate model counting.
//!
//! ## Library and documentation
//!
//! Circuitgraph is distributed as a library as well as a binary program.
//! The library is not stable, and the datastructures may change between versions.

#![warn(missing_docs)]

pub mod analysis;
pub mod circuit;
pub mod cnf;
pub mod error;
pub mod io;
pub mod sat;
pub mod sim;
pub mod transform;

pub use circuit::{BlackBox, BlackBoxInstance, Circuit, NodeKind, NodeOpts, Stops};
pub use error::{Error, Result};
