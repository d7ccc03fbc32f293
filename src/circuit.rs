//! Representation and handling of circuits as graphs of named nodes

mod blackbox;
mod circuit;
mod compose;
pub mod generators;
mod kind;
pub mod lint;
pub mod stats;
mod traversal;

pub use blackbox::{BlackBox, BlackBoxInstance};
pub use circuit::{Circuit, NodeOpts};
pub use kind::NodeKind;
pub use traversal::Stops;
