//! Transformations building new circuits from existing ones
//!
//! All transformations leave their input untouched and return a new circuit.
//! Circuits with blackboxes are rejected, except by [`supercircuit`] which creates them.

mod acyclic;
mod limit;
mod miter;
mod registers;
mod sensitivity;
mod supergates;
mod ternary;
mod unroll;

pub use acyclic::acyclic_unroll;
pub use limit::{limit_fanin, limit_fanout};
pub use miter::{miter, miter_with_difs};
pub use registers::{expose_registers, insert_registers};
pub use sensitivity::{sensitivity_transform, sensitization_transform};
pub use supergates::{supercircuit, supergates, Supergate};
pub use ternary::ternary;
pub use unroll::{sequential_unroll, unroll, UnrollOptions};
