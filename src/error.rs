//! Error types for circuit construction, compilation and analysis

use std::time::Duration;

use thiserror::Error;

use crate::circuit::NodeKind;

/// Errors that can occur when building, transforming or analyzing circuits
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A node was given a number of fanins its kind does not allow
    #[error("Node '{node}' of kind {kind} cannot have {got} fanins")]
    InvalidArity {
        /// Name of the node
        node: String,
        /// Kind of the node
        kind: NodeKind,
        /// Number of fanins requested
        got: usize,
    },

    /// A name is already used by a node of another kind
    #[error("Node '{name}' already exists with kind {existing}")]
    DuplicateName {
        /// The conflicting name
        name: String,
        /// Kind of the existing node
        existing: NodeKind,
    },

    /// A name is not a legal node identifier
    #[error("Invalid node name '{0}'")]
    InvalidName(String),

    /// A node name was not found in the circuit
    #[error("Node '{0}' not found in circuit")]
    UnknownNode(String),

    /// A blackbox pin is missing or unconnected
    #[error("Blackbox instance '{instance}' has no pin '{pin}'")]
    MissingBlackboxPin {
        /// Instance name
        instance: String,
        /// Pin name
        pin: String,
    },

    /// The operation requires a circuit without blackboxes
    #[error("Circuit '{0}' contains blackboxes")]
    BlackboxPresent(String),

    /// An argument does not meet the requirements of the operation
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// A node cannot be translated by the CNF compiler
    #[error("Unsupported gate kind {kind} for node '{node}'")]
    UnsupportedGateKind {
        /// Name of the node
        node: String,
        /// Kind of the node
        kind: NodeKind,
    },

    /// The cycle-breaking unroll produced a cyclic circuit
    #[error("Unrolling failed: {0}")]
    UnrollFailed(String),

    /// A cycle was found where an acyclic circuit is required
    #[error("Circuit contains a cycle through '{0}'")]
    CycleDetected(String),

    /// The SAT backend reported an error
    #[error("SAT backend error: {0}")]
    Backend(String),

    /// An external tool could not be found
    #[error("External tool '{0}' not found")]
    ToolNotFound(String),

    /// An external tool did not finish in time
    #[error("External tool '{tool}' timed out after {timeout:?}")]
    Timeout {
        /// Name of the tool
        tool: String,
        /// Timeout that was exceeded
        timeout: Duration,
    },

    /// An external tool exited with an error
    #[error("External tool '{tool}' failed with exit code {code:?}: {stderr}")]
    ProcessFailed {
        /// Name of the tool
        tool: String,
        /// Exit code, if any
        code: Option<i32>,
        /// Captured standard error
        stderr: String,
    },

    /// The output of an external tool could not be interpreted
    #[error("Unexpected output from '{tool}': {message}")]
    UnexpectedOutput {
        /// Name of the tool
        tool: String,
        /// Description of the problem
        message: String,
    },

    /// A file could not be parsed
    #[error("Parse error at line {line}: {message}")]
    Parse {
        /// Line number, starting at 1
        line: usize,
        /// Description of the problem
        message: String,
    },

    /// IO error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for circuit operations
pub type Result<T> = std::result::Result<T, Error>;
