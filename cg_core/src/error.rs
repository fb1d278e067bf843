//! Error types for evaluation and differentiation.

use thiserror::Error;

/// Errors raised while evaluating or differentiating an expression graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A symbol reachable from the evaluated expression has no binding.
    #[error("unbound symbol: {name}")]
    UnboundSymbol { name: String },

    /// An operation was applied to an operand count it does not support.
    #[error("unsupported operation: {op}")]
    UnsupportedOperation { op: String },

    /// Bound batches disagree in length.
    #[error("shape mismatch: expected batch of length {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// An elementwise operation left its valid input domain.
    #[error("domain error in {op}: {detail}")]
    Domain { op: &'static str, detail: String },

    /// A function was called with the wrong number of arguments.
    #[error("wrong number of arguments: expected {expected}, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    /// A function parameter is not a symbol, or names the same symbol twice.
    #[error("invalid parameter {index}: {reason}")]
    InvalidParameter { index: usize, reason: String },

    /// `sum` needs at least one operand.
    #[error("sum requires at least one operand")]
    EmptySum,
}

pub type Result<T> = std::result::Result<T, Error>;
