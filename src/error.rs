//! Error taxonomy shared by every module of the crate.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MarginError>;

/// Errors raised by distributions, fuzzy inference, margin nodes and
/// margin networks.
///
/// Every error is raised synchronously by the call that detects it, and
/// the failing call leaves its receiver unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarginError {
    #[error("dimension mismatch in {context}: expected {expected}, got {got}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A stateful fuzzy computation was started on top of an aggregate
    /// that was never reset.
    #[error("aggregate holds a previous computation; call reset() or use accumulate()")]
    StaleAggregate,

    #[error("dependency cycle between behaviours: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("behaviour `{behaviour}` did not produce declared output `{signal}`")]
    MissingOutput { behaviour: String, signal: String },

    #[error("unknown signal: {0}")]
    UnknownSignal(String),

    #[error("signal `{0}` is produced more than once")]
    DuplicateSignal(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
}

impl MarginError {
    pub(crate) fn mismatch(context: &'static str, expected: usize, got: usize) -> Self {
        MarginError::DimensionMismatch {
            context,
            expected,
            got,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        MarginError::InvalidParameters(msg.into())
    }

    pub(crate) fn state(msg: impl Into<String>) -> Self {
        MarginError::InvalidState(msg.into())
    }
}
