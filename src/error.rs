//! Error type shared by every module of the crate.

use thiserror::Error;

/// Errors raised by arrays, layers, update methods and processors.
///
/// Every failure is a precondition violation detected at construction or call
/// time: there is nothing to retry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DnnError {
    #[error("shape mismatch in {op}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        op: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("invalid hyperparameter `{name}`: {reason}")]
    InvalidHyperParameter { name: &'static str, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("errors of `{0}` have not been assigned before the backward pass")]
    MissingErrors(&'static str),

    #[error("values of `{0}` have not been computed: call forward first")]
    MissingValues(&'static str),

    #[error("support structure mismatch: params carry `{found}`, update method expects `{expected}`")]
    SupportStructureMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("index ({0}, {1}) out of bounds for shape {2:?}")]
    IndexOutOfBounds(usize, usize, (usize, usize)),

    #[error("empty input sequence given to {0}")]
    EmptySequence(&'static str),

    #[error("json error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for DnnError {
    fn from(e: serde_json::Error) -> Self {
        DnnError::Json(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DnnError>;

/// Builds an `InvalidHyperParameter` error when `cond` does not hold.
pub(crate) fn ensure_hyper(cond: bool, name: &'static str, reason: impl Into<String>) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(DnnError::InvalidHyperParameter {
            name,
            reason: reason.into(),
        })
    }
}
