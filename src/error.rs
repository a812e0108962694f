//! Errors raised while translating query parameters into a plan.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    /// The route's model is not registered.
    #[error("model '{0}' not found")]
    ModelNotFound(String),

    /// A join path segment does not name a registered model.
    #[error("unknown path '{path}': segment '{segment}' does not resolve to a model")]
    UnknownPath { path: String, segment: String },

    #[error("invalid value '{value}' for parameter '{name}': {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("malformed where clause at byte {position}: {message}")]
    MalformedFilter { position: usize, message: String },

    /// An `attributes` or `order` group that carries no column.
    #[error("malformed {parameter} group '{group}'")]
    MalformedGroup { parameter: String, group: String },

    #[error("{method} is not enabled for table '{table}'")]
    Forbidden { method: String, table: String },
}

impl TranslateError {
    pub(crate) fn invalid(name: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TranslateError>;
