//! Error types shared by every layer in the crate.

use thiserror::Error;

/// Failures raised by layers, wrappers and the layer registry.
///
/// `Validation` marks wrong usage (bad shapes, bad options) while
/// `NotImplemented` marks a feature this crate deliberately does not support,
/// so callers can tell the two apart.
#[derive(Debug, Error)]
pub enum LayerError {
    #[error("invalid value: {0}")]
    Validation(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("deserialization failed: {0}")]
    Deserialization(String),

    #[error("invalid layer state: {0}")]
    Attribute(String),

    #[error("tensor data error: {0}")]
    Tensor(String),
}

impl LayerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented(msg.into())
    }

    pub fn deserialization(msg: impl Into<String>) -> Self {
        Self::Deserialization(msg.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented(_))
    }
}

impl From<serde_json::Error> for LayerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Deserialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LayerError>;
