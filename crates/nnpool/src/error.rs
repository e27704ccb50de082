//! Error type shared by attribute parsing, shape inference, and kernel execution.

use thiserror::Error;

use crate::tensor::DType;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid attribute `{name}`: {reason}")]
    InvalidAttribute { name: &'static str, reason: String },

    #[error("{op} does not support element type {dtype:?}")]
    UnsupportedType { op: &'static str, dtype: DType },

    #[error("unsupported pooling size: {rank} spatial dimensions")]
    UnsupportedRank { rank: usize },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("no schema registered for {op} at version {version}")]
    NoSchema { op: String, version: u32 },

    #[error("no kernel registered for {key} that supports this call")]
    NoKernel { key: &'static str },

    #[error("configuration error: {0}")]
    Config(String),
}

impl PoolError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        PoolError::InvalidArgument(message.into())
    }

    pub fn attribute(name: &'static str, reason: impl Into<String>) -> Self {
        PoolError::InvalidAttribute {
            name,
            reason: reason.into(),
        }
    }

    pub fn shape(message: impl Into<String>) -> Self {
        PoolError::ShapeMismatch(message.into())
    }
}

/// Convenience alias for results returned by pooling routines.
pub type PoolResult<T> = Result<T, PoolError>;
