//! Unified error types for the notification dispatcher.
//!
//! Every error maps onto one of the handling classes in [`ErrorKind`]:
//! - CONN_001: broker or downstream unreachable (retried, never fatal)
//! - DECODE_001-002: malformed payload or unknown routing key (dropped)
//! - STORE_001: audit store unavailable (logged and swallowed)
//! - CONFIG_001: invalid configuration (fatal at startup only)

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// How a failure is handled by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connectivity,
    Decode,
    Storage,
    Config,
}

/// Unified error type for the notification dispatcher.
#[derive(Debug, Error)]
pub enum Error {
    #[error("[CONN_001] connectivity error: {0}")]
    Connectivity(String),

    #[error("[DECODE_001] decode error: {0}")]
    Decode(String),

    #[error("[DECODE_001] malformed payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("[DECODE_002] unrecognized routing key: {0}")]
    UnknownRoutingKey(String),

    #[error("[STORE_001] audit store error: {0}")]
    Storage(String),

    #[error("[CONFIG_001] configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::Connectivity(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Get the handling class for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connectivity(_) => ErrorKind::Connectivity,
            Self::Decode(_) | Self::Serialization(_) | Self::UnknownRoutingKey(_) => {
                ErrorKind::Decode
            }
            Self::Storage(_) => ErrorKind::Storage,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether retrying the same operation later could succeed.
    ///
    /// Decode errors never become valid on redelivery.
    pub fn is_retriable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Connectivity | ErrorKind::Storage)
    }
}
