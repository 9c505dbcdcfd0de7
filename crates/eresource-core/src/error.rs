//! Error types for the entity layer

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Result type for entity and cache operations
pub type Result<T> = std::result::Result<T, ResourceError>;

/// Failure reported by an HTTP transport.
///
/// Carries the same `{ data, status, headers }` shape a successful response
/// has. A status of `0` means the request never produced a response at all
/// (connection refused, timeout, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct TransportError {
    /// HTTP status code, `0` when no response was received
    pub status: u16,

    /// Decoded response body (`null` when empty)
    pub data: Value,

    /// Response headers
    pub headers: HashMap<String, String>,

    /// Human readable description
    pub message: String,
}

impl TransportError {
    /// Create an error for a response with a non-success status
    pub fn from_status(status: u16, data: Value) -> Self {
        Self {
            status,
            data,
            headers: HashMap::new(),
            message: format!("HTTP {}", status),
        }
    }

    /// Create an error for a request that never got a response
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: 0,
            data: Value::Null,
            headers: HashMap::new(),
            message: message.into(),
        }
    }

    /// Attach response headers
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.status == 0 {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} (status {})", self.message, self.status)
        }
    }
}

impl std::error::Error for TransportError {}

/// Errors raised by the cache, entities, and request orchestration
///
/// `InvalidArgument` and `Conflict` are local validation failures and are
/// returned synchronously by the call that caused them. `Transport` only ever
/// reaches callers through a completion future.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResourceError {
    /// Malformed local call (missing path, illegal path assignment, ...)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A different entity already occupies this path in the cache
    #[error("Conflict: a different entity is already stored at {path}")]
    Conflict { path: String },

    /// The network call failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A successful response body could not populate the entity
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl ResourceError {
    /// Shorthand for [`ResourceError::InvalidArgument`]
    pub fn invalid(message: impl Into<String>) -> Self {
        ResourceError::InvalidArgument(message.into())
    }

    /// The transport failure, if this error came from the network
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            ResourceError::Transport(err) => Some(err),
            _ => None,
        }
    }
}
