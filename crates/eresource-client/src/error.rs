//! Client error types

use eresource_core::ResourceError;
use thiserror::Error;

/// Errors raised while setting up or using a client
#[derive(Error, Debug)]
pub enum ClientError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Entity layer error
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    /// Configuration file could not be parsed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type for client setup
pub type Result<T> = std::result::Result<T, ClientError>;
