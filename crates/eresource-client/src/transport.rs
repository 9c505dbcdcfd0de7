//! HTTP transport seam
//!
//! The orchestrator never talks to the network directly. It hands an
//! [`HttpRequest`] to an [`HttpTransport`], which resolves with an
//! [`HttpResponse`] for 2xx outcomes and rejects with a [`TransportError`]
//! of the same shape for everything else.

use async_trait::async_trait;
use eresource_core::TransportError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    DELETE,
}

impl HttpMethod {
    /// Method name as sent on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request ready to be sent
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,

    /// Wire path (after path transformers), relative to the transport's base
    pub url: String,

    pub headers: HashMap<String, String>,

    /// JSON body, for POST and PUT
    pub body: Option<Value>,
}

impl HttpRequest {
    /// Create a request without headers or body
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Merge in headers
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Attach a JSON body
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A successful response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,

    /// Decoded body; `null` when the body was empty
    pub data: Value,

    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl HttpResponse {
    /// A response with no headers
    pub fn new(status: u16, data: Value) -> Self {
        Self {
            status,
            data,
            headers: HashMap::new(),
        }
    }
}

/// Sends requests to the remote API
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send `request`; non-2xx statuses reject with a [`TransportError`]
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// True for 2xx statuses
pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}
