//! `reqwest` backed transport
//!
//! Joins request paths onto a base URL and speaks JSON.
//!
//! # Authentication
//!
//! If an API key is configured, it's sent as a Bearer token:
//!
//! ```text
//! Authorization: Bearer {api_key}
//! ```

use async_trait::async_trait;
use eresource_core::TransportError;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::transport::{is_success, HttpMethod, HttpRequest, HttpResponse, HttpTransport};

/// HTTP transport over a shared `reqwest` client
pub struct ReqwestTransport {
    /// HTTP client for making requests
    client: Client,

    /// Base URL of the API (e.g., "https://api.example.com")
    base_url: String,

    /// Optional API key for authentication
    api_key: Option<String>,

    default_headers: HashMap<String, String>,
}

impl ReqwestTransport {
    /// Create a transport from `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            default_headers: config.default_headers.clone(),
        })
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::GET => Method::GET,
        HttpMethod::POST => Method::POST,
        HttpMethod::PUT => Method::PUT,
        HttpMethod::DELETE => Method::DELETE,
    }
}

fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

/// Empty bodies decode as `null`, non-JSON bodies as a string
fn decode_body(text: String) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        request: HttpRequest,
    ) -> std::result::Result<HttpResponse, TransportError> {
        let url = self.url_for(&request.url);
        let mut builder = self.client.request(method(request.method), &url);

        for (name, value) in self.default_headers.iter().chain(request.headers.iter()) {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref key) = self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!(method = %request.method, url = %url, "sending request");
        let response = builder.send().await.map_err(|e| {
            TransportError::network(format!("Failed to send {} {}: {}", request.method, url, e))
        })?;

        let status = response.status().as_u16();
        let headers = header_map(response.headers());
        let text = response.text().await.map_err(|e| {
            TransportError::network(format!("Failed to read response body: {}", e))
        })?;
        let data = decode_body(text);

        if !is_success(status) {
            return Err(TransportError::from_status(status, data).with_headers(headers));
        }
        Ok(HttpResponse {
            status,
            data,
            headers,
        })
    }
}
