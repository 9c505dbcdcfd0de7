//! Per-request configuration
//!
//! A [`RequestConfig`] carries the transformer pipelines and pathfinders for
//! one call. Orchestrators keep a default config and merge every per-call
//! config into it with [`RequestConfig::merge_defaults`].

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::entity::Entity;
use crate::error::{ResourceError, Result};
use crate::resource::Resource;

/// Rewrites the wire path of a request
pub type PathTransformer = Arc<dyn Fn(String) -> String + Send + Sync>;

/// Rewrites a request or response body
pub type BodyTransformer = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Derives the cache path of a created resource from the request path
pub type Pathfinder = Arc<dyn Fn(&str, &Resource) -> Result<String> + Send + Sync>;

/// Derives the cache path of a collection item from the collection path and
/// the item's data; `None` leaves the item without a path
pub type ItemPathfinder = Arc<dyn Fn(&str, &Value) -> Option<String> + Send + Sync>;

/// Options for a single request
#[derive(Clone, Default)]
pub struct RequestConfig {
    /// Extra request headers
    pub headers: HashMap<String, String>,

    /// Applied in order to build the wire path; the entity path is unaffected
    pub transform_path: Vec<PathTransformer>,

    /// Applied in order to outgoing bodies
    pub transform_request: Vec<BodyTransformer>,

    /// Applied in order to incoming bodies
    pub transform_response: Vec<BodyTransformer>,

    /// Path derivation for `post` results
    pub pathfinder: Option<Pathfinder>,

    /// Path derivation for `query` items
    pub item_pathfinder: Option<ItemPathfinder>,
}

impl RequestConfig {
    /// Empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a request header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Append a path transformer
    pub fn with_path_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(String) -> String + Send + Sync + 'static,
    {
        self.transform_path.push(Arc::new(transform));
        self
    }

    /// Append a request body transformer
    pub fn with_request_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.transform_request.push(Arc::new(transform));
        self
    }

    /// Append a response body transformer
    pub fn with_response_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.transform_response.push(Arc::new(transform));
        self
    }

    /// Use a custom pathfinder for created resources
    pub fn with_pathfinder<F>(mut self, pathfinder: F) -> Self
    where
        F: Fn(&str, &Resource) -> Result<String> + Send + Sync + 'static,
    {
        self.pathfinder = Some(Arc::new(pathfinder));
        self
    }

    /// Use a custom pathfinder for collection items
    pub fn with_item_pathfinder<F>(mut self, pathfinder: F) -> Self
    where
        F: Fn(&str, &Value) -> Option<String> + Send + Sync + 'static,
    {
        self.item_pathfinder = Some(Arc::new(pathfinder));
        self
    }

    /// Compose this per-call config with `defaults`.
    ///
    /// Path and request transformers run after the defaults, response
    /// transformers run before them. Per-call headers and pathfinders win.
    pub fn merge_defaults(self, defaults: &RequestConfig) -> RequestConfig {
        let mut headers = defaults.headers.clone();
        headers.extend(self.headers);

        let transform_path = defaults
            .transform_path
            .iter()
            .cloned()
            .chain(self.transform_path)
            .collect();
        let transform_request = defaults
            .transform_request
            .iter()
            .cloned()
            .chain(self.transform_request)
            .collect();
        let transform_response = self
            .transform_response
            .into_iter()
            .chain(defaults.transform_response.iter().cloned())
            .collect();

        RequestConfig {
            headers,
            transform_path,
            transform_request,
            transform_response,
            pathfinder: self.pathfinder.or_else(|| defaults.pathfinder.clone()),
            item_pathfinder: self
                .item_pathfinder
                .or_else(|| defaults.item_pathfinder.clone()),
        }
    }

    /// Run the path pipeline
    pub fn apply_path(&self, path: &str) -> String {
        self.transform_path
            .iter()
            .fold(path.to_string(), |path, transform| transform(path))
    }

    /// Run the request body pipeline
    pub fn apply_request(&self, body: Value) -> Value {
        self.transform_request
            .iter()
            .fold(body, |body, transform| transform(body))
    }

    /// Run the response body pipeline
    pub fn apply_response(&self, body: Value) -> Value {
        self.transform_response
            .iter()
            .fold(body, |body, transform| transform(body))
    }
}

impl fmt::Debug for RequestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestConfig")
            .field("headers", &self.headers)
            .field("transform_path", &self.transform_path.len())
            .field("transform_request", &self.transform_request.len())
            .field("transform_response", &self.transform_response.len())
            .field("pathfinder", &self.pathfinder.is_some())
            .field("item_pathfinder", &self.item_pathfinder.is_some())
            .finish()
    }
}

/// `<request-path>/<id>`, using the `id` field of the created resource
pub fn default_pathfinder() -> Pathfinder {
    Arc::new(|request_path: &str, resource: &Resource| {
        let id = resource.value("id").unwrap_or(Value::Null);
        join_id(request_path, &id).ok_or_else(|| {
            ResourceError::MalformedResponse(format!(
                "response for {} has no usable id",
                request_path
            ))
        })
    })
}

/// `<collection-path>/<id>`, using the item's `id`; items without one get no
/// path
pub fn default_item_pathfinder() -> ItemPathfinder {
    Arc::new(|collection_path: &str, data: &Value| {
        data.get("id")
            .and_then(|id| join_id(collection_path, id))
    })
}

/// Append `id` as a new last segment of `base` (query string dropped)
pub fn join_id(base: &str, id: &Value) -> Option<String> {
    let id = match id {
        Value::String(id) if !id.is_empty() => id.clone(),
        Value::Number(id) => id.to_string(),
        _ => return None,
    };
    let base = base.split('?').next().unwrap_or(base).trim_end_matches('/');
    Some(format!("{}/{}", base, id))
}
