//! Builder pattern for ResourceApi

use eresource_core::{PathCache, RequestConfig, Resource, Result as ResourceResult};
use serde_json::Value;
use std::sync::Arc;

use crate::api::ResourceApi;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::http::ReqwestTransport;
use crate::transport::HttpTransport;

/// Builder for ResourceApi
///
/// # Example
///
/// ```rust,no_run
/// use eresource_client::{ClientConfig, ResourceApiBuilder};
///
/// // Over HTTP
/// let api = ResourceApiBuilder::new()
///     .with_config(ClientConfig::new("https://api.example.com").with_api_key("secret-key"))
///     .build()?;
///
/// // Collection items named by their slug
/// let api = ResourceApiBuilder::new()
///     .with_config(ClientConfig::from_env()?)
///     .with_item_pathfinder(|base, item| {
///         item["slug"].as_str().map(|slug| format!("{}/{}", base, slug))
///     })
///     .build()?;
/// # Ok::<(), eresource_client::ClientError>(())
/// ```
#[derive(Default)]
pub struct ResourceApiBuilder {
    config: Option<ClientConfig>,
    transport: Option<Arc<dyn HttpTransport>>,
    cache: Option<PathCache>,
    defaults: RequestConfig,
}

impl ResourceApiBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Send requests over HTTP as described by `config`
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Send requests through `transport`; takes precedence over
    /// [`ResourceApiBuilder::with_config`]
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Share an existing cache
    pub fn with_cache(mut self, cache: PathCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Configuration merged into every call
    pub fn with_defaults(mut self, defaults: RequestConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Default pathfinder for `post`
    pub fn with_pathfinder<F>(mut self, pathfinder: F) -> Self
    where
        F: Fn(&str, &Resource) -> ResourceResult<String> + Send + Sync + 'static,
    {
        self.defaults = self.defaults.with_pathfinder(pathfinder);
        self
    }

    /// Default item pathfinder for `query`
    pub fn with_item_pathfinder<F>(mut self, pathfinder: F) -> Self
    where
        F: Fn(&str, &Value) -> Option<String> + Send + Sync + 'static,
    {
        self.defaults = self.defaults.with_item_pathfinder(pathfinder);
        self
    }

    /// Build the orchestrator
    ///
    /// # Errors
    ///
    /// Fails when neither a transport nor a client config was given, or when
    /// the HTTP transport cannot be created from the config.
    pub fn build(self) -> Result<ResourceApi> {
        let transport: Arc<dyn HttpTransport> = match (self.transport, self.config) {
            (Some(transport), _) => transport,
            (None, Some(config)) => Arc::new(ReqwestTransport::new(&config)?),
            (None, None) => {
                return Err(ClientError::ConfigError(
                    "either a transport or a client config is required".to_string(),
                ))
            }
        };
        Ok(ResourceApi::from_parts(
            transport,
            self.cache.unwrap_or_default(),
            self.defaults,
        ))
    }
}
