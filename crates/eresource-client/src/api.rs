//! Request orchestration over the path cache
//!
//! [`ResourceApi`] turns HTTP verbs into cached entities:
//!
//! - `get`/`query` store the new entity under the request path *before* the
//!   request is sent, so every later call for that path (until eviction)
//!   gets the same object and no second request.
//! - `post` stores its result once the server-assigned path is known.
//! - `put` updates the cached resource in place when there is one.
//! - `delete` evicts the path once the server confirms.
//! - `reload` refreshes a loaded entity, sharing one in-flight refresh per
//!   entity.
//!
//! Local validation failures (`InvalidArgument`, `Conflict`) are returned
//! by the call itself; network failures only ever reject completions.

use eresource_core::entity::validate_path;
use eresource_core::operation::{self, Operation, Pending};
use eresource_core::{
    default_item_pathfinder, default_pathfinder, CacheStats, Collection, DataSource, Entity,
    EntityRef, ItemFactory, PathCache, PathSource, Reloader, RequestConfig, Resource,
    ResourceError, Result,
};
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

use crate::builder::ResourceApiBuilder;
use crate::transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};

/// Orchestrates requests, the path cache, and entity lifecycles.
///
/// Cloning gives another handle on the same orchestrator.
///
/// # Example
///
/// ```
/// use eresource_client::{HttpMethod, MockTransport, ResourceApi};
/// use eresource_core::{Entity, RequestConfig};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> eresource_core::Result<()> {
/// let transport = Arc::new(MockTransport::new());
/// transport.respond(HttpMethod::GET, "/foo", 200, json!({"foo": "bar"}));
///
/// let api = ResourceApi::new(transport.clone());
/// let foo = api.get("/foo", RequestConfig::default())?;
/// foo.promise().await?;
///
/// assert_eq!(foo.value("foo"), Some(json!("bar")));
/// assert!(api.get("/foo", RequestConfig::default())?.ptr_eq(&foo));
/// assert_eq!(transport.request_count(HttpMethod::GET, "/foo"), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ResourceApi {
    inner: Arc<ApiInner>,
}

struct ApiInner {
    transport: Arc<dyn HttpTransport>,
    cache: PathCache,
    defaults: RequestConfig,
    /// In-flight reloads keyed by entity identity
    reloads: Mutex<HashMap<usize, InFlightReload>>,
    next_reload: AtomicU64,
    this: Weak<ApiInner>,
}

struct InFlightReload {
    generation: u64,
    operation: Operation<EntityRef>,
}

impl ResourceApi {
    /// Orchestrator over `transport` with a fresh cache and no defaults
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self::from_parts(transport, PathCache::new(), RequestConfig::default())
    }

    /// Start building an orchestrator
    pub fn builder() -> ResourceApiBuilder {
        ResourceApiBuilder::new()
    }

    pub(crate) fn from_parts(
        transport: Arc<dyn HttpTransport>,
        cache: PathCache,
        defaults: RequestConfig,
    ) -> Self {
        let inner = Arc::new_cyclic(|this: &Weak<ApiInner>| ApiInner {
            transport,
            cache,
            defaults,
            reloads: Mutex::new(HashMap::new()),
            next_reload: AtomicU64::new(0),
            this: this.clone(),
        });
        Self { inner }
    }

    /// The path cache shared by every entity this orchestrator creates
    pub fn cache(&self) -> &PathCache {
        &self.inner.cache
    }

    /// Cache statistics
    pub fn stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    /// Configuration merged into every call
    pub fn defaults(&self) -> &RequestConfig {
        &self.inner.defaults
    }

    /// Fetch the resource at `path`.
    ///
    /// A cached entity is returned as is, with no request. Otherwise a new
    /// resource is cached under `path` immediately and populated when the
    /// response arrives; if the request fails it is evicted again so a
    /// later call retries.
    pub fn get(&self, path: &str, config: RequestConfig) -> Result<Resource> {
        let (entity, created) = self.inner.cache.retrieve_or_store(path, || {
            let config = config.merge_defaults(&self.inner.defaults);
            let response = self.send(HttpMethod::GET, path, None, &config);
            let owner = Arc::new(AtomicUsize::new(0));
            let data = self.evicting(path, owner.clone(), async move {
                object_body(response.await?.data)
            });
            let resource = Resource::new(path, data)?;
            owner.store(resource.key(), Ordering::SeqCst);
            Ok(resource.into())
        })?;

        match entity {
            EntityRef::Resource(resource) => {
                if created {
                    self.bind(&resource);
                } else {
                    debug!(path = %path, "cache hit");
                }
                Ok(resource)
            }
            EntityRef::Collection(_) => Err(ResourceError::Conflict {
                path: path.to_string(),
            }),
        }
    }

    /// [`ResourceApi::get`] for a path that is not known yet.
    ///
    /// The returned operation resolves with the resource once the path has
    /// settled and the resource has loaded.
    pub fn get_when<F>(&self, path: F, config: RequestConfig) -> Operation<Resource>
    where
        F: Future<Output = Result<String>> + Send + 'static,
    {
        let api = self.clone();
        operation::start(async move {
            let path = path.await?;
            let resource = api.get(&path, config)?;
            resource.promise().await
        })
    }

    /// Create a resource by posting `data` to `path`.
    ///
    /// The resource has no path until the response arrives; the pathfinder
    /// (per call, then default, then `<path>/<id>`) then names it and it is
    /// stored in the cache. A cache conflict at that point rejects the
    /// completion.
    pub fn post(&self, path: &str, data: Value, config: RequestConfig) -> Result<Resource> {
        validate_path(path)?;
        let config = config.merge_defaults(&self.inner.defaults);
        let pathfinder = config
            .pathfinder
            .clone()
            .unwrap_or_else(default_pathfinder);
        let response = self.send(HttpMethod::POST, path, Some(data), &config);

        let request_path = path.to_string();
        let cache = self.inner.cache.clone();
        let resource = Resource::with_initializer(
            PathSource::derived(move |resource: &Resource| pathfinder(&request_path, resource)),
            DataSource::pending(async move { object_body(response.await?.data) }),
            Some(Box::new(move |resource: &Resource| {
                cache.store(resource.clone()).map(|_| ())
            })),
        )?;
        self.bind(&resource);
        Ok(resource)
    }

    /// Replace the resource at `path` with `data`.
    ///
    /// When the cache holds a resource at `path` once the response arrives,
    /// that object is updated in place and returned; otherwise a new resource
    /// is created and cached under `path`.
    pub fn put(
        &self,
        path: &str,
        data: Value,
        config: RequestConfig,
    ) -> Result<Operation<Resource>> {
        validate_path(path)?;
        if let Some(EntityRef::Collection(_)) = self.inner.cache.peek(path) {
            return Err(ResourceError::Conflict {
                path: path.to_string(),
            });
        }
        let config = config.merge_defaults(&self.inner.defaults);
        let response = self.send(HttpMethod::PUT, path, Some(data), &config);

        let cache = self.inner.cache.clone();
        let reloader = self.reloader();
        let path = path.to_string();
        Ok(operation::start(async move {
            let data = object_body(response.await?.data)?;
            if let Some(EntityRef::Resource(existing)) = cache.peek(&path) {
                existing.extend_json(&data)?;
                return Ok(existing);
            }
            let resource = Resource::new(path.as_str(), DataSource::Ready(data))?;
            resource.bind_reloader(reloader);
            cache.store_resource(&resource)
        }))
    }

    /// Delete `path` on the server, then evict it from the cache.
    ///
    /// Resolves with the raw response. The evicted entity itself is left
    /// untouched.
    pub fn delete(&self, path: &str, config: RequestConfig) -> Result<Operation<HttpResponse>> {
        validate_path(path)?;
        let config = config.merge_defaults(&self.inner.defaults);
        let response = self.send(HttpMethod::DELETE, path, None, &config);

        let cache = self.inner.cache.clone();
        let path = path.to_string();
        Ok(operation::start(async move {
            let response = response.await?;
            cache.remove(&path)?;
            Ok(response)
        }))
    }

    /// Fetch the collection at `path`.
    ///
    /// Caching works as for [`ResourceApi::get`]. Each item is named by the
    /// item pathfinder and resolved through the cache, so an item that is
    /// already cached is that same object (updated from the item data).
    pub fn query(&self, path: &str, config: RequestConfig) -> Result<Collection> {
        let (entity, created) = self.inner.cache.retrieve_or_store(path, || {
            let config = config.merge_defaults(&self.inner.defaults);
            let factory = self.item_factory(path, &config);
            let response = self.send(HttpMethod::GET, path, None, &config);
            let owner = Arc::new(AtomicUsize::new(0));
            let data = self.evicting(path, owner.clone(), async move {
                array_body(response.await?.data)
            });
            let collection = Collection::new(path, data, factory)?;
            owner.store(collection.key(), Ordering::SeqCst);
            Ok(collection.into())
        })?;

        match entity {
            EntityRef::Collection(collection) => {
                if created {
                    self.bind(&collection);
                } else {
                    debug!(path = %path, "cache hit");
                }
                Ok(collection)
            }
            EntityRef::Resource(_) => Err(ResourceError::Conflict {
                path: path.to_string(),
            }),
        }
    }

    /// Refresh `entity` from its path.
    ///
    /// An entity that has not loaded yet is not fetched again: the returned
    /// operation follows its existing completion. For a loaded entity, a
    /// reload already in flight is shared; otherwise a new GET is issued. A
    /// resource is updated in place, a collection is synced with the fresh
    /// membership.
    pub fn reload(
        &self,
        entity: impl Into<EntityRef>,
        config: RequestConfig,
    ) -> Result<Operation<EntityRef>> {
        let entity = entity.into();
        if !entity.loaded() {
            let completion = entity.completion();
            return Ok(operation::share(async move {
                completion.await.map(|_| entity)
            }));
        }

        let key = entity.key();
        let mut reloads = self.inner.reloads.lock();
        if let Some(in_flight) = reloads.get(&key) {
            debug!(path = ?entity.path(), "reload already in flight");
            return Ok(in_flight.operation.clone());
        }

        let path = entity
            .path()
            .ok_or_else(|| ResourceError::invalid("cannot reload an entity without a path"))?;
        let config = config.merge_defaults(&self.inner.defaults);
        let response = self.send(HttpMethod::GET, &path, None, &config);
        let refresh: Pending<EntityRef> = match entity {
            EntityRef::Resource(resource) => async move {
                let data = object_body(response.await?.data)?;
                resource.extend_json(&data)?;
                Ok(EntityRef::Resource(resource))
            }
            .boxed(),
            EntityRef::Collection(collection) => {
                let factory = self.item_factory(&path, &config);
                async move {
                    let items = array_body(response.await?.data)?;
                    let fresh =
                        Collection::new(PathSource::Unknown, DataSource::Ready(items), factory)?;
                    collection.sync(&fresh);
                    Ok(EntityRef::Collection(collection))
                }
                .boxed()
            }
        };

        let generation = self.inner.next_reload.fetch_add(1, Ordering::Relaxed);
        let api = self.inner.this.clone();
        let operation = operation::share(async move {
            let outcome = refresh.await;
            if let Some(api) = api.upgrade() {
                let mut reloads = api.reloads.lock();
                if reloads
                    .get(&key)
                    .map_or(false, |in_flight| in_flight.generation == generation)
                {
                    reloads.remove(&key);
                }
            }
            outcome
        });
        reloads.insert(
            key,
            InFlightReload {
                generation,
                operation: operation.clone(),
            },
        );
        drop(reloads);

        operation::drive(&operation);
        Ok(operation)
    }

    /// [`ResourceApi::reload`] for the entity cached at `path`
    pub fn reload_path(&self, path: &str, config: RequestConfig) -> Result<Operation<EntityRef>> {
        validate_path(path)?;
        let entity = self
            .inner
            .cache
            .peek(path)
            .ok_or_else(|| ResourceError::invalid(format!("nothing cached at {}", path)))?;
        self.reload(entity, config)
    }

    fn reloader(&self) -> Weak<dyn Reloader> {
        let reloader: Weak<dyn Reloader> = self.inner.this.clone();
        reloader
    }

    fn bind<E: Entity>(&self, entity: &E) {
        entity.bind_reloader(self.reloader());
    }

    fn send(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
        config: &RequestConfig,
    ) -> Pending<HttpResponse> {
        let mut request =
            HttpRequest::new(method, config.apply_path(path)).with_headers(config.headers.clone());
        if let Some(body) = body {
            request = request.with_body(config.apply_request(body));
        }
        let transport = self.inner.transport.clone();
        let config = config.clone();
        async move {
            info!(method = %request.method, url = %request.url, "request issued");
            let mut response = transport.send(request).await?;
            response.data = config.apply_response(std::mem::take(&mut response.data));
            Ok(response)
        }
        .boxed()
    }

    /// Data source that evicts the entity whose key ends up in `owner` from
    /// `path` if `fetch` fails
    fn evicting<T, F>(&self, path: &str, owner: Arc<AtomicUsize>, fetch: F) -> DataSource<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let cache = self.inner.cache.clone();
        let path = path.to_string();
        DataSource::pending(async move {
            let outcome = fetch.await;
            if let Err(err) = &outcome {
                if cache.remove_if_owner(&path, &owner) {
                    debug!(path = %path, error = %err, "evicted failed entity");
                }
            }
            outcome
        })
    }

    fn item_factory(&self, collection_path: &str, config: &RequestConfig) -> ItemFactory {
        let pathfinder = config
            .item_pathfinder
            .clone()
            .unwrap_or_else(default_item_pathfinder);
        let base = collection_path.to_string();
        let cache = self.inner.cache.clone();
        let reloader = self.reloader();
        ItemFactory::new(move |data: &Value| pathfinder(&base, data))
            .with_resolver(move |path, data| resolve_item(&cache, &reloader, path, data))
    }
}

impl Reloader for ApiInner {
    fn reload(&self, entity: EntityRef, config: RequestConfig) -> Result<Operation<EntityRef>> {
        let inner = self
            .this
            .upgrade()
            .ok_or_else(|| ResourceError::invalid("the api this entity came from is gone"))?;
        ResourceApi { inner }.reload(entity, config)
    }
}

impl fmt::Debug for ResourceApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceApi")
            .field("cache", &self.inner.cache)
            .field("defaults", &self.inner.defaults)
            .finish()
    }
}

/// Cached item at `path` updated from `data`, or a new one cached there
fn resolve_item(
    cache: &PathCache,
    reloader: &Weak<dyn Reloader>,
    path: Option<String>,
    data: Value,
) -> Result<Resource> {
    if let Some(path) = path.as_deref() {
        match cache.peek(path) {
            Some(EntityRef::Resource(existing)) => {
                existing.extend_json(&data)?;
                return Ok(existing);
            }
            Some(EntityRef::Collection(_)) => {
                return Err(ResourceError::Conflict {
                    path: path.to_string(),
                })
            }
            None => {}
        }
    }
    let resource = Resource::new(path, DataSource::Ready(data))?;
    resource.bind_reloader(reloader.clone());
    if resource.path().is_some() {
        cache.store(resource.clone())?;
    }
    Ok(resource)
}

fn object_body(data: Value) -> Result<Value> {
    match data {
        Value::Object(_) | Value::Null => Ok(data),
        other => Err(ResourceError::MalformedResponse(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

fn array_body(data: Value) -> Result<Vec<Value>> {
    match data {
        Value::Array(items) => Ok(items),
        other => Err(ResourceError::MalformedResponse(format!(
            "expected an array, got {}",
            other
        ))),
    }
}
