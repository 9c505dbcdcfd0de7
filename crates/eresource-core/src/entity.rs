//! Behaviour shared by resources and collections
//!
//! An entity is a cheap, cloneable handle on shared state: a path that may
//! not be known yet, a single-settlement completion, a load state, and a set
//! of fields with lazy overrides. Clones are the *same* entity; identity is
//! pointer identity, which is what the path cache and collections compare.
//!
//! # Lifecycle
//!
//! ```text
//!            data + path settle             error
//!   Pending ──────────────────▶ Loaded     Pending ─────▶ Failed
//!
//!   path:  None ──────────────▶ Some(path)   (monotonic, never cleared)
//! ```

use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Weak;
use tracing::{debug, warn};

use crate::collection::Collection;
use crate::config::RequestConfig;
use crate::error::{ResourceError, Result};
use crate::field::{Field, Fields, Read};
use crate::operation::{self, Operation};
use crate::resource::Resource;

/// Load state of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    /// Waiting for its path and/or data to settle
    Pending,
    /// Populated successfully (terminal)
    Loaded,
    /// Population failed (terminal)
    Failed,
}

/// Initial path of a new entity
pub enum PathSource<E> {
    /// Not known, and nothing will resolve it automatically
    Unknown,
    /// Known up front
    Literal(String),
    /// Known once the future settles; a rejection fails the entity
    Pending(BoxFuture<'static, Result<String>>),
    /// Computed from the entity itself once its data has been merged
    Derived(Box<dyn FnOnce(&E) -> Result<String> + Send>),
}

impl<E> PathSource<E> {
    /// Path resolved by a future
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<String>> + Send + 'static,
    {
        PathSource::Pending(future.boxed())
    }

    /// Path computed from the populated entity
    pub fn derived<F>(derive: F) -> Self
    where
        F: FnOnce(&E) -> Result<String> + Send + 'static,
    {
        PathSource::Derived(Box::new(derive))
    }
}

impl<E> From<&str> for PathSource<E> {
    fn from(path: &str) -> Self {
        PathSource::Literal(path.to_string())
    }
}

impl<E> From<String> for PathSource<E> {
    fn from(path: String) -> Self {
        PathSource::Literal(path)
    }
}

impl<E> From<Option<String>> for PathSource<E> {
    fn from(path: Option<String>) -> Self {
        path.map(PathSource::Literal).unwrap_or(PathSource::Unknown)
    }
}

/// Initial data of a new entity
pub enum DataSource<T> {
    /// No data; the entity stays empty
    Empty,
    /// Data available now
    Ready(T),
    /// Data delivered by a future; a rejection fails the entity
    Pending(BoxFuture<'static, Result<T>>),
}

impl<T> DataSource<T> {
    /// Data delivered by a future
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        DataSource::Pending(future.boxed())
    }

    fn is_pending(&self) -> bool {
        matches!(self, DataSource::Pending(_))
    }
}

/// Hook run once after an entity's path and data have settled
pub type Initializer<E> = Box<dyn FnOnce(&E) -> Result<()> + Send>;

/// Something able to refresh an entity from its origin
pub trait Reloader: Send + Sync {
    /// Reload `entity`, returning the operation that settles when done
    fn reload(&self, entity: EntityRef, config: RequestConfig) -> Result<Operation<EntityRef>>;
}

/// Check that `path` can identify an entity
pub fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(ResourceError::invalid("path must be a non-empty string"));
    }
    Ok(())
}

/// State shared by every entity
pub struct EntityCore {
    path: Mutex<Option<String>>,
    state: Mutex<LoadState>,
    fields: Mutex<Fields>,
    completion: Operation<()>,
    reloader: Mutex<Option<Weak<dyn Reloader>>>,
}

impl EntityCore {
    pub(crate) fn new(path: Option<String>, completion: Operation<()>) -> Self {
        Self {
            path: Mutex::new(path),
            state: Mutex::new(LoadState::Pending),
            fields: Mutex::new(Fields::default()),
            completion,
            reloader: Mutex::new(None),
        }
    }

    fn path(&self) -> Option<String> {
        self.path.lock().clone()
    }

    fn assign_path(&self, path: Option<&str>) -> Result<()> {
        let mut current = self.path.lock();
        match (current.as_deref(), path) {
            (None, None) => Ok(()),
            (None, Some(next)) => {
                validate_path(next)?;
                *current = Some(next.to_string());
                Ok(())
            }
            (Some(fixed), Some(next)) if fixed == next => Ok(()),
            (Some(fixed), _) => Err(ResourceError::invalid(format!(
                "path '{}' is immutable once set",
                fixed
            ))),
        }
    }

    fn state(&self) -> LoadState {
        *self.state.lock()
    }

    fn settle(&self, outcome: &Result<()>) {
        let mut state = self.state.lock();
        if *state != LoadState::Pending {
            return;
        }
        *state = match outcome {
            Ok(()) => LoadState::Loaded,
            Err(_) => LoadState::Failed,
        };
    }

    pub(crate) fn extend_json(&self, data: &Value) -> Result<()> {
        match data {
            Value::Object(map) => {
                self.fields.lock().extend(map);
                Ok(())
            }
            Value::Null => Ok(()),
            other => Err(ResourceError::MalformedResponse(format!(
                "expected an object, got {}",
                other
            ))),
        }
    }

    pub(crate) fn concrete_fields(&self) -> Vec<(String, Field)> {
        self.fields.lock().concrete()
    }

    pub(crate) fn extend_fields(&self, fields: Vec<(String, Field)>) {
        self.fields.lock().extend_fields(fields);
    }
}

impl fmt::Debug for EntityCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCore")
            .field("path", &*self.path.lock())
            .field("state", &*self.state.lock())
            .field("fields", &*self.fields.lock())
            .finish()
    }
}

/// Common entity surface implemented by [`Resource`] and [`Collection`]
pub trait Entity: Clone + Send + Sync + 'static {
    /// Shared entity state
    fn core(&self) -> &EntityCore;

    /// This entity as a type-erased reference
    fn to_entity_ref(&self) -> EntityRef;

    /// The path, or `None` while still unresolved
    fn path(&self) -> Option<String> {
        self.core().path()
    }

    /// Fix the path.
    ///
    /// Assigning `None` to an unresolved path is a no-op, as is assigning the
    /// path the entity already has. Any other change after the path is fixed
    /// fails with [`ResourceError::InvalidArgument`] and leaves it untouched.
    fn set_path(&self, path: Option<&str>) -> Result<()> {
        self.core().assign_path(path)
    }

    /// [`Entity::set_path`] for untyped input: only strings and `null` are
    /// accepted
    fn assign_path(&self, value: &Value) -> Result<()> {
        match value {
            Value::Null => self.set_path(None),
            Value::String(path) => self.set_path(Some(path)),
            other => Err(ResourceError::invalid(format!(
                "path must be a string or null, got {}",
                other
            ))),
        }
    }

    /// Current load state
    fn state(&self) -> LoadState {
        self.core().state()
    }

    /// True once population completed successfully
    fn loaded(&self) -> bool {
        self.state() == LoadState::Loaded
    }

    /// The completion operation; it settles exactly once
    fn completion(&self) -> Operation<()> {
        self.core().completion.clone()
    }

    /// Resolves with this entity when it has loaded, or with the failure
    fn promise(&self) -> BoxFuture<'static, Result<Self>> {
        let completion = self.completion();
        let entity = self.clone();
        async move { completion.await.map(|_| entity) }.boxed()
    }

    /// Read a field, evaluating a pending override on first access
    fn field(&self, name: &str) -> Option<Field> {
        let pending = self.core().fields.lock().begin_read(name);
        match pending {
            Read::Missing => None,
            Read::Ready(field) => Some(field),
            Read::Compute(compute) => {
                let field = compute();
                self.core().fields.lock().set(name, field.clone());
                Some(field)
            }
        }
    }

    /// Read a field as JSON; entity references render as their path
    fn value(&self, name: &str) -> Option<Value> {
        self.field(name).map(|field| field.to_json())
    }

    /// Write a field; a pending override for it is dropped unevaluated
    fn set(&self, name: &str, field: impl Into<Field>) -> &Self {
        self.core().fields.lock().set(name, field.into());
        self
    }

    /// True if the field exists (pending overrides included)
    fn has_field(&self, name: &str) -> bool {
        self.core().fields.lock().contains(name)
    }

    /// Names of all fields
    fn field_names(&self) -> Vec<String> {
        self.core().fields.lock().keys()
    }

    /// Merge `data` into the fields.
    ///
    /// Keys starting with `$` are entity metadata and are skipped, as are
    /// keys that have been proxied.
    fn extend(&self, data: &Map<String, Value>) -> &Self {
        self.core().fields.lock().extend(data);
        self
    }

    /// Replace `name` with a lazy override.
    ///
    /// `compute` runs on the first read; its result becomes the field's plain
    /// value and later reads return it directly. Arguments the computation
    /// needs are captured by the closure. The original value is recorded in
    /// [`Entity::overrides`]. Proxying a missing field is an error; proxying
    /// a `null` field records it but installs nothing.
    fn proxy<F>(&self, name: &str, compute: F) -> Result<&Self>
    where
        F: FnOnce() -> Field + Send + 'static,
    {
        self.core().fields.lock().proxy(name, Box::new(compute))?;
        Ok(self)
    }

    /// Like [`Entity::proxy`], unless the field currently equals `sentinel`,
    /// in which case the override just yields the current value
    fn proxy_unless<F>(&self, sentinel: &Value, name: &str, compute: F) -> Result<&Self>
    where
        F: FnOnce() -> Field + Send + 'static,
    {
        let current = self.core().fields.lock().peek(name);
        match current {
            Some(field) if field == *sentinel => self.proxy(name, move || field),
            _ => self.proxy(name, compute),
        }
    }

    /// Original values of every proxied field
    fn overrides(&self) -> BTreeMap<String, Field> {
        self.core().fields.lock().overrides()
    }

    /// Snapshot of the concrete fields as a JSON object
    fn to_json(&self) -> Value {
        self.core().fields.lock().to_json()
    }

    /// Bind the reloader used by [`Entity::reload`]
    fn bind_reloader(&self, reloader: Weak<dyn Reloader>) {
        *self.core().reloader.lock() = Some(reloader);
    }

    /// Refresh this entity through the reloader it was bound to
    fn reload(&self, config: RequestConfig) -> Result<Operation<EntityRef>> {
        let reloader = self
            .core()
            .reloader
            .lock()
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(|| ResourceError::invalid("entity is not bound to an api"))?;
        reloader.reload(self.to_entity_ref(), config)
    }
}

/// A resource or a collection
#[derive(Debug, Clone)]
pub enum EntityRef {
    /// A single remote item
    Resource(Resource),
    /// An ordered set of resources
    Collection(Collection),
}

impl EntityRef {
    /// Path of the underlying entity
    pub fn path(&self) -> Option<String> {
        match self {
            EntityRef::Resource(resource) => resource.path(),
            EntityRef::Collection(collection) => collection.path(),
        }
    }

    /// Load state of the underlying entity
    pub fn state(&self) -> LoadState {
        match self {
            EntityRef::Resource(resource) => resource.state(),
            EntityRef::Collection(collection) => collection.state(),
        }
    }

    /// True once the underlying entity has loaded
    pub fn loaded(&self) -> bool {
        self.state() == LoadState::Loaded
    }

    /// Completion of the underlying entity
    pub fn completion(&self) -> Operation<()> {
        match self {
            EntityRef::Resource(resource) => resource.completion(),
            EntityRef::Collection(collection) => collection.completion(),
        }
    }

    /// Identity key, stable for the lifetime of the entity
    pub fn key(&self) -> usize {
        match self {
            EntityRef::Resource(resource) => resource.key(),
            EntityRef::Collection(collection) => collection.key(),
        }
    }

    /// True if both refer to the same entity object
    pub fn ptr_eq(&self, other: &EntityRef) -> bool {
        match (self, other) {
            (EntityRef::Resource(a), EntityRef::Resource(b)) => a.ptr_eq(b),
            (EntityRef::Collection(a), EntityRef::Collection(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// The resource, if this is one
    pub fn as_resource(&self) -> Option<&Resource> {
        match self {
            EntityRef::Resource(resource) => Some(resource),
            EntityRef::Collection(_) => None,
        }
    }

    /// The collection, if this is one
    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            EntityRef::Collection(collection) => Some(collection),
            EntityRef::Resource(_) => None,
        }
    }

    /// Bind the reloader of the underlying entity
    pub fn bind_reloader(&self, reloader: Weak<dyn Reloader>) {
        match self {
            EntityRef::Resource(resource) => resource.bind_reloader(reloader),
            EntityRef::Collection(collection) => collection.bind_reloader(reloader),
        }
    }
}

impl From<Resource> for EntityRef {
    fn from(resource: Resource) -> Self {
        EntityRef::Resource(resource)
    }
}

impl From<Collection> for EntityRef {
    fn from(collection: Collection) -> Self {
        EntityRef::Collection(collection)
    }
}

/// Everything needed to bring an entity from `Pending` to a terminal state
pub(crate) struct Lifecycle<E, T> {
    pending_path: Option<BoxFuture<'static, Result<String>>>,
    derived_path: Option<Box<dyn FnOnce(&E) -> Result<String> + Send>>,
    data: DataSource<T>,
    initializer: Option<Initializer<E>>,
}

impl<E, T> Lifecycle<E, T>
where
    E: Entity,
    T: Send + 'static,
{
    /// Split `path` into what is known now and what settles later
    pub(crate) fn new(
        path: PathSource<E>,
        data: DataSource<T>,
        initializer: Option<Initializer<E>>,
    ) -> Result<(Option<String>, Self)> {
        let mut lifecycle = Self {
            pending_path: None,
            derived_path: None,
            data,
            initializer,
        };
        let literal = match path {
            PathSource::Unknown => None,
            PathSource::Literal(path) => {
                validate_path(&path)?;
                Some(path)
            }
            PathSource::Pending(future) => {
                lifecycle.pending_path = Some(future);
                None
            }
            PathSource::Derived(derive) => {
                lifecycle.derived_path = Some(derive);
                None
            }
        };
        Ok((literal, lifecycle))
    }

    /// True when nothing has to be waited for
    pub(crate) fn is_immediate(&self) -> bool {
        self.pending_path.is_none() && !self.data.is_pending()
    }

    /// Settle synchronously; only valid when [`Lifecycle::is_immediate`]
    pub(crate) fn settle_now<P>(self, entity: &E, populate: P) -> Result<()>
    where
        P: FnOnce(&E, T) -> Result<()>,
    {
        let outcome = (|| {
            if let DataSource::Ready(data) = self.data {
                populate(entity, data)?;
            }
            finish(entity, self.derived_path, self.initializer)
        })();
        entity.core().settle(&outcome);
        outcome
    }

    /// Settle once the pending path and data have arrived.
    ///
    /// `upgrade` returns the entity while it is still alive; when every
    /// handle has been dropped the remaining steps are skipped.
    pub(crate) async fn settle<U, P>(self, upgrade: U, populate: P) -> Result<()>
    where
        U: Fn() -> Option<E> + Send + Sync,
        P: FnOnce(&E, T) -> Result<()> + Send,
    {
        let Lifecycle {
            pending_path,
            derived_path,
            data,
            initializer,
        } = self;

        let path_step = async {
            if let Some(future) = pending_path {
                let path = future.await?;
                if let Some(entity) = upgrade() {
                    entity.set_path(Some(&path))?;
                }
            }
            Ok::<_, ResourceError>(())
        };
        let data_step = async {
            let data = match data {
                DataSource::Empty => return Ok(()),
                DataSource::Ready(data) => data,
                DataSource::Pending(future) => future.await?,
            };
            match upgrade() {
                Some(entity) => populate(&entity, data),
                None => Ok(()),
            }
        };

        let outcome = match future::try_join(path_step, data_step).await {
            Ok(_) => match upgrade() {
                Some(entity) => finish(&entity, derived_path, initializer),
                None => Ok(()),
            },
            Err(err) => Err(err),
        };

        if let Some(entity) = upgrade() {
            entity.core().settle(&outcome);
            match &outcome {
                Ok(()) => debug!(path = ?entity.path(), "entity loaded"),
                Err(err) => warn!(path = ?entity.path(), error = %err, "entity failed to load"),
            }
        }
        outcome
    }
}

fn finish<E: Entity>(
    entity: &E,
    derived_path: Option<Box<dyn FnOnce(&E) -> Result<String> + Send>>,
    initializer: Option<Initializer<E>>,
) -> Result<()> {
    if let Some(derive) = derived_path {
        let path = derive(entity)?;
        entity.set_path(Some(&path))?;
    }
    if let Some(initializer) = initializer {
        initializer(entity)?;
    }
    Ok(())
}

/// Completion for an entity that settles synchronously
pub(crate) fn immediate_completion() -> Operation<()> {
    operation::settled(Ok(()))
}
