//! A single remote item

use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::entity::{
    immediate_completion, DataSource, Entity, EntityCore, EntityRef, Initializer, Lifecycle,
    PathSource,
};
use crate::error::Result;
use crate::operation;

/// A lazily populated remote item.
///
/// Fields appear once the backing data settles. Until then the resource can
/// be stored, compared, placed in collections, and proxied like any other.
///
/// # Example
///
/// ```
/// use eresource_core::{DataSource, Entity, Resource};
/// use serde_json::json;
///
/// let resource = Resource::new("/foo/1", DataSource::Ready(json!({"foo": "bar"}))).unwrap();
/// assert!(resource.loaded());
/// assert_eq!(resource.value("foo"), Some(json!("bar")));
/// ```
#[derive(Clone)]
pub struct Resource {
    inner: Arc<ResourceInner>,
}

struct ResourceInner {
    core: EntityCore,
}

impl Resource {
    /// Create a resource from a path and a data source.
    ///
    /// When neither is pending the resource is populated and loaded before
    /// this returns; otherwise it loads when both settle.
    pub fn new(path: impl Into<PathSource<Resource>>, data: DataSource<Value>) -> Result<Self> {
        Self::with_initializer(path, data, None)
    }

    /// Like [`Resource::new`], running `initializer` after path and data
    /// settle. An initializer error fails the resource.
    pub fn with_initializer(
        path: impl Into<PathSource<Resource>>,
        data: DataSource<Value>,
        initializer: Option<Initializer<Resource>>,
    ) -> Result<Self> {
        let (literal, lifecycle) = Lifecycle::new(path.into(), data, initializer)?;

        if lifecycle.is_immediate() {
            let resource = Self::from_core(EntityCore::new(literal, immediate_completion()));
            lifecycle.settle_now(&resource, populate)?;
            return Ok(resource);
        }

        let inner = Arc::new_cyclic(|weak: &Weak<ResourceInner>| {
            let weak = weak.clone();
            let completion = operation::share(async move {
                let upgrade = move || weak.upgrade().map(|inner| Resource { inner });
                lifecycle.settle(upgrade, populate).await
            });
            ResourceInner {
                core: EntityCore::new(literal, completion),
            }
        });
        let resource = Resource { inner };
        operation::drive(&resource.completion());
        Ok(resource)
    }

    fn from_core(core: EntityCore) -> Self {
        Self {
            inner: Arc::new(ResourceInner { core }),
        }
    }

    /// True if both handles refer to the same resource
    pub fn ptr_eq(&self, other: &Resource) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Identity key, stable for the lifetime of the resource
    pub fn key(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// Merge a JSON body; `null` is ignored and non-objects are rejected
    pub fn extend_json(&self, data: &Value) -> Result<&Self> {
        self.inner.core.extend_json(data)?;
        Ok(self)
    }

    /// Copy `other`'s current field values into this resource
    pub fn update_from(&self, other: &Resource) -> &Self {
        if !self.ptr_eq(other) {
            let fields = other.inner.core.concrete_fields();
            self.inner.core.extend_fields(fields);
        }
        self
    }
}

fn populate(resource: &Resource, data: Value) -> Result<()> {
    resource.extend_json(&data).map(|_| ())
}

impl Entity for Resource {
    fn core(&self) -> &EntityCore {
        &self.inner.core
    }

    fn to_entity_ref(&self) -> EntityRef {
        EntityRef::Resource(self.clone())
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Resource {}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("path", &self.path())
            .field("state", &self.state())
            .finish()
    }
}
