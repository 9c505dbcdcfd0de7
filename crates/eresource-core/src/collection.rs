//! Ordered, path-indexed sets of resources

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

use crate::entity::{
    immediate_completion, DataSource, Entity, EntityCore, EntityRef, Initializer, Lifecycle,
    PathSource,
};
use crate::error::Result;
use crate::operation;
use crate::resource::Resource;

/// Computes an item's path from its raw data
pub type ItemPath = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// Runs on every item resource after it has been built
pub type ItemInitializer = Arc<dyn Fn(&Resource) -> Result<()> + Send + Sync>;

/// Turns an item's path and data into a resource (e.g. through a cache)
pub type ItemResolver = Arc<dyn Fn(Option<String>, Value) -> Result<Resource> + Send + Sync>;

/// How a collection turns raw item data into resources
#[derive(Clone)]
pub struct ItemFactory {
    pathfinder: ItemPath,
    initializer: Option<ItemInitializer>,
    resolver: Option<ItemResolver>,
}

impl ItemFactory {
    /// Factory using `pathfinder` to name each item
    pub fn new<F>(pathfinder: F) -> Self
    where
        F: Fn(&Value) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            pathfinder: Arc::new(pathfinder),
            initializer: None,
            resolver: None,
        }
    }

    /// Run `initializer` on every built item
    pub fn with_initializer<F>(mut self, initializer: F) -> Self
    where
        F: Fn(&Resource) -> Result<()> + Send + Sync + 'static,
    {
        self.initializer = Some(Arc::new(initializer));
        self
    }

    /// Build items through `resolver` instead of creating fresh resources
    pub fn with_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(Option<String>, Value) -> Result<Resource> + Send + Sync + 'static,
    {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Build the resource for one item
    pub fn build(&self, data: Value) -> Result<Resource> {
        let path = (self.pathfinder)(&data);
        let resource = match &self.resolver {
            Some(resolver) => resolver(path, data)?,
            None => Resource::new(path, DataSource::Ready(data))?,
        };
        if let Some(initializer) = &self.initializer {
            initializer(&resource)?;
        }
        Ok(resource)
    }

    /// Build every item, failing on the first error
    pub fn build_all(&self, items: Vec<Value>) -> Result<Vec<Resource>> {
        items.into_iter().map(|data| self.build(data)).collect()
    }
}

impl fmt::Debug for ItemFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemFactory")
            .field("initializer", &self.initializer.is_some())
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

#[derive(Default)]
struct Members {
    resources: Vec<Resource>,
    index: HashMap<String, usize>,
    /// Positions of resources whose path was unknown when last checked
    unindexed: Vec<usize>,
}

impl Members {
    fn reindex(&mut self) {
        self.index.clear();
        self.unindexed.clear();
        for (position, resource) in self.resources.iter().enumerate() {
            match resource.path() {
                Some(path) => {
                    self.index.insert(path, position);
                }
                None => self.unindexed.push(position),
            }
        }
    }

    fn push(&mut self, resource: Resource) {
        let position = self.resources.len();
        match resource.path() {
            Some(path) => {
                self.index.insert(path, position);
            }
            None => self.unindexed.push(position),
        }
        self.resources.push(resource);
    }

    /// Index members whose path has resolved since they were added.
    ///
    /// Paths only ever go from unknown to known, so only the unindexed
    /// positions need checking.
    fn resolve_unindexed(&mut self) {
        let Members {
            resources,
            index,
            unindexed,
        } = self;
        unindexed.retain(|&position| match resources[position].path() {
            Some(path) => {
                let entry = index.entry(path).or_insert(position);
                // the index points at the last position holding a path
                if *entry < position {
                    *entry = position;
                }
                false
            }
            None => true,
        });
    }

    fn position(&self, resource: &Resource) -> Option<usize> {
        self.resources.iter().position(|r| r.ptr_eq(resource))
    }

    fn lookup(&mut self, path: &str) -> Option<usize> {
        self.resolve_unindexed();
        self.index.get(path).copied()
    }
}

/// A lazily populated, ordered collection of resources.
///
/// `index` maps every known member path to its position in `resources`; the
/// two are updated together under one lock so they never disagree.
#[derive(Clone)]
pub struct Collection {
    inner: Arc<CollectionInner>,
}

struct CollectionInner {
    core: EntityCore,
    members: Mutex<Members>,
    factory: ItemFactory,
}

impl Collection {
    /// Create a collection whose items are built by `factory` once `data`
    /// settles
    pub fn new(
        path: impl Into<PathSource<Collection>>,
        data: DataSource<Vec<Value>>,
        factory: ItemFactory,
    ) -> Result<Self> {
        Self::with_initializer(path, data, factory, None)
    }

    /// Like [`Collection::new`], running `initializer` on the collection
    /// after it has been populated
    pub fn with_initializer(
        path: impl Into<PathSource<Collection>>,
        data: DataSource<Vec<Value>>,
        factory: ItemFactory,
        initializer: Option<Initializer<Collection>>,
    ) -> Result<Self> {
        let (literal, lifecycle) = Lifecycle::new(path.into(), data, initializer)?;

        if lifecycle.is_immediate() {
            let collection = Self {
                inner: Arc::new(CollectionInner {
                    core: EntityCore::new(literal, immediate_completion()),
                    members: Mutex::new(Members::default()),
                    factory,
                }),
            };
            lifecycle.settle_now(&collection, populate)?;
            return Ok(collection);
        }

        let inner = Arc::new_cyclic(|weak: &Weak<CollectionInner>| {
            let weak = weak.clone();
            let completion = operation::share(async move {
                let upgrade = move || weak.upgrade().map(|inner| Collection { inner });
                lifecycle.settle(upgrade, populate).await
            });
            CollectionInner {
                core: EntityCore::new(literal, completion),
                members: Mutex::new(Members::default()),
                factory,
            }
        });
        let collection = Collection { inner };
        operation::drive(&collection.completion());
        Ok(collection)
    }

    /// True if both handles refer to the same collection
    pub fn ptr_eq(&self, other: &Collection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Identity key, stable for the lifetime of the collection
    pub fn key(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// The item factory this collection was created with
    pub fn factory(&self) -> &ItemFactory {
        &self.inner.factory
    }

    /// Number of member resources
    pub fn len(&self) -> usize {
        self.inner.members.lock().resources.len()
    }

    /// True when there are no members
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Members in order
    pub fn resources(&self) -> Vec<Resource> {
        self.inner.members.lock().resources.clone()
    }

    /// Path to position map of the members
    pub fn index(&self) -> HashMap<String, usize> {
        let mut members = self.inner.members.lock();
        members.resolve_unindexed();
        members.index.clone()
    }

    /// The member stored at `path`
    pub fn get(&self, path: &str) -> Option<Resource> {
        let mut members = self.inner.members.lock();
        let position = members.lookup(path)?;
        members.resources.get(position).cloned()
    }

    /// True if this exact resource object is a member
    pub fn contains(&self, resource: &Resource) -> bool {
        self.inner.members.lock().position(resource).is_some()
    }

    /// Append `resource` unless this exact object is already a member.
    ///
    /// Returns whether it was added.
    pub fn add(&self, resource: &Resource) -> bool {
        let mut members = self.inner.members.lock();
        if members.position(resource).is_some() {
            return false;
        }
        members.push(resource.clone());
        true
    }

    /// Remove this exact resource object. Returns whether it was a member.
    pub fn remove(&self, resource: &Resource) -> bool {
        let mut members = self.inner.members.lock();
        let Some(position) = members.position(resource) else {
            return false;
        };
        members.resources.remove(position);
        members.reindex();
        true
    }

    /// Keep only the members for which `predicate` returns true
    pub fn filter<F>(&self, mut predicate: F) -> &Self
    where
        F: FnMut(&Resource) -> bool,
    {
        let dropped: HashSet<usize> = self
            .resources()
            .iter()
            .filter(|resource| !predicate(resource))
            .map(Resource::key)
            .collect();
        if !dropped.is_empty() {
            let mut members = self.inner.members.lock();
            members
                .resources
                .retain(|resource| !dropped.contains(&resource.key()));
            members.reindex();
        }
        self
    }

    /// Reconcile membership with `other` without replacing known objects.
    ///
    /// 1. Members absent from `other` (by identity or path) are removed.
    /// 2. Each resource of `other` is appended if nothing here has its path;
    ///    if a different object here has its path, that object is updated
    ///    in place from it.
    /// 3. Surviving members keep their order; new ones follow in `other`'s
    ///    order.
    ///
    /// Resources without a path never match by path and are always new.
    pub fn sync(&self, other: &Collection) -> &Self {
        if !self.ptr_eq(other) {
            self.reconcile(other.resources());
        }
        self
    }

    fn reconcile(&self, incoming: Vec<Resource>) {
        let incoming_keys: HashSet<usize> = incoming.iter().map(Resource::key).collect();
        let incoming_paths: HashSet<String> = incoming.iter().filter_map(Resource::path).collect();

        let mut updates = Vec::new();
        let (removed, added) = {
            let mut members = self.inner.members.lock();
            let before = members.resources.len();
            members.resources.retain(|resource| {
                incoming_keys.contains(&resource.key())
                    || resource
                        .path()
                        .map_or(false, |path| incoming_paths.contains(&path))
            });
            members.reindex();
            let removed = before - members.resources.len();

            let mut present: HashSet<usize> = members.resources.iter().map(Resource::key).collect();
            let mut added = 0;
            for resource in incoming {
                if present.contains(&resource.key()) {
                    continue;
                }
                let existing = resource
                    .path()
                    .and_then(|path| members.index.get(&path).copied());
                match existing {
                    Some(position) => {
                        updates.push((members.resources[position].clone(), resource));
                    }
                    None => {
                        present.insert(resource.key());
                        members.push(resource);
                        added += 1;
                    }
                }
            }
            (removed, added)
        };

        let updated = updates.len();
        for (existing, incoming) in updates {
            existing.update_from(&incoming);
        }
        debug!(
            path = ?self.path(),
            removed,
            added,
            updated,
            "collection synced"
        );
    }
}

fn populate(collection: &Collection, items: Vec<Value>) -> Result<()> {
    let resources = collection.inner.factory.build_all(items)?;
    collection.reconcile(resources);
    Ok(())
}

impl Entity for Collection {
    fn core(&self) -> &EntityCore {
        &self.inner.core
    }

    fn to_entity_ref(&self) -> EntityRef {
        EntityRef::Collection(self.clone())
    }
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Collection {}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("path", &self.path())
            .field("state", &self.state())
            .field("len", &self.len())
            .finish()
    }
}
