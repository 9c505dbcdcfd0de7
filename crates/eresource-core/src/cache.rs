//! Path-keyed entity registry
//!
//! The [`PathCache`] holds at most one live entity per path. Everything that
//! wants "the" object for a path goes through it, which is what makes two
//! independent fetches of `/users/1` come back as the same object.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::collection::Collection;
use crate::entity::{validate_path, EntityRef};
use crate::error::{ResourceError, Result};
use crate::resource::Resource;

/// Cache statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Number of lookups that found an entity
    pub hits: u64,
    /// Number of lookups that found nothing
    pub misses: u64,
    /// Number of entries in cache
    pub size: usize,
}

impl CacheStats {
    /// Calculate cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Registry mapping each path to exactly one entity.
///
/// Cloning gives another handle on the same registry.
#[derive(Clone, Default)]
pub struct PathCache {
    inner: Arc<CacheInner>,
}

#[derive(Default)]
struct CacheInner {
    entries: Mutex<HashMap<String, EntityRef>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PathCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `entity` under its path.
    ///
    /// Storing the object already held at that path is a no-op. Storing a
    /// different object there fails with [`ResourceError::Conflict`]; an
    /// entity without a path is [`ResourceError::InvalidArgument`].
    pub fn store(&self, entity: impl Into<EntityRef>) -> Result<EntityRef> {
        let entity = entity.into();
        let path = entity
            .path()
            .ok_or_else(|| ResourceError::invalid("cannot cache an entity without a path"))?;

        let mut entries = self.inner.entries.lock();
        if let Some(existing) = entries.get(&path) {
            if existing.ptr_eq(&entity) {
                return Ok(entity);
            }
            warn!(path = %path, "cache conflict");
            return Err(ResourceError::Conflict { path });
        }
        debug!(path = %path, "cached entity");
        entries.insert(path, entity.clone());
        Ok(entity)
    }

    /// The entity at `path`, or the one `create` builds, stored atomically.
    ///
    /// The boolean is true when `create` ran. `create` runs under the cache
    /// lock, so it must not touch this cache itself; the entity it returns
    /// must carry `path`.
    pub fn retrieve_or_store<F>(&self, path: &str, create: F) -> Result<(EntityRef, bool)>
    where
        F: FnOnce() -> Result<EntityRef>,
    {
        validate_path(path)?;
        let mut entries = self.inner.entries.lock();
        if let Some(existing) = entries.get(path) {
            self.inner.hits.fetch_add(1, Ordering::Relaxed);
            return Ok((existing.clone(), false));
        }
        self.inner.misses.fetch_add(1, Ordering::Relaxed);

        let entity = create()?;
        if entity.path().as_deref() != Some(path) {
            return Err(ResourceError::invalid(format!(
                "entity created for {} carries path {:?}",
                path,
                entity.path()
            )));
        }
        debug!(path = %path, "cached entity");
        entries.insert(path.to_string(), entity.clone());
        Ok((entity, true))
    }

    /// [`PathCache::store`] for a resource, handing the resource back
    pub fn store_resource(&self, resource: &Resource) -> Result<Resource> {
        self.store(resource.clone())?;
        Ok(resource.clone())
    }

    /// The entity stored at `path`
    pub fn retrieve(&self, path: &str) -> Option<EntityRef> {
        let found = self.inner.entries.lock().get(path).cloned();
        let counter = if found.is_some() {
            &self.inner.hits
        } else {
            &self.inner.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// The entity stored at `path`, without counting as a lookup in
    /// [`CacheStats`]
    pub fn peek(&self, path: &str) -> Option<EntityRef> {
        self.inner.entries.lock().get(path).cloned()
    }

    /// The resource stored at `path`, if what is stored there is a resource
    pub fn retrieve_resource(&self, path: &str) -> Option<Resource> {
        self.retrieve(path)
            .and_then(|entity| entity.as_resource().cloned())
    }

    /// The collection stored at `path`, if what is stored there is a
    /// collection
    pub fn retrieve_collection(&self, path: &str) -> Option<Collection> {
        self.retrieve(path)
            .and_then(|entity| entity.as_collection().cloned())
    }

    /// True if anything is stored at `path` (does not count as a lookup)
    pub fn contains(&self, path: &str) -> bool {
        self.inner.entries.lock().contains_key(path)
    }

    /// Remove and return the entity stored at `path`
    pub fn remove(&self, path: &str) -> Result<Option<EntityRef>> {
        validate_path(path)?;
        let removed = self.inner.entries.lock().remove(path);
        if removed.is_some() {
            debug!(path = %path, "evicted entity");
        }
        Ok(removed)
    }

    /// Remove `entity` from its path, but only if it is still the object
    /// stored there. Returns whether it was removed.
    pub fn remove_if_same(&self, entity: &EntityRef) -> bool {
        match entity.path() {
            Some(path) => self.remove_if_key(&path, entity.key()),
            None => false,
        }
    }

    /// Remove the entry at `path` if its identity key is `key`
    pub fn remove_if_key(&self, path: &str, key: usize) -> bool {
        let mut entries = self.inner.entries.lock();
        match entries.get(path) {
            Some(existing) if existing.key() == key => {
                entries.remove(path);
                debug!(path = %path, "evicted entity");
                true
            }
            _ => false,
        }
    }

    /// Remove the entry at `path` if its identity key is the one held in
    /// `owner`.
    ///
    /// `owner` is read under the cache lock, so a key published from inside
    /// a [`PathCache::retrieve_or_store`] `create` callback is always seen.
    pub fn remove_if_owner(&self, path: &str, owner: &AtomicUsize) -> bool {
        let mut entries = self.inner.entries.lock();
        let key = owner.load(Ordering::SeqCst);
        match entries.get(path) {
            Some(existing) if existing.key() == key => {
                entries.remove(path);
                debug!(path = %path, "evicted entity");
                true
            }
            _ => false,
        }
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.inner.entries.lock().clear();
    }

    /// Number of cached entities
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Paths currently cached, in no particular order
    pub fn paths(&self) -> Vec<String> {
        self.inner.entries.lock().keys().cloned().collect()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            size: self.len(),
        }
    }
}

impl std::fmt::Debug for PathCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathCache")
            .field("size", &self.len())
            .finish()
    }
}
