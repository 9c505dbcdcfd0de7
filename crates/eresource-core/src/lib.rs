//! Entity layer for eResource
//!
//! This crate holds the client-side model of a remote HTTP API: lazily
//! populated resources and collections, and the path cache that keeps one
//! live object per path.
//!
//! # Features
//!
//! - **PathCache**: at-most-one entity per path, with conflict detection
//! - **Resource**: a remote item whose fields arrive asynchronously
//! - **Collection**: an ordered, path-indexed set of resources that can be
//!   reconciled in place with `sync`
//! - **Lazy overrides**: `proxy` replaces a field with a computation run on
//!   first read
//!
//! Network access lives in `eresource-client`; this crate only needs futures.
//!
//! # Quick Start
//!
//! ```
//! use eresource_core::{DataSource, Entity, PathCache, Resource};
//! use serde_json::json;
//!
//! let cache = PathCache::new();
//! let user = Resource::new("/users/1", DataSource::Ready(json!({"name": "ann"}))).unwrap();
//! cache.store(user.clone()).unwrap();
//!
//! let cached = cache.retrieve_resource("/users/1").unwrap();
//! assert!(cached.ptr_eq(&user));
//! assert_eq!(cached.value("name"), Some(json!("ann")));
//! ```

pub mod cache;
pub mod collection;
pub mod config;
pub mod entity;
pub mod error;
pub mod field;
pub mod operation;
pub mod resource;

pub use cache::{CacheStats, PathCache};
pub use collection::{Collection, ItemFactory};
pub use config::{
    default_item_pathfinder, default_pathfinder, join_id, ItemPathfinder, Pathfinder,
    RequestConfig,
};
pub use entity::{
    DataSource, Entity, EntityCore, EntityRef, Initializer, LoadState, PathSource, Reloader,
};
pub use error::{ResourceError, Result, TransportError};
pub use field::Field;
pub use operation::Operation;
pub use resource::Resource;
