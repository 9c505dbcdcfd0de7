//! HTTP request orchestration for eResource
//!
//! This crate connects the entity layer in `eresource-core` to a remote API:
//!
//! - **ResourceApi**: `get`, `post`, `put`, `delete`, `query` and `reload`,
//!   all going through one shared path cache
//! - **HttpTransport**: the seam to the network, with a `reqwest`
//!   implementation and an in-memory [`MockTransport`]
//! - **ClientConfig**: base URL, timeout, API key and default headers from
//!   code, YAML, or the environment
//!
//! # Quick Start
//!
//! ```no_run
//! use eresource_client::{ClientConfig, ResourceApiBuilder};
//! use eresource_core::{Entity, RequestConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let api = ResourceApiBuilder::new()
//!         .with_config(ClientConfig::new("https://api.example.com"))
//!         .build()?;
//!
//!     // Fetch once; later gets for the same path share the object
//!     let user = api.get("/users/1", RequestConfig::default())?;
//!     user.promise().await?;
//!     println!("name: {:?}", user.value("name"));
//!
//!     // Collections deduplicate their items through the same cache
//!     let users = api.query("/users", RequestConfig::default())?;
//!     users.promise().await?;
//!     assert!(users.get("/users/1").map_or(true, |u| u.ptr_eq(&user)));
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod builder;
pub mod config;
pub mod error;
pub mod http;
pub mod mock;
pub mod transport;

pub use api::ResourceApi;
pub use builder::ResourceApiBuilder;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use http::ReqwestTransport;
pub use mock::MockTransport;
pub use transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
