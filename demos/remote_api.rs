//! Talking to a real HTTP API
//!
//! Configure with ERESOURCE_BASE_URL (and optionally ERESOURCE_API_KEY and
//! ERESOURCE_TIMEOUT_SECS), then:
//!
//! ```text
//! ERESOURCE_BASE_URL=https://jsonplaceholder.typicode.com \
//!     cargo run --example remote_api
//! ```

use eresource_client::{ClientConfig, ResourceApiBuilder};
use eresource_core::{Entity, RequestConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    eresource_demos::init_tracing()?;

    let config = ClientConfig::from_env()?;
    info!(base_url = %config.base_url, "connecting");
    let api = ResourceApiBuilder::new()
        .with_config(config)
        .with_defaults(RequestConfig::new().with_header("Accept", "application/json"))
        .build()?;

    let users = api.query("/users", RequestConfig::default())?;
    users.promise().await?;
    println!("{} users", users.len());

    // Already cached by the query: no request
    let first = api.get("/users/1", RequestConfig::default())?;
    println!("user 1: {:?}", first.value("name"));
    println!("{:?}", api.stats());
    Ok(())
}
