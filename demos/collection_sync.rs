//! Reloading a collection in place
//!
//! Run with: cargo run --example collection_sync

use eresource_client::{HttpMethod, MockTransport, ResourceApi};
use eresource_core::{Entity, RequestConfig};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    eresource_demos::init_tracing()?;

    let transport = Arc::new(MockTransport::new());
    transport.respond(
        HttpMethod::GET,
        "/todos",
        200,
        json!([
            {"id": 1, "title": "write docs", "done": false},
            {"id": 2, "title": "fix bug", "done": false},
        ]),
    );

    let api = ResourceApi::new(transport.clone());
    let todos = api.query("/todos", RequestConfig::default())?;
    todos.promise().await?;
    let docs = todos.get("/todos/1");

    transport.respond(
        HttpMethod::GET,
        "/todos",
        200,
        json!([
            {"id": 1, "title": "write docs", "done": true},
            {"id": 3, "title": "release", "done": false},
        ]),
    );
    // Two reloads while the first is in flight share one request
    let first = todos.reload(RequestConfig::default())?;
    let second = todos.reload(RequestConfig::default())?;
    first.await?;
    second.await?;

    for todo in todos.resources() {
        println!("{:?}: {}", todo.path(), todo.to_json());
    }
    if let (Some(before), Some(after)) = (docs, todos.get("/todos/1")) {
        println!("identity kept: {}", before.ptr_eq(&after));
    }
    println!(
        "requests for /todos: {}",
        transport.request_count(HttpMethod::GET, "/todos")
    );
    Ok(())
}
