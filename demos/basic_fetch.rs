//! Fetching, creating and deleting resources against an in-memory API
//!
//! Run with: cargo run --example basic_fetch

use eresource_client::{HttpMethod, MockTransport, ResourceApi};
use eresource_core::{Entity, Field, RequestConfig};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    eresource_demos::init_tracing()?;

    let transport = Arc::new(MockTransport::new());
    transport
        .respond(HttpMethod::GET, "/users/1", 200, json!({"id": 1, "name": "ann"}))
        .respond(
            HttpMethod::GET,
            "/posts/1",
            200,
            json!({"id": 1, "title": "hello", "author": "/users/1"}),
        )
        .respond(HttpMethod::POST, "/posts", 201, json!({"id": 2, "title": "second"}))
        .respond(HttpMethod::DELETE, "/posts/2", 204, json!(null));

    let api = ResourceApi::new(transport.clone());

    // Both calls share one request and one object
    let post = api.get("/posts/1", RequestConfig::default())?;
    let same = api.get("/posts/1", RequestConfig::default())?;
    println!("loaded before await: {}", post.loaded());
    post.promise().await?;
    println!("same object: {}, title: {:?}", same.ptr_eq(&post), post.value("title"));

    // Turn the author path into the cached user on first read
    let relations = api.clone();
    let author_path = post.value("author").unwrap_or_default();
    post.proxy("author", move || {
        author_path
            .as_str()
            .and_then(|path| relations.get(path, RequestConfig::default()).ok())
            .map(Field::from)
            .unwrap_or_else(Field::null)
    })?;
    if let Some(author) = post.field("author").as_ref().and_then(Field::as_resource) {
        author.promise().await?;
        println!("author: {:?}", author.value("name"));
    }

    let created = api.post("/posts", json!({"title": "second"}), RequestConfig::default())?;
    created.promise().await?;
    println!("created at {:?}", created.path());

    let response = api.delete("/posts/2", RequestConfig::default())?.await?;
    println!(
        "deleted with status {}, still cached: {}",
        response.status,
        api.cache().contains("/posts/2")
    );

    println!("cache hit rate: {:.2}", api.stats().hit_rate());
    Ok(())
}
