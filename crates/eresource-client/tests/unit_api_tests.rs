//! Unit tests for ResourceApi
//!
//! These tests drive the orchestrator with MockTransport.

use eresource_client::{HttpMethod, MockTransport, ResourceApi, ResourceApiBuilder};
use eresource_core::{Entity, EntityRef, LoadState, RequestConfig, ResourceError};
use serde_json::{json, Value};
use std::sync::Arc;

fn setup() -> (Arc<MockTransport>, ResourceApi) {
    let transport = Arc::new(MockTransport::new());
    let api = ResourceApi::new(transport.clone());
    (transport, api)
}

fn none() -> RequestConfig {
    RequestConfig::default()
}

#[tokio::test]
async fn test_get_populates_same_object() {
    let (transport, api) = setup();
    transport.respond(HttpMethod::GET, "/foo", 200, json!({"foo": "bar"}));
    transport.hold();

    let foo = api.get("/foo", none()).unwrap();
    assert_eq!(foo.path().as_deref(), Some("/foo"));
    assert!(!foo.loaded());
    assert_eq!(foo.value("foo"), None);

    transport.flush();
    let loaded = foo.promise().await.unwrap();

    assert!(loaded.ptr_eq(&foo));
    assert!(foo.loaded());
    assert_eq!(foo.value("foo"), Some(json!("bar")));
}

#[tokio::test]
async fn test_get_is_single_flight() {
    let (transport, api) = setup();
    transport.respond(HttpMethod::GET, "/foo", 200, json!({"foo": "bar"}));

    let first = api.get("/foo", none()).unwrap();
    let second = api.get("/foo", none()).unwrap();
    assert!(first.ptr_eq(&second));

    first.promise().await.unwrap();
    let third = api.get("/foo", none()).unwrap();
    assert!(third.ptr_eq(&first));
    assert_eq!(transport.request_count(HttpMethod::GET, "/foo"), 1);

    let stats = api.stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn test_failed_get_keeps_shell_and_is_evicted() {
    let (transport, api) = setup();
    transport.respond(HttpMethod::GET, "/thing", 404, json!({"error": "missing"}));

    let thing = api.get("/thing", none()).unwrap();
    thing.set("local", "kept");
    let err = thing.promise().await.unwrap_err();

    let transport_error = err.transport().unwrap();
    assert_eq!(transport_error.status, 404);
    assert_eq!(transport_error.data, json!({"error": "missing"}));
    assert_eq!(thing.state(), LoadState::Failed);
    assert_eq!(thing.value("local"), Some(json!("kept")));
    assert!(!api.cache().contains("/thing"));

    transport.respond(HttpMethod::GET, "/thing", 200, json!({"ok": true}));
    let retried = api.get("/thing", none()).unwrap();
    retried.promise().await.unwrap();
    assert!(!retried.ptr_eq(&thing));
    assert_eq!(transport.request_count(HttpMethod::GET, "/thing"), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_get_is_evicted_on_multi_thread_runtime() {
    let (transport, api) = setup();

    for i in 0..2000 {
        let path = format!("/missing/{}", i);
        let missing = api.get(&path, none()).unwrap();
        let err = missing.promise().await.unwrap_err();
        assert_eq!(err.transport().unwrap().status, 404);
        assert!(!api.cache().contains(&path), "{} left in cache", path);
    }
    assert!(api.cache().is_empty());

    transport.respond(HttpMethod::GET, "/missing/7", 200, json!({"found": true}));
    let found = api.get("/missing/7", none()).unwrap();
    found.promise().await.unwrap();
    assert_eq!(found.value("found"), Some(json!(true)));
    assert_eq!(transport.request_count(HttpMethod::GET, "/missing/7"), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_query_is_evicted_on_multi_thread_runtime() {
    let (_transport, api) = setup();

    for i in 0..500 {
        let path = format!("/lists/{}", i);
        let list = api.query(&path, none()).unwrap();
        assert!(list.promise().await.is_err());
        assert!(!api.cache().contains(&path), "{} left in cache", path);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_gets_share_one_request() {
    let (transport, api) = setup();
    transport.respond(HttpMethod::GET, "/foo", 200, json!({"foo": "bar"}));
    transport.hold();

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let api = api.clone();
            tokio::spawn(async move { api.get("/foo", RequestConfig::default()).unwrap() })
        })
        .collect();
    let mut resources = Vec::new();
    for task in tasks {
        resources.push(task.await.unwrap());
    }
    transport.flush();

    let first = resources[0].promise().await.unwrap();
    for resource in &resources {
        assert!(resource.ptr_eq(&first));
        assert_eq!(resource.value("foo"), Some(json!("bar")));
    }
    assert_eq!(transport.request_count(HttpMethod::GET, "/foo"), 1);
    assert_eq!(api.stats().misses, 1);
    assert_eq!(api.stats().hits, 15);
}

#[tokio::test]
async fn test_internal_lookups_do_not_count_in_stats() {
    let (transport, api) = setup();
    transport
        .respond(HttpMethod::GET, "/items", 200, json!([{"id": 1}, {"id": 2}]))
        .respond(HttpMethod::GET, "/items/1", 200, json!({"id": 1}))
        .respond(HttpMethod::PUT, "/items/1", 200, json!({"id": 1, "name": "one"}));

    let item = api.get("/items/1", none()).unwrap();
    item.promise().await.unwrap();
    let items = api.query("/items", none()).unwrap();
    items.promise().await.unwrap();
    assert!(items.get("/items/1").unwrap().ptr_eq(&item));

    let updated = api.put("/items/1", json!({"name": "one"}), none()).unwrap().await.unwrap();
    assert!(updated.ptr_eq(&item));
    api.reload_path("/items", none()).unwrap().await.unwrap();

    let stats = api.stats();
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 2);
}

#[tokio::test]
async fn test_network_failure_has_no_status() {
    let (transport, api) = setup();
    transport.respond(HttpMethod::GET, "/down", 0, Value::Null);

    let err = api.get("/down", none()).unwrap().promise().await.unwrap_err();
    assert_eq!(err.transport().unwrap().status, 0);
}

#[tokio::test]
async fn test_invalid_path_fails_synchronously() {
    let (transport, api) = setup();
    assert!(matches!(api.get("", none()), Err(ResourceError::InvalidArgument(_))));
    assert!(matches!(api.post("", json!({}), none()), Err(ResourceError::InvalidArgument(_))));
    assert!(matches!(api.delete("", none()), Err(ResourceError::InvalidArgument(_))));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_post_resolves_path_and_caches() {
    let (transport, api) = setup();
    transport.respond(HttpMethod::POST, "/foo", 201, json!({"id": 2, "foo": "notbar"}));

    let created = api.post("/foo", json!({"foo": "notbar"}), none()).unwrap();
    assert_eq!(created.path(), None);

    created.promise().await.unwrap();
    assert_eq!(created.path().as_deref(), Some("/foo/2"));

    let fetched = api.get("/foo/2", none()).unwrap();
    assert!(fetched.ptr_eq(&created));
    assert_eq!(transport.request_count(HttpMethod::GET, "/foo/2"), 0);

    let sent = &transport.requests()[0];
    assert_eq!(sent.body, Some(json!({"foo": "notbar"})));
}

#[tokio::test]
async fn test_post_with_custom_pathfinder() {
    let (transport, api) = setup();
    transport.respond(HttpMethod::POST, "/foo", 201, json!({"slug": "hello"}));

    let config = RequestConfig::new().with_pathfinder(|_, resource| {
        let slug = resource
            .value("slug")
            .and_then(|slug| slug.as_str().map(String::from))
            .unwrap_or_default();
        Ok(format!("/posts/{}", slug))
    });
    let created = api.post("/foo", json!({}), config).unwrap();
    created.promise().await.unwrap();

    assert_eq!(created.path().as_deref(), Some("/posts/hello"));
    assert!(api.cache().retrieve_resource("/posts/hello").unwrap().ptr_eq(&created));
}

#[tokio::test]
async fn test_post_conflict_rejects_completion() {
    let (transport, api) = setup();
    transport
        .respond(HttpMethod::GET, "/foo/2", 200, json!({"id": 2}))
        .respond(HttpMethod::POST, "/foo", 201, json!({"id": 2}));

    let existing = api.get("/foo/2", none()).unwrap();
    existing.promise().await.unwrap();

    let created = api.post("/foo", json!({}), none()).unwrap();
    let err = created.promise().await.unwrap_err();

    assert_eq!(
        err,
        ResourceError::Conflict {
            path: "/foo/2".to_string()
        }
    );
    assert!(api.cache().retrieve_resource("/foo/2").unwrap().ptr_eq(&existing));
}

#[tokio::test]
async fn test_post_without_id_is_malformed() {
    let (transport, api) = setup();
    transport.respond(HttpMethod::POST, "/foo", 201, json!({"foo": "bar"}));

    let created = api.post("/foo", json!({}), none()).unwrap();
    assert!(matches!(
        created.promise().await,
        Err(ResourceError::MalformedResponse(_))
    ));
}

#[tokio::test]
async fn test_put_updates_cached_resource_in_place() {
    let (transport, api) = setup();
    transport
        .respond(HttpMethod::GET, "/foo/1", 200, json!({"foo": "bar"}))
        .respond(HttpMethod::PUT, "/foo/1", 200, json!({"foo": "baz"}));

    let existing = api.get("/foo/1", none()).unwrap();
    existing.promise().await.unwrap();

    let updated = api.put("/foo/1", json!({"foo": "baz"}), none()).unwrap().await.unwrap();

    assert!(updated.ptr_eq(&existing));
    assert_eq!(existing.value("foo"), Some(json!("baz")));
    assert_eq!(api.cache().len(), 1);
}

#[tokio::test]
async fn test_put_creates_when_uncached() {
    let (transport, api) = setup();
    transport.respond(HttpMethod::PUT, "/foo/9", 200, json!({"foo": "new"}));

    let created = api.put("/foo/9", json!({"foo": "new"}), none()).unwrap().await.unwrap();

    assert_eq!(created.path().as_deref(), Some("/foo/9"));
    assert!(created.loaded());
    assert!(api.get("/foo/9", none()).unwrap().ptr_eq(&created));
    assert_eq!(transport.request_count(HttpMethod::GET, "/foo/9"), 0);
}

#[tokio::test]
async fn test_delete_evicts_and_refetches() {
    let (transport, api) = setup();
    transport
        .respond(HttpMethod::GET, "/thing", 200, json!({"v": 1}))
        .respond(HttpMethod::DELETE, "/thing", 204, Value::Null);

    let thing = api.get("/thing", none()).unwrap();
    thing.promise().await.unwrap();

    let response = api.delete("/thing", none()).unwrap().await.unwrap();
    assert_eq!(response.status, 204);
    assert!(!api.cache().contains("/thing"));
    assert!(thing.loaded());
    assert_eq!(thing.value("v"), Some(json!(1)));

    let again = api.get("/thing", none()).unwrap();
    again.promise().await.unwrap();
    assert!(!again.ptr_eq(&thing));
    assert_eq!(transport.request_count(HttpMethod::GET, "/thing"), 2);
}

#[tokio::test]
async fn test_failed_delete_keeps_cache_entry() {
    let (transport, api) = setup();
    transport
        .respond(HttpMethod::GET, "/thing", 200, json!({}))
        .respond(HttpMethod::DELETE, "/thing", 500, Value::Null);

    api.get("/thing", none()).unwrap().promise().await.unwrap();
    let err = api.delete("/thing", none()).unwrap().await.unwrap_err();

    assert_eq!(err.transport().unwrap().status, 500);
    assert!(api.cache().contains("/thing"));
}

#[tokio::test]
async fn test_query_shares_cached_items() {
    let (transport, api) = setup();
    transport
        .respond(HttpMethod::GET, "/users/1", 200, json!({"id": 1, "name": "ann"}))
        .respond(
            HttpMethod::GET,
            "/users",
            200,
            json!([{"id": 1, "name": "ann b."}, {"id": 2, "name": "bob"}]),
        );

    let ann = api.get("/users/1", none()).unwrap();
    ann.promise().await.unwrap();

    let users = api.query("/users", none()).unwrap();
    assert!(users.is_empty());
    users.promise().await.unwrap();

    assert_eq!(users.len(), 2);
    assert!(users.get("/users/1").unwrap().ptr_eq(&ann));
    assert_eq!(ann.value("name"), Some(json!("ann b.")));

    let bob = users.get("/users/2").unwrap();
    assert!(api.get("/users/2", none()).unwrap().ptr_eq(&bob));
    assert_eq!(transport.request_count(HttpMethod::GET, "/users/2"), 0);
    assert!(api.query("/users", none()).unwrap().ptr_eq(&users));
}

#[tokio::test]
async fn test_query_with_item_pathfinder() {
    let transport = Arc::new(MockTransport::new());
    let api = ResourceApiBuilder::new()
        .with_transport(transport.clone())
        .with_item_pathfinder(|_, item| {
            item["slug"].as_str().map(|slug| format!("/pages/{}", slug))
        })
        .build()
        .unwrap();
    transport.respond(
        HttpMethod::GET,
        "/pages",
        200,
        json!([{"slug": "home"}, {"title": "draft"}]),
    );

    let pages = api.query("/pages", none()).unwrap();
    pages.promise().await.unwrap();

    assert_eq!(pages.len(), 2);
    assert!(pages.get("/pages/home").is_some());
    assert_eq!(pages.resources()[1].path(), None);
    assert_eq!(api.cache().len(), 2);
}

#[tokio::test]
async fn test_query_rejects_non_array() {
    let (transport, api) = setup();
    transport.respond(HttpMethod::GET, "/users", 200, json!({"items": []}));

    let users = api.query("/users", none()).unwrap();
    assert!(matches!(
        users.promise().await,
        Err(ResourceError::MalformedResponse(_))
    ));
    assert!(!api.cache().contains("/users"));
}

#[tokio::test]
async fn test_kind_mismatch_is_conflict() {
    let (transport, api) = setup();
    transport.respond(HttpMethod::GET, "/users", 200, json!([]));

    api.query("/users", none()).unwrap();
    assert!(matches!(
        api.get("/users", none()),
        Err(ResourceError::Conflict { .. })
    ));
}

#[tokio::test]
async fn test_reload_is_memoized_while_in_flight() {
    let (transport, api) = setup();
    transport.respond(HttpMethod::GET, "/foo", 200, json!({"foo": "bar"}));
    let foo = api.get("/foo", none()).unwrap();
    foo.promise().await.unwrap();

    transport.respond(HttpMethod::GET, "/foo", 200, json!({"foo": "baz"}));
    transport.hold();
    let first = api.reload(foo.clone(), none()).unwrap();
    let second = api.reload(foo.clone(), none()).unwrap();
    assert!(first.ptr_eq(&second));

    transport.flush();
    let reloaded = first.clone().await.unwrap();
    assert!(reloaded.as_resource().unwrap().ptr_eq(&foo));
    assert_eq!(foo.value("foo"), Some(json!("baz")));
    assert_eq!(transport.request_count(HttpMethod::GET, "/foo"), 2);

    let third = api.reload(foo.clone(), none()).unwrap();
    assert!(!third.ptr_eq(&first));
    third.await.unwrap();
    assert_eq!(transport.request_count(HttpMethod::GET, "/foo"), 3);
}

#[tokio::test]
async fn test_reload_of_pending_entity_does_not_refetch() {
    let (transport, api) = setup();
    transport.respond(HttpMethod::GET, "/foo", 200, json!({"foo": "bar"}));
    transport.hold();

    let foo = api.get("/foo", none()).unwrap();
    let reload = api.reload(foo.clone(), none()).unwrap();

    transport.flush();
    let reloaded = reload.await.unwrap();
    assert!(reloaded.as_resource().unwrap().ptr_eq(&foo));
    assert_eq!(transport.request_count(HttpMethod::GET, "/foo"), 1);
}

#[tokio::test]
async fn test_reload_collection_syncs_in_place() {
    let (transport, api) = setup();
    transport.respond(
        HttpMethod::GET,
        "/items",
        200,
        json!([{"id": 1, "v": 1}, {"id": 2, "v": 2}]),
    );
    let items = api.query("/items", none()).unwrap();
    items.promise().await.unwrap();
    let first = items.get("/items/1").unwrap();

    transport.respond(
        HttpMethod::GET,
        "/items",
        200,
        json!([{"id": 1, "v": 10}, {"id": 3, "v": 3}]),
    );
    let reloaded = api.reload_path("/items", none()).unwrap().await.unwrap();

    assert!(reloaded.as_collection().unwrap().ptr_eq(&items));
    let paths: Vec<_> = items.resources().iter().filter_map(|r| r.path()).collect();
    assert_eq!(paths, vec!["/items/1", "/items/3"]);
    assert!(items.get("/items/1").unwrap().ptr_eq(&first));
    assert_eq!(first.value("v"), Some(json!(10)));
}

#[tokio::test]
async fn test_entity_reload_uses_binding() {
    let (transport, api) = setup();
    transport.respond(HttpMethod::GET, "/foo", 200, json!({"n": 1}));
    let foo = api.get("/foo", none()).unwrap();
    foo.promise().await.unwrap();

    transport.respond(HttpMethod::GET, "/foo", 200, json!({"n": 2}));
    foo.reload(none()).unwrap().await.unwrap();
    assert_eq!(foo.value("n"), Some(json!(2)));

    drop(api);
    assert!(matches!(foo.reload(none()), Err(ResourceError::InvalidArgument(_))));
}

#[tokio::test]
async fn test_transformers_and_headers() {
    let transport = Arc::new(MockTransport::new());
    let defaults = RequestConfig::new()
        .with_header("Accept", "application/json")
        .with_path_transform(|path| format!("/api{}", path))
        .with_response_transform(|body| body["payload"].clone());
    let api = ResourceApiBuilder::new()
        .with_transport(transport.clone())
        .with_defaults(defaults)
        .build()
        .unwrap();
    transport
        .respond(HttpMethod::GET, "/api/foo.json", 200, json!({"payload": {"foo": "bar"}}))
        .respond(HttpMethod::POST, "/api/foo", 201, json!({"payload": {"id": 5}}));

    let config = RequestConfig::new()
        .with_header("X-Call", "1")
        .with_path_transform(|path| format!("{}.json", path));
    let foo = api.get("/foo", config).unwrap();
    foo.promise().await.unwrap();

    assert_eq!(foo.path().as_deref(), Some("/foo"));
    assert_eq!(foo.value("foo"), Some(json!("bar")));
    let sent = &transport.requests()[0];
    assert_eq!(sent.url, "/api/foo.json");
    assert_eq!(sent.headers["Accept"], "application/json");
    assert_eq!(sent.headers["X-Call"], "1");

    let wrap = RequestConfig::new().with_request_transform(|body| json!({"data": body}));
    let created = api.post("/foo", json!({"a": 1}), wrap).unwrap();
    created.promise().await.unwrap();
    assert_eq!(created.path().as_deref(), Some("/foo/5"));
    assert_eq!(transport.requests()[1].body, Some(json!({"data": {"a": 1}})));
}

#[tokio::test]
async fn test_get_when_waits_for_path() {
    let (transport, api) = setup();
    transport.respond(HttpMethod::GET, "/foo/7", 200, json!({"id": 7}));
    let (tx, rx) = tokio::sync::oneshot::channel::<String>();

    let pending = api.get_when(
        async move { rx.await.map_err(|_| ResourceError::invalid("no path")) },
        none(),
    );
    tx.send("/foo/7".to_string()).unwrap();
    let resource = pending.await.unwrap();

    assert_eq!(resource.value("id"), Some(json!(7)));
    assert!(api.get("/foo/7", none()).unwrap().ptr_eq(&resource));
}

#[tokio::test]
async fn test_cached_collection_is_entity_ref() {
    let (transport, api) = setup();
    transport.respond(HttpMethod::GET, "/users", 200, json!([]));
    let users = api.query("/users", none()).unwrap();

    match api.cache().retrieve("/users") {
        Some(EntityRef::Collection(cached)) => assert!(cached.ptr_eq(&users)),
        other => panic!("unexpected cache entry: {:?}", other),
    }
}
