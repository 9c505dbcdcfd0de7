//! Unit tests for ReqwestTransport
//!
//! These tests use mockito to mock HTTP API responses.

use eresource_client::{
    ClientConfig, HttpMethod, HttpRequest, HttpTransport, ReqwestTransport, ResourceApiBuilder,
};
use eresource_core::{Entity, RequestConfig};
use mockito::{Matcher, Server};
use serde_json::{json, Value};

fn transport(server: &Server) -> ReqwestTransport {
    ReqwestTransport::new(&ClientConfig::new(server.url())).unwrap()
}

#[tokio::test]
async fn test_get_decodes_json() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", "/users/1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_header("x-request-id", "abc")
        .with_body(r#"{"id": 1, "name": "ann"}"#)
        .create_async()
        .await;

    let response = transport(&server)
        .send(HttpRequest::new(HttpMethod::GET, "/users/1"))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.data, json!({"id": 1, "name": "ann"}));
    assert_eq!(response.headers.get("x-request-id").map(String::as_str), Some("abc"));
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let mut server = Server::new_async().await;
    let m = server
        .mock("POST", "/users")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!({"name": "bob"})))
        .with_status(201)
        .with_body(r#"{"id": 2, "name": "bob"}"#)
        .create_async()
        .await;

    let response = transport(&server)
        .send(HttpRequest::new(HttpMethod::POST, "/users").with_body(json!({"name": "bob"})))
        .await
        .unwrap();

    m.assert_async().await;
    assert_eq!(response.data["id"], json!(2));
}

#[tokio::test]
async fn test_error_status_rejects_with_body() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", "/missing")
        .with_status(404)
        .with_body(r#"{"error": "not found"}"#)
        .create_async()
        .await;

    let err = transport(&server)
        .send(HttpRequest::new(HttpMethod::GET, "/missing"))
        .await
        .unwrap_err();

    assert_eq!(err.status, 404);
    assert_eq!(err.data, json!({"error": "not found"}));
}

#[tokio::test]
async fn test_empty_body_is_null() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("DELETE", "/users/1")
        .with_status(204)
        .create_async()
        .await;

    let response = transport(&server)
        .send(HttpRequest::new(HttpMethod::DELETE, "/users/1"))
        .await
        .unwrap();

    assert_eq!(response.status, 204);
    assert_eq!(response.data, Value::Null);
}

#[tokio::test]
async fn test_bearer_and_default_headers() {
    let mut server = Server::new_async().await;
    let m = server
        .mock("GET", "/secure")
        .match_header("authorization", "Bearer secret-key")
        .match_header("x-client", "eresource")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let config = ClientConfig::new(server.url())
        .with_api_key("secret-key")
        .with_header("X-Client", "eresource");
    ReqwestTransport::new(&config)
        .unwrap()
        .send(HttpRequest::new(HttpMethod::GET, "/secure"))
        .await
        .unwrap();

    m.assert_async().await;
}

#[tokio::test]
async fn test_unreachable_server_has_status_zero() {
    let config = ClientConfig::new("http://127.0.0.1:1");
    let err = ReqwestTransport::new(&config)
        .unwrap()
        .send(HttpRequest::new(HttpMethod::GET, "/"))
        .await
        .unwrap_err();

    assert_eq!(err.status, 0);
}

#[tokio::test]
async fn test_api_over_http_fetches_once() {
    let mut server = Server::new_async().await;
    let m = server
        .mock("GET", "/foo")
        .with_status(200)
        .with_body(r#"{"foo": "bar"}"#)
        .expect(1)
        .create_async()
        .await;

    let api = ResourceApiBuilder::new()
        .with_config(ClientConfig::new(server.url()))
        .build()
        .unwrap();

    let foo = api.get("/foo", RequestConfig::default()).unwrap();
    foo.promise().await.unwrap();
    let again = api.get("/foo", RequestConfig::default()).unwrap();

    assert!(again.ptr_eq(&foo));
    assert_eq!(foo.value("foo"), Some(json!("bar")));
    m.assert_async().await;
}
