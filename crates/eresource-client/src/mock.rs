//! In-memory transport for tests and demos

use async_trait::async_trait;
use eresource_core::TransportError;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::oneshot;

use crate::transport::{is_success, HttpMethod, HttpRequest, HttpResponse, HttpTransport};

/// Transport answering from canned routes.
///
/// Every request is logged. Unrouted requests get a 404. A route with status
/// `0` fails like an unreachable server. While [`MockTransport::hold`] is in
/// effect requests wait, and are answered (from the routes as they are at
/// that point) on [`MockTransport::flush`].
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<(HttpMethod, String), (u16, Value)>>,
    log: Mutex<Vec<HttpRequest>>,
    held: Mutex<Option<Vec<oneshot::Sender<()>>>>,
}

impl MockTransport {
    /// Create a transport with no routes
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `method path` with `status` and `body` from now on
    pub fn respond(&self, method: HttpMethod, path: &str, status: u16, body: Value) -> &Self {
        self.routes
            .lock()
            .insert((method, path.to_string()), (status, body));
        self
    }

    /// Every request sent so far
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.log.lock().clone()
    }

    /// Number of requests sent for `method path`
    pub fn request_count(&self, method: HttpMethod, path: &str) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|request| request.method == method && request.url == path)
            .count()
    }

    /// Hold back responses until [`MockTransport::flush`]
    pub fn hold(&self) {
        let mut held = self.held.lock();
        if held.is_none() {
            *held = Some(Vec::new());
        }
    }

    /// Release every held request and stop holding
    pub fn flush(&self) {
        let waiters = self.held.lock().take().unwrap_or_default();
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }

    /// Number of requests currently held back
    pub fn pending(&self) -> usize {
        self.held.lock().as_ref().map_or(0, Vec::len)
    }

    fn answer(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let route = self
            .routes
            .lock()
            .get(&(request.method, request.url.clone()))
            .cloned();
        match route {
            Some((0, _)) => Err(TransportError::network(format!(
                "connection refused: {} {}",
                request.method, request.url
            ))),
            Some((status, data)) if is_success(status) => Ok(HttpResponse::new(status, data)),
            Some((status, data)) => Err(TransportError::from_status(status, data)),
            None => Err(TransportError::from_status(404, Value::Null)),
        }
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.log.lock().push(request.clone());

        let release = {
            let mut held = self.held.lock();
            held.as_mut().map(|waiters| {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                rx
            })
        };
        if let Some(release) = release {
            let _ = release.await;
        }

        self.answer(&request)
    }
}
