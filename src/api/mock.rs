//! In-memory transport for tests

use std::sync::Mutex;

use reqwest::StatusCode;

use super::transport::{ApiResponse, RequestSpec, Transport, TransportError};

type Handler = Box<dyn Fn(&RequestSpec) -> Result<ApiResponse, TransportError> + Send + Sync>;

/// Answers every request through `handler` and records what was sent.
pub struct MockTransport {
    handler: Handler,
    log: Mutex<Vec<RequestSpec>>,
}

impl MockTransport {
    pub fn new(
        handler: impl Fn(&RequestSpec) -> Result<ApiResponse, TransportError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Requests in the order they were sent, bearer headers included.
    pub fn requests(&self) -> Vec<RequestSpec> {
        self.log.lock().unwrap().clone()
    }

    /// How many requests hit a URL whose path ends in `path`.
    pub fn count_path(&self, path: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.split('?').next().is_some_and(|u| u.ends_with(path)))
            .count()
    }
}

impl Transport for MockTransport {
    async fn send(&self, request: &RequestSpec) -> Result<ApiResponse, TransportError> {
        self.log.lock().unwrap().push(request.clone());
        // Suspend like a real network call so concurrent callers interleave.
        tokio::task::yield_now().await;
        (self.handler)(request)
    }
}

pub fn json_reply(status: u16, body: serde_json::Value) -> Result<ApiResponse, TransportError> {
    let status = StatusCode::from_u16(status).unwrap();
    Ok(ApiResponse::new(status, body.to_string().into_bytes()))
}
