//! Shared test doubles: a scripted gateway and a non-sleeping clock.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use serde_json::Value;

use crate::error::SyncResult;
use crate::gateway::{ApiRequest, ApiResponse, Gateway};
use crate::job::Clock;

/// Gateway double with per-endpoint response queues.
///
/// Responses are keyed by `"METHOD endpoint"` and consumed in order. Every
/// request is recorded for assertion. An unexpected request panics with the
/// key it looked for.
pub struct MockGateway {
    responses: RefCell<HashMap<String, VecDeque<ApiResponse>>>,
    requests: RefCell<Vec<ApiRequest>>,
    api_version: String,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            responses: RefCell::new(HashMap::new()),
            requests: RefCell::new(Vec::new()),
            api_version: "v26.1".to_string(),
        }
    }

    /// Queue a JSON response for `"METHOD endpoint"`
    pub fn enqueue(&self, key: &str, status: u16, body: Value) {
        let bytes = serde_json::to_vec(&body).expect("serializable body");
        self.enqueue_bytes(key, status, bytes);
    }

    /// Queue a raw-bytes response (archive downloads, CSV exports)
    pub fn enqueue_bytes(&self, key: &str, status: u16, bytes: Vec<u8>) {
        self.responses
            .borrow_mut()
            .entry(key.to_string())
            .or_default()
            .push_back(ApiResponse::from_bytes(status, bytes));
    }

    /// All requests seen so far
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.borrow().clone()
    }

    /// Requests matching a `"METHOD endpoint"` key
    pub fn requests_for(&self, key: &str) -> Vec<ApiRequest> {
        self.requests
            .borrow()
            .iter()
            .filter(|r| format!("{} {}", r.method.as_str(), r.endpoint) == key)
            .cloned()
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl Gateway for MockGateway {
    fn request(&self, request: &ApiRequest) -> SyncResult<ApiResponse> {
        self.requests.borrow_mut().push(request.clone());
        let key = format!("{} {}", request.method.as_str(), request.endpoint);
        let mut responses = self.responses.borrow_mut();
        let queue = responses
            .get_mut(&key)
            .unwrap_or_else(|| panic!("unexpected request: {}", key));
        let response = queue
            .pop_front()
            .unwrap_or_else(|| panic!("response queue exhausted for: {}", key));
        Ok(response)
    }

    fn api_version(&self) -> &str {
        &self.api_version
    }
}

/// Clock that records sleeps instead of performing them
pub struct ManualClock {
    sleeps: RefCell<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            sleeps: RefCell::new(Vec::new()),
        }
    }

    pub fn sleep_count(&self) -> usize {
        self.sleeps.borrow().len()
    }

    pub fn total_slept(&self) -> Duration {
        self.sleeps.borrow().iter().sum()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
    }
}

/// Canned job-status body for poll tests
pub fn job_status_body(id: &str, status: &str) -> Value {
    serde_json::json!({
        "responseStatus": "SUCCESS",
        "data": {"id": id, "status": status}
    })
}
