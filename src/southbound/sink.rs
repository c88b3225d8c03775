//! REST sink abstraction.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::classifier::RestOperation;
use crate::error::SinkError;

/// One southbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestRequest {
    /// HTTP method.
    pub operation: RestOperation,
    /// Full destination URI.
    pub uri: String,
    /// JSON body; `None` for `DELETE`.
    pub body: Option<String>,
}

/// Delivers southbound requests. Called from dispatcher worker threads, so
/// blocking I/O is allowed.
pub trait RestSink: Send + Sync {
    /// Issue the request. Non-success responses are errors.
    fn send(&self, request: &RestRequest) -> Result<(), SinkError>;
}

/// In-memory sink that records every request.
///
/// URIs registered with `fail_uri` are rejected with a transport error after
/// being recorded, which lets tests exercise partial fan-out failures.
#[derive(Debug, Default)]
pub struct RecordingSink {
    requests: Mutex<Vec<RestRequest>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future request to `uri` fail.
    pub fn fail_uri(&self, uri: impl Into<String>) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(uri.into());
        }
    }

    /// Requests received so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<RestRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Requests received for one URI, in arrival order.
    #[must_use]
    pub fn requests_to(&self, uri: &str) -> Vec<RestRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.uri == uri)
            .collect()
    }
}

impl RestSink for RecordingSink {
    fn send(&self, request: &RestRequest) -> Result<(), SinkError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let fails = self
            .failing
            .lock()
            .map(|f| f.contains(&request.uri))
            .unwrap_or(false);
        if fails {
            return Err(SinkError::Transport {
                uri: request.uri.clone(),
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}
