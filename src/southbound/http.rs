//! Blocking HTTP sink backed by reqwest.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::trace;

use crate::classifier::RestOperation;
use crate::config::HttpConfig;
use crate::error::{SinkError, SyncError, SyncResult};

use super::sink::{RestRequest, RestSink};

/// Issues southbound requests over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRestSink {
    client: Client,
    credentials: Option<(String, String)>,
}

impl HttpRestSink {
    /// Build a client from configuration.
    pub fn new(config: &HttpConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| SyncError::internal(format!("failed to build http client: {e}")))?;
        let credentials = config
            .username
            .clone()
            .map(|user| (user, config.password.clone().unwrap_or_default()));
        Ok(Self { client, credentials })
    }
}

impl RestSink for HttpRestSink {
    fn send(&self, request: &RestRequest) -> Result<(), SinkError> {
        let mut builder = match request.operation {
            RestOperation::Post => self.client.post(&request.uri),
            RestOperation::Put => self.client.put(&request.uri),
            RestOperation::Delete => self.client.delete(&request.uri),
        };
        if let Some((user, password)) = &self.credentials {
            builder = builder.basic_auth(user, Some(password));
        }
        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        let response = builder.send().map_err(|e| SinkError::Transport {
            uri: request.uri.clone(),
            message: e.to_string(),
        })?;

        let status = response.status();
        trace!(uri = %request.uri, status = status.as_u16(), "southbound response");
        if status.is_success() {
            Ok(())
        } else {
            Err(SinkError::Status {
                uri: request.uri.clone(),
                status: status.as_u16(),
            })
        }
    }
}
