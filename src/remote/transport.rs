use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::OmniParserConfig;
use crate::errors::ProbeResult;
use crate::remote::types::{JobHandle, TransportError};

/// Wire access to one call/poll procedure.
/// `HttpCallTransport` is the production implementation.
#[async_trait]
pub trait CallTransport: Send + Sync {
    /// Submit a call body. Returns the raw response text on a 2xx status.
    async fn submit(&self, body: &Value) -> Result<String, TransportError>;

    /// Fetch the event stream for a submitted job. Returns the whole body.
    async fn fetch(&self, handle: &JobHandle) -> Result<String, TransportError>;
}

pub struct HttpCallTransport {
    call_url: String,
    submit_timeout: Duration,
    fetch_timeout: Duration,
    client: reqwest::Client,
}

impl HttpCallTransport {
    pub fn new(cfg: &OmniParserConfig) -> ProbeResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("omniprobe/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            call_url: cfg.call_url(),
            submit_timeout: cfg.submit_timeout(),
            fetch_timeout: cfg.fetch_timeout(),
            client,
        })
    }

    pub fn call_url(&self) -> &str {
        &self.call_url
    }

    pub fn result_url(&self, handle: &JobHandle) -> String {
        format!("{}/{}", self.call_url, handle.as_str())
    }

    async fn read_success(
        response: reqwest::Response,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .text()
            .await
            .map_err(|e| request_error(e, timeout))
    }
}

#[async_trait]
impl CallTransport for HttpCallTransport {
    async fn submit(&self, body: &Value) -> Result<String, TransportError> {
        tracing::debug!(url = %self.call_url, "submitting job");
        tracing::debug!(body = %sanitized_body(body), "call body (sanitized, base64 omitted)");

        let response = self
            .client
            .post(&self.call_url)
            .timeout(self.submit_timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| request_error(e, self.submit_timeout))?;
        Self::read_success(response, self.submit_timeout).await
    }

    async fn fetch(&self, handle: &JobHandle) -> Result<String, TransportError> {
        let url = self.result_url(handle);
        tracing::trace!(url = %url, "fetching job events");

        let response = self
            .client
            .get(&url)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(|e| request_error(e, self.fetch_timeout))?;
        Self::read_success(response, self.fetch_timeout).await
    }
}

fn request_error(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    } else {
        TransportError::Request(err)
    }
}

/// Render a call body for logs with inline base64 images replaced.
pub fn sanitized_body(body: &Value) -> String {
    let mut log_body = body.clone();
    if let Some(args) = log_body.get_mut("data").and_then(|d| d.as_array_mut()) {
        for arg in args {
            if let Some(url) = arg.get_mut("url") {
                if url.as_str().is_some_and(|u| u.starts_with("data:")) {
                    *url = Value::String("<omitted_base64_image>".to_string());
                }
            }
        }
    }
    serde_json::to_string(&log_body).unwrap_or_default()
}
