//! Bounded outbound HTTP transport.
//!
//! Every tool call goes through one shared [`HttpTransport`]. The transport caps the number of
//! requests in flight with a semaphore; a caller that cannot get a slot within the configured
//! acquire timeout fails with [`HttpToolsError::AcquireTimeout`] instead of queueing forever.

use crate::config::TransportConfig;
use crate::safety::{redact_url, sanitize_reqwest_error};
use reqwest::{Client, Request};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

#[derive(Debug, Error)]
pub enum HttpToolsError {
    #[error("config error: {0}")]
    Config(String),
    #[error("http transport error: {0}")]
    Transport(String),
    #[error("timed out after {}s waiting for a free connection", .0.as_secs())]
    AcquireTimeout(Duration),
}

pub type Result<T> = std::result::Result<T, HttpToolsError>;

impl From<reqwest::Error> for HttpToolsError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(sanitize_reqwest_error(&value))
    }
}

/// Status and body text of a completed upstream call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    permits: Arc<Semaphore>,
    acquire_timeout: Duration,
}

impl HttpTransport {
    /// Build a transport from pool and timeout settings.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_connections` is zero or the HTTP client cannot be built.
    pub fn new(config: &TransportConfig) -> Result<Self> {
        if config.max_connections == 0 {
            return Err(HttpToolsError::Config(
                "maxConnections must be greater than zero".to_string(),
            ));
        }

        let client = Client::builder()
            .pool_max_idle_per_host(config.max_connections)
            .connect_timeout(config.connect_timeout())
            .timeout(config.response_timeout())
            .build()?;

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(config.max_connections)),
            acquire_timeout: config.pending_acquire_timeout(),
        })
    }

    /// Underlying client, for building requests that are later passed to [`Self::execute`].
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// Send a request and read the whole response body as text.
    ///
    /// Any HTTP status counts as success here; only transport-level failures are errors.
    ///
    /// # Errors
    ///
    /// Returns [`HttpToolsError::AcquireTimeout`] when no connection slot frees up in time, and
    /// [`HttpToolsError::Transport`] for connect, DNS, timeout and body read failures.
    pub async fn execute(&self, request: Request) -> Result<HttpResponse> {
        let _permit = tokio::time::timeout(self.acquire_timeout, self.permits.acquire())
            .await
            .map_err(|_| HttpToolsError::AcquireTimeout(self.acquire_timeout))?
            .map_err(|_| HttpToolsError::Transport("connection pool is closed".to_string()))?;

        let method = request.method().clone();
        let url = redact_url(request.url());
        tracing::debug!(%method, %url, "sending upstream request");

        let response = self.client.execute(request).await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        tracing::debug!(%method, %url, status, bytes = body.len(), "upstream responded");
        Ok(HttpResponse { status, body })
    }
}
