use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Response};
use secmail_domain::{ByteSink, FormPayload};
use secmail_error::SecMailError;
use tokio::io::AsyncWriteExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

pub const DEFAULT_ENDPOINT: &str = "https://demvreply.datevnet.de/web.app";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct VendorConfig {
    pub endpoint: String,
    /// Upper bound on requests in flight against the portal at once.
    pub max_connections: usize,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            max_connections: 10,
        }
    }
}

/// Shared HTTP client for the secure mail portal.
///
/// Every step of every session POSTs to the same endpoint. Clones share the
/// connection pool and the connection limit.
#[derive(Clone)]
pub struct VendorClient {
    client: Client,
    endpoint: Arc<str>,
    permits: Arc<Semaphore>,
}

impl VendorClient {
    pub fn new(config: VendorConfig) -> Result<Self, SecMailError> {
        let max_connections = config.max_connections.max(1);
        let client = Client::builder()
            .pool_max_idle_per_host(max_connections)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| SecMailError::internal(format!("http client: {e}")))?;

        Ok(Self {
            client,
            endpoint: Arc::from(config.endpoint),
            permits: Arc::new(Semaphore::new(max_connections)),
        })
    }

    /// POSTs `form` url-encoded. Waits while the connection limit is
    /// exhausted; the returned response keeps its slot until dropped.
    pub async fn post_form(&self, form: &FormPayload) -> Result<PortalResponse, SecMailError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| SecMailError::internal(format!("connection limit closed: {e}")))?;

        debug!(endpoint = %self.endpoint, fields = form.len(), "portal POST");
        let response = self
            .client
            .post(&*self.endpoint)
            .form(form.as_pairs())
            .send()
            .await
            .map_err(|e| SecMailError::http(format!("portal request failed: {e}")))?
            .error_for_status()
            .map_err(|e| SecMailError::http(format!("portal rejected request: {e}")))?;

        Ok(PortalResponse {
            response,
            _permit: permit,
        })
    }
}

pub struct PortalResponse {
    response: Response,
    _permit: OwnedSemaphorePermit,
}

impl PortalResponse {
    /// Reads the whole body, releasing the connection slot.
    pub async fn into_document(self) -> Result<Vec<u8>, SecMailError> {
        let body = self
            .response
            .bytes()
            .await
            .map_err(|e| SecMailError::http(format!("reading portal page: {e}")))?;
        Ok(body.to_vec())
    }

    /// Copies the body into `sink` chunk by chunk and flushes it.
    pub async fn stream_to(mut self, sink: &mut ByteSink) -> Result<u64, SecMailError> {
        let mut written = 0u64;
        while let Some(chunk) = self
            .response
            .chunk()
            .await
            .map_err(|e| SecMailError::http(format!("reading download: {e}")))?
        {
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        sink.flush().await?;
        Ok(written)
    }
}
