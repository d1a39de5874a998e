//! Template download over HTTP.

use std::time::Duration;

use async_trait::async_trait;

use super::ArchiveFetcher;
use crate::error::EngineError;

/// Default timeout for a single download.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpArchiveFetcher {
    client: reqwest::Client,
}

impl HttpArchiveFetcher {
    pub fn new(timeout: Duration) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Fetch(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ArchiveFetcher for HttpArchiveFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, EngineError> {
        tracing::debug!(url, "Downloading template archive");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| EngineError::Fetch(format!("cannot reach {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Fetch(format!(
                "{url} returned HTTP {}",
                status.as_u16()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| EngineError::Fetch(format!("cannot read body from {url}: {e}")))?;
        Ok(body.to_vec())
    }
}
