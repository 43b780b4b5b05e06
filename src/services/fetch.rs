//! URL validation and image retrieval
//!
//! Retrieval never panics and never aborts a batch: every transport, status
//! or decoding problem comes back as [`PipelineError::Fetch`] so the caller
//! can log it and move on to the next record.

use crate::{
    config::PipelineConfig,
    error::{PipelineError, Result},
    services::io::ImageIOService,
};
use async_trait::async_trait;
use futures_util::stream::TryStreamExt;
use image::DynamicImage;
use reqwest::{Client, Url};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;
use tracing::debug;

/// Check whether a string is a well-formed, fetchable locator
///
/// True iff the string parses as an absolute URL with a non-empty scheme and
/// a non-empty host. No network access is performed.
#[must_use]
pub fn is_valid_url(candidate: &str) -> bool {
    match Url::parse(candidate) {
        Ok(url) => !url.scheme().is_empty() && url.host_str().is_some_and(|host| !host.is_empty()),
        Err(_) => false,
    }
}

/// Source of raw image data
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Retrieve the full response body into memory
    ///
    /// # Errors
    /// - `PipelineError::Fetch` on transport failure, timeout or non-success status
    async fn fetch_bytes(&self, locator: &str) -> Result<Vec<u8>>;

    /// Stream the response body directly into `dest`, returning the byte count
    ///
    /// # Errors
    /// - `PipelineError::Fetch` on transport failure, timeout or non-success status
    /// - `PipelineError::Io` when `dest` cannot be written
    async fn fetch_to_file(&self, locator: &str, dest: &Path) -> Result<u64>;

    /// Retrieve and decode an image
    ///
    /// Undecodable payloads are reported exactly like failed retrievals.
    ///
    /// # Errors
    /// - `PipelineError::Fetch` on any retrieval or decoding failure
    async fn fetch_image(&self, locator: &str) -> Result<DynamicImage> {
        let bytes = self.fetch_bytes(locator).await?;
        ImageIOService::decode(&bytes)
            .map_err(|e| PipelineError::fetch(locator, format!("undecodable image data: {}", e)))
    }
}

/// HTTP(S) fetcher backed by `reqwest`, with `file://` support for local paths
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Create a fetcher using the configured timeout and user agent
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.fetch_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| PipelineError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            timeout: config.fetch_timeout,
        })
    }

    fn local_path(locator: &str) -> Option<std::path::PathBuf> {
        Url::parse(locator)
            .ok()
            .filter(|url| url.scheme() == "file")
            .and_then(|url| url.to_file_path().ok())
    }

    async fn send(&self, locator: &str) -> Result<reqwest::Response> {
        let response = self.client.get(locator).send().await.map_err(|e| {
            if e.is_timeout() {
                PipelineError::fetch(locator, format!("timed out after {:?}", self.timeout))
            } else {
                PipelineError::fetch(locator, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::fetch(locator, format!("HTTP {}", status)));
        }

        Ok(response)
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch_bytes(&self, locator: &str) -> Result<Vec<u8>> {
        if let Some(path) = Self::local_path(locator) {
            return tokio::fs::read(&path)
                .await
                .map_err(|e| PipelineError::fetch(locator, e));
        }

        let response = self.send(locator).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| PipelineError::fetch(locator, format!("failed to read body: {}", e)))?;

        debug!(url = %locator, bytes = body.len(), "Fetched image");
        Ok(body.to_vec())
    }

    async fn fetch_to_file(&self, locator: &str, dest: &Path) -> Result<u64> {
        if let Some(path) = Self::local_path(locator) {
            return tokio::fs::copy(&path, dest)
                .await
                .map_err(|e| PipelineError::fetch(locator, e));
        }

        let response = self.send(locator).await?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| PipelineError::file_io_error("create download file", dest, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let written = tokio::io::copy(&mut stream, &mut file)
            .await
            .map_err(|e| PipelineError::fetch(locator, format!("download interrupted: {}", e)))?;

        file.flush()
            .await
            .map_err(|e| PipelineError::file_io_error("flush download file", dest, &e))?;

        debug!(url = %locator, bytes = written, path = %dest.display(), "Streamed image to disk");
        Ok(written)
    }
}
