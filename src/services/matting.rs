//! Background removal capability
//!
//! The pipeline treats background removal as an opaque remote capability:
//! an encoded image goes in, an encoded image with an alpha channel comes out.

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;
use tracing::debug;

/// Multipart field carrying the image sent to the matting service
pub const UPLOAD_FIELD: &str = "file";

/// Produces a cut-out of the foreground subject
#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    /// Remove the background from an encoded image
    ///
    /// Returns encoded image bytes whose alpha channel marks the background
    /// as transparent.
    ///
    /// # Errors
    /// - `PipelineError::Transform` when the capability fails
    async fn remove_background(&self, image_bytes: Vec<u8>) -> Result<Vec<u8>>;
}

/// Matting service reached over HTTP
///
/// Sends the image as a multipart upload and expects the cut-out as the raw
/// response body.
pub struct HttpMattingService {
    client: reqwest::Client,
    endpoint: String,
}

impl Debug for HttpMattingService {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("HttpMattingService")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl HttpMattingService {
    /// Create a client for the given endpoint
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new<S: Into<String>>(endpoint: S, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                PipelineError::internal(format!(
                    "Failed to create HTTP client for matting service: {}",
                    e
                ))
            })?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl BackgroundRemover for HttpMattingService {
    async fn remove_background(&self, image_bytes: Vec<u8>) -> Result<Vec<u8>> {
        let part = Part::bytes(image_bytes)
            .file_name("image.png")
            .mime_str("image/png")
            .map_err(|e| PipelineError::internal(format!("Invalid upload content type: {}", e)))?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                PipelineError::transform_stage_error(
                    "background removal",
                    &format!("matting request failed: {}", e),
                    None,
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PipelineError::transform_stage_error(
                "background removal",
                &format!("matting service returned {} - {}", status, error_text),
                None,
            ));
        }

        let body = response.bytes().await.map_err(|e| {
            PipelineError::transform_stage_error(
                "background removal",
                &format!("failed to read matting response: {}", e),
                None,
            )
        })?;

        debug!(endpoint = %self.endpoint, bytes = body.len(), "Received cut-out");
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_removal_returns_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/remove")
            .match_header(
                "content-type",
                mockito::Matcher::Regex("multipart/form-data.*".to_string()),
            )
            .with_status(200)
            .with_body(b"cutout".to_vec())
            .create_async()
            .await;

        let service = HttpMattingService::new(
            format!("{}/api/remove", server.url()),
            Duration::from_secs(5),
        )
        .unwrap();
        let out = service.remove_background(b"png".to_vec()).await.unwrap();

        assert_eq!(out, b"cutout");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_transform_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/remove")
            .with_status(500)
            .with_body("model crashed")
            .create_async()
            .await;

        let service = HttpMattingService::new(
            format!("{}/api/remove", server.url()),
            Duration::from_secs(5),
        )
        .unwrap();
        let err = service.remove_background(b"png".to_vec()).await.unwrap_err();

        assert!(matches!(err, PipelineError::Transform(_)));
        assert!(err.to_string().contains("model crashed"));
    }
}
