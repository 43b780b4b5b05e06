//! Per-record image transformer
//!
//! This module provides the `ImageTransformer` that applies a
//! [`TransformOption`] to one decoded image. The batch runner and the link
//! collector both go through it.

use crate::{
    config::{TargetSize, TransformOption},
    error::{PipelineError, Result},
    services::{compositor::Compositor, io::ImageIOService, matting::BackgroundRemover},
};
use image::imageops::FilterType;
use image::DynamicImage;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Applies transform options to decoded images
///
/// Every returned image is opaque three-channel RGB.
#[derive(Clone)]
pub struct ImageTransformer {
    remover: Arc<dyn BackgroundRemover>,
    removal_timeout: Duration,
}

impl ImageTransformer {
    #[must_use]
    pub fn new(remover: Arc<dyn BackgroundRemover>, removal_timeout: Duration) -> Self {
        Self {
            remover,
            removal_timeout,
        }
    }

    /// Apply `option` to `image`
    ///
    /// | option                     | steps                                  |
    /// |----------------------------|----------------------------------------|
    /// | `original`                 | convert to RGB                         |
    /// | `background_remove`        | remove background, flatten onto white  |
    /// | `resize`                   | resize exactly, convert to RGB         |
    /// | `resize_background_remove` | resize, remove background, flatten     |
    ///
    /// Resizing always happens before background removal.
    ///
    /// # Errors
    /// - `PipelineError::Validation` when a resize option has no target size
    /// - `PipelineError::Transform` when background removal fails or times out
    #[instrument(
        skip(self, image, option),
        fields(
            option = %option,
            dimensions = %format!("{}x{}", image.width(), image.height())
        )
    )]
    pub async fn transform(
        &self,
        image: DynamicImage,
        option: TransformOption,
        size: Option<TargetSize>,
    ) -> Result<DynamicImage> {
        let image = if option.requires_dimensions() {
            let size = size.ok_or_else(|| {
                PipelineError::validation(format!(
                    "Width and Height are required for the '{}' option",
                    option
                ))
            })?;
            resize_exact(image, size).await?
        } else {
            image
        };

        if option.removes_background() {
            self.remove_and_flatten(image).await
        } else {
            Ok(DynamicImage::ImageRgb8(image.to_rgb8()))
        }
    }

    async fn remove_and_flatten(&self, image: DynamicImage) -> Result<DynamicImage> {
        let input_info = format!("{}x{}", image.width(), image.height());
        let encoded = run_blocking(move || ImageIOService::encode_png(&image)).await?;

        let removal = self.remover.remove_background(encoded);
        let cutout = tokio::time::timeout(self.removal_timeout, removal)
            .await
            .map_err(|_| {
                PipelineError::transform_stage_error(
                    "background removal",
                    &format!("timed out after {:?}", self.removal_timeout),
                    Some(&input_info),
                )
            })??;

        let flattened = run_blocking(move || {
            let decoded = ImageIOService::decode(&cutout).map_err(|e| {
                PipelineError::transform_stage_error(
                    "background removal",
                    &format!("undecodable cut-out: {}", e),
                    None,
                )
            })?;
            Ok(Compositor::to_opaque(&decoded))
        })
        .await?;

        debug!(input = %input_info, "Background removed");
        Ok(flattened)
    }
}

/// Resize to exactly `size`, ignoring aspect ratio
async fn resize_exact(image: DynamicImage, size: TargetSize) -> Result<DynamicImage> {
    run_blocking(move || {
        Ok(image.resize_exact(size.width, size.height, FilterType::Lanczos3))
    })
    .await
}

/// Run CPU-bound image work off the async executor
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| {
            PipelineError::internal(format!("Image task panicked or was cancelled: {}", e))
        })?
}
