//! Shared-link collection flow
//!
//! Downloads every linked image into the scratch directory, normalizes it to
//! an opaque JPEG, optionally resizes it and removes its background, and
//! packages exactly the produced files into a single archive.

use crate::{
    archive::{Archiver, COLLECTION_ARCHIVE_NAME},
    batch::{plan_records, record_failure, PlannedRecord},
    config::{PipelineConfig, TransformOption},
    error::{PipelineError, Result},
    processor::{run_blocking, ImageTransformer},
    services::{
        fetch::{HttpFetcher, ImageFetcher},
        io::ImageIOService,
        matting::{BackgroundRemover, HttpMattingService},
    },
    types::CollectionReport,
};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// What to do with each collected image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionAction {
    /// Normalize to JPEG only
    Download,
    /// Resize to the collection size
    Resize,
    /// Remove the background
    RemoveBg,
    /// Resize, then remove the background
    ResizeRemoveBg,
}

impl CollectionAction {
    pub const ALL: [Self; 4] = [Self::Download, Self::Resize, Self::RemoveBg, Self::ResizeRemoveBg];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Resize => "resize",
            Self::RemoveBg => "remove_bg",
            Self::ResizeRemoveBg => "resize_remove_bg",
        }
    }

    /// Equivalent transform option
    #[must_use]
    pub fn transform_option(self) -> TransformOption {
        match self {
            Self::Download => TransformOption::Original,
            Self::Resize => TransformOption::Resize,
            Self::RemoveBg => TransformOption::BackgroundRemove,
            Self::ResizeRemoveBg => TransformOption::ResizeBackgroundRemove,
        }
    }
}

impl std::fmt::Display for CollectionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionAction {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s.trim())
            .ok_or_else(|| PipelineError::UnsupportedOption(s.to_string()))
    }
}

/// Turn a Dropbox share link into a direct download link
///
/// Other links are returned unchanged.
#[must_use]
pub fn rewrite_share_link(url: &str) -> String {
    if url.contains("dropbox.com") {
        url.replace("?dl=0", "?raw=1").replace("?rlkey", "?raw=1&rlkey")
    } else {
        url.to_string()
    }
}

/// Collects linked images into a single archive
pub struct LinkCollector {
    config: PipelineConfig,
    fetcher: Arc<dyn ImageFetcher>,
    transformer: ImageTransformer,
}

impl LinkCollector {
    /// Create a collector using the HTTP fetcher and the configured matting service
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Failed to create HTTP clients
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let fetcher: Arc<dyn ImageFetcher> = Arc::new(HttpFetcher::new(&config)?);
        let remover: Arc<dyn BackgroundRemover> = Arc::new(HttpMattingService::new(
            config.matting_endpoint.clone(),
            config.removal_timeout,
        )?);
        Ok(Self::with_services(config, fetcher, remover))
    }

    #[must_use]
    pub fn with_services(
        config: PipelineConfig,
        fetcher: Arc<dyn ImageFetcher>,
        remover: Arc<dyn BackgroundRemover>,
    ) -> Self {
        let transformer = ImageTransformer::new(remover, config.removal_timeout);
        Self {
            config,
            fetcher,
            transformer,
        }
    }

    /// Collect every eligible record and archive the results
    ///
    /// The archive lands at `<temp_dir>/dropbox_downloaded_images.zip` and
    /// contains exactly the files listed in the report.
    ///
    /// # Errors
    /// - `PipelineError::Io` when the scratch directory cannot be created
    /// - `PipelineError::Io` / `PipelineError::Archive` when the archive cannot be written
    #[instrument(skip(self, records), fields(records = records.len()))]
    pub async fn collect(
        &self,
        records: &[crate::types::Record],
        action: CollectionAction,
    ) -> Result<CollectionReport> {
        let temp_dir = &self.config.temp_dir;
        tokio::fs::create_dir_all(temp_dir)
            .await
            .map_err(|e| PipelineError::file_io_error("create scratch directory", temp_dir, &e))?;

        let (planned, skipped) = plan_records(records);
        for skip in &skipped {
            warn!(
                index = skip.index,
                name = %skip.output_name,
                reason = %skip.reason,
                "Skipping record"
            );
        }

        let mut results: Vec<(usize, Result<PathBuf>)> = stream::iter(planned.iter())
            .map(|record| async move { (record.index, self.collect_one(record, action).await) })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;
        results.sort_by_key(|(index, _)| *index);

        let mut files = Vec::new();
        let mut failed = Vec::new();
        for (planned_record, (_, result)) in planned.iter().zip(results) {
            match result {
                Ok(path) => files.push(path),
                Err(e) => failed.push(record_failure(planned_record, &e)),
            }
        }

        let destination = temp_dir.join(COLLECTION_ARCHIVE_NAME);
        let archived = files.clone();
        let archive = run_blocking(move || Archiver::archive_files(&archived, &destination)).await?;

        info!(
            action = %action,
            collected = files.len(),
            skipped = skipped.len(),
            failed = failed.len(),
            "Collection finished"
        );

        Ok(CollectionReport {
            files,
            skipped,
            failed,
            archive,
        })
    }

    async fn collect_one(
        &self,
        record: &PlannedRecord,
        action: CollectionAction,
    ) -> Result<PathBuf> {
        let url = rewrite_share_link(&record.locator);

        let temp_dir = &self.config.temp_dir;
        let download = tempfile::Builder::new()
            .prefix(".download-")
            .tempfile_in(temp_dir)
            .map_err(|e| PipelineError::file_io_error("create download file", temp_dir, &e))?
            .into_temp_path();
        self.fetcher.fetch_to_file(&url, &download).await?;

        let image = run_blocking(move || {
            let image = ImageIOService::load_image(&download)
                .map_err(|e| PipelineError::fetch(url, format!("undecodable image data: {}", e)));
            drop(download);
            image
        })
        .await?;

        let size = Some(self.config.collection_size);
        let image = self
            .transformer
            .transform(image, action.transform_option(), size)
            .await?;

        let temp_dir = self.config.temp_dir.clone();
        let file_name = ImageIOService::artifact_file_name(&record.name);
        let quality = self.config.jpeg_quality;
        run_blocking(move || {
            let bytes = ImageIOService::encode_jpeg(&image, quality)?;
            ImageIOService::write_atomic(&temp_dir, &file_name, &bytes)
        })
        .await
    }
}
