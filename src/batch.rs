//! Batch runner
//!
//! Drives every record of a batch through fetch, transform and write. A run
//! only fails as a whole when its inputs are rejected before the first record
//! is touched; everything that goes wrong for an individual record is logged
//! and accumulated in the [`BatchReport`].

use crate::{
    archive::{Archiver, BATCH_ARCHIVE_NAME},
    config::{validate_transform_request, PipelineConfig, TargetSize, TransformOption},
    error::{PipelineError, Result},
    processor::{run_blocking, ImageTransformer},
    services::{
        fetch::{is_valid_url, HttpFetcher, ImageFetcher},
        io::ImageIOService,
        matting::{BackgroundRemover, HttpMattingService},
        progress::{NoOpProgressReporter, ProcessingStage, ProgressReporter},
    },
    types::{BatchReport, FailedRecord, Record, RecordOutcome, SkipReason, SkippedRecord},
};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// An eligible record with trimmed fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlannedRecord {
    pub index: usize,
    pub locator: String,
    pub name: String,
}

/// Split records into eligible work and skips, preserving input order
///
/// The first eligible occurrence of an output name wins; later records with
/// the same name are skipped.
pub(crate) fn plan_records(records: &[Record]) -> (Vec<PlannedRecord>, Vec<SkippedRecord>) {
    let mut planned = Vec::new();
    let mut skipped = Vec::new();
    let mut seen_names = HashSet::new();

    for (index, record) in records.iter().enumerate() {
        let locator = record.source_locator.trim();
        let name = record.output_name.trim();

        let reason = if locator.is_empty() {
            Some(SkipReason::MissingLocator)
        } else if name.is_empty() {
            Some(SkipReason::MissingName)
        } else if !is_valid_url(locator) {
            Some(SkipReason::InvalidLocator)
        } else if !ImageIOService::is_plain_file_name(name) {
            Some(SkipReason::InvalidOutputName)
        } else if !seen_names.insert(name.to_string()) {
            Some(SkipReason::DuplicateOutputName)
        } else {
            None
        };

        match reason {
            Some(reason) => skipped.push(SkippedRecord {
                index,
                output_name: name.to_string(),
                reason,
            }),
            None => planned.push(PlannedRecord {
                index,
                locator: locator.to_string(),
                name: name.to_string(),
            }),
        }
    }

    (planned, skipped)
}

/// Turn a per-record error into a reported failure
pub(crate) fn record_failure(planned: &PlannedRecord, err: &PipelineError) -> FailedRecord {
    if err.is_per_record() {
        warn!(index = planned.index, name = %planned.name, error = %err, "Record failed");
    } else {
        error!(index = planned.index, name = %planned.name, error = %err, "Record failed");
    }

    FailedRecord {
        index: planned.index,
        output_name: planned.name.clone(),
        error: err.to_string(),
    }
}

/// Runs batches of records against a fetcher and a background remover
pub struct BatchRunner {
    config: PipelineConfig,
    fetcher: Arc<dyn ImageFetcher>,
    transformer: ImageTransformer,
    progress: Arc<dyn ProgressReporter>,
}

impl BatchRunner {
    /// Create a runner using the HTTP fetcher and the configured matting service
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

    /// Create a runner with explicit service implementations
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
            progress: Arc::new(NoOpProgressReporter),
        }
    }

    /// Replace the progress reporter
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process every record, writing `<output_name>.jpg` files into the output directory
    ///
    /// # Errors
    /// - `PipelineError::Validation` when `option` needs a size and none was given,
    ///   or the size is not positive; nothing is fetched in that case
    /// - `PipelineError::Io` when the output directory cannot be created
    #[instrument(skip(self, records, option), fields(records = records.len(), option = %option))]
    pub async fn run(
        &self,
        records: &[Record],
        option: TransformOption,
        size: Option<TargetSize>,
    ) -> Result<BatchReport> {
        validate_transform_request(option, size)?;

        let output_dir = &self.config.output_dir;
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| PipelineError::file_io_error("create output directory", output_dir, &e))?;

        let started_at = Utc::now();
        self.progress.report_batch_start(records.len());

        let (planned, skipped) = plan_records(records);
        let mut outcomes: Vec<RecordOutcome> = Vec::with_capacity(records.len());
        for skip in skipped {
            warn!(
                index = skip.index,
                name = %skip.output_name,
                reason = %skip.reason,
                "Skipping record"
            );
            let outcome = RecordOutcome::Skipped(skip);
            self.progress.report_record(&outcome);
            outcomes.push(outcome);
        }

        let processed: Vec<RecordOutcome> = stream::iter(planned.iter())
            .map(|record| self.process_record(record, option, size))
            .buffer_unordered(self.config.concurrency)
            .inspect(|outcome| self.progress.report_record(outcome))
            .collect()
            .await;
        outcomes.extend(processed);

        let report = BatchReport::from_outcomes(outcomes, started_at);
        info!(
            written = report.written_count(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Batch finished"
        );
        self.progress.report_batch_complete(&report);
        Ok(report)
    }

    /// Run the batch, then archive the output directory to `processed_images.zip`
    ///
    /// The archive is produced even when no record succeeded.
    ///
    /// # Errors
    /// - Errors surfaced by [`BatchRunner::run`]
    /// - `PipelineError::Io` / `PipelineError::Archive` when the archive cannot be written
    pub async fn run_and_archive(
        &self,
        records: &[Record],
        option: TransformOption,
        size: Option<TargetSize>,
    ) -> Result<(BatchReport, PathBuf)> {
        let report = self.run(records, option, size).await?;

        let source = self.config.output_dir.clone();
        let destination = source.join(BATCH_ARCHIVE_NAME);
        let archive = run_blocking(move || Archiver::archive_dir(&source, &destination))
            .await
            .map_err(|e| {
                self.progress
                    .report_error(ProcessingStage::Archiving, &e.to_string());
                e
            })?;

        Ok((report, archive))
    }

    async fn process_record(
        &self,
        record: &PlannedRecord,
        option: TransformOption,
        size: Option<TargetSize>,
    ) -> RecordOutcome {
        match self.produce_artifact(record, option, size).await {
            Ok(path) => RecordOutcome::Written {
                index: record.index,
                path,
            },
            Err(e) => RecordOutcome::Failed(record_failure(record, &e)),
        }
    }

    #[instrument(skip(self, record, size), fields(index = record.index, name = %record.name))]
    async fn produce_artifact(
        &self,
        record: &PlannedRecord,
        option: TransformOption,
        size: Option<TargetSize>,
    ) -> Result<PathBuf> {
        self.progress.report_stage(record.index, ProcessingStage::Fetching);
        let image = self.fetcher.fetch_image(&record.locator).await?;

        self.progress.report_stage(record.index, ProcessingStage::Transforming);
        let image = self.transformer.transform(image, option, size).await?;

        self.progress.report_stage(record.index, ProcessingStage::Writing);
        let output_dir = self.config.output_dir.clone();
        let file_name = ImageIOService::artifact_file_name(&record.name);
        let quality = self.config.jpeg_quality;
        run_blocking(move || {
            let bytes = ImageIOService::encode_jpeg(&image, quality)?;
            ImageIOService::write_atomic(&output_dir, &file_name, &bytes)
        })
        .await
    }
}
