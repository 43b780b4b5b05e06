#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Batch Background Removal Pipeline
//!
//! Fetches the images listed in a record table, applies one of a fixed set of
//! transformations (pass-through, background removal, resize, or resize
//! followed by background removal), writes opaque JPEG artifacts and packages
//! them into a ZIP archive. A companion flow extracts embedded raster images
//! from PDF documents.
//!
//! ## Features
//!
//! - **Resilient batches**: a record that cannot be fetched or transformed is
//!   logged and reported, never fatal to the run
//! - **Pluggable matting**: background removal sits behind the
//!   [`BackgroundRemover`] trait; [`HttpMattingService`] talks to a remote service
//! - **White compositing**: cut-outs are flattened onto white for JPEG output
//! - **Bounded concurrency**: records are processed by a configurable number of workers
//! - **Archives**: flat ZIP containers that never include themselves
//! - **PDF extraction**: embedded JPEG and Flate images via `lopdf`
//! - **CLI Integration**: optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgremove_batch::{run_batch, PipelineConfig, Record, TargetSize, TransformOption};
//!
//! # async fn example() -> bgremove_batch::Result<()> {
//! let config = PipelineConfig::builder()
//!     .output_dir("processed")
//!     .concurrency(8)
//!     .build()?;
//!
//! let records = vec![Record::new("https://example.com/shoe.png", "shoe")];
//! let written = run_batch(
//!     &records,
//!     TransformOption::ResizeBackgroundRemove,
//!     Some(TargetSize::new(800, 800)?),
//!     &config,
//! )
//! .await?;
//! println!("{written} artifacts written");
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): command-line interface and progress bars
//! - `tracing-json`: JSON log output for the CLI

pub mod archive;
pub mod batch;
#[cfg(feature = "cli")]
pub mod cli;
pub mod collect;
pub mod config;
pub mod error;
pub mod pdf;
pub mod processor;
pub mod services;
pub mod table;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;

use std::path::{Path, PathBuf};

// Public API exports
pub use archive::{Archiver, BATCH_ARCHIVE_NAME, COLLECTION_ARCHIVE_NAME, PDF_ARCHIVE_NAME};
pub use batch::BatchRunner;
pub use collect::{rewrite_share_link, CollectionAction, LinkCollector};
pub use config::{
    validate_transform_request, PipelineConfig, PipelineConfigBuilder, TargetSize, TransformOption,
};
pub use error::{PipelineError, Result};
pub use pdf::PdfImageExtractor;
pub use processor::ImageTransformer;
pub use services::{
    flatten_onto_white, is_valid_url, BackgroundRemover, HttpFetcher, HttpMattingService,
    ImageFetcher, ImageIOService, NoOpProgressReporter, ProgressReporter, TracingProgressReporter,
};
pub use table::{read_records, read_records_from_path, LINK_COLUMN, NAME_COLUMN};
pub use types::{
    BatchReport, CollectionReport, ColorMode, ExtractionReport, FailedRecord, Record,
    RecordOutcome, SkipReason, SkippedRecord,
};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, init_library_tracing, TracingConfig, TracingFormat};

/// Process a batch of records and return the number of artifacts written
///
/// Artifacts are written as `<output_name>.jpg` into `config.output_dir`.
/// Records that are ineligible, cannot be fetched or fail to transform are
/// logged and do not count; they never fail the call.
///
/// # Errors
/// - `PipelineError::Validation` when `option` needs a size and none was given
/// - `PipelineError::Io` when the output directory cannot be created
///
/// # Examples
/// ```rust,no_run
/// use bgremove_batch::{run_batch, PipelineConfig, Record, TransformOption};
///
/// # async fn example() -> bgremove_batch::Result<()> {
/// let records = vec![
///     Record::new("https://x/a.png", "a"),
///     Record::new("not-a-url", "b"),
/// ];
/// let config = PipelineConfig::default();
/// let written = run_batch(&records, TransformOption::Original, None, &config).await?;
/// assert!(written <= 1);
/// # Ok(())
/// # }
/// ```
pub async fn run_batch(
    records: &[Record],
    option: TransformOption,
    size: Option<TargetSize>,
    config: &PipelineConfig,
) -> Result<usize> {
    let runner = BatchRunner::new(config.clone())?;
    let report = runner.run(records, option, size).await?;
    Ok(report.written_count())
}

/// Read a record table and process it
///
/// # Errors
/// - `PipelineError::Validation` when the table lacks the required columns or
///   `option` needs a size and none was given
/// - `PipelineError::Io` when the table cannot be read or the output directory created
pub async fn run_batch_from_csv<P: AsRef<Path>>(
    table: P,
    option: TransformOption,
    size: Option<TargetSize>,
    config: &PipelineConfig,
) -> Result<BatchReport> {
    let records = read_records_from_path(table)?;
    BatchRunner::new(config.clone())?
        .run(&records, option, size)
        .await
}

/// Process a batch and archive the output directory to `processed_images.zip`
///
/// # Errors
/// - Errors surfaced by [`run_batch`]
/// - `PipelineError::Io` / `PipelineError::Archive` when the archive cannot be written
pub async fn run_batch_and_archive(
    records: &[Record],
    option: TransformOption,
    size: Option<TargetSize>,
    config: &PipelineConfig,
) -> Result<(BatchReport, PathBuf)> {
    BatchRunner::new(config.clone())?
        .run_and_archive(records, option, size)
        .await
}

/// Package every file under `source_dir` into a flat archive at `destination`
///
/// # Errors
/// - `PipelineError::Io` when the source is unreadable or the destination cannot be created
/// - `PipelineError::Archive` when the container cannot be written
pub fn archive<P: AsRef<Path>, Q: AsRef<Path>>(source_dir: P, destination: Q) -> Result<PathBuf> {
    Archiver::archive_dir(source_dir.as_ref(), destination.as_ref())
}

/// Extract embedded images from a PDF and return how many were written
///
/// # Errors
/// - `PipelineError::Format` when the document cannot be parsed
/// - `PipelineError::Io` when the document cannot be read or a file cannot be written
pub fn extract_pdf_images<P: AsRef<Path>, Q: AsRef<Path>>(
    pdf_path: P,
    output_dir: Q,
) -> Result<usize> {
    PdfImageExtractor::extract(pdf_path.as_ref(), output_dir.as_ref())
        .map(|report| report.extracted_count())
}

/// Extract embedded images from a PDF and archive them at `destination`
///
/// Only the files extracted by this call are archived.
///
/// # Errors
/// - Errors surfaced by [`extract_pdf_images`]
/// - `PipelineError::Io` / `PipelineError::Archive` when the archive cannot be written
pub fn extract_pdf_images_and_archive<P, Q, R>(
    pdf_path: P,
    output_dir: Q,
    destination: R,
) -> Result<(ExtractionReport, PathBuf)>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    R: AsRef<Path>,
{
    let report = PdfImageExtractor::extract(pdf_path.as_ref(), output_dir.as_ref())?;
    let archive = Archiver::archive_files(&report.extracted, destination.as_ref())?;
    Ok((report, archive))
}

/// Download linked images, apply `action` and archive the results
///
/// # Errors
/// - `PipelineError::Io` when the scratch directory or archive cannot be written
pub async fn collect_links(
    records: &[Record],
    action: CollectionAction,
    config: &PipelineConfig,
) -> Result<CollectionReport> {
    LinkCollector::new(config.clone())?
        .collect(records, action)
        .await
}
