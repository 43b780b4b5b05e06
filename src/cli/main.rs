//! Batch Background Removal CLI Tool
//!
//! Command-line interface for the batch, collection, archive and PDF flows.

use super::config::CliConfigBuilder;
use crate::{
    archive::{Archiver, PDF_ARCHIVE_NAME},
    batch::BatchRunner,
    collect::{CollectionAction, LinkCollector},
    config::TransformOption,
    pdf::PdfImageExtractor,
    services::progress::{BatchProcessingStats, ProgressReporter},
    table::read_records_from_path,
    tracing_config::{init_cli_tracing, spans},
    types::{BatchReport, RecordOutcome},
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, warn, Instrument};

/// Batch background removal tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremove-batch")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// JSON configuration file; flags override its values
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Maximum number of records processed concurrently
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    /// Endpoint of the remote matting service
    #[arg(long, value_name = "URL", global = true)]
    pub matting_endpoint: Option<String>,

    /// Print the final report as JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Process every row of a record table
    Batch {
        /// CSV file with "Image link" and "Image Name" columns
        #[arg(value_name = "CSV")]
        table: PathBuf,

        /// original, background_remove, resize or resize_background_remove
        #[arg(long, default_value = "original")]
        option: TransformOption,

        /// Target width for the resize options
        #[arg(long)]
        width: Option<u32>,

        /// Target height for the resize options
        #[arg(long)]
        height: Option<u32>,

        /// Directory receiving the artifacts
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Archive the output directory when the batch finishes
        #[arg(long)]
        archive: bool,
    },

    /// Download linked images into a single archive
    Collect {
        /// CSV file with "Image link" and "Image Name" columns
        #[arg(value_name = "CSV")]
        table: PathBuf,

        /// download, resize, remove_bg or resize_remove_bg
        #[arg(long, default_value = "download")]
        action: CollectionAction,
    },

    /// Package a directory into a flat ZIP archive
    Archive {
        #[arg(value_name = "SOURCE_DIR")]
        source: PathBuf,

        #[arg(value_name = "DEST")]
        destination: PathBuf,
    },

    /// Extract embedded images from a PDF document
    PdfImages {
        #[arg(value_name = "PDF")]
        pdf: PathBuf,

        /// Directory receiving the extracted images
        #[arg(short, long, value_name = "DIR", default_value = "extracted_images")]
        output_dir: PathBuf,

        /// Archive the extracted images to DEST
        #[arg(
            long,
            value_name = "DEST",
            num_args = 0..=1,
            default_missing_value = PDF_ARCHIVE_NAME
        )]
        archive: Option<PathBuf>,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Batch { .. } => "batch",
            Self::Collect { .. } => "collect",
            Self::Archive { .. } => "archive",
            Self::PdfImages { .. } => "pdf-images",
        }
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let session_id = init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;

    let start_time = Instant::now();
    dispatch(&cli)
        .instrument(spans::session(&session_id, cli.command.name()))
        .await?;

    info!(
        "Finished '{}' in {:.2}s",
        cli.command.name(),
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

async fn dispatch(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Batch {
            table,
            option,
            width,
            height,
            output_dir,
            archive,
        } => {
            let size = CliConfigBuilder::target_size(*width, *height)?;
            run_batch_command(cli, table, *option, size, output_dir.as_deref(), *archive).await?;
        },
        Command::Collect { table, action } => {
            run_collect_command(cli, table, *action).await?;
        },
        Command::Archive {
            source,
            destination,
        } => {
            let archive = Archiver::archive_dir(source, destination)
                .with_context(|| format!("Failed to archive {}", source.display()))?;
            println!("{}", archive.display());
        },
        Command::PdfImages {
            pdf,
            output_dir,
            archive,
        } => {
            run_pdf_command(cli, pdf, output_dir, archive.as_deref())?;
        },
    }
    Ok(())
}

async fn run_batch_command(
    cli: &Cli,
    table: &Path,
    option: TransformOption,
    size: Option<crate::config::TargetSize>,
    output_dir: Option<&Path>,
    archive: bool,
) -> Result<()> {
    let config = CliConfigBuilder::from_cli(cli, output_dir)?;
    let records = read_records_from_path(table)
        .with_context(|| format!("Failed to read record table {}", table.display()))?;

    let span = spans::batch_processing(table, records.len());
    let progress = Arc::new(IndicatifProgressReporter::new(cli.json));
    let runner = BatchRunner::new(config)
        .context("Failed to create batch runner")?
        .with_progress(progress);

    let (report, archive_path) = if archive {
        let (report, path) = runner
            .run_and_archive(&records, option, size)
            .instrument(span)
            .await
            .context("Batch failed")?;
        (report, Some(path))
    } else {
        let report = runner
            .run(&records, option, size)
            .instrument(span)
            .await
            .context("Batch failed")?;
        (report, None)
    };

    if cli.json {
        print_json(&BatchOutput {
            report: &report,
            archive: archive_path.as_deref(),
        })?;
    } else {
        println!(
            "{} written, {} skipped, {} failed",
            report.written_count(),
            report.skipped.len(),
            report.failed.len()
        );
        if let Some(path) = archive_path {
            println!("Archive: {}", path.display());
        }
    }
    Ok(())
}

async fn run_collect_command(cli: &Cli, table: &Path, action: CollectionAction) -> Result<()> {
    let config = CliConfigBuilder::from_cli(cli, None)?;
    let records = read_records_from_path(table)
        .with_context(|| format!("Failed to read record table {}", table.display()))?;

    let collector = LinkCollector::new(config).context("Failed to create link collector")?;
    let report = collector
        .collect(&records, action)
        .await
        .context("Collection failed")?;

    if cli.json {
        print_json(&report)?;
    } else {
        for failed in &report.failed {
            warn!("{}: {}", failed.output_name, failed.error);
        }
        println!("{} collected, archive: {}", report.files.len(), report.archive.display());
    }
    Ok(())
}

fn run_pdf_command(cli: &Cli, pdf: &Path, output_dir: &Path, archive: Option<&Path>) -> Result<()> {
    let report = PdfImageExtractor::extract(pdf, output_dir)
        .with_context(|| format!("Failed to extract images from {}", pdf.display()))?;

    let archive_path = match archive {
        Some(destination) => Some(
            Archiver::archive_files(&report.extracted, destination)
                .with_context(|| format!("Failed to write archive {}", destination.display()))?,
        ),
        None => None,
    };

    if cli.json {
        print_json(&PdfOutput {
            report: &report,
            archive: archive_path.as_deref(),
        })?;
    } else {
        println!(
            "{} image(s) extracted to {}, {} skipped",
            report.extracted_count(),
            output_dir.display(),
            report.skipped.len()
        );
        if let Some(path) = archive_path {
            println!("Archive: {}", path.display());
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct BatchOutput<'a> {
    #[serde(flatten)]
    report: &'a BatchReport,
    archive: Option<&'a Path>,
}

#[derive(Serialize)]
struct PdfOutput<'a> {
    #[serde(flatten)]
    report: &'a crate::types::ExtractionReport,
    archive: Option<&'a Path>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize report")?;
    println!("{json}");
    Ok(())
}

/// Progress bar over the records of a batch
struct IndicatifProgressReporter {
    hidden: bool,
    bar: Mutex<Option<ProgressBar>>,
    stats: Mutex<Option<BatchProcessingStats>>,
}

impl IndicatifProgressReporter {
    fn new(hidden: bool) -> Self {
        Self {
            hidden,
            bar: Mutex::new(None),
            stats: Mutex::new(None),
        }
    }

    fn create_bar(&self, total: usize) -> ProgressBar {
        if self.hidden {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar
    }
}

impl ProgressReporter for IndicatifProgressReporter {
    fn report_batch_start(&self, total: usize) {
        if let Ok(mut bar) = self.bar.lock() {
            *bar = Some(self.create_bar(total));
        }
        if let Ok(mut stats) = self.stats.lock() {
            *stats = Some(BatchProcessingStats::new(total));
        }
    }

    fn report_record(&self, outcome: &RecordOutcome) {
        let summary = match self.stats.lock() {
            Ok(mut stats) => stats.as_mut().map(|stats| {
                stats.record(outcome);
                format!(
                    "{} written, {} skipped, {} failed",
                    stats.items_written, stats.items_skipped, stats.items_failed
                )
            }),
            Err(_) => None,
        };

        if let Ok(bar) = self.bar.lock() {
            if let Some(bar) = bar.as_ref() {
                match outcome {
                    RecordOutcome::Skipped(skipped) => bar.suspend(|| {
                        warn!("Row {} skipped: {}", skipped.index + 1, skipped.reason);
                    }),
                    RecordOutcome::Failed(failed) => bar.suspend(|| {
                        warn!(
                            "Row {} ({}) failed: {}",
                            failed.index + 1,
                            failed.output_name,
                            failed.error
                        );
                    }),
                    RecordOutcome::Written { .. } => {},
                }
                if let Some(summary) = summary {
                    bar.set_message(summary);
                }
                bar.inc(1);
            }
        }
    }

    fn report_batch_complete(&self, report: &BatchReport) {
        if let Ok(mut bar) = self.bar.lock() {
            if let Some(bar) = bar.take() {
                bar.finish_with_message(format!(
                    "{} written in {}ms",
                    report.written_count(),
                    report.elapsed_ms()
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FailedRecord, SkipReason, SkippedRecord};

    #[test]
    fn test_parse_batch_command() {
        let cli = Cli::parse_from([
            "bgremove-batch",
            "-vv",
            "batch",
            "records.csv",
            "--option",
            "resize_background_remove",
            "--width",
            "100",
            "--height",
            "80",
            "--archive",
        ]);

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Batch {
                table,
                option,
                width,
                height,
                output_dir,
                archive,
            } => {
                assert_eq!(table, PathBuf::from("records.csv"));
                assert_eq!(option, TransformOption::ResizeBackgroundRemove);
                assert_eq!((width, height), (Some(100), Some(80)));
                assert!(output_dir.is_none());
                assert!(archive);
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_option_rejected_by_parser() {
        let result =
            Cli::try_parse_from(["bgremove-batch", "batch", "r.csv", "--option", "sharpen"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_collect_and_pdf_commands() {
        let cli = Cli::parse_from([
            "bgremove-batch",
            "collect",
            "r.csv",
            "--action",
            "remove_bg",
            "--json",
        ]);
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Command::Collect {
                action: CollectionAction::RemoveBg,
                ..
            }
        ));

        let cli = Cli::parse_from(["bgremove-batch", "pdf-images", "doc.pdf", "--archive"]);
        match cli.command {
            Command::PdfImages {
                output_dir, archive, ..
            } => {
                assert_eq!(output_dir, PathBuf::from("extracted_images"));
                assert_eq!(archive, Some(PathBuf::from(PDF_ARCHIVE_NAME)));
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_command_names() {
        let cli = Cli::parse_from(["bgremove-batch", "archive", "dir", "out.zip"]);
        assert_eq!(cli.command.name(), "archive");
    }

    #[test]
    fn test_hidden_reporter_tracks_outcomes() {
        let reporter = IndicatifProgressReporter::new(true);
        reporter.report_batch_start(2);
        reporter.report_record(&RecordOutcome::Skipped(SkippedRecord {
            index: 0,
            output_name: "a".to_string(),
            reason: SkipReason::MissingLocator,
        }));
        reporter.report_record(&RecordOutcome::Failed(FailedRecord {
            index: 1,
            output_name: "b".to_string(),
            error: "HTTP 404".to_string(),
        }));

        let stats = reporter.stats.lock().unwrap();
        let stats = stats.as_ref().unwrap();
        assert_eq!(stats.items_skipped, 1);
        assert_eq!(stats.items_failed, 1);
        assert_eq!(stats.percentage(), 100);
    }
}
