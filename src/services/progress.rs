//! Progress reporting service
//!
//! This module separates progress reporting concerns from business logic,
//! allowing different frontends to implement their own progress handling.

use crate::types::{BatchReport, RecordOutcome};
use tracing::{debug, error, info, warn};

/// Stages a single record moves through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Retrieving the source image
    Fetching,
    /// Resizing and background removal
    Transforming,
    /// Encoding the artifact and placing it in the output directory
    Writing,
    /// Packaging files into an archive
    Archiving,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::Fetching => "Fetching image",
            ProcessingStage::Transforming => "Transforming image",
            ProcessingStage::Writing => "Writing artifact",
            ProcessingStage::Archiving => "Creating archive",
        }
    }
}

/// Running counters for a batch in flight
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchProcessingStats {
    /// Number of records with a final outcome
    pub items_completed: usize,
    /// Total number of records in the batch
    pub items_total: usize,
    /// Records that produced an artifact
    pub items_written: usize,
    /// Records skipped as ineligible
    pub items_skipped: usize,
    /// Records attempted without producing an artifact
    pub items_failed: usize,
}

impl BatchProcessingStats {
    #[must_use]
    pub fn new(items_total: usize) -> Self {
        Self {
            items_total,
            ..Self::default()
        }
    }

    /// Fold one outcome into the counters
    pub fn record(&mut self, outcome: &RecordOutcome) {
        self.items_completed += 1;
        match outcome {
            RecordOutcome::Written { .. } => self.items_written += 1,
            RecordOutcome::Skipped(_) => self.items_skipped += 1,
            RecordOutcome::Failed(_) => self.items_failed += 1,
        }
    }

    /// Completion percentage (0-100)
    #[must_use]
    pub fn percentage(&self) -> u8 {
        if self.items_total == 0 {
            return 100;
        }
        ((self.items_completed.min(self.items_total) * 100) / self.items_total) as u8
    }
}

/// Trait for reporting progress during batch operations
///
/// Outcomes arrive in completion order, which may differ from input order
/// when records run concurrently.
pub trait ProgressReporter: Send + Sync {
    /// Called once before any record is attempted
    fn report_batch_start(&self, total: usize);

    /// Called when a record enters a new stage
    fn report_stage(&self, index: usize, stage: ProcessingStage) {
        let _ = (index, stage);
    }

    /// Called once per record when its outcome is known
    fn report_record(&self, outcome: &RecordOutcome);

    /// Called once with the final report
    fn report_batch_complete(&self, report: &BatchReport);

    /// Report a failure that is not tied to a single record
    fn report_error(&self, stage: ProcessingStage, error: &str) {
        let _ = (stage, error);
    }
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_batch_start(&self, _total: usize) {}

    fn report_record(&self, _outcome: &RecordOutcome) {}

    fn report_batch_complete(&self, _report: &BatchReport) {}
}

/// Progress reporter that emits structured tracing events
pub struct TracingProgressReporter {
    verbose: bool,
}

impl TracingProgressReporter {
    /// Create a new tracing progress reporter
    ///
    /// # Arguments
    /// * `verbose` - Whether to log every written record, not only problems
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for TracingProgressReporter {
    fn report_batch_start(&self, total: usize) {
        info!(records = total, "Batch started");
    }

    fn report_stage(&self, index: usize, stage: ProcessingStage) {
        if self.verbose {
            debug!(index, stage = stage.description(), "Record stage");
        }
    }

    fn report_record(&self, outcome: &RecordOutcome) {
        match outcome {
            RecordOutcome::Written { index, path } => {
                if self.verbose {
                    info!(index, path = %path.display(), "Artifact written");
                }
            },
            RecordOutcome::Skipped(skipped) => {
                warn!(
                    index = skipped.index,
                    name = %skipped.output_name,
                    reason = %skipped.reason,
                    "Record skipped"
                );
            },
            RecordOutcome::Failed(failed) => {
                warn!(
                    index = failed.index,
                    name = %failed.output_name,
                    error = %failed.error,
                    "Record failed"
                );
            },
        }
    }

    fn report_batch_complete(&self, report: &BatchReport) {
        info!(
            written = report.written_count(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            elapsed_ms = report.elapsed_ms(),
            "Batch completed"
        );
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        error!(stage = stage.description(), error, "Batch error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FailedRecord, SkipReason, SkippedRecord};
    use std::path::PathBuf;

    #[test]
    fn test_stage_descriptions() {
        assert_eq!(ProcessingStage::Fetching.description(), "Fetching image");
        assert_eq!(ProcessingStage::Archiving.description(), "Creating archive");
    }

    #[test]
    fn test_stats_accumulate_outcomes() {
        let mut stats = BatchProcessingStats::new(4);
        assert_eq!(stats.percentage(), 0);

        stats.record(&RecordOutcome::Written {
            index: 0,
            path: PathBuf::from("a.jpg"),
        });
        stats.record(&RecordOutcome::Skipped(SkippedRecord {
            index: 1,
            output_name: "b".to_string(),
            reason: SkipReason::InvalidLocator,
        }));
        stats.record(&RecordOutcome::Failed(FailedRecord {
            index: 2,
            output_name: "c".to_string(),
            error: "HTTP 500".to_string(),
        }));

        assert_eq!(stats.items_completed, 3);
        assert_eq!(stats.items_written, 1);
        assert_eq!(stats.items_skipped, 1);
        assert_eq!(stats.items_failed, 1);
        assert_eq!(stats.percentage(), 75);
    }

    #[test]
    fn test_empty_batch_is_complete() {
        assert_eq!(BatchProcessingStats::new(0).percentage(), 100);
    }
}
