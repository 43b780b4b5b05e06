//! Core types for batch pipeline operations

use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One input row: where to fetch the image and what to name the result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub source_locator: String,
    pub output_name: String,
}

impl Record {
    #[must_use]
    pub fn new<L: Into<String>, N: Into<String>>(source_locator: L, output_name: N) -> Self {
        Self {
            source_locator: source_locator.into(),
            output_name: output_name.into(),
        }
    }
}

/// Pixel layout of a decoded image as far as the pipeline cares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorMode {
    /// Opaque three-channel RGB
    Rgb,
    /// RGB with an alpha channel
    Rgba,
}

impl ColorMode {
    /// Classify a decoded image
    #[must_use]
    pub fn of(image: &DynamicImage) -> Self {
        if image.color().has_alpha() {
            Self::Rgba
        } else {
            Self::Rgb
        }
    }
}

/// Why a record was not attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingLocator,
    MissingName,
    InvalidLocator,
    InvalidOutputName,
    DuplicateOutputName,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::MissingLocator => "missing image link",
            Self::MissingName => "missing image name",
            Self::InvalidLocator => "invalid image link",
            Self::InvalidOutputName => "image name is not a plain file name",
            Self::DuplicateOutputName => "image name already used by an earlier row",
        };
        f.write_str(text)
    }
}

/// A record that was ineligible for processing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecord {
    /// Zero-based position in the input
    pub index: usize,
    pub output_name: String,
    pub reason: SkipReason,
}

/// A record that was attempted but produced no artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRecord {
    /// Zero-based position in the input
    pub index: usize,
    pub output_name: String,
    pub error: String,
}

/// Result of processing a single record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Written { index: usize, path: PathBuf },
    Skipped(SkippedRecord),
    Failed(FailedRecord),
}

/// Accumulated result of a batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Artifacts written, in input order
    pub written: Vec<PathBuf>,
    pub skipped: Vec<SkippedRecord>,
    pub failed: Vec<FailedRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    /// Fold per-record outcomes into a report ordered by input position
    #[must_use]
    pub fn from_outcomes(mut outcomes: Vec<RecordOutcome>, started_at: DateTime<Utc>) -> Self {
        outcomes.sort_by_key(RecordOutcome::index);

        let mut report = Self {
            written: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            started_at,
            finished_at: Utc::now(),
        };

        for outcome in outcomes {
            match outcome {
                RecordOutcome::Written { path, .. } => report.written.push(path),
                RecordOutcome::Skipped(skipped) => report.skipped.push(skipped),
                RecordOutcome::Failed(failed) => report.failed.push(failed),
            }
        }

        report
    }

    /// Number of artifacts written
    #[must_use]
    pub fn written_count(&self) -> usize {
        self.written.len()
    }

    /// Number of records considered
    #[must_use]
    pub fn total(&self) -> usize {
        self.written.len() + self.skipped.len() + self.failed.len()
    }

    /// Wall-clock duration of the run in milliseconds
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

impl RecordOutcome {
    /// Zero-based input position of the record this outcome belongs to
    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            Self::Written { index, .. } => *index,
            Self::Skipped(skipped) => skipped.index,
            Self::Failed(failed) => failed.index,
        }
    }
}

/// Result of extracting embedded images from a PDF
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionReport {
    /// Files written, in page then image order
    pub extracted: Vec<PathBuf>,
    /// Descriptions of embedded images that could not be extracted
    pub skipped: Vec<String>,
}

impl ExtractionReport {
    #[must_use]
    pub fn extracted_count(&self) -> usize {
        self.extracted.len()
    }
}

/// Result of the link collection flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionReport {
    /// Normalized files that were packaged
    pub files: Vec<PathBuf>,
    pub skipped: Vec<SkippedRecord>,
    pub failed: Vec<FailedRecord>,
    /// Archive containing exactly `files`
    pub archive: PathBuf,
}
