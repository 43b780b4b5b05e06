//! Error types for batch image pipeline operations

use std::path::Path;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error taxonomy for the batch pipeline
///
/// Only a subset of these are ever surfaced to the caller of a batch run.
/// Per-record failures (`Fetch`, `Transform`, `Image`) are absorbed by the
/// batch runner and recorded in its report; see [`PipelineError::is_per_record`].
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Bad input shape detected before any record was processed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transform option or collection action string outside the supported set
    #[error("Unsupported option '{0}'")]
    UnsupportedOption(String),

    /// Network, transport or response-status failure while retrieving an image
    #[error("Fetch error for '{url}': {reason}")]
    Fetch { url: String, reason: String },

    /// Background removal or resize failure
    #[error("Transform error: {0}")]
    Transform(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Document could not be parsed
    #[error("Format error: {0}")]
    Format(String),

    /// Archive container could not be written
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new fetch error
    pub fn fetch<U: Into<String>, R: std::fmt::Display>(url: U, reason: R) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a new transform error
    pub fn transform<S: Into<String>>(msg: S) -> Self {
        Self::Transform(msg.into())
    }

    /// Create a new format error
    pub fn format<S: Into<String>>(msg: S) -> Self {
        Self::Format(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<Path>>(operation: &str, path: P, error: &std::io::Error) -> Self {
        Self::Io(std::io::Error::new(
            error.kind(),
            format!(
                "Failed to {} '{}': {}",
                operation,
                path.as_ref().display(),
                error
            ),
        ))
    }

    /// Create processing error with stage context
    pub fn transform_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {})", info),
            None => String::new(),
        };

        Self::Transform(format!(
            "Processing failed at stage '{}'{}: {}",
            stage, input_context, details
        ))
    }

    /// Whether the batch runner absorbs this error for a single record
    /// instead of aborting the whole run
    #[must_use]
    pub fn is_per_record(&self) -> bool {
        matches!(
            self,
            Self::Fetch { .. } | Self::Transform(_) | Self::Image(_)
        )
    }
}
