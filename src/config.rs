//! Configuration types for batch pipeline operations

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default JPEG quality for every written artifact
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Default side length used by the collection flow's resize actions
pub const DEFAULT_COLLECTION_SIDE: u32 = 800;

/// Processing mode selecting which pipeline steps run for each record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformOption {
    /// Re-encode as opaque RGB, nothing else
    Original,
    /// Background removal, then flatten onto white
    BackgroundRemove,
    /// Resize to the target size, then re-encode as opaque RGB
    Resize,
    /// Resize first, then background removal and flatten onto white
    ResizeBackgroundRemove,
}

impl TransformOption {
    /// All supported options, in declaration order
    pub const ALL: [Self; 4] = [
        Self::Original,
        Self::BackgroundRemove,
        Self::Resize,
        Self::ResizeBackgroundRemove,
    ];

    /// Whether this option needs a [`TargetSize`]
    #[must_use]
    pub fn requires_dimensions(self) -> bool {
        matches!(self, Self::Resize | Self::ResizeBackgroundRemove)
    }

    /// Whether this option runs the background remover
    #[must_use]
    pub fn removes_background(self) -> bool {
        matches!(self, Self::BackgroundRemove | Self::ResizeBackgroundRemove)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::BackgroundRemove => "background_remove",
            Self::Resize => "resize",
            Self::ResizeBackgroundRemove => "resize_background_remove",
        }
    }
}

impl Default for TransformOption {
    fn default() -> Self {
        Self::Original
    }
}

impl std::fmt::Display for TransformOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransformOption {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|option| option.as_str() == s.trim())
            .ok_or_else(|| PipelineError::UnsupportedOption(s.to_string()))
    }
}

/// Target pixel dimensions for the resize options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

impl TargetSize {
    /// Create a target size, rejecting zero dimensions
    ///
    /// # Errors
    /// - `PipelineError::Validation` if either dimension is zero
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let size = Self { width, height };
        size.validate()?;
        Ok(size)
    }

    /// Build a target size from optional form-style inputs
    ///
    /// Returns `Ok(None)` when both dimensions are absent.
    ///
    /// # Errors
    /// - `PipelineError::Validation` when only one dimension is given or one is zero
    pub fn from_parts(width: Option<u32>, height: Option<u32>) -> Result<Option<Self>> {
        match (width, height) {
            (None, None) => Ok(None),
            (Some(width), Some(height)) => Self::new(width, height).map(Some),
            _ => Err(PipelineError::validation(
                "Width and Height are required for resizing",
            )),
        }
    }

    /// Validate that both dimensions are positive
    ///
    /// # Errors
    /// - `PipelineError::Validation` if either dimension is zero
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PipelineError::validation(format!(
                "Target size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for TargetSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Check an option/size pair before any record is touched
///
/// # Errors
/// - `PipelineError::Validation` when the option needs dimensions and none were given,
///   or the given dimensions are not positive
pub fn validate_transform_request(option: TransformOption, size: Option<TargetSize>) -> Result<()> {
    match size {
        Some(size) => size.validate(),
        None if option.requires_dimensions() => Err(PipelineError::validation(format!(
            "Width and Height are required for the '{}' option",
            option
        ))),
        None => Ok(()),
    }
}

/// Configuration shared by the batch, collection and archive components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory receiving one artifact per processed record
    pub output_dir: PathBuf,

    /// Scratch directory for streamed downloads and the collection flow
    pub temp_dir: PathBuf,

    /// JPEG quality for written artifacts (1-100)
    pub jpeg_quality: u8,

    /// Per-request timeout for image retrieval
    #[serde(with = "duration_secs")]
    pub fetch_timeout: Duration,

    /// Per-image timeout for the background removal capability
    #[serde(with = "duration_secs")]
    pub removal_timeout: Duration,

    /// Maximum number of records processed concurrently
    pub concurrency: usize,

    /// User agent sent with image requests
    pub user_agent: String,

    /// Endpoint of the remote matting service
    pub matting_endpoint: String,

    /// Fixed size used by the collection flow's resize actions
    pub collection_size: TargetSize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("processed"),
            temp_dir: PathBuf::from("dropbox_temp"),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            fetch_timeout: Duration::from_secs(30),
            removal_timeout: Duration::from_secs(120),
            concurrency: 4,
            user_agent: format!("bgremove-batch/{}", env!("CARGO_PKG_VERSION")),
            matting_endpoint: "http://127.0.0.1:7000/api/remove".to_string(),
            collection_size: TargetSize {
                width: DEFAULT_COLLECTION_SIDE,
                height: DEFAULT_COLLECTION_SIDE,
            },
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }

    /// Load a configuration from a JSON file; absent fields take defaults
    ///
    /// # Errors
    /// - File read errors
    /// - Malformed JSON
    /// - Values rejected by [`PipelineConfig::validate`]
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            PipelineError::validation(format!("Invalid config file '{}': {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    /// - JPEG quality outside 1-100
    /// - Zero concurrency
    /// - Zero collection size
    /// - Empty matting endpoint
    pub fn validate(&self) -> Result<()> {
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(PipelineError::validation(format!(
                "JPEG quality must be 1-100, got {}",
                self.jpeg_quality
            )));
        }
        if self.concurrency == 0 {
            return Err(PipelineError::validation("Concurrency must be at least 1"));
        }
        self.collection_size.validate()?;
        if self.matting_endpoint.trim().is_empty() {
            return Err(PipelineError::validation("Matting endpoint must not be empty"));
        }
        Ok(())
    }
}

/// Builder for `PipelineConfig`
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    #[must_use]
    pub fn output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    #[must_use]
    pub fn temp_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.temp_dir = dir.into();
        self
    }

    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(1, 100);
        self
    }

    #[must_use]
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetch_timeout = timeout;
        self
    }

    #[must_use]
    pub fn removal_timeout(mut self, timeout: Duration) -> Self {
        self.config.removal_timeout = timeout;
        self
    }

    #[must_use]
    pub fn concurrency(mut self, workers: usize) -> Self {
        self.config.concurrency = workers;
        self
    }

    #[must_use]
    pub fn user_agent<S: Into<String>>(mut self, agent: S) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    #[must_use]
    pub fn matting_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.config.matting_endpoint = endpoint.into();
        self
    }

    #[must_use]
    pub fn collection_size(mut self, size: TargetSize) -> Self {
        self.config.collection_size = size;
        self
    }

    /// Build the pipeline configuration
    ///
    /// # Errors
    /// - Values rejected by [`PipelineConfig::validate`]
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for PipelineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
