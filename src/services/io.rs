//! Image I/O operations service
//!
//! This module separates encoding, decoding and file placement from the
//! pipeline logic, making the system more testable and maintainable.

use crate::error::{PipelineError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Extension of every batch artifact
pub const ARTIFACT_EXTENSION: &str = "jpg";

/// Service for image encoding and artifact file handling
pub struct ImageIOService;

impl ImageIOService {
    /// Decode an image from bytes, guessing the format from content
    ///
    /// # Errors
    /// - `PipelineError::Image` when the bytes are not a supported image
    pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
        Ok(image::load_from_memory(bytes)?)
    }

    /// Decode an image from a file, guessing the format from content
    ///
    /// # Errors
    /// - `PipelineError::Io` when the file cannot be opened
    /// - `PipelineError::Image` when the content is not a supported image
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();
        let reader = image::ImageReader::open(path_ref)
            .map_err(|e| PipelineError::file_io_error("open image file", path_ref, &e))?
            .with_guessed_format()
            .map_err(|e| PipelineError::file_io_error("read image file", path_ref, &e))?;
        Ok(reader.decode()?)
    }

    /// Encode as opaque three-channel JPEG
    ///
    /// Any alpha channel is dropped, so callers wanting a white background
    /// must flatten first.
    ///
    /// # Errors
    /// - `PipelineError::Image` on encoder failure
    pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
        let rgb_image = image.to_rgb8();
        let mut buffer = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
        encoder.encode_image(&rgb_image)?;
        Ok(buffer)
    }

    /// Encode as PNG, preserving any alpha channel
    ///
    /// # Errors
    /// - `PipelineError::Image` on encoder failure
    pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        image.write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)?;
        Ok(buffer)
    }

    /// File name of the artifact produced for an output name
    #[must_use]
    pub fn artifact_file_name(output_name: &str) -> String {
        format!("{}.{}", output_name, ARTIFACT_EXTENSION)
    }

    /// Whether a name can be used as a single path component
    ///
    /// Rejects empty names, `.`/`..`, and anything containing a separator.
    #[must_use]
    pub fn is_plain_file_name(name: &str) -> bool {
        !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\', '\0'])
    }

    /// Write bytes to `dir/file_name` so that the file is either complete or absent
    ///
    /// The data is written to a temporary file in the same directory and then
    /// renamed over the destination, replacing any previous file.
    ///
    /// # Errors
    /// - `PipelineError::Io` when the directory or file cannot be written
    pub fn write_atomic(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .map_err(|e| PipelineError::file_io_error("create output directory", dir, &e))?;

        let destination = dir.join(file_name);
        let mut staged = tempfile::Builder::new()
            .prefix(".partial-")
            .tempfile_in(dir)
            .map_err(|e| PipelineError::file_io_error("create staging file", dir, &e))?;

        staged
            .write_all(bytes)
            .and_then(|()| staged.as_file().sync_all())
            .map_err(|e| PipelineError::file_io_error("write staging file", staged.path(), &e))?;

        staged
            .persist(&destination)
            .map_err(|e| {
                PipelineError::file_io_error("finalize artifact", &destination, &e.error)
            })?;

        Ok(destination)
    }
}
