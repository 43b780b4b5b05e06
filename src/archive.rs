//! Flat zip archives of produced files
//!
//! Entries are stored under their base name only. An existing destination is
//! replaced, never appended to.

use crate::error::{PipelineError, Result};
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

/// Archive written next to batch artifacts
pub const BATCH_ARCHIVE_NAME: &str = "processed_images.zip";

/// Archive written by the link collection flow
pub const COLLECTION_ARCHIVE_NAME: &str = "dropbox_downloaded_images.zip";

/// Archive written for images extracted from a PDF
pub const PDF_ARCHIVE_NAME: &str = "extracted_images.zip";

pub struct Archiver;

impl Archiver {
    /// Archive every file under `source_dir` into `destination`
    ///
    /// Files whose name matches the destination's file name are left out, so
    /// a previous archive in the same directory is never re-included. When two
    /// files share a base name the first in sorted walk order wins.
    ///
    /// # Errors
    /// - `PipelineError::Io` when the source directory cannot be read or the
    ///   destination cannot be created
    /// - `PipelineError::Archive` when the container cannot be written
    pub fn archive_dir(source_dir: &Path, destination: &Path) -> Result<PathBuf> {
        let excluded = destination.file_name().map(|name| name.to_os_string());
        let mut files = Vec::new();

        for entry in WalkDir::new(source_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let kind = e
                    .io_error()
                    .map_or(std::io::ErrorKind::Other, std::io::Error::kind);
                PipelineError::file_io_error(
                    "read source directory",
                    source_dir,
                    &std::io::Error::new(kind, e.to_string()),
                )
            })?;

            if !entry.file_type().is_file() {
                continue;
            }
            if excluded.as_deref() == Some(entry.file_name()) {
                debug!(path = %entry.path().display(), "Skipping previous archive");
                continue;
            }
            files.push(entry.into_path());
        }

        Self::archive_files(&files, destination)
    }

    /// Archive exactly `files` into `destination`
    ///
    /// # Errors
    /// - `PipelineError::Io` when a file cannot be read or the destination cannot be created
    /// - `PipelineError::Archive` when the container cannot be written
    pub fn archive_files(files: &[PathBuf], destination: &Path) -> Result<PathBuf> {
        let parent = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)
            .map_err(|e| PipelineError::file_io_error("create archive directory", &parent, &e))?;

        let mut staged = tempfile::Builder::new()
            .prefix(".archive-")
            .tempfile_in(&parent)
            .map_err(|e| PipelineError::file_io_error("create archive", &parent, &e))?;

        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);

        let mut names = HashSet::new();
        {
            let mut zip = ZipWriter::new(staged.as_file_mut());

            for path in files {
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    warn!(path = %path.display(), "Skipping file without a UTF-8 name");
                    continue;
                };
                if !names.insert(name.to_string()) {
                    warn!(path = %path.display(), "Skipping file with duplicate archive name");
                    continue;
                }

                let mut file = File::open(path)
                    .map_err(|e| PipelineError::file_io_error("open file for archive", path, &e))?;
                zip.start_file(name, options)?;
                std::io::copy(&mut file, &mut zip)
                    .map_err(|e| PipelineError::file_io_error("add file to archive", path, &e))?;
            }

            zip.finish()?;
        }

        staged
            .persist(destination)
            .map_err(|e| PipelineError::file_io_error("finalize archive", destination, &e.error))?;

        info!(
            archive = %destination.display(),
            entries = names.len(),
            "Archive written"
        );
        Ok(destination.to_path_buf())
    }
}
