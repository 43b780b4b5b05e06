//! Record table input
//!
//! Reads the uploaded spreadsheet export. Only the link and name columns are
//! used; any other column is ignored. Empty cells are passed through so the
//! batch runner can report them as skipped rows.

use crate::{
    error::{PipelineError, Result},
    types::Record,
};
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Header of the column holding image locators
pub const LINK_COLUMN: &str = "Image link";

/// Header of the column holding output names
pub const NAME_COLUMN: &str = "Image Name";

/// Read records from CSV data with a header row
///
/// # Errors
/// - `PipelineError::Validation` when a required column is absent or the CSV is malformed
pub fn read_records<R: Read>(reader: R) -> Result<Vec<Record>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers = csv_reader
        .byte_headers()
        .map_err(|e| PipelineError::validation(format!("Malformed table header: {}", e)))?
        .iter()
        .map(|field| {
            String::from_utf8_lossy(field)
                .trim_start_matches('\u{feff}')
                .trim()
                .to_string()
        })
        .collect::<Vec<_>>();

    let position = |column: &str| headers.iter().position(|h| h == column);
    let (link_idx, name_idx) = match (position(LINK_COLUMN), position(NAME_COLUMN)) {
        (Some(link), Some(name)) => (link, name),
        (link, name) => {
            let missing: Vec<&str> = [(LINK_COLUMN, link), (NAME_COLUMN, name)]
                .into_iter()
                .filter(|(_, idx)| idx.is_none())
                .map(|(column, _)| column)
                .collect();
            return Err(PipelineError::validation(format!(
                "Missing required column(s): {}",
                missing.join(", ")
            )));
        },
    };

    let mut records = Vec::new();
    for (row, result) in csv_reader.byte_records().enumerate() {
        let record = result.map_err(|e| {
            PipelineError::validation(format!("Malformed table row {}: {}", row + 1, e))
        })?;
        let cell = |idx: usize| {
            record
                .get(idx)
                .map(|value| String::from_utf8_lossy(value).into_owned())
                .unwrap_or_default()
        };
        records.push(Record::new(cell(link_idx), cell(name_idx)));
    }

    debug!(rows = records.len(), "Read record table");
    Ok(records)
}

/// Read records from a CSV file
///
/// # Errors
/// - `PipelineError::Io` when the file cannot be opened
/// - `PipelineError::Validation` when a required column is absent or the CSV is malformed
pub fn read_records_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .map_err(|e| PipelineError::file_io_error("open record table", path, &e))?;
    read_records(std::io::BufReader::new(file))
}
