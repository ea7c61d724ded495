//! CSV loader for replay mode.
//!
//! The file must start with a header row that names at least
//! [`CHANNEL_COUNT`] columns. Data rows may be shorter; missing and empty
//! cells read as zero. Further columns are ignored.

use std::path::Path;

use csv::{ReaderBuilder, Trim};
use tracing::{debug, info};

use eeg_core::{CHANNEL_COUNT, EegError, ReplayTable};

/// Empty cells read as zero, like missing ones.
fn parse_cell(cell: &str) -> Option<f64> {
    if cell.is_empty() {
        return Some(0.0);
    }
    cell.parse().ok()
}

fn table_error(path: &Path, msg: impl std::fmt::Display) -> EegError {
    EegError::Table(format!("{}: {msg}", path.display()))
}

/// Load a replay table from `path`.
pub fn load_csv(path: &Path) -> Result<ReplayTable, EegError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)
        .map_err(|e| table_error(path, e))?;

    let columns = reader.headers().map_err(|e| table_error(path, e))?.len();
    if columns < CHANNEL_COUNT {
        return Err(table_error(
            path,
            format!("need at least {CHANNEL_COUNT} channel columns, found {columns}"),
        ));
    }

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| table_error(path, e))?;
        // Line 1 is the header.
        let line = i + 2;
        let mut row = [0.0; CHANNEL_COUNT];
        for (col, (dst, cell)) in row.iter_mut().zip(record.iter()).enumerate() {
            *dst = parse_cell(cell).ok_or_else(|| {
                table_error(path, format!("line {line}, column {}: '{cell}' is not numeric", col + 1))
            })?;
        }
        if record.len() < CHANNEL_COUNT {
            debug!("line {line} has {} columns, padding with zeros", record.len());
        }
        rows.push(row);
    }

    let table = ReplayTable::from_rows(rows).map_err(|e| table_error(path, e))?;
    info!("loaded {} replay rows from {}", table.len(), path.display());
    Ok(table)
}

// ── Tests ────────────────────────────────────────────────────────
