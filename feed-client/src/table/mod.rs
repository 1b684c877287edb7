//! CSV rendering of the narrow energy table and the wide forecast table.
//!
//! Both tables share one convention: a single header row, UTF-8, RFC 3339 UTC
//! timestamps, and an empty field for a missing value.

pub mod energy_csv;
pub mod wide_csv;

pub use energy_csv::{read_energy_csv, write_energy_csv, ENERGY_COLUMNS};
pub use wide_csv::{write_wide_csv, WIDE_METADATA_COLUMNS};

use time::{format_description::well_known::Rfc3339, OffsetDateTime, UtcOffset};

#[derive(thiserror::Error, Debug)]
pub enum TableError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("missing column '{0}' in CSV header")]
    MissingColumn(String),
    #[error("invalid {column} '{value}': {reason}")]
    InvalidField {
        column: &'static str,
        value: String,
        reason: String,
    },
    #[error("failed to render table: {0}")]
    Render(String),
}

pub fn format_timestamp(ts: OffsetDateTime) -> Result<String, TableError> {
    ts.to_offset(UtcOffset::UTC)
        .format(&Rfc3339)
        .map_err(|e| TableError::Render(format!("timestamp {ts}: {e}")))
}

fn format_optional_f64(v: Option<f64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String, TableError> {
    let bytes = wtr
        .into_inner()
        .map_err(|e| TableError::Render(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| TableError::Render(e.to_string()))
}
