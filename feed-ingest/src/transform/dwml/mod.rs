//! Flattening of NWS digital DWML forecast documents into one wide table.

pub mod assemble;
pub mod series;
pub mod time_layout;

pub use assemble::{assemble_wide_table, display_name, RunContext, DISPLAY_NAMES};
pub use series::{extract_series, extract_weather_flags, LengthPolicy, Series, WeatherFlags};
pub use time_layout::TimeLayoutIndex;

use feed_client::domain::WideTable;

use super::xml::{XmlElement, XmlError};

#[derive(thiserror::Error, Debug)]
pub enum FlattenError {
    #[error("undecodable forecast document: {0}")]
    Xml(#[from] XmlError),
    #[error("no timestamps found in forecast document")]
    NoTimestamps,
}

/// Flatten a raw DWML document.
///
/// Malformed individual layouts, series and values degrade to gaps; only an
/// unparsable document or one without any timestamps is an error.
pub fn flatten_dwml(doc: &[u8], ctx: RunContext, policy: LengthPolicy) -> Result<WideTable, FlattenError> {
    let text = String::from_utf8_lossy(doc);
    let root = XmlElement::parse(&text)?;

    let index = TimeLayoutIndex::from_document(&root);
    let mut series = extract_series(&root, &index, policy);
    series.extend(extract_weather_flags(&root, &index).into_series());

    let table = assemble_wide_table(series, ctx)?;
    tracing::debug!(
        layouts = index.len(),
        columns = table.columns.len(),
        rows = table.len(),
        "flattened dwml document"
    );
    Ok(table)
}
