use time::OffsetDateTime;

/// A single non-missing cell of a forecast feature column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureValue {
    Number(f64),
    Flag(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WideRow {
    pub forecast_time_utc: OffsetDateTime,
    /// Aligned with `WideTable::columns`; `None` is an explicit missing value.
    pub features: Vec<Option<FeatureValue>>,
}

/// Forecast document flattened onto one timestamp axis.
#[derive(Debug, Clone, PartialEq)]
pub struct WideTable {
    pub scrape_time_utc: OffsetDateTime,
    pub location_lat: f64,
    pub location_lon: f64,
    /// Feature column names, after display-name remapping.
    pub columns: Vec<String>,
    pub rows: Vec<WideRow>,
}

impl WideTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell lookup by row position and feature column name.
    pub fn value(&self, row: usize, column: &str) -> Option<FeatureValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.features.get(idx).copied().flatten()
    }
}
