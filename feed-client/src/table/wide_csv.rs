use super::{finish, format_timestamp, TableError};
use crate::domain::{FeatureValue, WideTable};

pub const WIDE_METADATA_COLUMNS: [&str; 4] = [
    "scrape_time_utc",
    "location_lat",
    "location_lon",
    "forecast_time_utc",
];

fn render_feature(v: Option<FeatureValue>) -> String {
    match v {
        Some(FeatureValue::Number(x)) => x.to_string(),
        Some(FeatureValue::Flag(b)) => b.to_string(),
        None => String::new(),
    }
}

/// Render the forecast wide table: metadata columns first, then one column
/// per feature in table order.
pub fn write_wide_csv(table: &WideTable) -> Result<String, TableError> {
    let mut wtr = csv::Writer::from_writer(Vec::new());

    let mut header: Vec<&str> = WIDE_METADATA_COLUMNS.to_vec();
    header.extend(table.columns.iter().map(String::as_str));
    wtr.write_record(&header)?;

    let scrape = format_timestamp(table.scrape_time_utc)?;
    let lat = table.location_lat.to_string();
    let lon = table.location_lon.to_string();

    for row in &table.rows {
        let mut fields = Vec::with_capacity(header.len());
        fields.push(scrape.clone());
        fields.push(lat.clone());
        fields.push(lon.clone());
        fields.push(format_timestamp(row.forecast_time_utc)?);
        fields.extend(row.features.iter().map(|v| render_feature(*v)));
        wtr.write_record(&fields)?;
    }

    finish(wtr)
}
