use std::collections::BTreeSet;

use feed_client::domain::{WideRow, WideTable};
use time::OffsetDateTime;

use super::{series::Series, FlattenError};

/// Derived series name → published column name.
pub const DISPLAY_NAMES: [(&str, &str); 12] = [
    ("temperature_hourly", "temp_F"),
    ("temperature_apparent", "heat_index_F"),
    ("dewpoint_hourly", "dewpoint_F"),
    ("wind-speed_sustained", "wind_speed_mph"),
    ("wind-speed_gust", "wind_gust_mph"),
    ("direction", "wind_dir_deg"),
    ("probability-of-precipitation", "pop_pct"),
    ("cloud-amount", "sky_cover_pct"),
    ("humidity_relative", "rh_pct"),
    ("pressure_sea-level", "pressure_hPa"),
    ("visibility", "visibility_mi"),
    ("cig", "ceiling_ft"),
];

pub fn display_name(derived: &str) -> &str {
    DISPLAY_NAMES
        .iter()
        .find(|(from, _)| *from == derived)
        .map(|(_, to)| *to)
        .unwrap_or(derived)
}

/// Metadata shared by every row of one flattened document.
#[derive(Debug, Clone, Copy)]
pub struct RunContext {
    pub scrape_time_utc: OffsetDateTime,
    pub location_lat: f64,
    pub location_lon: f64,
}

/// Reindex every series onto the sorted union of their timestamps.
///
/// Empty series contribute no column. A repeated series name replaces the
/// earlier column's values but keeps its position; the axis still covers the
/// timestamps of both.
pub fn assemble_wide_table(series: Vec<Series>, ctx: RunContext) -> Result<WideTable, FlattenError> {
    let axis: BTreeSet<OffsetDateTime> = series
        .iter()
        .flat_map(|s| s.points.keys().copied())
        .collect();
    if axis.is_empty() {
        return Err(FlattenError::NoTimestamps);
    }

    let mut columns: Vec<Series> = Vec::new();
    for s in series.into_iter().filter(|s| !s.is_empty()) {
        match columns.iter_mut().find(|c| c.name == s.name) {
            Some(existing) => *existing = s,
            None => columns.push(s),
        }
    }

    let rows = axis
        .into_iter()
        .map(|ts| WideRow {
            forecast_time_utc: ts,
            features: columns
                .iter()
                .map(|s| s.points.get(&ts).copied().flatten())
                .collect(),
        })
        .collect();

    Ok(WideTable {
        scrape_time_utc: ctx.scrape_time_utc,
        location_lat: ctx.location_lat,
        location_lon: ctx.location_lon,
        columns: columns
            .iter()
            .map(|s| display_name(&s.name).to_string())
            .collect(),
        rows,
    })
}
