use csv::StringRecord;
use time::{format_description::well_known::Rfc3339, OffsetDateTime, UtcOffset};

use super::{finish, format_optional_f64, format_timestamp, TableError};
use crate::domain::EnergyRecord;

pub const ENERGY_COLUMNS: [&str; 5] = [
    "scrape_time_utc",
    "begin_date",
    "location",
    "location_id",
    "load",
];

/// Render energy records as CSV. An empty slice still yields the header row.
pub fn write_energy_csv(records: &[EnergyRecord]) -> Result<String, TableError> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(ENERGY_COLUMNS)?;

    for r in records {
        let begin = match r.begin_date {
            Some(ts) => format_timestamp(ts)?,
            None => String::new(),
        };
        wtr.write_record([
            format_timestamp(r.scrape_time_utc)?,
            begin,
            r.location.clone(),
            r.location_id.clone(),
            format_optional_f64(r.load),
        ])?;
    }

    finish(wtr)
}

fn parse_ts(column: &'static str, s: &str) -> Result<OffsetDateTime, TableError> {
    OffsetDateTime::parse(s.trim(), &Rfc3339)
        .map(|ts| ts.to_offset(UtcOffset::UTC))
        .map_err(|e| TableError::InvalidField {
            column,
            value: s.to_string(),
            reason: e.to_string(),
        })
}

fn record_to_energy(record: &StringRecord, headers: &StringRecord) -> Result<EnergyRecord, TableError> {
    let get = |name: &str| -> Result<&str, TableError> {
        headers
            .iter()
            .position(|h| h == name)
            .and_then(|idx| record.get(idx))
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))
    };

    let scrape_time_utc = parse_ts("scrape_time_utc", get("scrape_time_utc")?)?;

    let begin_str = get("begin_date")?;
    let begin_date = if begin_str.trim().is_empty() {
        None
    } else {
        Some(parse_ts("begin_date", begin_str)?)
    };

    let load_str = get("load")?.trim();
    // NaN is a missing load, not a value.
    let load = if load_str.is_empty() {
        None
    } else {
        Some(load_str.parse::<f64>().map_err(|e| TableError::InvalidField {
            column: "load",
            value: load_str.to_string(),
            reason: e.to_string(),
        })?)
        .filter(|v| !v.is_nan())
    };

    Ok(EnergyRecord {
        scrape_time_utc,
        begin_date,
        location: get("location")?.to_string(),
        location_id: get("location_id")?.to_string(),
        load,
    })
}

/// Parse a persisted energy table. Blank input is an empty table.
///
/// Every cell is read as a string first, so identifiers such as `4004` keep
/// their textual form.
pub fn read_energy_csv(text: &str) -> Result<Vec<EnergyRecord>, TableError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut rdr = csv::Reader::from_reader(text.as_bytes());
    let headers = rdr.headers()?.clone();

    let mut out = Vec::new();
    for result in rdr.records() {
        let record = result?;
        out.push(record_to_energy(&record, &headers)?);
    }
    Ok(out)
}
