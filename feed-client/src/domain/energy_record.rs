use std::cmp::Ordering;

use time::{OffsetDateTime, UtcOffset};

/// One narrow row of the energy-demand feed.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyRecord {
    pub scrape_time_utc: OffsetDateTime,
    pub begin_date: Option<OffsetDateTime>,
    pub location: String,
    pub location_id: String,
    pub load: Option<f64>,
}

/// Deduplication key of the master table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey {
    pub begin_date: Option<OffsetDateTime>,
    pub location_id: String,
}

impl EnergyRecord {
    /// Key with `begin_date` in UTC and `location_id` in canonical form.
    pub fn composite_key(&self) -> CompositeKey {
        CompositeKey {
            begin_date: self.begin_date.map(|ts| ts.to_offset(UtcOffset::UTC)),
            location_id: canonical_location_id(&self.location_id),
        }
    }
}

/// Canonical string form of a location identifier.
///
/// Identifiers travel through JSON numbers, XML attributes and CSV cells, so
/// `4004`, `" 4004 "` and `4004.0` must all compare equal.
pub fn canonical_location_id(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some((int_part, frac)) = trimmed.split_once('.') {
        let int_is_digits = !int_part.is_empty()
            && int_part
                .trim_start_matches('-')
                .chars()
                .all(|c| c.is_ascii_digit());
        let frac_is_zero = !frac.is_empty() && frac.chars().all(|c| c == '0');
        if int_is_digits && frac_is_zero {
            return int_part.to_string();
        }
    }
    trimmed.to_string()
}

/// Ascending by `begin_date`, records without one last.
pub fn cmp_begin_date_nulls_last(a: &EnergyRecord, b: &EnergyRecord) -> Ordering {
    match (a.begin_date, b.begin_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Full append-only history of energy records for one location universe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MasterTable {
    pub records: Vec<EnergyRecord>,
}

impl MasterTable {
    pub fn new(records: Vec<EnergyRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Stable sort ascending by `begin_date`, nulls last.
    pub fn sort_by_begin_date(&mut self) {
        self.records.sort_by(cmp_begin_date_nulls_last);
    }
}
