use std::collections::HashSet;

use feed_client::domain::{canonical_location_id, CompositeKey, EnergyRecord, MasterTable};
use time::UtcOffset;

fn normalize(mut record: EnergyRecord) -> EnergyRecord {
    record.begin_date = record.begin_date.map(|ts| ts.to_offset(UtcOffset::UTC));
    record.location_id = canonical_location_id(&record.location_id);
    record
}

/// Append the records of `incoming` whose `(begin_date, location_id)` key is
/// not yet in `existing`.
///
/// A key already stored wins regardless of its `load`; stored rows are never
/// rewritten, updated or removed. Within one batch the first occurrence of a
/// key wins. Accepted rows are normalized to UTC and canonical ids, and the
/// table is re-sorted by `begin_date` with undated records last. When nothing
/// is accepted `existing` comes back as it was. The second value is the number
/// of appended records.
pub fn merge(existing: MasterTable, incoming: Vec<EnergyRecord>) -> (MasterTable, usize) {
    let mut seen: HashSet<CompositeKey> = existing.records.iter().map(EnergyRecord::composite_key).collect();

    let accepted: Vec<EnergyRecord> = incoming
        .into_iter()
        .filter(|record| seen.insert(record.composite_key()))
        .map(normalize)
        .collect();

    metrics::counter!("energy_records_accepted_total").increment(accepted.len() as u64);
    if accepted.is_empty() {
        return (existing, 0);
    }

    let count = accepted.len();
    let mut table = existing;
    table.records.extend(accepted);
    table.sort_by_begin_date();
    (table, count)
}
