//! Normalization of the per-day energy-demand feed into narrow records.
//!
//! The feed has no stable contract: it arrives as a JSON list, as a JSON
//! object wrapping the list under one or more keys, or as XML. Nothing in
//! this module returns an error; unusable payloads become an empty batch and
//! a warning.

use feed_client::domain::{canonical_location_id, cmp_begin_date_nulls_last, EnergyRecord};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use super::{
    coerce::{json_number, json_text, json_timestamp, parse_number, parse_timestamp},
    xml::XmlElement,
};

/// Field that holds the record list in the usual ISO-NE payload.
pub const RECORD_FIELD: &str = "HourlyRtDemand";

const BEGIN_DATE_FIELDS: [&str; 3] = ["BeginDate", "Begin", "beginDate"];
const LOAD_FIELDS: [&str; 3] = ["Load", "Value", "load"];
const LOCATION_ID_FIELDS: [&str; 2] = ["LocId", "Id"];
const LOCATION_NAME_FIELDS: [&str; 2] = ["Name", "Location"];
const XML_LOCATION_ID_ATTRS: [&str; 2] = ["LocId", "LocID"];

/// How deep the nested-wrapper rule descends into object-valued fields.
const MAX_WRAPPER_DEPTH: usize = 3;

/// An energy payload as handed over by the fetcher or a caller that already
/// decoded it.
#[derive(Debug, Clone, Copy)]
pub enum EnergyPayload<'a> {
    Text(&'a str),
    Bytes(&'a [u8]),
    Json(&'a Value),
}

/// One step of record-list discovery. Rules run in order and the first one
/// that returns `Some` wins.
pub struct RecordListRule {
    pub name: &'static str,
    pub extract: for<'v> fn(&'v Value, usize) -> Option<Vec<&'v Value>>,
}

pub const RECORD_LIST_RULES: &[RecordListRule] = &[
    RecordListRule {
        name: "top_level_list",
        extract: top_level_list,
    },
    RecordListRule {
        name: "known_record_field",
        extract: known_record_field,
    },
    RecordListRule {
        name: "first_list_of_objects",
        extract: first_list_of_objects,
    },
    RecordListRule {
        name: "nested_wrapper",
        extract: nested_wrapper,
    },
];

fn top_level_list(v: &Value, _depth: usize) -> Option<Vec<&Value>> {
    v.as_array().map(|items| items.iter().collect())
}

fn known_record_field(v: &Value, _depth: usize) -> Option<Vec<&Value>> {
    match v.as_object()?.get(RECORD_FIELD)? {
        Value::Array(items) => Some(items.iter().collect()),
        single @ Value::Object(_) => Some(vec![single]),
        _ => None,
    }
}

fn first_list_of_objects(v: &Value, _depth: usize) -> Option<Vec<&Value>> {
    v.as_object()?.values().find_map(|field| match field {
        Value::Array(items) if matches!(items.first(), Some(Value::Object(_))) => {
            Some(items.iter().collect())
        }
        _ => None,
    })
}

fn nested_wrapper(v: &Value, depth: usize) -> Option<Vec<&Value>> {
    if depth == 0 {
        return None;
    }
    v.as_object()?
        .values()
        .filter(|field| field.is_object())
        .find_map(|field| locate_with_depth(field, depth - 1))
}

fn locate_with_depth(v: &Value, depth: usize) -> Option<Vec<&Value>> {
    RECORD_LIST_RULES.iter().find_map(|rule| {
        let found = (rule.extract)(v, depth)?;
        tracing::trace!(rule = rule.name, records = found.len(), "energy record list located");
        Some(found)
    })
}

/// Locate the record list in a decoded payload; empty when no rule matches.
pub fn find_record_list(v: &Value) -> Vec<&Value> {
    locate_with_depth(v, MAX_WRAPPER_DEPTH).unwrap_or_default()
}

/// First field, in priority order, holding a non-null, non-empty value.
fn first_present<'v>(obj: &'v Map<String, Value>, keys: &[&str]) -> Option<&'v Value> {
    keys.iter().find_map(|k| match obj.get(*k) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(v) => Some(v),
    })
}

fn normalize_json_record(
    rec: &Value,
    scrape_time_utc: OffsetDateTime,
    caller_location_id: &str,
) -> Option<EnergyRecord> {
    let obj = rec.as_object()?;

    let begin_date = first_present(obj, &BEGIN_DATE_FIELDS).and_then(json_timestamp);

    let (location, location_id) = match obj.get("Location") {
        Some(Value::Object(loc)) => (
            first_present(loc, &LOCATION_NAME_FIELDS)
                .and_then(json_text)
                .unwrap_or_default(),
            first_present(loc, &LOCATION_ID_FIELDS)
                .and_then(json_text)
                .unwrap_or_else(|| caller_location_id.to_string()),
        ),
        Some(scalar) => (
            json_text(scalar).unwrap_or_default(),
            caller_location_id.to_string(),
        ),
        None => (String::new(), caller_location_id.to_string()),
    };

    let load = first_present(obj, &LOAD_FIELDS).and_then(json_number);

    Some(EnergyRecord {
        scrape_time_utc,
        begin_date,
        location,
        location_id: canonical_location_id(&location_id),
        load,
    })
}

fn records_from_json(
    payload: &Value,
    scrape_time_utc: OffsetDateTime,
    caller_location_id: &str,
) -> Vec<EnergyRecord> {
    let list = find_record_list(payload);
    let mut skipped = 0usize;
    let records: Vec<EnergyRecord> = list
        .into_iter()
        .filter_map(|rec| {
            let normalized = normalize_json_record(rec, scrape_time_utc, caller_location_id);
            if normalized.is_none() {
                skipped += 1;
            }
            normalized
        })
        .collect();

    if skipped > 0 {
        tracing::warn!(
            location_id = caller_location_id,
            skipped,
            "energy payload list contains non-object entries, skipped"
        );
    }
    records
}

fn records_from_xml(
    root: &XmlElement,
    scrape_time_utc: OffsetDateTime,
    caller_location_id: &str,
) -> Vec<EnergyRecord> {
    std::iter::once(root)
        .chain(root.descendants())
        .filter(|el| el.name == RECORD_FIELD)
        .map(|node| {
            let begin_date = node
                .descendants_named("BeginDate")
                .next()
                .and_then(|el| parse_timestamp(el.text()));

            let (location, location_id) = match node.descendants_named("Location").next() {
                Some(loc) => (
                    loc.text().trim().to_string(),
                    XML_LOCATION_ID_ATTRS
                        .iter()
                        .find_map(|a| loc.attr(a).filter(|v| !v.trim().is_empty()))
                        .unwrap_or(caller_location_id)
                        .to_string(),
                ),
                None => (String::new(), caller_location_id.to_string()),
            };

            let load = node
                .descendants_named("Load")
                .next()
                .and_then(|el| parse_number(el.text()));

            EnergyRecord {
                scrape_time_utc,
                begin_date,
                location,
                location_id: canonical_location_id(&location_id),
                load,
            }
        })
        .collect()
}

/// Extract narrow energy records from a payload of unknown shape.
///
/// `location_id` is the identifier the payload was requested for; it fills
/// records that do not carry their own. The result is sorted by
/// `begin_date` with undated records last.
pub fn extract_energy_records(
    payload: EnergyPayload<'_>,
    scrape_time_utc: OffsetDateTime,
    location_id: &str,
) -> Vec<EnergyRecord> {
    let mut records = match payload {
        EnergyPayload::Json(v) => records_from_json(v, scrape_time_utc, location_id),
        EnergyPayload::Bytes(b) => extract_from_text(&String::from_utf8_lossy(b), scrape_time_utc, location_id),
        EnergyPayload::Text(t) => extract_from_text(t, scrape_time_utc, location_id),
    };

    if records.is_empty() {
        metrics::counter!("energy_payload_unusable_total").increment(1);
        tracing::warn!(location_id, scrape_time_utc = %scrape_time_utc, "energy payload yielded no records");
    }

    records.sort_by(cmp_begin_date_nulls_last);
    records
}

fn extract_from_text(text: &str, scrape_time_utc: OffsetDateTime, location_id: &str) -> Vec<EnergyRecord> {
    if text.trim().is_empty() {
        metrics::counter!("energy_payload_empty_total").increment(1);
        tracing::warn!(location_id, "energy payload is empty");
        return Vec::new();
    }

    let json_err = match serde_json::from_str::<Value>(text) {
        Ok(v) => return records_from_json(&v, scrape_time_utc, location_id),
        Err(e) => e,
    };

    match XmlElement::parse(text) {
        Ok(root) => {
            let records = records_from_xml(&root, scrape_time_utc, location_id);
            if !records.is_empty() {
                metrics::counter!("energy_payload_xml_total").increment(1);
                tracing::info!(location_id, rows = records.len(), "energy payload parsed as XML");
            } else {
                tracing::warn!(
                    location_id,
                    error = %json_err,
                    "energy payload is neither JSON nor XML with HourlyRtDemand records"
                );
            }
            records
        }
        Err(xml_err) => {
            tracing::warn!(
                location_id,
                error = %json_err,
                xml_error = %xml_err,
                "energy payload is neither JSON nor XML"
            );
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    const STAMP: OffsetDateTime = datetime!(2025-08-26 00:00:00 UTC);

    fn extract_text(text: &str) -> Vec<EnergyRecord> {
        extract_energy_records(EnergyPayload::Text(text), STAMP, "4004")
    }

    #[test]
    fn empty_payload_is_an_empty_batch() {
        assert!(extract_text("").is_empty());
        assert!(extract_text("   \n\t").is_empty());
        assert!(extract_energy_records(EnergyPayload::Bytes(b""), STAMP, "4004").is_empty());
    }

    #[test]
    fn iso_ne_object_payload() {
        let records = extract_text(
            r#"{"HourlyRtDemand":[{"BeginDate":"2025-08-25T03:00:00.000-04:00","Location":{"LocId":"4004","Name":".Z.CONNECTICUT"},"Load":2552.328}]}"#,
        );

        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.location_id, "4004");
        assert_eq!(r.location, ".Z.CONNECTICUT");
        assert_eq!(r.load, Some(2552.328));
        assert_eq!(r.begin_date, Some(datetime!(2025-08-25 07:00:00 UTC)));
        assert_eq!(r.scrape_time_utc, STAMP);
    }

    #[test]
    fn top_level_list_with_scalar_location_and_alternate_fields() {
        let payload = json!([
            {"Begin": "2025-08-25T05:00:00-04:00", "Location": ".Z.MAINE", "Value": "1200.5"},
            {"beginDate": "2025-08-25T04:00:00-04:00", "load": 1100},
        ]);
        let records = extract_energy_records(EnergyPayload::Json(&payload), STAMP, "4001");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].begin_date, Some(datetime!(2025-08-25 08:00:00 UTC)));
        assert_eq!(records[0].location, "");
        assert_eq!(records[0].load, Some(1100.0));
        assert_eq!(records[1].location, ".Z.MAINE");
        assert_eq!(records[1].location_id, "4001");
        assert_eq!(records[1].load, Some(1200.5));
    }

    #[test]
    fn zero_load_is_not_missing() {
        let payload = json!([{"BeginDate": "2025-08-25T03:00:00-04:00", "Load": 0, "Value": 9}]);
        let records = extract_energy_records(EnergyPayload::Json(&payload), STAMP, "4004");
        assert_eq!(records[0].load, Some(0.0));
    }

    #[test]
    fn first_list_of_objects_is_used_when_known_field_is_absent() {
        let records = extract_text(
            r#"{"meta": [1, 2], "empty": [], "rows": [{"BeginDate": "2025-08-25T03:00:00-04:00", "Location": {"Id": 4008, "Location": ".Z.NEMASSBOST"}, "Load": "n/a"}]}"#,
        );

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].location_id, "4008");
        assert_eq!(records[0].location, ".Z.NEMASSBOST");
        assert_eq!(records[0].load, None);
    }

    #[test]
    fn nested_wrapper_object_is_descended() {
        let records = extract_text(
            r#"{"HourlyRtDemands": {"HourlyRtDemand": {"BeginDate": "2025-08-25T03:00:00-04:00", "Load": 10}}}"#,
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].location_id, "4004");
        assert_eq!(records[0].load, Some(10.0));
    }

    #[test]
    fn unmatched_json_shape_is_empty() {
        assert!(extract_text(r#"{"status": "ok", "count": 0}"#).is_empty());
        assert!(extract_text("42").is_empty());
    }

    #[test]
    fn non_object_items_and_bad_dates_degrade() {
        let records = extract_text(
            r#"[17, {"BeginDate": "not a date", "Load": 5}, {"BeginDate": "2025-08-25T03:00:00-04:00", "Load": 6}]"#,
        );
        assert_eq!(records.len(), 2);
        assert!(records[0].begin_date.is_some());
        assert_eq!(records[1].begin_date, None);
        assert_eq!(records[1].load, Some(5.0));
    }

    #[test]
    fn xml_fallback_with_namespaces() {
        let records = extract_text(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <HourlyRtDemands xmlns="http://WEBSERVICES.iso-ne.com/">
              <HourlyRtDemand>
                <BeginDate>2025-08-25T04:00:00.000-04:00</BeginDate>
                <Location LocId="4004">.Z.CONNECTICUT</Location>
                <Load>2481.2</Load>
              </HourlyRtDemand>
              <HourlyRtDemand>
                <BeginDate>2025-08-25T03:00:00.000-04:00</BeginDate>
                <Load>NA</Load>
              </HourlyRtDemand>
            </HourlyRtDemands>"#,
        );

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].begin_date, Some(datetime!(2025-08-25 07:00:00 UTC)));
        assert_eq!(records[0].location, "");
        assert_eq!(records[0].load, None);
        assert_eq!(records[1].location, ".Z.CONNECTICUT");
        assert_eq!(records[1].location_id, "4004");
        assert_eq!(records[1].load, Some(2481.2));
    }

    #[test]
    fn garbage_is_an_empty_batch() {
        assert!(extract_text("<html><body>Service Unavailable</body></html>").is_empty());
        assert!(extract_text("not json, not xml").is_empty());
    }

    #[test]
    fn rule_order_prefers_known_field() {
        let payload = json!({
            "other": [{"Load": 1}],
            "HourlyRtDemand": [{"Load": 2}, {"Load": 3}],
        });
        assert_eq!(find_record_list(&payload).len(), 2);
    }
}
