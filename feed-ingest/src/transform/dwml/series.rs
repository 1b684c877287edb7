use std::collections::BTreeMap;

use feed_client::domain::FeatureValue;
use serde::Deserialize;
use time::OffsetDateTime;

use super::time_layout::{TimeLayoutIndex, TimeSlots};
use crate::transform::{coerce::parse_number, xml::XmlElement};

/// Parameter tags that are not numeric series.
const EXCLUDED_TAGS: [&str; 2] = ["weather", "conditions-icon"];

const RAIN_KEYWORDS: [&str; 3] = ["rain", "shower", "drizzle"];
const THUNDER_KEYWORDS: [&str; 3] = ["thunder", "tstm", "tstorm"];
const FOG_KEYWORDS: [&str; 2] = ["fog", "mist"];

/// Attributes scanned on a `weather-conditions` record, in concatenation order.
const CONDITION_ATTRIBUTES: [&str; 4] = ["weather-type", "intensity", "coverage", "additive"];

/// What to do when a parameter's value count differs from its layout length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthPolicy {
    /// Keep the aligned prefix, `min(values, timestamps)` points.
    #[default]
    Truncate,
    /// Drop the whole parameter.
    Reject,
}

/// A named, sparse, time-indexed sequence. `None` is an explicit missing value.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub points: BTreeMap<OffsetDateTime, Option<FeatureValue>>,
}

impl Series {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            points: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Rain/thunder/fog flags derived from the `weather` parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherFlags {
    pub rain: Series,
    pub thunder: Series,
    pub fog: Series,
}

impl WeatherFlags {
    fn empty() -> Self {
        Self {
            rain: Series::new("weather_rain"),
            thunder: Series::new("weather_thunder"),
            fog: Series::new("weather_fog"),
        }
    }

    pub fn into_series(self) -> [Series; 3] {
        [self.rain, self.thunder, self.fog]
    }
}

fn series_name(node: &XmlElement) -> String {
    match node.attr("type") {
        Some(kind) if !kind.is_empty() => format!("{}_{}", node.name, kind),
        _ => node.name.clone(),
    }
}

/// Number of aligned points to take, or `None` when the policy rejects the node.
fn aligned_len(name: &str, values: usize, slots: &TimeSlots, policy: LengthPolicy) -> Option<usize> {
    let n = values.min(slots.len());
    if values != slots.len() {
        match policy {
            LengthPolicy::Truncate => {
                metrics::counter!("dwml_series_truncated_total").increment(1);
                tracing::warn!(
                    series = name,
                    values,
                    timestamps = slots.len(),
                    kept = n,
                    "dwml series length differs from its time-layout, truncating"
                );
            }
            LengthPolicy::Reject => {
                metrics::counter!("dwml_series_rejected_total").increment(1);
                tracing::warn!(
                    series = name,
                    values,
                    timestamps = slots.len(),
                    "dwml series length differs from its time-layout, rejecting"
                );
                return None;
            }
        }
    }
    Some(n)
}

/// Extract every numeric series declared under the document's `parameters`
/// elements, in document order.
pub fn extract_series(root: &XmlElement, index: &TimeLayoutIndex, policy: LengthPolicy) -> Vec<Series> {
    let mut out = Vec::new();

    for params in root.descendants_named("parameters") {
        for node in &params.children {
            if EXCLUDED_TAGS.contains(&node.name.as_str()) {
                continue;
            }
            let values: Vec<&XmlElement> = node.children_named("value").collect();
            if values.is_empty() {
                continue;
            }

            let name = series_name(node);
            let Some(slots) = node.attr("time-layout").and_then(|key| index.get(key)) else {
                tracing::warn!(
                    series = %name,
                    time_layout = node.attr("time-layout").unwrap_or(""),
                    "dwml series references an unknown time-layout, skipping"
                );
                continue;
            };

            let Some(n) = aligned_len(&name, values.len(), slots, policy) else {
                continue;
            };
            if n == 0 {
                continue;
            }

            let mut series = Series::new(name);
            for (value, slot) in values.iter().zip(slots.iter()).take(n) {
                if let Some(ts) = slot {
                    let v = parse_number(value.text()).map(FeatureValue::Number);
                    series.points.insert(*ts, v);
                }
            }
            out.push(series);
        }
    }

    out
}

fn contains_any(haystack: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| haystack.contains(k))
}

/// Lowercased text of the scanned attributes on a condition record and its
/// descendants, grouped by attribute name.
fn condition_text(conditions: &XmlElement) -> String {
    let nodes: Vec<&XmlElement> = std::iter::once(conditions)
        .chain(conditions.descendants())
        .collect();

    CONDITION_ATTRIBUTES
        .iter()
        .map(|attr| {
            nodes
                .iter()
                .filter_map(|n| n.attr(attr))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Derive rain/thunder/fog flags from the first `parameters/weather` node.
///
/// Returns empty flag series when the document has no weather node or its
/// layout is unknown.
pub fn extract_weather_flags(root: &XmlElement, index: &TimeLayoutIndex) -> WeatherFlags {
    let mut flags = WeatherFlags::empty();

    let weather = root
        .descendants_named("parameters")
        .find_map(|p| p.child("weather"));
    let Some(weather) = weather else {
        return flags;
    };

    let empty = TimeSlots::new();
    let slots = weather
        .attr("time-layout")
        .and_then(|key| index.get(key))
        .unwrap_or(&empty);
    let conditions: Vec<&XmlElement> = weather.children_named("weather-conditions").collect();

    let m = slots.len().min(conditions.len());
    for (cond, slot) in conditions.iter().zip(slots.iter()).take(m) {
        let Some(ts) = slot else {
            continue;
        };
        let text = condition_text(cond);
        flags
            .rain
            .points
            .insert(*ts, Some(FeatureValue::Flag(contains_any(&text, &RAIN_KEYWORDS))));
        flags
            .thunder
            .points
            .insert(*ts, Some(FeatureValue::Flag(contains_any(&text, &THUNDER_KEYWORDS))));
        flags
            .fog
            .points
            .insert(*ts, Some(FeatureValue::Flag(contains_any(&text, &FOG_KEYWORDS))));
    }

    flags
}
