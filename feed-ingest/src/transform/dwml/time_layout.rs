use std::collections::HashMap;

use time::OffsetDateTime;

use crate::transform::{coerce::parse_timestamp, xml::XmlElement};

/// Ordered start-valid-times of one layout. A slot is `None` when its
/// timestamp could not be parsed, so later slots keep their positions.
pub type TimeSlots = Vec<Option<OffsetDateTime>>;

/// Layout key → positional timestamps, for every `time-layout` in a document.
#[derive(Debug, Clone, Default)]
pub struct TimeLayoutIndex {
    layouts: HashMap<String, TimeSlots>,
}

impl TimeLayoutIndex {
    pub fn from_document(root: &XmlElement) -> Self {
        let mut layouts = HashMap::new();

        for layout in root.descendants_named("time-layout") {
            let Some(key) = layout.child("layout-key").map(|k| k.text().trim()) else {
                tracing::warn!("dwml time-layout without layout-key skipped");
                continue;
            };
            if key.is_empty() {
                tracing::warn!("dwml time-layout with empty layout-key skipped");
                continue;
            }

            let slots: TimeSlots = layout
                .children_named("start-valid-time")
                .map(|t| parse_timestamp(t.text()))
                .collect();

            let unparsed = slots.iter().filter(|s| s.is_none()).count();
            if unparsed > 0 {
                tracing::warn!(layout_key = key, unparsed, "dwml time-layout has unparsable timestamps");
            }

            layouts.insert(key.to_string(), slots);
        }

        Self { layouts }
    }

    pub fn get(&self, key: &str) -> Option<&TimeSlots> {
        self.layouts.get(key)
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}
