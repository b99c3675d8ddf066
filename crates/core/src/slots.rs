//! Slot tracking for the information-gathering phases.
//!
//! A slot is one structured attribute of the shopper's request (category,
//! material, ...). The tracker merges whatever the slot-extraction
//! collaborator recovered and answers the two questions the controller asks
//! every turn: what is still missing, and is there enough to search.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::extraction::strip_code_fence;

pub const REQUIRED_SLOTS: [&str; 4] = ["category", "usage", "style", "material"];
pub const OPTIONAL_SLOTS: [&str; 4] =
    ["budget", "brand_preference", "installation_method", "color_preference"];

/// Default completion rate at or above which a search may run even with
/// required slots still missing.
pub const DEFAULT_SUFFICIENCY_THRESHOLD: f64 = 0.7;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSchema {
    pub required: Vec<String>,
    pub optional: Vec<String>,
}

impl Default for SlotSchema {
    fn default() -> Self {
        Self {
            required: REQUIRED_SLOTS.iter().map(|slot| (*slot).to_string()).collect(),
            optional: OPTIONAL_SLOTS.iter().map(|slot| (*slot).to_string()).collect(),
        }
    }
}

impl SlotSchema {
    pub fn total(&self) -> usize {
        self.required.len() + self.optional.len()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlotTracker {
    schema: SlotSchema,
    sufficiency_threshold: f64,
    values: BTreeMap<String, Value>,
}

impl Default for SlotTracker {
    fn default() -> Self {
        Self::new(SlotSchema::default(), DEFAULT_SUFFICIENCY_THRESHOLD)
    }
}

impl SlotTracker {
    pub fn new(schema: SlotSchema, sufficiency_threshold: f64) -> Self {
        Self { schema, sufficiency_threshold, values: BTreeMap::new() }
    }

    pub fn schema(&self) -> &SlotSchema {
        &self.schema
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn get(&self, slot: &str) -> Option<&Value> {
        self.values.get(slot)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Merges filled values only; an empty or falsy value never erases a
    /// slot that is already known.
    pub fn update<I>(&mut self, new_slots: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        for (slot, value) in new_slots {
            if is_filled(&value) {
                self.values.insert(slot, value);
            }
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn missing_required(&self) -> Vec<String> {
        self.schema.required.iter().filter(|slot| !self.is_slot_filled(slot)).cloned().collect()
    }

    pub fn missing_optional(&self) -> Vec<String> {
        self.schema.optional.iter().filter(|slot| !self.is_slot_filled(slot)).cloned().collect()
    }

    pub fn completion_rate(&self) -> f64 {
        let total = self.schema.total();
        if total == 0 {
            return 1.0;
        }
        let filled = self
            .schema
            .required
            .iter()
            .chain(self.schema.optional.iter())
            .filter(|slot| self.is_slot_filled(slot))
            .count();
        filled as f64 / total as f64
    }

    /// Enough to search: nothing required is missing, or the overall
    /// completion rate reaches the configured threshold.
    pub fn sufficient(&self) -> bool {
        self.missing_required().is_empty() || self.completion_rate() >= self.sufficiency_threshold
    }

    /// `slot:value` pairs joined by `, `, in map order.
    pub fn summary(&self) -> String {
        self.values
            .iter()
            .map(|(slot, value)| format!("{slot}:{}", render_value(value)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Non-empty slot values rendered as text, in map order.
    pub fn filled_values(&self) -> Vec<String> {
        self.values
            .values()
            .filter(|value| is_filled(value))
            .map(render_value)
            .filter(|text| !text.trim().is_empty())
            .collect()
    }

    fn is_slot_filled(&self, slot: &str) -> bool {
        self.values.get(slot).map(is_filled).unwrap_or(false)
    }
}

/// Falsy values (`null`, `false`, `0`, empty strings and collections) do not
/// count as filled.
pub fn is_filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(true),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Parses slot-extraction output into a slot map.
///
/// The collaborator is asked for a JSON object but may wrap it in a code
/// fence or return something else entirely; anything that is not an object
/// degrades to an empty map.
pub fn parse_slot_payload(raw: &str) -> BTreeMap<String, Value> {
    let trimmed = strip_code_fence(raw.trim());
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(fields)) => fields.into_iter().collect(),
        _ => BTreeMap::new(),
    }
}
