use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Attribute names consulted, in order, when deriving a display name.
pub const DISPLAY_NAME_FIELDS: [&str; 4] = ["name", "product_name", "title", "product_title"];

/// Placeholder used when a record carries no usable name.
pub const MISSING_NAME: &str = "N/A";

/// One product as recovered from agent output.
///
/// Records keep every attribute the agent produced. Only `name` (or
/// `product_name`) is required to tell records apart; everything else is
/// optional and may be `null`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductRecord(pub Map<String, Value>);

impl ProductRecord {
    pub fn new(attributes: Map<String, Value>) -> Self {
        Self(attributes)
    }

    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(attributes) => Some(Self(attributes)),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.0
    }

    /// True when the record carries a `name` or `product_name` key.
    pub fn has_name_key(&self) -> bool {
        self.0.contains_key("name") || self.0.contains_key("product_name")
    }

    /// First non-empty attribute from [`DISPLAY_NAME_FIELDS`], or `"N/A"`.
    pub fn display_name(&self) -> String {
        DISPLAY_NAME_FIELDS
            .iter()
            .filter_map(|field| self.0.get(*field))
            .find_map(non_empty_text)
            .unwrap_or_else(|| MISSING_NAME.to_string())
    }

    pub fn description(&self) -> Option<String> {
        self.0
            .get("description")
            .and_then(non_empty_text)
            .filter(|description| description != "null")
    }
}

fn non_empty_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) if text.trim().is_empty() => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(false) => None,
        other => Some(other.to_string()),
    }
}
