//! The ordered parsing cascade applied to agent text.
//!
//! Each strategy is independent and total: it either recovers at least one
//! record or reports nothing, it never fails. [`ExtractionStrategy::CASCADE`]
//! fixes the order; the first strategy with a non-empty result wins.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::product::ProductRecord;
use crate::extraction::strip_code_fence;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// First `[ {...} ]` substring, parsed as a list.
    DirectArray,
    /// The whole text as a list, or as an object with a `products` list.
    WholePayload,
    /// Line-by-line accumulation until the brace count returns to zero.
    BraceBalanced,
    /// Every object matched by a one-level-nesting brace regex.
    RelaxedRegex,
    /// Spans grown outward from lines that mention a name key.
    AnchorScan,
}

impl ExtractionStrategy {
    pub const CASCADE: [ExtractionStrategy; 5] = [
        Self::DirectArray,
        Self::WholePayload,
        Self::BraceBalanced,
        Self::RelaxedRegex,
        Self::AnchorScan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectArray => "direct_array",
            Self::WholePayload => "whole_payload",
            Self::BraceBalanced => "brace_balanced",
            Self::RelaxedRegex => "relaxed_regex",
            Self::AnchorScan => "anchor_scan",
        }
    }

    /// Returns `Some` only when at least one record was recovered.
    pub fn apply(&self, text: &str) -> Option<Vec<ProductRecord>> {
        let records = match self {
            Self::DirectArray => direct_array(text),
            Self::WholePayload => whole_payload(text),
            Self::BraceBalanced => brace_balanced(text),
            Self::RelaxedRegex => relaxed_regex(text),
            Self::AnchorScan => anchor_scan(text),
        };
        if records.is_empty() {
            None
        } else {
            Some(records)
        }
    }
}

impl std::fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn array_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)\[\s*\{.*?\}\s*\]").expect("array pattern is a valid regex")
    })
}

fn nested_object_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}").expect("object pattern is a valid regex")
    })
}

fn direct_array(text: &str) -> Vec<ProductRecord> {
    let Some(found) = array_pattern().find(text) else {
        return Vec::new();
    };
    match serde_json::from_str::<Value>(found.as_str()) {
        Ok(Value::Array(items)) => objects(items),
        _ => Vec::new(),
    }
}

fn whole_payload(text: &str) -> Vec<ProductRecord> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Array(items)) => objects(items),
        Ok(Value::Object(mut fields)) => match fields.remove("products") {
            Some(Value::Array(items)) => objects(items),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn brace_balanced(text: &str) -> Vec<ProductRecord> {
    let mut records = Vec::new();
    let mut buffer = String::new();
    let mut depth: i64 = 0;

    for line in text.lines() {
        buffer.push_str(line);
        buffer.push('\n');
        depth += brace_delta(line);

        if depth == 0 && !buffer.trim().is_empty() {
            let candidate = strip_code_fence(&buffer);
            if candidate.starts_with('{') {
                records.extend(named_object(candidate));
            }
            buffer.clear();
        }
    }
    records
}

fn relaxed_regex(text: &str) -> Vec<ProductRecord> {
    nested_object_pattern()
        .find_iter(text)
        .filter_map(|found| named_object(found.as_str()))
        .collect()
}

fn anchor_scan(text: &str) -> Vec<ProductRecord> {
    let lines: Vec<&str> = text.lines().collect();
    let mut records = Vec::new();
    let mut covered_until: Option<usize> = None;

    for (anchor, line) in lines.iter().enumerate() {
        if !(line.contains("\"name\"") || line.contains("\"product_name\"")) {
            continue;
        }
        if covered_until.is_some_and(|end| anchor <= end) {
            continue;
        }
        let Some(start) = (0..=anchor).rev().find(|index| lines[*index].contains('{')) else {
            continue;
        };
        let Some(end) = balanced_end(&lines, start) else {
            continue;
        };
        if end < anchor {
            continue;
        }
        if let Some(record) = named_object(&lines[start..=end].join("\n")) {
            records.push(record);
            covered_until = Some(end);
        }
    }
    records
}

/// Index of the line on which the brace count opened at `start` closes.
fn balanced_end(lines: &[&str], start: usize) -> Option<usize> {
    let mut depth: i64 = 0;
    for (index, line) in lines.iter().enumerate().skip(start) {
        depth += brace_delta(line);
        if depth <= 0 {
            return Some(index);
        }
    }
    None
}

fn brace_delta(line: &str) -> i64 {
    line.chars().fold(0, |depth, character| match character {
        '{' => depth + 1,
        '}' => depth - 1,
        _ => depth,
    })
}

fn named_object(candidate: &str) -> Option<ProductRecord> {
    let value = serde_json::from_str::<Value>(candidate.trim()).ok()?;
    ProductRecord::from_value(value).filter(ProductRecord::has_name_key)
}

fn objects(items: Vec<Value>) -> Vec<ProductRecord> {
    items.into_iter().filter_map(ProductRecord::from_value).collect()
}
