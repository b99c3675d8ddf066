//! Recovery of product records from automation-agent output.
//!
//! The agent hands back whatever it ended up with: a native JSON value, a
//! blob of prose with JSON somewhere inside, a transcript file path, or a
//! list of step results. [`ResultExtractor`] first normalizes that payload
//! into either structured records or a single string, then runs the text
//! through an ordered cascade of parsing strategies (see [`strategies`]).
//! Finding nothing is a valid outcome, not an error.

pub mod strategies;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::product::ProductRecord;

pub use strategies::ExtractionStrategy;

/// One step of an agent run, as exposed by the automation collaborator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStepResult {
    pub extracted_content: Option<String>,
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Vec<PathBuf>,
}

impl AgentStepResult {
    fn content(&self) -> Option<&str> {
        self.extracted_content
            .as_deref()
            .filter(|content| !content.trim().is_empty())
            .or_else(|| self.text.as_deref().filter(|text| !text.trim().is_empty()))
    }
}

/// Every payload shape the search collaborator is known to produce.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum RawAgentResult {
    /// Already-parsed JSON: a list, an object or a scalar.
    Structured(Value),
    /// Free text, or a path to a `.md` transcript.
    Text(String),
    /// Enumerable step results; the last one carries the answer.
    History(Vec<AgentStepResult>),
}

impl From<String> for RawAgentResult {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Value> for RawAgentResult {
    fn from(value: Value) -> Self {
        Self::Structured(value)
    }
}

#[derive(Clone, Debug, PartialEq)]
enum NormalizedPayload {
    Records(Vec<ProductRecord>),
    Text(String),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Extraction {
    /// Strategy that produced the records; `None` for structured payloads
    /// and for empty results.
    pub strategy: Option<ExtractionStrategy>,
    pub records: Vec<ProductRecord>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResultExtractor;

impl ResultExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, payload: RawAgentResult) -> Extraction {
        match normalize(payload) {
            NormalizedPayload::Records(records) => {
                debug!(
                    event_name = "extraction.structured",
                    record_count = records.len(),
                    "flattened structured agent payload"
                );
                Extraction { strategy: None, records }
            }
            NormalizedPayload::Text(text) => self.extract_text(&text),
        }
    }

    pub fn extract_text(&self, text: &str) -> Extraction {
        debug!(
            event_name = "extraction.text_received",
            text_length = text.len(),
            "parsing agent text payload"
        );
        for strategy in ExtractionStrategy::CASCADE {
            if let Some(records) = strategy.apply(text) {
                debug!(
                    event_name = "extraction.strategy_matched",
                    strategy = strategy.as_str(),
                    record_count = records.len(),
                    "extraction strategy recovered products"
                );
                return Extraction { strategy: Some(strategy), records };
            }
        }
        debug!(event_name = "extraction.exhausted", "no extraction strategy recovered products");
        Extraction::default()
    }
}

fn normalize(payload: RawAgentResult) -> NormalizedPayload {
    match payload {
        RawAgentResult::Structured(Value::String(text)) | RawAgentResult::Text(text) => {
            NormalizedPayload::Text(resolve_transcript(text))
        }
        RawAgentResult::Structured(value @ (Value::Array(_) | Value::Object(_))) => {
            let mut records = Vec::new();
            flatten_into(&value, &mut records);
            if records.is_empty() {
                // No product-shaped objects; let the text cascade look at it.
                NormalizedPayload::Text(value.to_string())
            } else {
                NormalizedPayload::Records(records)
            }
        }
        RawAgentResult::Structured(scalar) => NormalizedPayload::Text(scalar.to_string()),
        RawAgentResult::History(steps) => NormalizedPayload::Text(history_content(&steps)),
    }
}

fn history_content(steps: &[AgentStepResult]) -> String {
    let Some(last) = steps.last() else {
        return String::new();
    };
    if let Some(content) = last.content() {
        return resolve_transcript(content.to_string());
    }
    last.attachments
        .iter()
        .filter(|path| path.extension().is_some_and(|extension| extension == "md"))
        .find_map(|path| read_transcript(path))
        .unwrap_or_default()
}

/// Swaps a `.md` path that exists on disk for the file's contents.
fn resolve_transcript(text: String) -> String {
    let candidate = text.trim();
    if !candidate.ends_with(".md") {
        return text;
    }
    let path = Path::new(candidate);
    if !path.is_file() {
        return text;
    }
    read_transcript(path).unwrap_or(text)
}

fn read_transcript(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            debug!(
                event_name = "extraction.transcript_read",
                path = %path.display(),
                text_length = contents.len(),
                "read agent transcript file"
            );
            Some(contents)
        }
        Err(error) => {
            warn!(
                event_name = "extraction.transcript_unreadable",
                path = %path.display(),
                error = %error,
                "could not read agent transcript file"
            );
            None
        }
    }
}

/// Structural walk over native JSON. An object counts as a product when it
/// has both `name` and `product_url`; `variants`, `product_variants` and
/// `products` lists are walked as well, after the parent itself.
fn flatten_into(value: &Value, records: &mut Vec<ProductRecord>) {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten_into(item, records);
            }
        }
        Value::Object(fields) => {
            if fields.contains_key("name") && fields.contains_key("product_url") {
                records.push(ProductRecord::new(fields.clone()));
            }
            for key in ["variants", "product_variants", "products"] {
                if let Some(nested @ Value::Array(_)) = fields.get(key) {
                    flatten_into(nested, records);
                }
            }
        }
        _ => {}
    }
}

/// Removes a surrounding markdown code fence (```` ```json ```` / ```` ``` ````).
pub fn strip_code_fence(text: &str) -> &str {
    let mut stripped = text.trim();
    if let Some(rest) = stripped.strip_prefix("```json") {
        stripped = rest;
    } else if let Some(rest) = stripped.strip_prefix("```") {
        stripped = rest;
    }
    if let Some(rest) = stripped.strip_suffix("```") {
        stripped = rest;
    }
    stripped.trim()
}
