//! Detail lookups for products the shopper picked from a recommendation.
//!
//! Each lookup is one agent run aimed at a single product's detail page.
//! The agent's answer goes through the same [`ResultExtractor`] as search
//! output, and the first recovered record is taken as the product.

use std::sync::Arc;
use std::time::Instant;

use pickwise_core::domain::product::ProductRecord;
use pickwise_core::extraction::ResultExtractor;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::collaborators::SearchAgent;

/// Bookkeeping attributes that are kept on the record but never rendered.
pub const HIDDEN_ATTRIBUTES: [&str; 3] = ["source", "product_url", "search_time"];

const NOTHING_EXTRACTED: &str = "agent output held no product details";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProductDetails {
    /// The name the lookup was asked for, not necessarily the page title.
    pub product_name: String,
    pub record: ProductRecord,
    pub elapsed_secs: f64,
}

impl ProductDetails {
    /// Attribute/value pairs sorted by attribute name. Hidden bookkeeping
    /// attributes, nulls and blank strings are left out.
    pub fn visible_attributes(&self) -> Vec<(String, String)> {
        self.record
            .attributes()
            .iter()
            .filter(|(key, _)| !HIDDEN_ATTRIBUTES.contains(&key.as_str()))
            .filter_map(|(key, value)| attribute_text(value).map(|text| (key.clone(), text)))
            .collect()
    }

    pub fn render(&self) -> String {
        let mut lines: Vec<String> = self
            .visible_attributes()
            .into_iter()
            .map(|(key, value)| format!("{key}: {value}"))
            .collect();
        lines.push(format!("Retrieval time: {:.1} seconds", self.elapsed_secs));
        lines.join("\n")
    }
}

fn attribute_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) if text.trim().is_empty() => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DetailOutcome {
    Found(ProductDetails),
    /// The agent ran but did not come back with the product.
    NotFound { product_name: String, reason: String },
    AgentFailed { product_name: String, error: String },
}

impl DetailOutcome {
    pub fn product_name(&self) -> &str {
        match self {
            Self::Found(details) => &details.product_name,
            Self::NotFound { product_name, .. } | Self::AgentFailed { product_name, .. } => {
                product_name
            }
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn render(&self) -> String {
        match self {
            Self::Found(details) => details.render(),
            Self::NotFound { reason, .. } => format!("No details found: {reason}"),
            Self::AgentFailed { error, .. } => format!("Detail lookup failed: {error}"),
        }
    }
}

#[derive(Clone)]
pub struct DetailLookup {
    agent: Arc<dyn SearchAgent>,
    extractor: ResultExtractor,
}

impl DetailLookup {
    pub fn new(agent: Arc<dyn SearchAgent>) -> Self {
        Self { agent, extractor: ResultExtractor::new() }
    }

    pub async fn fetch(&self, product_name: &str) -> DetailOutcome {
        let started = Instant::now();
        let payload = match self.agent.fetch_details(product_name).await {
            Ok(payload) => payload,
            Err(error) => {
                warn!(
                    event_name = "details.agent_failed",
                    product_name = %product_name,
                    error = %error,
                    "detail lookup failed"
                );
                return DetailOutcome::AgentFailed {
                    product_name: product_name.to_string(),
                    error: error.to_string(),
                };
            }
        };

        let extraction = self.extractor.extract(payload);
        let Some(record) = extraction.records.into_iter().next() else {
            info!(
                event_name = "details.not_found",
                product_name = %product_name,
                "agent output held no product details"
            );
            return DetailOutcome::NotFound {
                product_name: product_name.to_string(),
                reason: NOTHING_EXTRACTED.to_string(),
            };
        };

        if let Some(error) = record.get("error") {
            let reason = attribute_text(error).unwrap_or_else(|| NOTHING_EXTRACTED.to_string());
            info!(
                event_name = "details.not_found",
                product_name = %product_name,
                reason = %reason,
                "agent reported the product as missing"
            );
            return DetailOutcome::NotFound { product_name: product_name.to_string(), reason };
        }

        let elapsed_secs = started.elapsed().as_secs_f64();
        info!(
            event_name = "details.found",
            product_name = %product_name,
            attribute_count = record.attributes().len(),
            elapsed_secs,
            "product details retrieved"
        );
        DetailOutcome::Found(ProductDetails {
            product_name: product_name.to_string(),
            record,
            elapsed_secs,
        })
    }

    /// Runs one lookup per name concurrently; outcomes keep the input order.
    pub async fn fetch_all(&self, product_names: &[String]) -> Vec<DetailOutcome> {
        let mut tasks = JoinSet::new();
        for (index, product_name) in product_names.iter().cloned().enumerate() {
            let lookup = self.clone();
            tasks.spawn(async move { (index, lookup.fetch(&product_name).await) });
        }

        let mut outcomes: Vec<Option<DetailOutcome>> = vec![None; product_names.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(error) => {
                    warn!(event_name = "details.task_failed", error = %error, "detail task aborted")
                }
            }
        }

        outcomes
            .into_iter()
            .zip(product_names)
            .map(|(outcome, product_name)| {
                outcome.unwrap_or_else(|| DetailOutcome::AgentFailed {
                    product_name: product_name.clone(),
                    error: "detail lookup did not complete".to_string(),
                })
            })
            .collect()
    }
}
