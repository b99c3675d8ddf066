//! Reduces an extracted product list to a handful of distinct entries.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::dialogue::context::DEFAULT_MAX_PRODUCTS;
use crate::domain::product::{ProductRecord, MISSING_NAME};

/// A strict pass keeping fewer records than this triggers the relaxed pass.
pub const DEFAULT_RELAXED_BELOW: usize = 3;

const STOP_WORDS: [&str; 14] =
    ["the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by"];

/// How two relaxed-pass names relate to each other.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NameRelation {
    Identical,
    /// Same core name with a different trailing `- <digits>` model number.
    ModelVariant,
    Distinct,
}

impl NameRelation {
    pub fn between(left: &str, right: &str) -> Self {
        if left == right {
            return Self::Identical;
        }
        let left_core = strip_model_suffix(left);
        if !left_core.is_empty() && left_core == strip_model_suffix(right) {
            Self::ModelVariant
        } else {
            Self::Distinct
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deduplicator {
    pub max_products: usize,
    pub relaxed_below: usize,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self { max_products: DEFAULT_MAX_PRODUCTS, relaxed_below: DEFAULT_RELAXED_BELOW }
    }
}

impl Deduplicator {
    pub fn new(max_products: usize, relaxed_below: usize) -> Self {
        Self { max_products, relaxed_below }
    }

    /// Strict pass first. When the strict result is thin the relaxed pass
    /// runs over the original input and its result is final, so unnamed
    /// records never survive a relaxed run.
    pub fn deduplicate(&self, records: &[ProductRecord]) -> Vec<ProductRecord> {
        let strict = self.strict(records);
        if strict.len() >= self.relaxed_below {
            return strict;
        }

        let relaxed = self.relaxed(records);
        debug!(
            event_name = "dedup.relaxed_pass",
            input_count = records.len(),
            strict_count = strict.len(),
            relaxed_count = relaxed.len(),
            "strict deduplication kept too few products"
        );
        relaxed
    }

    /// First record per normalized display name, in input order.
    pub fn strict(&self, records: &[ProductRecord]) -> Vec<ProductRecord> {
        let mut seen = HashSet::new();
        records
            .iter()
            .filter(|record| seen.insert(normalize_name(&record.display_name())))
            .take(self.max_products)
            .cloned()
            .collect()
    }

    /// Drops unnamed records and exact (case-insensitive) repeats only.
    pub fn relaxed(&self, records: &[ProductRecord]) -> Vec<ProductRecord> {
        let mut kept: Vec<(String, &ProductRecord)> = Vec::new();

        for record in records {
            if kept.len() >= self.max_products {
                break;
            }
            let name = record.display_name();
            let name = name.trim();
            if name.is_empty() || name == MISSING_NAME {
                continue;
            }
            let lowered = name.to_lowercase();

            let mut duplicate = false;
            for (existing, _) in &kept {
                match NameRelation::between(&lowered, existing) {
                    NameRelation::Identical => {
                        duplicate = true;
                        break;
                    }
                    NameRelation::ModelVariant => {
                        debug!(
                            event_name = "dedup.model_variant_kept",
                            candidate = %lowered,
                            existing = %existing,
                            "keeping model variant of an already listed product"
                        );
                    }
                    NameRelation::Distinct => {}
                }
            }
            if !duplicate {
                kept.push((lowered, record));
            }
        }

        kept.into_iter().map(|(_, record)| record.clone()).collect()
    }
}

/// Lowercased, punctuation-free, stop-word-free form used by the strict pass.
pub fn normalize_name(name: &str) -> String {
    if name.is_empty() || name == MISSING_NAME {
        return String::new();
    }
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .filter(|character| character.is_alphanumeric() || character.is_whitespace())
        .collect();
    cleaned
        .split_whitespace()
        .filter(|word| !STOP_WORDS.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_model_suffix(name: &str) -> &str {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"\s*-\s*\d+\s*$").expect("model suffix pattern is a valid regex")
    });
    match pattern.find(name) {
        Some(found) => name[..found.start()].trim(),
        None => name.trim(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{normalize_name, Deduplicator, NameRelation};
    use crate::domain::product::ProductRecord;

    fn named(names: &[&str]) -> Vec<ProductRecord> {
        names
            .iter()
            .map(|name| ProductRecord::from_value(json!({ "name": name })).expect("object literal"))
            .collect()
    }

    fn names_of(records: &[ProductRecord]) -> Vec<String> {
        records.iter().map(ProductRecord::display_name).collect()
    }

    #[test]
    fn normalization_drops_punctuation_and_stop_words() {
        assert_eq!(normalize_name("The Steel Knob - 305"), "steel knob 305");
        assert_eq!(normalize_name("Pull for the Kitchen, Matte!"), "pull kitchen matte");
        assert_eq!(normalize_name("N/A"), "");
    }

    #[test]
    fn case_variants_collapse_but_model_numbers_do_not() {
        let records = named(&["Steel Knob - 305", "steel knob - 305", "Steel Knob - 306"]);
        let deduplicator = Deduplicator::default();

        let strict = deduplicator.strict(&records);
        assert_eq!(names_of(&strict), vec!["Steel Knob - 305", "Steel Knob - 306"]);

        let final_list = deduplicator.deduplicate(&records);
        assert_eq!(names_of(&final_list), vec!["Steel Knob - 305", "Steel Knob - 306"]);
    }

    #[test]
    fn relaxed_pass_keeps_model_variants() {
        let records = named(&["Modern Pull - 100", "Modern Pull - 200"]);
        let final_list = Deduplicator::default().deduplicate(&records);

        assert_eq!(names_of(&final_list), vec!["Modern Pull - 100", "Modern Pull - 200"]);
        assert_eq!(
            NameRelation::between("modern pull - 100", "modern pull - 200"),
            NameRelation::ModelVariant
        );
    }

    #[test]
    fn relaxed_pass_recovers_names_the_strict_pass_merges() {
        // Differ only by punctuation and a stop word, so strict sees one name.
        let records = named(&["Bar Pull (Black)", "The Bar Pull Black", "bar pull (black)"]);
        let deduplicator = Deduplicator::default();

        assert_eq!(deduplicator.strict(&records).len(), 1);
        assert_eq!(
            names_of(&deduplicator.deduplicate(&records)),
            vec!["Bar Pull (Black)", "The Bar Pull Black"]
        );
    }

    #[test]
    fn unnamed_records_are_dropped_once_the_relaxed_pass_runs() {
        let unnamed = vec![
            ProductRecord::from_value(json!({"sku": "A"})).expect("object literal"),
            ProductRecord::from_value(json!({"error": "captcha required"})).expect("object literal"),
        ];
        assert!(Deduplicator::default().deduplicate(&unnamed).is_empty());

        let mixed = vec![
            ProductRecord::from_value(json!({"sku": "A"})).expect("object literal"),
            ProductRecord::from_value(json!({"name": "Bar Pull"})).expect("object literal"),
        ];
        assert_eq!(names_of(&Deduplicator::default().deduplicate(&mixed)), vec!["Bar Pull"]);
    }

    #[test]
    fn output_is_capped_at_max_products() {
        let records = named(&["A1", "B2", "C3", "D4", "E5", "F6", "G7"]);
        assert_eq!(Deduplicator::default().deduplicate(&records).len(), 5);
        assert_eq!(Deduplicator::new(2, 3).deduplicate(&records).len(), 2);
    }
}
