use pickwise_core::slots::SlotTracker;
use tracing::{debug, warn};

use crate::collaborators::Translator;

/// Assembles the search query from filled slots and routes it through the
/// translator when it contains script the search agent cannot work with.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueryBuilder;

impl QueryBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Filled slot values joined by single spaces, in slot-map order.
    pub fn raw_query(&self, slots: &SlotTracker) -> String {
        slots.filled_values().join(" ")
    }

    pub async fn build(&self, slots: &SlotTracker, translator: &dyn Translator) -> String {
        let query = self.raw_query(slots);
        if !needs_translation(&query) {
            return query;
        }

        match translator.translate(&query).await {
            Ok(translated) if !translated.trim().is_empty() => {
                debug!(
                    event_name = "query.translated",
                    original = %query,
                    translated = %translated,
                    "translated search query"
                );
                translated.trim().to_string()
            }
            Ok(_) => {
                warn!(event_name = "query.translation_empty", "translator returned nothing");
                query
            }
            Err(error) => {
                warn!(
                    event_name = "query.translation_failed",
                    error = %error,
                    "translation failed; searching with the original query"
                );
                query
            }
        }
    }
}

/// True when the text carries letters outside the Latin script ranges
/// (ASCII and Latin-1 Supplement through Latin Extended-B).
pub fn needs_translation(text: &str) -> bool {
    text.chars()
        .any(|character| character.is_alphabetic() && !character.is_ascii() && !is_latin(character))
}

fn is_latin(character: char) -> bool {
    matches!(character, '\u{00C0}'..='\u{024F}')
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use pickwise_core::errors::CollaboratorError;
    use pickwise_core::slots::SlotTracker;
    use serde_json::json;

    use super::{needs_translation, QueryBuilder};
    use crate::collaborators::Translator;

    struct FixedTranslator {
        reply: Result<String, CollaboratorError>,
        calls: AtomicUsize,
    }

    impl FixedTranslator {
        fn new(reply: Result<String, CollaboratorError>) -> Self {
            Self { reply, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl Translator for FixedTranslator {
        async fn translate(&self, _text: &str) -> Result<String, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    fn slots(pairs: &[(&str, serde_json::Value)]) -> SlotTracker {
        let mut tracker = SlotTracker::default();
        tracker.update(pairs.iter().map(|(slot, value)| ((*slot).to_string(), value.clone())));
        tracker
    }

    #[test]
    fn script_detection_ignores_latin_accents() {
        assert!(!needs_translation("brushed nickel knob"));
        assert!(!needs_translation("poignée en laiton"));
        assert!(needs_translation("不锈钢 handle"));
        assert!(needs_translation("ручка"));
    }

    #[tokio::test]
    async fn latin_query_skips_translation() {
        let translator = FixedTranslator::new(Ok("unused".to_string()));
        let tracker = slots(&[("category", json!("knob")), ("style", json!("modern"))]);

        let query = QueryBuilder::new().build(&tracker, &translator).await;

        assert_eq!(query, "knob modern");
        assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn non_latin_query_uses_translator_output() {
        let translator = FixedTranslator::new(Ok(" stainless steel handle ".to_string()));
        let tracker = slots(&[("category", json!("把手")), ("material", json!("不锈钢"))]);

        let query = QueryBuilder::new().build(&tracker, &translator).await;

        assert_eq!(query, "stainless steel handle");
        assert_eq!(translator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn translation_failure_keeps_original_query() {
        let translator = FixedTranslator::new(Err(CollaboratorError::Timeout {
            collaborator: "llm".to_string(),
            seconds: 30,
        }));
        let tracker = slots(&[("category", json!("把手")), ("budget", json!(25))]);

        let query = QueryBuilder::new().build(&tracker, &translator).await;

        assert_eq!(query, "25 把手");
    }
}
