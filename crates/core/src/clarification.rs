//! Chooses the next question to ask while slots are still being gathered.

use serde::{Deserialize, Serialize};

use crate::slots::SlotTracker;

pub const DEFAULT_CLARIFICATION_FLOOR: f64 = 0.3;

pub const READY_TO_SEARCH: &str = "Information is complete, let me search for products for you...";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarificationPrompt {
    /// Slot the question targets; `None` for the ready-to-search message.
    pub slot: Option<String>,
    pub question: String,
}

impl ClarificationPrompt {
    fn about(slot: &str, question: String) -> Self {
        Self { slot: Some(slot.to_string()), question }
    }

    fn ready() -> Self {
        Self { slot: None, question: READY_TO_SEARCH.to_string() }
    }
}

/// Completion-rate bands that decide how specific the next question is.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClarificationPolicy {
    /// Below this rate the shopper is asked a basic per-slot question.
    pub floor: f64,
    /// At or above this rate only optional slots are asked about.
    pub sufficiency: f64,
}

impl Default for ClarificationPolicy {
    fn default() -> Self {
        Self {
            floor: DEFAULT_CLARIFICATION_FLOOR,
            sufficiency: crate::slots::DEFAULT_SUFFICIENCY_THRESHOLD,
        }
    }
}

impl ClarificationPolicy {
    pub fn new(floor: f64, sufficiency: f64) -> Self {
        Self { floor, sufficiency }
    }

    pub fn next_prompt(&self, slots: &SlotTracker) -> ClarificationPrompt {
        let missing = slots.missing_required();
        let rate = slots.completion_rate();

        let Some(first_missing) = missing.first() else {
            return ClarificationPrompt::ready();
        };

        if rate < self.floor {
            return ClarificationPrompt::about(first_missing, basic_question(first_missing));
        }

        if rate < self.sufficiency {
            let slot = ["style", "material"]
                .into_iter()
                .find(|preferred| missing.iter().any(|slot| slot == preferred));
            return match slot {
                Some("style") => ClarificationPrompt::about(
                    "style",
                    "What style do you want for the product? Modern minimalist, European classical, or other styles?"
                        .to_string(),
                ),
                Some(other) => ClarificationPrompt::about(
                    other,
                    "What material preferences do you have? For example: stainless steel, brass, zinc alloy, etc."
                        .to_string(),
                ),
                None => ClarificationPrompt::about(
                    first_missing,
                    format!("Please supplement the information about {}", humanize(first_missing)),
                ),
            };
        }

        match slots.missing_optional().first() {
            Some(optional) => ClarificationPrompt::about(
                optional,
                format!("Do you have any requirements for {}?", humanize(optional)),
            ),
            None => ClarificationPrompt::ready(),
        }
    }
}

fn basic_question(slot: &str) -> String {
    match slot {
        "category" => "What type of product do you need? For example: door handles, drawer pulls, cabinet handles, etc.",
        "usage" => "Where will this product be used? For example: kitchen cabinets, bedroom wardrobes, bathroom cabinets, etc.",
        "style" => "What style do you prefer? For example: modern minimalist, European classical, industrial style, etc.",
        "material" => "What material requirements do you have? For example: stainless steel, brass, zinc alloy, etc.",
        other => return format!("Please tell me about {}", humanize(other)),
    }
    .to_string()
}

fn humanize(slot: &str) -> String {
    slot.replace('_', " ")
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::{ClarificationPolicy, READY_TO_SEARCH};
    use crate::slots::{SlotSchema, SlotTracker};

    fn tracker(pairs: &[(&str, &str)]) -> SlotTracker {
        let mut tracker = SlotTracker::default();
        tracker.update(pairs.iter().map(|(slot, value)| ((*slot).to_string(), Value::from(*value))));
        tracker
    }

    #[test]
    fn empty_session_asks_for_category_first() {
        let prompt = ClarificationPolicy::default().next_prompt(&tracker(&[]));
        assert_eq!(prompt.slot.as_deref(), Some("category"));
        assert!(prompt.question.starts_with("What type of product do you need?"));
    }

    #[test]
    fn low_rate_uses_the_slot_specific_template() {
        let prompt = ClarificationPolicy::default().next_prompt(&tracker(&[("category", "knob")]));
        assert_eq!(prompt.slot.as_deref(), Some("usage"));
        assert!(prompt.question.starts_with("Where will this product be used?"));
    }

    #[test]
    fn unknown_required_slot_falls_back_to_generic_template() {
        let schema = SlotSchema {
            required: vec!["mounting_hole_spacing".to_string()],
            optional: vec!["budget".to_string(), "color_preference".to_string(), "brand".to_string()],
        };
        let prompt = ClarificationPolicy::default().next_prompt(&SlotTracker::new(schema, 0.7));
        assert_eq!(prompt.question, "Please tell me about mounting hole spacing");
    }

    #[test]
    fn middle_band_prefers_style_then_material() {
        let policy = ClarificationPolicy::default();

        let style = policy.next_prompt(&tracker(&[
            ("category", "knob"),
            ("usage", "kitchen"),
            ("budget", "20"),
        ]));
        assert_eq!(style.slot.as_deref(), Some("style"));
        assert!(style.question.starts_with("What style do you want for the product?"));

        let material = policy.next_prompt(&tracker(&[
            ("category", "knob"),
            ("usage", "kitchen"),
            ("style", "modern"),
        ]));
        assert_eq!(material.slot.as_deref(), Some("material"));
        assert!(material.question.starts_with("What material preferences do you have?"));

        let generic = policy.next_prompt(&tracker(&[
            ("style", "modern"),
            ("material", "brass"),
            ("budget", "50"),
        ]));
        assert_eq!(generic.slot.as_deref(), Some("category"));
        assert_eq!(generic.question, "Please supplement the information about category");
    }

    #[test]
    fn high_rate_asks_about_optional_slots() {
        let prompt = ClarificationPolicy::default().next_prompt(&tracker(&[
            ("category", "knob"),
            ("usage", "kitchen"),
            ("style", "modern"),
            ("budget", "20"),
            ("brand_preference", "Richelieu"),
            ("installation_method", "screw"),
        ]));
        assert_eq!(prompt.slot.as_deref(), Some("color_preference"));
        assert_eq!(prompt.question, "Do you have any requirements for color preference?");
    }

    #[test]
    fn nothing_missing_means_ready_to_search() {
        let prompt = ClarificationPolicy::default().next_prompt(&tracker(&[
            ("category", "knob"),
            ("usage", "kitchen"),
            ("style", "modern"),
            ("material", "brass"),
        ]));
        assert_eq!(prompt.slot, None);
        assert_eq!(prompt.question, READY_TO_SEARCH);
    }
}
