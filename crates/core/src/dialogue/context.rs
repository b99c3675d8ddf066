use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dialogue::states::{DialoguePhase, PhaseTransition, UserIntent};
use crate::domain::product::ProductRecord;
use crate::slots::SlotTracker;

pub const DEFAULT_MAX_PRODUCTS: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(format!("session_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub text: String,
    pub phase: DialoguePhase,
    pub turn: u64,
    pub timestamp: DateTime<Utc>,
}

/// Mutable state of one conversation, owned by exactly one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DialogueContext {
    pub session_id: SessionId,
    pub started_at: DateTime<Utc>,
    pub phase: DialoguePhase,
    pub slots: SlotTracker,
    pub history: Vec<HistoryEntry>,
    pub clarification_questions: Vec<String>,
    pub current_products: Vec<ProductRecord>,
    pub selected_product: Option<ProductRecord>,
    pub turn_count: u64,
    pub last_user_input: String,
    pub last_system_response: String,
    max_products: usize,
}

impl DialogueContext {
    pub fn new(session_id: SessionId, slots: SlotTracker, max_products: usize) -> Self {
        Self {
            session_id,
            started_at: Utc::now(),
            phase: DialoguePhase::Init,
            slots,
            history: Vec::new(),
            clarification_questions: Vec::new(),
            current_products: Vec::new(),
            selected_product: None,
            turn_count: 0,
            last_user_input: String::new(),
            last_system_response: String::new(),
            max_products,
        }
    }

    pub fn max_products(&self) -> usize {
        self.max_products
    }

    /// Opens a turn: bumps the counter by one and records the utterance.
    pub fn begin_turn(&mut self, utterance: &str) {
        self.turn_count += 1;
        self.last_user_input = utterance.to_string();
        self.push_history(Role::User, utterance);
    }

    pub fn record_response(&mut self, response: &str) {
        self.last_system_response = response.to_string();
        self.push_history(Role::Assistant, response);
    }

    pub fn transition(&mut self, to: DialoguePhase, intent: UserIntent) -> PhaseTransition {
        let transition = PhaseTransition { from: self.phase, to, intent };
        self.phase = to;
        transition
    }

    /// Replaces (never merges) the product list, capped at the session maximum.
    pub fn replace_products(&mut self, mut products: Vec<ProductRecord>) {
        products.truncate(self.max_products);
        self.current_products = products;
    }

    /// Clears everything gathered so far. History and the turn counter are
    /// append-only and survive a restart.
    pub fn reset(&mut self) {
        self.slots.clear();
        self.current_products.clear();
        self.selected_product = None;
    }

    fn push_history(&mut self, role: Role, text: &str) {
        self.history.push(HistoryEntry {
            role,
            text: text.to_string(),
            phase: self.phase,
            turn: self.turn_count,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::dialogue::context::{DialogueContext, Role, SessionId};
    use crate::dialogue::states::{DialoguePhase, UserIntent};
    use crate::domain::product::ProductRecord;
    use crate::slots::SlotTracker;

    fn context() -> DialogueContext {
        DialogueContext::new(SessionId("session_test".to_owned()), SlotTracker::default(), 2)
    }

    #[test]
    fn turns_are_counted_and_recorded_in_order() {
        let mut context = context();
        context.begin_turn("hello");
        context.record_response("Good morning!");
        context.begin_turn("a brass knob");

        assert_eq!(context.turn_count, 2);
        assert_eq!(context.history.len(), 3);
        assert_eq!(context.history[0].role, Role::User);
        assert_eq!(context.history[1].role, Role::Assistant);
        assert_eq!(context.history[2].turn, 2);
        assert_eq!(context.last_user_input, "a brass knob");
        assert_eq!(context.history[1].text, "Good morning!");
    }

    #[test]
    fn product_list_is_replaced_and_capped() {
        let mut context = context();
        let product = |name: &str| {
            ProductRecord::from_value(json!({ "name": name })).expect("object literal")
        };
        context.replace_products(vec![product("A"), product("B"), product("C")]);
        assert_eq!(context.current_products.len(), 2);

        context.replace_products(vec![product("D")]);
        assert_eq!(context.current_products, vec![product("D")]);
    }

    #[test]
    fn transition_reports_previous_phase() {
        let mut context = context();
        let transition = context.transition(DialoguePhase::Greeting, UserIntent::Greeting);

        assert_eq!(transition.from, DialoguePhase::Init);
        assert_eq!(transition.to, DialoguePhase::Greeting);
        assert!(transition.is_change());
        assert_eq!(context.phase, DialoguePhase::Greeting);
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionId::generate(), SessionId::generate());
    }
}
