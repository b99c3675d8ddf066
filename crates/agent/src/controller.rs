//! The dialogue state machine.
//!
//! One call to [`DialogueController::process_user_input`] handles exactly one
//! utterance: it bumps the turn counter, classifies intent against the
//! current phase, runs the matching handler and records the reply. Every
//! collaborator failure degrades into a user-facing message; nothing is
//! propagated to the caller.

use std::sync::Arc;

use chrono::{Local, Timelike};
use pickwise_core::audit::{
    AuditCategory, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink, DETAILS_FETCHED,
    PHASE_CHANGED, SEARCH_AGENT_FAILED, SEARCH_COMPLETED,
};
use pickwise_core::clarification::ClarificationPolicy;
use pickwise_core::config::DialogueConfig;
use pickwise_core::dedup::Deduplicator;
use pickwise_core::dialogue::{DialogueContext, DialoguePhase, PhaseTransition, SessionId, UserIntent};
use pickwise_core::domain::product::{ProductRecord, MISSING_NAME};
use pickwise_core::errors::DialogueError;
use pickwise_core::extraction::ResultExtractor;
use pickwise_core::intent::IntentClassifier;
use pickwise_core::slots::parse_slot_payload;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::collaborators::{Explainer, SearchAgent, SlotExtractor, Translator};
use crate::details::{DetailLookup, DetailOutcome};
use crate::query::QueryBuilder;
use crate::recommendation::{explain_products, render_listing};
use crate::session::SessionStore;

pub const FAREWELL: &str = "Thank you for using our system, goodbye!";
pub const RESTART_PROMPT: &str = "Alright, let's start over. Please tell me your requirements.";
pub const NO_PRODUCTS: &str = "Sorry, I couldn't find a product that meets your requirements. Please try adjusting your search criteria or re-describe your requirements.";
pub const RECOMMENDATION_DONE: &str =
    "Recommendation completed. If you want to search again, please re-describe your requirements.";

/// The four external collaborators the controller drives.
#[derive(Clone)]
pub struct Collaborators {
    pub slot_extractor: Arc<dyn SlotExtractor>,
    pub translator: Arc<dyn Translator>,
    pub search_agent: Arc<dyn SearchAgent>,
    pub explainer: Arc<dyn Explainer>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "count", rename_all = "snake_case")]
pub enum SearchStatus {
    Found(usize),
    Empty,
    AgentFailed,
}

/// Everything one processed utterance produced.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TurnOutcome {
    pub response: String,
    pub intent: UserIntent,
    pub phase: DialoguePhase,
    pub turn: u64,
    /// Set only when the turn ran a search.
    pub search: Option<SearchStatus>,
}

pub struct DialogueController {
    sessions: SessionStore,
    collaborators: Collaborators,
    settings: DialogueConfig,
    classifier: IntentClassifier,
    clarification: ClarificationPolicy,
    query_builder: QueryBuilder,
    extractor: ResultExtractor,
    deduplicator: Deduplicator,
    details: DetailLookup,
    audit: Arc<dyn AuditSink>,
}

impl DialogueController {
    pub fn new(collaborators: Collaborators, settings: DialogueConfig) -> Self {
        Self {
            sessions: SessionStore::new(),
            classifier: IntentClassifier::new(settings.intents.clone()),
            clarification: settings.clarification_policy(),
            query_builder: QueryBuilder::new(),
            extractor: ResultExtractor::new(),
            deduplicator: settings.deduplicator(),
            details: DetailLookup::new(Arc::clone(&collaborators.search_agent)),
            audit: Arc::new(TracingAuditSink),
            settings,
            collaborators,
        }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub async fn create_session(&self) -> SessionId {
        let context = DialogueContext::new(
            SessionId::generate(),
            self.settings.slot_tracker(),
            self.settings.max_products,
        );
        let session_id = self.sessions.insert(context).await;
        info!(event_name = "session.created", session_id = %session_id, "dialogue session created");
        session_id
    }

    pub async fn get_session(&self, session_id: &SessionId) -> Result<DialogueContext, DialogueError> {
        self.sessions
            .snapshot(session_id)
            .await
            .ok_or_else(|| DialogueError::SessionNotFound { session_id: session_id.to_string() })
    }

    pub async fn process_user_input(&self, session_id: &SessionId, utterance: &str) -> String {
        match self.process_turn(session_id, utterance).await {
            Ok(outcome) => outcome.response,
            Err(error) => error.user_message().to_string(),
        }
    }

    /// Like [`Self::process_user_input`], with the details the CLI reports.
    pub async fn process_turn(
        &self,
        session_id: &SessionId,
        utterance: &str,
    ) -> Result<TurnOutcome, DialogueError> {
        let Some(handle) = self.sessions.handle(session_id).await else {
            warn!(
                event_name = "session.not_found",
                session_id = %session_id,
                "utterance for unknown session"
            );
            return Err(DialogueError::SessionNotFound { session_id: session_id.to_string() });
        };

        let mut context = handle.lock().await;
        context.begin_turn(utterance);
        let intent = self.classifier.classify(utterance, context.phase);
        debug!(
            event_name = "dialogue.intent_classified",
            session_id = %session_id,
            turn = context.turn_count,
            phase = context.phase.as_str(),
            intent = intent.as_str(),
            "classified utterance"
        );

        let (response, search) = self.handle_intent(&mut context, intent, utterance).await;
        context.record_response(&response);

        Ok(TurnOutcome {
            response,
            intent,
            phase: context.phase,
            turn: context.turn_count,
            search,
        })
    }

    /// Looks up one product by name, outside any session.
    pub async fn lookup_details(&self, product_name: &str) -> DetailOutcome {
        self.details.fetch(product_name).await
    }

    /// Fetches details for products of the current recommendation, picked by
    /// 1-based position. The first pick becomes the selected product. The
    /// turn counter and phase are left alone.
    pub async fn product_details(
        &self,
        session_id: &SessionId,
        positions: &[usize],
    ) -> Result<Vec<DetailOutcome>, DialogueError> {
        let handle = self
            .sessions
            .handle(session_id)
            .await
            .ok_or_else(|| DialogueError::SessionNotFound { session_id: session_id.to_string() })?;

        let picked = {
            let mut context = handle.lock().await;
            let available = context.current_products.len();
            let mut picked = Vec::with_capacity(positions.len());
            for &position in positions {
                let product = position
                    .checked_sub(1)
                    .and_then(|index| context.current_products.get(index))
                    .filter(|product| product.display_name() != MISSING_NAME)
                    .ok_or(DialogueError::InvalidSelection { position, available })?;
                picked.push(product.clone());
            }
            if let Some(first) = picked.first() {
                context.selected_product = Some(first.clone());
            }
            picked
        };

        let names: Vec<String> = picked.iter().map(ProductRecord::display_name).collect();
        let outcomes = self.details.fetch_all(&names).await;
        for outcome in &outcomes {
            let audit_outcome = match outcome {
                DetailOutcome::Found(_) => AuditOutcome::Success,
                DetailOutcome::NotFound { .. } => AuditOutcome::Empty,
                DetailOutcome::AgentFailed { .. } => AuditOutcome::Failed,
            };
            self.audit.emit(
                AuditEvent::new(
                    session_id.clone(),
                    DETAILS_FETCHED,
                    AuditCategory::Search,
                    audit_outcome,
                )
                .with_metadata("product_name", outcome.product_name()),
            );
        }
        Ok(outcomes)
    }

    async fn handle_intent(
        &self,
        context: &mut DialogueContext,
        intent: UserIntent,
        utterance: &str,
    ) -> (String, Option<SearchStatus>) {
        match intent {
            UserIntent::Greeting => {
                self.move_to(context, DialoguePhase::Greeting, intent);
                (greeting_for_hour(Local::now().hour()), None)
            }
            UserIntent::End => {
                self.move_to(context, DialoguePhase::End, intent);
                (FAREWELL.to_string(), None)
            }
            UserIntent::Restart => {
                context.reset();
                self.move_to(context, DialoguePhase::Greeting, intent);
                (RESTART_PROMPT.to_string(), None)
            }
            UserIntent::ProductSelection | UserIntent::MoreDetails => {
                (RECOMMENDATION_DONE.to_string(), None)
            }
            UserIntent::ProductInquiry | UserIntent::ClarificationResponse => {
                self.gather(context, intent, utterance).await
            }
        }
    }

    async fn gather(
        &self,
        context: &mut DialogueContext,
        intent: UserIntent,
        utterance: &str,
    ) -> (String, Option<SearchStatus>) {
        let slots = match self.collaborators.slot_extractor.extract_slots(utterance).await {
            Ok(raw) => parse_slot_payload(&raw),
            Err(error) => {
                warn!(
                    event_name = "dialogue.slot_extraction_failed",
                    session_id = %context.session_id,
                    error = %error,
                    "slot extraction failed; keeping known slots"
                );
                Default::default()
            }
        };
        context.slots.update(slots);
        debug!(
            event_name = "dialogue.slots_updated",
            session_id = %context.session_id,
            completion_rate = context.slots.completion_rate(),
            missing_required = context.slots.missing_required().len(),
            "slot tracker updated"
        );

        if context.slots.sufficient() {
            self.move_to(context, DialoguePhase::ProductSearch, intent);
            let (response, status) = self.search(context, intent).await;
            (response, Some(status))
        } else {
            self.move_to(context, DialoguePhase::Clarification, intent);
            let prompt = self.clarification.next_prompt(&context.slots);
            context.clarification_questions.push(prompt.question.clone());
            (prompt.question, None)
        }
    }

    async fn search(
        &self,
        context: &mut DialogueContext,
        intent: UserIntent,
    ) -> (String, SearchStatus) {
        let query =
            self.query_builder.build(&context.slots, self.collaborators.translator.as_ref()).await;
        let max_products = context.max_products();

        let payload = match self.collaborators.search_agent.run_search(&query, max_products).await
        {
            Ok(payload) => payload,
            Err(error) => {
                warn!(
                    event_name = "dialogue.search_agent_failed",
                    session_id = %context.session_id,
                    query = %query,
                    error = %error,
                    "search agent failed; treating as no products"
                );
                self.audit.emit(
                    AuditEvent::new(
                        context.session_id.clone(),
                        SEARCH_AGENT_FAILED,
                        AuditCategory::Collaborator,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("query", query.clone())
                    .with_metadata("error_kind", error.kind()),
                );
                context.replace_products(Vec::new());
                return (NO_PRODUCTS.to_string(), SearchStatus::AgentFailed);
            }
        };

        let extraction = self.extractor.extract(payload);
        let extracted = extraction.records.len();
        let products = self.deduplicator.deduplicate(&extraction.records);
        let strategy = extraction.strategy.map(|strategy| strategy.as_str());
        self.record_search(context, &query, extracted, &products, strategy);

        if products.is_empty() {
            context.replace_products(Vec::new());
            return (NO_PRODUCTS.to_string(), SearchStatus::Empty);
        }

        context.replace_products(products);
        self.move_to(context, DialoguePhase::ProductRecommendation, intent);

        let user_summary = context.slots.summary();
        let recommendations = explain_products(
            self.collaborators.explainer.as_ref(),
            &user_summary,
            &context.current_products,
        )
        .await;
        (render_listing(&recommendations), SearchStatus::Found(context.current_products.len()))
    }

    fn record_search(
        &self,
        context: &DialogueContext,
        query: &str,
        extracted: usize,
        products: &[ProductRecord],
        strategy: Option<&'static str>,
    ) {
        info!(
            event_name = "dialogue.search_completed",
            session_id = %context.session_id,
            turn = context.turn_count,
            query = %query,
            extracted,
            kept = products.len(),
            strategy = strategy.unwrap_or("structured"),
            "search finished"
        );
        let outcome = if products.is_empty() { AuditOutcome::Empty } else { AuditOutcome::Success };
        self.audit.emit(
            AuditEvent::new(
                context.session_id.clone(),
                SEARCH_COMPLETED,
                AuditCategory::Search,
                outcome,
            )
            .with_metadata("query", query)
            .with_metadata("extracted", extracted.to_string())
            .with_metadata("kept", products.len().to_string()),
        );
    }

    fn move_to(&self, context: &mut DialogueContext, to: DialoguePhase, intent: UserIntent) {
        let transition = context.transition(to, intent);
        if transition.is_change() {
            self.emit_transition(&context.session_id, &transition);
        }
    }

    fn emit_transition(&self, session_id: &SessionId, transition: &PhaseTransition) {
        debug!(
            event_name = "dialogue.phase_changed",
            session_id = %session_id,
            from = transition.from.as_str(),
            to = transition.to.as_str(),
            intent = transition.intent.as_str(),
            "dialogue phase changed"
        );
        self.audit.emit(
            AuditEvent::new(
                session_id.clone(),
                PHASE_CHANGED,
                AuditCategory::Dialogue,
                AuditOutcome::Success,
            )
            .with_metadata("from", transition.from.as_str())
            .with_metadata("to", transition.to.as_str())
            .with_metadata("intent", transition.intent.as_str()),
        );
    }
}

/// Morning from 05:00, afternoon from 12:00, evening from 18:00.
pub fn greeting_for_hour(hour: u32) -> String {
    let salutation = match hour {
        5..=11 => "Good morning",
        12..=17 => "Good afternoon",
        _ => "Good evening",
    };
    format!(
        "{salutation}! I'm your intelligent product recommendation assistant. Please tell me what type of product you need, and I'll help you find the most suitable one."
    )
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use pickwise_core::audit::{
        InMemoryAuditSink, DETAILS_FETCHED, PHASE_CHANGED, SEARCH_AGENT_FAILED, SEARCH_COMPLETED,
    };
    use pickwise_core::config::DialogueConfig;
    use pickwise_core::dialogue::{DialoguePhase, SessionId, UserIntent};
    use pickwise_core::errors::{CollaboratorError, DialogueError};
    use pickwise_core::extraction::RawAgentResult;

    use super::{
        greeting_for_hour, Collaborators, DialogueController, SearchStatus, FAREWELL, NO_PRODUCTS,
        RECOMMENDATION_DONE, RESTART_PROMPT,
    };
    use crate::collaborators::{Explainer, SearchAgent, SlotExtractor, Translator};
    use crate::details::DetailOutcome;
    use crate::recommendation::FALLBACK_REASON;

    /// Replies with queued payloads, then `{}` once the queue is drained.
    struct ScriptedSlots {
        replies: Mutex<VecDeque<Result<String, CollaboratorError>>>,
    }

    impl ScriptedSlots {
        fn new(replies: Vec<Result<String, CollaboratorError>>) -> Self {
            Self { replies: Mutex::new(replies.into()) }
        }
    }

    #[async_trait]
    impl SlotExtractor for ScriptedSlots {
        async fn extract_slots(&self, _utterance: &str) -> Result<String, CollaboratorError> {
            self.replies
                .lock()
                .expect("slot script")
                .pop_front()
                .unwrap_or_else(|| Ok("{}".to_string()))
        }
    }

    struct EchoTranslator;

    #[async_trait]
    impl Translator for EchoTranslator {
        async fn translate(&self, text: &str) -> Result<String, CollaboratorError> {
            Ok(text.to_string())
        }
    }

    struct FixedSearch {
        reply: Result<RawAgentResult, CollaboratorError>,
        queries: Mutex<Vec<(String, usize)>>,
        detail_requests: Mutex<Vec<String>>,
    }

    impl FixedSearch {
        fn new(reply: Result<RawAgentResult, CollaboratorError>) -> Self {
            Self { reply, queries: Mutex::new(Vec::new()), detail_requests: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl SearchAgent for FixedSearch {
        async fn run_search(
            &self,
            query: &str,
            max_results: usize,
        ) -> Result<RawAgentResult, CollaboratorError> {
            self.queries.lock().expect("query log").push((query.to_string(), max_results));
            self.reply.clone()
        }

        async fn fetch_details(
            &self,
            product_name: &str,
        ) -> Result<RawAgentResult, CollaboratorError> {
            self.detail_requests.lock().expect("detail log").push(product_name.to_string());
            Ok(RawAgentResult::Text(format!(
                r#"{{"name": "{product_name}", "finish": "brushed"}}"#
            )))
        }
    }

    struct CountingExplainer {
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Explainer for CountingExplainer {
        async fn explain(
            &self,
            _user_summary: &str,
            product_summary: &str,
        ) -> Result<String, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(CollaboratorError::Unavailable {
                    collaborator: "llm".to_string(),
                    message: "quota exhausted".to_string(),
                })
            } else {
                Ok(format!("Good match: {product_summary}"))
            }
        }
    }

    const FULL_SLOTS: &str =
        r#"{"category": "knob", "usage": "kitchen", "style": "modern", "material": "brass"}"#;
    const AGENT_OUTPUT: &str = r#"Done. [{"name": "Modern Pull - 100", "description": "Brushed"}, {"name": "Modern Pull - 200", "description": null}, {"name": "modern pull - 100"}]"#;

    struct Harness {
        controller: DialogueController,
        search: Arc<FixedSearch>,
        explainer: Arc<CountingExplainer>,
        audit: InMemoryAuditSink,
    }

    fn harness(
        slots: Vec<Result<String, CollaboratorError>>,
        search: Result<RawAgentResult, CollaboratorError>,
        explainer_fails: bool,
    ) -> Harness {
        harness_with(slots, search, explainer_fails, DialogueConfig::default())
    }

    fn harness_with(
        slots: Vec<Result<String, CollaboratorError>>,
        search: Result<RawAgentResult, CollaboratorError>,
        explainer_fails: bool,
        settings: DialogueConfig,
    ) -> Harness {
        let search = Arc::new(FixedSearch::new(search));
        let explainer =
            Arc::new(CountingExplainer { fail: explainer_fails, calls: AtomicUsize::new(0) });
        let audit = InMemoryAuditSink::default();
        let controller = DialogueController::new(
            Collaborators {
                slot_extractor: Arc::new(ScriptedSlots::new(slots)),
                translator: Arc::new(EchoTranslator),
                search_agent: search.clone(),
                explainer: explainer.clone(),
            },
            settings,
        )
        .with_audit_sink(Arc::new(audit.clone()));
        Harness { controller, search, explainer, audit }
    }

    fn found(text: &str) -> Result<RawAgentResult, CollaboratorError> {
        Ok(RawAgentResult::Text(text.to_string()))
    }

    #[tokio::test]
    async fn turn_count_tracks_every_utterance() {
        let h = harness(Vec::new(), found("[]"), false);
        let id = h.controller.create_session().await;

        for utterance in ["hello", "a knob", "select number 2", "more details", "bye"] {
            h.controller.process_user_input(&id, utterance).await;
        }

        let session = h.controller.get_session(&id).await.expect("session");
        assert_eq!(session.turn_count, 5);
        assert_eq!(session.history.len(), 10);
        assert_eq!(session.phase, DialoguePhase::End);
        assert_eq!(session.last_system_response, FAREWELL);
    }

    #[tokio::test]
    async fn unknown_session_gets_fixed_message() {
        let h = harness(Vec::new(), found("[]"), false);
        let missing = SessionId("session_missing".to_string());

        let response = h.controller.process_user_input(&missing, "hello").await;
        assert_eq!(response, "Session does not exist, please start over.");
        assert!(matches!(
            h.controller.get_session(&missing).await,
            Err(DialogueError::SessionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn partial_slots_lead_to_clarification() {
        let h = harness(
            vec![Ok(r#"```json
{"category": "knob", "usage": "kitchen", "budget": "20"}
```"#
                .to_string())],
            found("[]"),
            false,
        );
        let id = h.controller.create_session().await;

        let outcome = h.controller.process_turn(&id, "a kitchen knob under 20").await.expect("turn");

        assert_eq!(outcome.intent, UserIntent::ProductInquiry);
        assert_eq!(outcome.phase, DialoguePhase::Clarification);
        assert!(outcome.response.starts_with("What style do you want for the product?"));
        assert_eq!(outcome.search, None);

        let session = h.controller.get_session(&id).await.expect("session");
        assert_eq!(session.clarification_questions, vec![outcome.response.clone()]);
        assert!(h.search.queries.lock().expect("query log").is_empty());
    }

    #[tokio::test]
    async fn clarification_answer_completes_slots_and_searches() {
        let h = harness(
            vec![
                Ok(r#"{"category": "knob", "usage": "kitchen"}"#.to_string()),
                Ok(r#"{"style": "modern", "material": "brass"}"#.to_string()),
            ],
            found(AGENT_OUTPUT),
            false,
        );
        let id = h.controller.create_session().await;

        h.controller.process_user_input(&id, "kitchen knob").await;
        let outcome = h.controller.process_turn(&id, "modern, brass").await.expect("turn");

        assert_eq!(outcome.intent, UserIntent::ClarificationResponse);
        assert_eq!(outcome.phase, DialoguePhase::ProductRecommendation);
        assert_eq!(outcome.search, Some(SearchStatus::Found(2)));
        assert!(outcome.response.contains("1. Modern Pull - 100\n"));
        assert!(outcome
            .response
            .contains("   Recommendation reason: Good match: Modern Pull - 100 - Brushed"));
        assert!(outcome.response.contains("2. Modern Pull - 200\n"));

        let queries = h.search.queries.lock().expect("query log").clone();
        assert_eq!(queries, vec![("knob brass modern kitchen".to_string(), 5)]);
        assert_eq!(h.explainer.calls.load(Ordering::SeqCst), 2);

        let session = h.controller.get_session(&id).await.expect("session");
        assert_eq!(session.current_products.len(), 2);
        assert_eq!(h.audit.events_of_type(SEARCH_COMPLETED).len(), 1);
    }

    #[tokio::test]
    async fn agent_failure_reads_as_no_products() {
        let h = harness(
            vec![Ok(FULL_SLOTS.to_string())],
            Err(CollaboratorError::NonZeroExit {
                collaborator: "search_agent".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "browser crashed".to_string(),
            }),
            false,
        );
        let id = h.controller.create_session().await;

        let outcome = h.controller.process_turn(&id, "modern brass kitchen knob").await.expect("turn");

        assert_eq!(outcome.response, NO_PRODUCTS);
        assert_eq!(outcome.search, Some(SearchStatus::AgentFailed));
        assert_eq!(outcome.phase, DialoguePhase::ProductSearch);
        assert_eq!(h.audit.events_of_type(SEARCH_AGENT_FAILED).len(), 1);
    }

    #[tokio::test]
    async fn unparseable_agent_output_reads_as_no_products() {
        let h = harness(vec![Ok(FULL_SLOTS.to_string())], found("I could not load the page."), false);
        let id = h.controller.create_session().await;

        let outcome = h.controller.process_turn(&id, "modern brass kitchen knob").await.expect("turn");

        assert_eq!(outcome.response, NO_PRODUCTS);
        assert_eq!(outcome.search, Some(SearchStatus::Empty));
    }

    #[tokio::test]
    async fn records_without_names_read_as_no_products() {
        let h = harness(
            vec![Ok(FULL_SLOTS.to_string())],
            found(r#"Blocked: [{"error": "captcha required"}]"#),
            false,
        );
        let id = h.controller.create_session().await;

        let outcome = h.controller.process_turn(&id, "modern brass kitchen knob").await.expect("turn");

        assert_eq!(outcome.response, NO_PRODUCTS);
        assert_eq!(outcome.search, Some(SearchStatus::Empty));
        assert_eq!(outcome.phase, DialoguePhase::ProductSearch);
        assert_eq!(h.explainer.calls.load(Ordering::SeqCst), 0);

        let session = h.controller.get_session(&id).await.expect("session");
        assert!(session.current_products.is_empty());
    }

    #[tokio::test]
    async fn configured_intent_words_drive_classification() {
        let mut settings = DialogueConfig::default();
        settings.intents.end.push("ciao".to_string());
        settings.intents.greeting = vec!["howdy".to_string()];
        let h = harness_with(Vec::new(), found("[]"), false, settings);
        let id = h.controller.create_session().await;

        let greeting = h.controller.process_turn(&id, "howdy").await.expect("turn");
        assert_eq!(greeting.intent, UserIntent::Greeting);

        let replaced = h.controller.process_turn(&id, "hello").await.expect("turn");
        assert_eq!(replaced.intent, UserIntent::ProductInquiry);

        let farewell = h.controller.process_turn(&id, "ok ciao").await.expect("turn");
        assert_eq!(farewell.intent, UserIntent::End);
        assert_eq!(farewell.response, FAREWELL);
    }

    #[tokio::test]
    async fn explanation_failure_uses_fallback_reason() {
        let h = harness(vec![Ok(FULL_SLOTS.to_string())], found(AGENT_OUTPUT), true);
        let id = h.controller.create_session().await;

        let response = h.controller.process_user_input(&id, "modern brass kitchen knob").await;

        assert_eq!(response.matches(FALLBACK_REASON).count(), 2);
    }

    #[tokio::test]
    async fn slot_extraction_failure_keeps_known_slots() {
        let h = harness(
            vec![
                Ok(r#"{"category": "hinge"}"#.to_string()),
                Err(CollaboratorError::Timeout { collaborator: "llm".to_string(), seconds: 30 }),
            ],
            found("[]"),
            false,
        );
        let id = h.controller.create_session().await;

        h.controller.process_user_input(&id, "a hinge").await;
        let outcome = h.controller.process_turn(&id, "for the bathroom").await.expect("turn");

        assert_eq!(outcome.phase, DialoguePhase::Clarification);
        let session = h.controller.get_session(&id).await.expect("session");
        assert_eq!(session.slots.summary(), "category:hinge");
    }

    #[tokio::test]
    async fn restart_clears_everything_from_any_phase() {
        let h = harness(vec![Ok(FULL_SLOTS.to_string())], found(AGENT_OUTPUT), false);
        let id = h.controller.create_session().await;

        h.controller.process_user_input(&id, "modern brass kitchen knob").await;
        let before = h.controller.get_session(&id).await.expect("session");
        assert!(!before.current_products.is_empty());

        let response = h.controller.process_user_input(&id, "let's start over").await;
        assert_eq!(response, RESTART_PROMPT);

        let after = h.controller.get_session(&id).await.expect("session");
        assert_eq!(after.phase, DialoguePhase::Greeting);
        assert!(after.slots.is_empty());
        assert!(after.current_products.is_empty());
        assert!(after.selected_product.is_none());
        assert_eq!(after.turn_count, 2);
    }

    #[tokio::test]
    async fn selection_and_details_do_not_change_phase() {
        let h = harness(vec![Ok(FULL_SLOTS.to_string())], found(AGENT_OUTPUT), false);
        let id = h.controller.create_session().await;
        h.controller.process_user_input(&id, "modern brass kitchen knob").await;

        let selection = h.controller.process_turn(&id, "I choose number 1").await.expect("turn");
        let details = h.controller.process_turn(&id, "more specs please").await.expect("turn");

        assert_eq!(selection.response, RECOMMENDATION_DONE);
        assert_eq!(details.intent, UserIntent::MoreDetails);
        assert_eq!(details.phase, DialoguePhase::ProductRecommendation);
    }

    #[tokio::test]
    async fn picked_products_are_looked_up_in_pick_order() {
        let h = harness(vec![Ok(FULL_SLOTS.to_string())], found(AGENT_OUTPUT), false);
        let id = h.controller.create_session().await;
        h.controller.process_user_input(&id, "modern brass kitchen knob").await;

        let outcomes = h.controller.product_details(&id, &[2, 1]).await.expect("details");

        let names: Vec<&str> = outcomes.iter().map(DetailOutcome::product_name).collect();
        assert_eq!(names, vec!["Modern Pull - 200", "Modern Pull - 100"]);
        assert!(outcomes.iter().all(DetailOutcome::is_found));

        let session = h.controller.get_session(&id).await.expect("session");
        let selected = session.selected_product.expect("selected product");
        assert_eq!(selected.display_name(), "Modern Pull - 200");
        assert_eq!(session.turn_count, 1);
        assert_eq!(session.phase, DialoguePhase::ProductRecommendation);
        assert_eq!(h.audit.events_of_type(DETAILS_FETCHED).len(), 2);
    }

    #[tokio::test]
    async fn out_of_range_pick_runs_no_lookup() {
        let h = harness(vec![Ok(FULL_SLOTS.to_string())], found(AGENT_OUTPUT), false);
        let id = h.controller.create_session().await;
        h.controller.process_user_input(&id, "modern brass kitchen knob").await;

        for position in [0, 3] {
            assert_eq!(
                h.controller.product_details(&id, &[1, position]).await,
                Err(DialogueError::InvalidSelection { position, available: 2 })
            );
        }
        assert!(h.search.detail_requests.lock().expect("detail log").is_empty());
        let session = h.controller.get_session(&id).await.expect("session");
        assert!(session.selected_product.is_none());
    }

    #[tokio::test]
    async fn detail_lookup_by_name_needs_no_session() {
        let h = harness(Vec::new(), found("[]"), false);

        let outcome = h.controller.lookup_details("Cup Pull").await;

        let DetailOutcome::Found(details) = outcome else {
            panic!("expected details");
        };
        assert_eq!(details.record.get("finish"), Some(&serde_json::json!("brushed")));
        assert_eq!(*h.search.detail_requests.lock().expect("detail log"), vec!["Cup Pull"]);
    }

    #[tokio::test]
    async fn phase_changes_are_audited() {
        let h = harness(Vec::new(), found("[]"), false);
        let id = h.controller.create_session().await;

        h.controller.process_user_input(&id, "hello").await;
        h.controller.process_user_input(&id, "hi again").await;
        h.controller.process_user_input(&id, "goodbye").await;

        let phases: Vec<String> = h
            .audit
            .events_of_type(PHASE_CHANGED)
            .iter()
            .filter_map(|event| event.metadata.get("to").cloned())
            .collect();
        assert_eq!(phases, vec!["greeting".to_string(), "end".to_string()]);
    }

    #[tokio::test]
    async fn sessions_advance_concurrently_without_interference() {
        let h = Arc::new(harness(Vec::new(), found("[]"), false));
        let first = h.controller.create_session().await;
        let second = h.controller.create_session().await;

        let mut tasks = Vec::new();
        for (session, count) in [(first.clone(), 3_u64), (second.clone(), 5_u64)] {
            for _ in 0..count {
                let h = Arc::clone(&h);
                let session = session.clone();
                tasks.push(tokio::spawn(async move {
                    h.controller.process_user_input(&session, "hello").await
                }));
            }
        }
        for task in tasks {
            task.await.expect("turn task");
        }

        assert_eq!(h.controller.get_session(&first).await.expect("first").turn_count, 3);
        assert_eq!(h.controller.get_session(&second).await.expect("second").turn_count, 5);
    }

    #[test]
    fn greeting_follows_time_of_day() {
        assert!(greeting_for_hour(4).starts_with("Good evening!"));
        assert!(greeting_for_hour(5).starts_with("Good morning!"));
        assert!(greeting_for_hour(11).starts_with("Good morning!"));
        assert!(greeting_for_hour(12).starts_with("Good afternoon!"));
        assert!(greeting_for_hour(17).starts_with("Good afternoon!"));
        assert!(greeting_for_hour(18).starts_with("Good evening!"));
    }
}
