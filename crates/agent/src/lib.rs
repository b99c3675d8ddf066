//! Dialogue orchestration for the product-recommendation assistant.
//!
//! [`controller::DialogueController`] owns the sessions and drives each
//! utterance through intent classification, slot gathering, search,
//! extraction, deduplication and explanation. The LLM, the search agent and
//! the explainer sit behind the narrow traits in [`collaborators`], so the
//! state machine can be exercised with in-process fakes. Products picked
//! from a recommendation are looked up one detail page at a time through
//! [`details::DetailLookup`].

pub mod collaborators;
pub mod controller;
pub mod details;
pub mod llm;
pub mod query;
pub mod recommendation;
pub mod search_agent;
pub mod session;

pub use collaborators::{
    Explainer, LlmExplainer, LlmSlotExtractor, LlmTranslator, SearchAgent, SlotExtractor,
    Translator,
};
pub use controller::{Collaborators, DialogueController, SearchStatus, TurnOutcome};
pub use details::{DetailLookup, DetailOutcome, ProductDetails};
pub use llm::{CompletionOptions, LlmClient, OpenAiCompatibleClient};
pub use search_agent::CommandSearchAgent;
pub use session::SessionStore;
