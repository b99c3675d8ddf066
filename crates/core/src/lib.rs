pub mod audit;
pub mod clarification;
pub mod config;
pub mod dedup;
pub mod dialogue;
pub mod domain;
pub mod errors;
pub mod extraction;
pub mod intent;
pub mod slots;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use clarification::{ClarificationPolicy, ClarificationPrompt};
pub use config::{AppConfig, ConfigError, LoadOptions};
pub use dedup::Deduplicator;
pub use dialogue::{DialogueContext, DialoguePhase, PhaseTransition, SessionId, UserIntent};
pub use domain::product::ProductRecord;
pub use errors::{ApplicationError, CollaboratorError, DialogueError};
pub use extraction::{AgentStepResult, Extraction, ExtractionStrategy, RawAgentResult, ResultExtractor};
pub use intent::{IntentClassifier, IntentLexicon};
pub use slots::{SlotSchema, SlotTracker};
