pub mod context;
pub mod states;

pub use context::{DialogueContext, HistoryEntry, Role, SessionId};
pub use states::{DialoguePhase, PhaseTransition, UserIntent};
