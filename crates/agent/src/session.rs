use std::collections::HashMap;
use std::sync::Arc;

use pickwise_core::dialogue::{DialogueContext, SessionId};
use tokio::sync::{Mutex, RwLock};

pub type SessionHandle = Arc<Mutex<DialogueContext>>;

/// Active sessions keyed by id.
///
/// The map lock is only held to look up or insert a handle. Each context
/// sits behind its own mutex, so one session is advanced by one call at a
/// time while distinct sessions proceed independently.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, SessionHandle>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, context: DialogueContext) -> SessionId {
        let session_id = context.session_id.clone();
        self.sessions.write().await.insert(session_id.clone(), Arc::new(Mutex::new(context)));
        session_id
    }

    pub async fn handle(&self, session_id: &SessionId) -> Option<SessionHandle> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Point-in-time copy of the session state.
    pub async fn snapshot(&self, session_id: &SessionId) -> Option<DialogueContext> {
        let handle = self.handle(session_id).await?;
        let context = handle.lock().await;
        Some(context.clone())
    }
}
