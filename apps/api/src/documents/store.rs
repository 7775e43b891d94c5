//! Session store: maps document ids to their sessions.
//!
//! Each session sits behind its own `tokio::sync::Mutex`. Every operation that
//! mutates a document holds that lock until it finishes (including any LLM
//! call), so requests for the same document run one at a time and never lose
//! updates. Requests for different documents only touch the map's `RwLock`
//! briefly.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::models::session::DocumentSession;

pub type SessionHandle = Arc<Mutex<DocumentSession>>;

/// Storage seam for document sessions. `AppState` holds an `Arc<dyn SessionStore>`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Option<SessionHandle>;

    /// Inserts or replaces the session under its own `document_id`.
    async fn put(&self, session: DocumentSession) -> SessionHandle;

    /// Returns whether a session was removed.
    async fn delete(&self, id: Uuid) -> bool;
}

/// Process-lifetime store. Nothing survives a restart.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: Uuid) -> Option<SessionHandle> {
        self.sessions.read().await.get(&id).cloned()
    }

    async fn put(&self, session: DocumentSession) -> SessionHandle {
        let id = session.document_id;
        let handle = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id, handle.clone());
        handle
    }

    async fn delete(&self, id: Uuid) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }
}
