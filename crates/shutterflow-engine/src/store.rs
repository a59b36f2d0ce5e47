//! Session storage.
//!
//! Sessions are handed out as `Arc<Mutex<SessionState>>` so a caller can hold
//! one session's lock across an `await` (a device round trip) without
//! blocking access to any other session.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::error::{Result, ShutterflowError};
use crate::session::SessionState;

/// A shared, individually lockable session.
pub type SessionHandle = Arc<Mutex<SessionState>>;

/// Keyed storage for active sessions.
#[async_trait]
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// Looks up a session by identifier.
    async fn get(&self, session_id: &str) -> Option<SessionHandle>;

    /// Inserts a new session.
    ///
    /// Fails with [`ShutterflowError::SessionAlreadyExists`] if the
    /// identifier is taken.
    async fn put(&self, state: SessionState) -> Result<SessionHandle>;

    /// Removes a session, returning it if it existed.
    async fn delete(&self, session_id: &str) -> Option<SessionHandle>;

    /// Returns every session handle.
    async fn list(&self) -> Vec<SessionHandle>;
}

/// Process-local session store.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(session_id).cloned()
    }

    async fn put(&self, state: SessionState) -> Result<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&state.session_id) {
            return Err(ShutterflowError::session_exists(&state.session_id));
        }
        let session_id = state.session_id.clone();
        let handle = Arc::new(Mutex::new(state));
        sessions.insert(session_id, Arc::clone(&handle));
        Ok(handle)
    }

    async fn delete(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.write().await.remove(session_id)
    }

    async fn list(&self) -> Vec<SessionHandle> {
        self.sessions.read().await.values().cloned().collect()
    }
}
