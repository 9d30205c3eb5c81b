//! In-memory session service: useful for testing and single-process runs.

use crate::session::{Session, SessionService};
use agentloop_core::error::SessionError;
use agentloop_core::state::{SessionState, StateScope};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SessionKey {
    app_name: String,
    user_id: String,
    session_id: String,
}

impl SessionKey {
    fn new(app_name: &str, user_id: &str, session_id: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
        }
    }

    fn not_found(&self) -> SessionError {
        SessionError::NotFound {
            app: self.app_name.clone(),
            user: self.user_id.clone(),
            session_id: self.session_id.clone(),
        }
    }
}

#[derive(Default)]
struct Stores {
    /// Session-scoped state only
    sessions: HashMap<SessionKey, Session>,
    /// `app:` keys per app
    app_state: HashMap<String, SessionState>,
    /// `user:` keys per (app, user)
    user_state: HashMap<(String, String), SessionState>,
}

impl Stores {
    /// Route each key of `state` to the store its prefix names.
    fn absorb(&mut self, app_name: &str, user_id: &str, state: &SessionState) -> SessionState {
        self.app_state
            .entry(app_name.to_string())
            .or_default()
            .extend(state.scoped(StateScope::App));
        self.user_state
            .entry((app_name.to_string(), user_id.to_string()))
            .or_default()
            .extend(state.scoped(StateScope::User));
        state.scoped(StateScope::Session)
    }

    fn merged(&self, session: &Session) -> Session {
        let mut merged = session.clone();
        if let Some(app) = self.app_state.get(&session.app_name) {
            merged.state.extend(app.clone());
        }
        let user_key = (session.app_name.clone(), session.user_id.clone());
        if let Some(user) = self.user_state.get(&user_key) {
            merged.state.extend(user.clone());
        }
        merged
    }
}

/// Keeps every session in process memory behind a tokio `RwLock`.
pub struct InMemorySessionService {
    stores: Arc<RwLock<Stores>>,
}

impl InMemorySessionService {
    pub fn new() -> Self {
        Self {
            stores: Arc::new(RwLock::new(Stores::default())),
        }
    }
}

impl Default for InMemorySessionService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionService for InMemorySessionService {
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: Option<&str>,
        initial: SessionState,
    ) -> Result<Session, SessionError> {
        let id = session_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let key = SessionKey::new(app_name, user_id, &id);

        let mut stores = self.stores.write().await;
        if stores.sessions.contains_key(&key) {
            return Err(SessionError::AlreadyExists(id));
        }

        let own = stores.absorb(app_name, user_id, &initial);
        let session = Session::new(app_name, user_id, id, own);
        let merged = stores.merged(&session);
        stores.sessions.insert(key, session);

        tracing::debug!(app = app_name, user = user_id, session = %merged.id, "Session created");
        Ok(merged)
    }

    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Session, SessionError> {
        let key = SessionKey::new(app_name, user_id, session_id);
        let stores = self.stores.read().await;
        let session = stores.sessions.get(&key).ok_or_else(|| key.not_found())?;
        Ok(stores.merged(session))
    }

    async fn commit(&self, session: &Session) -> Result<(), SessionError> {
        let key = SessionKey::new(&session.app_name, &session.user_id, &session.id);
        let mut stores = self.stores.write().await;
        if !stores.sessions.contains_key(&key) {
            return Err(key.not_found());
        }

        let own = stores.absorb(&session.app_name, &session.user_id, &session.state);
        if let Some(stored) = stores.sessions.get_mut(&key) {
            stored.state = own;
            stored.updated_at = Utc::now();
        }

        tracing::debug!(session = %session.id, keys = session.state.len(), "Session committed");
        Ok(())
    }

    async fn delete_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<bool, SessionError> {
        let key = SessionKey::new(app_name, user_id, session_id);
        Ok(self.stores.write().await.sessions.remove(&key).is_some())
    }

    async fn list_sessions(
        &self,
        app_name: &str,
        user_id: &str,
    ) -> Result<Vec<String>, SessionError> {
        let stores = self.stores.read().await;
        let mut ids: Vec<String> = stores
            .sessions
            .keys()
            .filter(|k| k.app_name == app_name && k.user_id == user_id)
            .map(|k| k.session_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}
