//! Session record and the storage trait.

use agentloop_core::error::SessionError;
use agentloop_core::state::SessionState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One conversation's identity plus its state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub app_name: String,
    pub user_id: String,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        id: impl Into<String>,
        state: SessionState,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            app_name: app_name.into(),
            user_id: user_id.into(),
            state,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Stores sessions and the app/user scoped state around them.
#[async_trait]
pub trait SessionService: Send + Sync {
    /// Create a session seeded with `initial` state. A `None` id gets a fresh UUID.
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: Option<&str>,
        initial: SessionState,
    ) -> Result<Session, SessionError>;

    /// Fetch a session with app and user scoped values merged into its state.
    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Session, SessionError>;

    /// Persist a session's state after a turn. `temp:` keys are dropped.
    async fn commit(&self, session: &Session) -> Result<(), SessionError>;

    /// Remove a session. Returns whether it existed.
    async fn delete_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<bool, SessionError>;

    /// Ids of every session a user has in an app, sorted.
    async fn list_sessions(&self, app_name: &str, user_id: &str)
    -> Result<Vec<String>, SessionError>;
}
