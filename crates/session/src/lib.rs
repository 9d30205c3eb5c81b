//! Session storage for agentloop.
//!
//! A session owns one [`SessionState`](agentloop_core::SessionState). The
//! service splits that state by key prefix when it is committed: `app:` keys
//! are shared across the app, `user:` keys across one user's sessions,
//! `temp:` keys are never persisted, and everything else stays with the
//! session.

pub mod in_memory;
pub mod session;

pub use in_memory::InMemorySessionService;
pub use session::{Session, SessionService};
