//! # agentloop core
//!
//! Domain types, traits, and error definitions for the agentloop runtime.
//! Every other crate depends inward on this one.
//!
//! ## Design Philosophy
//!
//! Collaborators (the completion service, tools, session storage) are traits
//! defined here; implementations live in their own crates. This keeps the
//! loop logic testable with scripted providers and in-memory sessions.

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod schema;
pub mod state;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{EventBus, LoopEvent};
pub use message::{Conversation, Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ResponseFormat};
pub use schema::{FieldKind, FieldSpec, OutputSchema, decode_record};
pub use state::{SessionState, StateDelta, StateScope, StateValue};
pub use tool::{Tool, ToolCall, ToolContext, ToolRegistry, ToolResult};
