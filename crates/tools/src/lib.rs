//! Built-in tool implementations for agentloop.
//!
//! `search_information` answers from a fixed lookup table so tool-calling
//! agents can run without network access. `log_user_login` and `show_state`
//! work on the session state handed to them through the tool context.

pub mod login;
pub mod search;
pub mod show_state;

use agentloop_core::tool::ToolRegistry;

pub use login::LogUserLoginTool;
pub use search::SearchInformationTool;
pub use show_state::ShowStateTool;

/// Create a tool registry with all built-in tools.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(SearchInformationTool));
    registry.register(Box::new(LogUserLoginTool));
    registry.register(Box::new(ShowStateTool));
    registry
}
