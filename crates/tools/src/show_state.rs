//! State inspection tool.

use agentloop_core::error::ToolError;
use agentloop_core::tool::{Tool, ToolContext, ToolResult};
use async_trait::async_trait;

/// Returns the whole session state so the model can report it.
pub struct ShowStateTool;

#[async_trait]
impl Tool for ShowStateTool {
    fn name(&self) -> &str {
        "show_state"
    }

    fn description(&self) -> &str {
        "Returns the current session state for inspection."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(
        &self,
        _arguments: serde_json::Value,
        ctx: &mut ToolContext<'_>,
    ) -> Result<ToolResult, ToolError> {
        Ok(ToolResult::json(serde_json::json!({
            "current_state": ctx.state.to_json(),
        })))
    }
}
