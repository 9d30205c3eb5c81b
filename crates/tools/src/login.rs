//! Login tracking tool: records a login in session state.

use agentloop_core::error::ToolError;
use agentloop_core::tool::{Tool, ToolContext, ToolResult};
use async_trait::async_trait;
use chrono::Utc;

pub struct LogUserLoginTool;

#[async_trait]
impl Tool for LogUserLoginTool {
    fn name(&self) -> &str {
        "log_user_login"
    }

    fn description(&self) -> &str {
        "Tracks a user login and updates the session state."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(
        &self,
        _arguments: serde_json::Value,
        ctx: &mut ToolContext<'_>,
    ) -> Result<ToolResult, ToolError> {
        let state = &mut *ctx.state;
        let login_count = state.get_i64("user:login_count").unwrap_or(0) + 1;

        state.set("user:login_count", login_count);
        state.set("task_status", "active");
        state.set("user:last_login_ts", Utc::now().timestamp());
        state.set("temp:validation_needed", true);

        tracing::info!(login_count, "User login tracked");

        Ok(ToolResult::json(serde_json::json!({
            "status": "success",
            "message": format!("User login tracked. Total logins: {login_count}."),
        })))
    }
}
