//! Search tool: answers from a small table of canned facts.
//!
//! Lookup is on the whole query, case-insensitive. Anything unknown gets a
//! default answer rather than an error, so the model always has something
//! to work with.

use agentloop_core::error::ToolError;
use agentloop_core::tool::{Tool, ToolContext, ToolResult};
use async_trait::async_trait;

const FACTS: &[(&str, &str)] = &[
    (
        "weather in london",
        "The weather in London is currently cloudy with a temperature of 15°C.",
    ),
    ("capital of france", "The capital of France is Paris."),
    (
        "population of earth",
        "The estimated population of Earth is around 8 billion people.",
    ),
    (
        "tallest mountain",
        "Mount Everest is the tallest mountain above sea level.",
    ),
];

pub struct SearchInformationTool;

/// Look `query` up in the fact table.
pub fn lookup(query: &str) -> String {
    let key = query.trim().to_lowercase();
    FACTS
        .iter()
        .find(|(topic, _)| *topic == key)
        .map(|(_, answer)| answer.to_string())
        .unwrap_or_else(|| {
            format!(
                "Simulated search result for '{query}': No specific information found, \
                 but the topic seems interesting."
            )
        })
}

#[async_trait]
impl Tool for SearchInformationTool {
    fn name(&self) -> &str {
        "search_information"
    }

    fn description(&self) -> &str {
        "Provides factual information on a given topic. Use this tool to find answers to \
         questions like 'What is the capital of France?' or 'What is the weather in London?'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The topic to look up, e.g. 'capital of france'"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _ctx: &mut ToolContext<'_>,
    ) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let answer = lookup(query);
        tracing::debug!(query, answer = %answer, "search_information");

        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: answer,
            data: None,
        })
    }
}
