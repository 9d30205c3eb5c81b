//! Tool-calling agent: the Plan → Act → Observe loop.
//!
//! 1. Render the instruction from session state and send it with the input
//! 2. If the model asks for tools, run them against the session state
//! 3. Append the tool results and ask again
//! 4. Stop at the first text-only answer or after `max_tool_rounds`

use crate::template::PromptTemplate;
use agentloop_core::error::StepError;
use agentloop_core::event::{EventBus, LoopEvent};
use agentloop_core::message::{Conversation, Message};
use agentloop_core::provider::{Provider, ProviderRequest};
use agentloop_core::state::SessionState;
use agentloop_core::tool::{ToolCall, ToolRegistry};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Answer returned once the round budget is used up.
const ROUND_LIMIT_ANSWER: &str =
    "I've reached the maximum number of tool call rounds. Please provide further guidance.";

/// An agent whose tools read and write the session state.
pub struct ToolAgent {
    name: String,
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    instruction: PromptTemplate,
    tools: Arc<ToolRegistry>,
    max_tool_rounds: u32,
    output_key: Option<String>,
    event_bus: Option<Arc<EventBus>>,
}

impl ToolAgent {
    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            instruction: PromptTemplate::new("You are a helpful assistant."),
            tools,
            max_tool_rounds: 5,
            output_key: None,
            event_bus: None,
        }
    }

    pub fn with_instruction(mut self, template: impl Into<PromptTemplate>) -> Self {
        self.instruction = template.into();
        self
    }

    /// Set the maximum number of tool-calling rounds per turn.
    pub fn with_max_tool_rounds(mut self, max: u32) -> Self {
        self.max_tool_rounds = max;
        self
    }

    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Process one user input and return the final text answer.
    ///
    /// Tool failures are reported back to the model; only provider and
    /// template errors abort the turn.
    pub async fn run(
        &self,
        input: &str,
        state: &mut SessionState,
    ) -> Result<String, agentloop_core::Error> {
        let instruction = self
            .instruction
            .render(state)
            .map_err(|source| StepError::Template {
                step: self.name.clone(),
                source,
            })?;

        let mut conversation = Conversation::with_system(instruction);
        conversation.push(Message::user(input));

        info!(agent = %self.name, tools = ?self.tools.names(), "Processing input");

        let answer = self.converse(&mut conversation, state).await?;

        if let Some(key) = &self.output_key {
            state.set(key.clone(), answer.clone());
        }
        Ok(answer)
    }

    async fn converse(
        &self,
        conversation: &mut Conversation,
        state: &mut SessionState,
    ) -> Result<String, agentloop_core::Error> {
        let tool_definitions = self.tools.definitions();

        for round in 1..=self.max_tool_rounds.max(1) {
            debug!(agent = %self.name, round, "Agent loop round");

            let mut request = ProviderRequest::new(&self.model, conversation.messages.clone());
            request.temperature = self.temperature;
            request.max_tokens = self.max_tokens;
            request.tools = tool_definitions.clone();

            let response = self.provider.complete(request).await?;

            if let Some(usage) = &response.usage {
                self.publish(LoopEvent::ResponseGenerated {
                    model: response.model.clone(),
                    tokens_used: usage.total_tokens,
                    timestamp: Utc::now(),
                });
            }

            if response.message.tool_calls.is_empty() {
                let answer = response.message.content.trim().to_string();
                conversation.push(response.message);
                return Ok(answer);
            }

            debug!(tool_count = response.message.tool_calls.len(), "Executing tool calls");

            let tool_calls = response.message.tool_calls.clone();
            conversation.push(response.message);

            for tc in &tool_calls {
                let call = ToolCall {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    arguments: serde_json::from_str(&tc.arguments).unwrap_or_default(),
                };

                let start = std::time::Instant::now();
                let result = self.tools.execute(&call, state).await;
                let duration_ms = start.elapsed().as_millis() as u64;

                match result {
                    Ok(tool_result) => {
                        self.publish(LoopEvent::ToolExecuted {
                            tool_name: tc.name.clone(),
                            success: tool_result.success,
                            duration_ms,
                            timestamp: Utc::now(),
                        });
                        conversation.push(Message::tool_result(&tc.id, &tool_result.output));
                    }
                    Err(e) => {
                        warn!(tool = %tc.name, error = %e, "Tool execution failed");
                        self.publish(LoopEvent::ToolExecuted {
                            tool_name: tc.name.clone(),
                            success: false,
                            duration_ms,
                            timestamp: Utc::now(),
                        });
                        // Let the model see the failure and recover
                        conversation.push(Message::tool_result(&tc.id, format!("Error: {e}")));
                    }
                }
            }
        }

        warn!(agent = %self.name, rounds = self.max_tool_rounds, "Max tool rounds reached");
        Ok(ROUND_LIMIT_ANSWER.into())
    }

    fn publish(&self, event: LoopEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}
