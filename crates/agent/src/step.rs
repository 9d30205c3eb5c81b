//! Step Executor: one unit of work against the completion service.
//!
//! A step renders its instruction from the current state, calls the
//! provider once, and returns either trimmed text or a record validated
//! against its [`OutputSchema`]. [`run_step`] adds the retry policy and the
//! write-back under the step's output key.

use crate::template::PromptTemplate;
use agentloop_core::error::StepError;
use agentloop_core::event::{EventBus, LoopEvent};
use agentloop_core::message::Message;
use agentloop_core::provider::{Provider, ProviderRequest, ResponseFormat};
use agentloop_core::schema::OutputSchema;
use agentloop_core::state::{SessionState, StateValue};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// What a step produced.
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    Text(String),
    Record(Map<String, Value>),
}

impl StepResult {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            StepResult::Text(s) => Some(s),
            StepResult::Record(_) => None,
        }
    }

    pub fn as_record(&self) -> Option<&Map<String, Value>> {
        match self {
            StepResult::Record(r) => Some(r),
            StepResult::Text(_) => None,
        }
    }

    /// Single-line summary for progress output.
    pub fn preview(&self, max_chars: usize) -> String {
        let full = self.to_string().replace('\n', " ");
        if full.chars().count() <= max_chars {
            return full;
        }
        let cut: String = full.chars().take(max_chars).collect();
        format!("{cut}…")
    }
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepResult::Text(s) => f.write_str(s),
            StepResult::Record(r) => write!(f, "{}", Value::Object(r.clone())),
        }
    }
}

impl From<StepResult> for StateValue {
    fn from(result: StepResult) -> Self {
        match result {
            StepResult::Text(s) => StateValue::Text(s),
            StepResult::Record(r) => StateValue::Record(r),
        }
    }
}

/// A single unit of work that reads state and produces a [`StepResult`].
#[async_trait]
pub trait StepExecutor: Send + Sync {
    fn name(&self) -> &str;

    /// Key the result is written under by [`run_step`], if any.
    fn output_key(&self) -> Option<&str>;

    /// Run once. `attempt` starts at 1 and grows on validation retries.
    async fn execute(&self, state: &SessionState, attempt: u32) -> Result<StepResult, StepError>;
}

/// How often a step may be re-run after malformed structured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Single attempt, no retry.
    pub fn none() -> Self {
        Self::new(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2)
    }
}

/// A step backed by one provider call.
pub struct LlmStep {
    name: String,
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    instruction: PromptTemplate,
    input: Option<PromptTemplate>,
    schema: Option<OutputSchema>,
    output_key: Option<String>,
    event_bus: Option<Arc<EventBus>>,
}

impl LlmStep {
    pub fn new(name: impl Into<String>, provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            instruction: PromptTemplate::new(""),
            input: None,
            schema: None,
            output_key: None,
            event_bus: None,
        }
    }

    /// System instruction, rendered against state on every call.
    pub fn with_instruction(mut self, template: impl Into<PromptTemplate>) -> Self {
        self.instruction = template.into();
        self
    }

    /// User message template. Without one the instruction is sent as the user turn.
    pub fn with_input(mut self, template: impl Into<PromptTemplate>) -> Self {
        self.input = Some(template.into());
        self
    }

    pub fn with_schema(mut self, schema: OutputSchema) -> Self {
        self.schema = Some(schema);
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

    fn template_error(&self, source: agentloop_core::error::TemplateError) -> StepError {
        StepError::Template {
            step: self.name.clone(),
            source,
        }
    }

    fn build_messages(&self, state: &SessionState, attempt: u32) -> Result<Vec<Message>, StepError> {
        let mut instruction = self
            .instruction
            .render(state)
            .map_err(|e| self.template_error(e))?;

        if let Some(schema) = &self.schema {
            instruction.push_str(&format!(
                "\n\nRespond with a JSON object of the form {}.",
                schema.describe()
            ));
            if attempt > 1 {
                instruction.push_str(&format!(
                    "\nYour previous reply could not be used. Reply with ONLY a JSON object \
                     exactly matching {} with no extra fields, no code fences and no other text.",
                    schema.describe()
                ));
            }
        }

        let messages = match &self.input {
            Some(input) => {
                let user = input.render(state).map_err(|e| self.template_error(e))?;
                vec![Message::system(instruction), Message::user(user)]
            }
            None => vec![Message::user(instruction)],
        };
        Ok(messages)
    }
}

#[async_trait]
impl StepExecutor for LlmStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_key(&self) -> Option<&str> {
        self.output_key.as_deref()
    }

    async fn execute(&self, state: &SessionState, attempt: u32) -> Result<StepResult, StepError> {
        let mut request = ProviderRequest::new(&self.model, self.build_messages(state, attempt)?);
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;
        if self.schema.is_some() {
            request.response_format = Some(ResponseFormat::JsonObject);
        }

        debug!(step = %self.name, attempt, model = %self.model, "Calling provider");

        let response = self
            .provider
            .complete(request)
            .await
            .map_err(|source| StepError::Service {
                step: self.name.clone(),
                source,
            })?;

        if let (Some(bus), Some(usage)) = (&self.event_bus, &response.usage) {
            bus.publish(LoopEvent::ResponseGenerated {
                model: response.model.clone(),
                tokens_used: usage.total_tokens,
                timestamp: Utc::now(),
            });
        }

        let raw = response.message.content;
        match &self.schema {
            Some(schema) => schema
                .parse(&raw)
                .map(StepResult::Record)
                .map_err(|source| StepError::Validation {
                    step: self.name.clone(),
                    attempts: attempt,
                    source,
                }),
            None => Ok(StepResult::Text(raw.trim().to_string())),
        }
    }
}

/// Run `step` under `retry` without touching state.
///
/// Only validation failures are retried; the final one reports how many
/// attempts were made.
pub async fn execute_with_retry(
    step: &dyn StepExecutor,
    state: &SessionState,
    retry: &RetryPolicy,
    events: Option<&EventBus>,
) -> Result<StepResult, StepError> {
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match step.execute(state, attempt).await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                warn!(step = %step.name(), attempt, error = %e, "Malformed structured output, retrying");
                if let Some(bus) = events {
                    bus.publish(LoopEvent::StepRetried {
                        step: step.name().to_string(),
                        attempt: attempt + 1,
                        reason: e.to_string(),
                        timestamp: Utc::now(),
                    });
                }
                attempt += 1;
            }
            Err(StepError::Validation { step: name, source, .. }) => {
                return Err(StepError::Validation {
                    step: name,
                    attempts: attempt,
                    source,
                });
            }
            Err(e) => return Err(e),
        }
    }
}

/// Run `step` under `retry` and write its result under the output key.
pub async fn run_step(
    step: &dyn StepExecutor,
    state: &mut SessionState,
    retry: &RetryPolicy,
    events: Option<&EventBus>,
) -> Result<StepResult, StepError> {
    let result = execute_with_retry(step, state, retry, events).await?;

    if let Some(key) = step.output_key() {
        state.set(key, result.clone());
    }

    debug!(step = %step.name(), output_key = ?step.output_key(), "Step completed");
    if let Some(bus) = events {
        bus.publish(LoopEvent::StepCompleted {
            step: step.name().to_string(),
            output_key: step.output_key().map(str::to_string),
            preview: result.preview(80),
            timestamp: Utc::now(),
        });
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, text_response};
    use agentloop_core::error::{OutputError, ProviderError, SchemaError};

    fn status_step(provider: Arc<ScriptedProvider>) -> LlmStep {
        LlmStep::new("ProcessingStep", provider, "mock-model")
            .with_instruction("Check the status. Iteration {iterative?}.")
            .with_schema(OutputSchema::status(&["completed", "pending"]))
            .with_output_key("status_update")
    }

    #[tokio::test]
    async fn structured_output_is_validated_and_written() {
        let provider = Arc::new(ScriptedProvider::texts(&[r#"{"status": "pending"}"#]));
        let step = status_step(provider.clone());
        let mut state = SessionState::new();

        let result = run_step(&step, &mut state, &RetryPolicy::default(), None).await.unwrap();

        assert_eq!(result.as_record().unwrap()["status"], "pending");
        assert_eq!(state.get_record("status_update").unwrap()["status"], "pending");
        let request = &provider.requests()[0];
        assert_eq!(request.response_format, Some(ResponseFormat::JsonObject));
        assert!(request.messages[0].content.contains(r#""status": "completed" | "pending""#));
    }

    #[tokio::test]
    async fn malformed_once_then_valid_retries_with_stricter_instruction() {
        let provider = Arc::new(ScriptedProvider::texts(&[
            "The status is probably pending",
            r#"{"status": "completed"}"#,
        ]));
        let step = status_step(provider.clone());
        let mut state = SessionState::new();
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let result = run_step(&step, &mut state, &RetryPolicy::default(), Some(&bus))
            .await
            .unwrap();

        assert_eq!(result.as_record().unwrap()["status"], "completed");
        assert_eq!(provider.call_count(), 2);
        let retried = &provider.requests()[1].messages[0].content;
        assert!(retried.contains("ONLY a JSON object"));
        assert!(matches!(rx.recv().await.unwrap().as_ref(), LoopEvent::StepRetried { attempt: 2, .. }));
    }

    #[tokio::test]
    async fn malformed_twice_fails_with_attempt_count() {
        let provider = Arc::new(ScriptedProvider::texts(&["nope", r#"{"status": "done"}"#]));
        let step = status_step(provider.clone());
        let mut state = SessionState::new();

        let err = run_step(&step, &mut state, &RetryPolicy::default(), None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StepError::Validation {
                attempts: 2,
                source: OutputError::Schema(SchemaError::InvalidLiteral { .. }),
                ..
            }
        ));
        assert!(!state.contains("status_update"));
    }

    #[tokio::test]
    async fn provider_failure_is_not_retried() {
        let provider = Arc::new(ScriptedProvider::with_results(vec![Err(
            ProviderError::Network("connection reset".into()),
        )]));
        let step = status_step(provider.clone());
        let mut state = SessionState::new();

        let err = run_step(&step, &mut state, &RetryPolicy::new(3), None)
            .await
            .unwrap_err();

        assert!(matches!(err, StepError::Service { .. }));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn text_step_trims_and_overwrites() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("  Hello there!\n")]));
        let step = LlmStep::new("Greeter", provider.clone(), "mock-model")
            .with_instruction("Generate a short, friendly greeting.")
            .with_output_key("last_greeting");
        let mut state = SessionState::new();
        state.set("last_greeting", "old");

        run_step(&step, &mut state, &RetryPolicy::none(), None).await.unwrap();

        assert_eq!(state.get_text("last_greeting"), Some("Hello there!"));
        let request = &provider.requests()[0];
        assert_eq!(request.response_format, None);
        assert_eq!(request.messages.len(), 1);
    }

    #[tokio::test]
    async fn input_template_becomes_user_message() {
        let provider = Arc::new(ScriptedProvider::texts(&["summary"]));
        let step = LlmStep::new("summary", provider.clone(), "m")
            .with_instruction("Summarize the topic concisely.")
            .with_input("{topic}");
        let mut state = SessionState::new();
        state.set("topic", "The history of space exploration");

        step.execute(&state, 1).await.unwrap();

        let messages = &provider.requests()[0].messages;
        assert_eq!(messages[1].content, "The history of space exploration");
    }

    #[tokio::test]
    async fn missing_template_variable_fails_before_calling() {
        let provider = Arc::new(ScriptedProvider::texts(&["unused"]));
        let step = LlmStep::new("transform", provider.clone(), "m").with_instruction("{specifications}");

        let err = step.execute(&SessionState::new(), 1).await.unwrap_err();

        assert!(matches!(err, StepError::Template { .. }));
        assert_eq!(provider.call_count(), 0);
    }

    #[test]
    fn preview_truncates() {
        let result = StepResult::Text("a".repeat(100));
        assert_eq!(result.preview(10).chars().count(), 11);
    }
}
