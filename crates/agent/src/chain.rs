//! Sequential and parallel composition of steps.
//!
//! A [`ParallelChain`] fans out over one read-only snapshot and merges every
//! branch result into a copy of it. A [`SequentialChain`] threads state
//! through its stages in order, so each stage sees what the previous one
//! wrote.

use crate::step::{RetryPolicy, StepExecutor, StepResult, execute_with_retry, run_step};
use agentloop_core::error::StepError;
use agentloop_core::event::{EventBus, LoopEvent};
use agentloop_core::state::SessionState;
use chrono::Utc;
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info};

/// Runs independent branches concurrently against the same input.
pub struct ParallelChain {
    name: String,
    branches: Vec<Arc<dyn StepExecutor>>,
    retry: RetryPolicy,
    event_bus: Option<Arc<EventBus>>,
}

impl ParallelChain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            branches: Vec::new(),
            retry: RetryPolicy::default(),
            event_bus: None,
        }
    }

    /// Add a branch. Its result lands under its output key, or its name.
    pub fn with_branch(mut self, step: Arc<dyn StepExecutor>) -> Self {
        self.branches.push(step);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Run every branch and merge. Any failing branch fails the whole chain.
    pub async fn run(&self, input: &SessionState) -> Result<SessionState, StepError> {
        info!(chain = %self.name, branches = self.branches.len(), "Fanning out");

        let snapshot = input.snapshot();
        let events = self.event_bus.as_deref();
        let retry = &self.retry;

        let branches = self.branches.iter().map(|branch| {
            let snapshot = &snapshot;
            async move {
                let result = execute_with_retry(branch.as_ref(), snapshot, retry, events).await?;
                let key = branch.output_key().unwrap_or(branch.name()).to_string();
                debug!(branch = %branch.name(), key = %key, "Branch finished");
                Ok::<_, StepError>((branch.name(), key, result))
            }
        });
        let results = try_join_all(branches).await?;

        let mut merged = snapshot.clone();
        for (step, key, result) in results {
            if let Some(bus) = events {
                bus.publish(LoopEvent::StepCompleted {
                    step: step.to_string(),
                    output_key: Some(key.clone()),
                    preview: result.preview(80),
                    timestamp: Utc::now(),
                });
            }
            merged.set(key, result);
        }
        Ok(merged)
    }
}

/// One stage of a [`SequentialChain`].
pub enum ChainStage {
    Step(Arc<dyn StepExecutor>),
    Parallel(ParallelChain),
}

/// The result of a sequential chain.
#[derive(Debug, Clone)]
pub struct ChainRun {
    /// Result of the last plain step, if the chain had one
    pub output: Option<StepResult>,
    pub state: SessionState,
}

/// Runs stages in order over one evolving state.
pub struct SequentialChain {
    name: String,
    stages: Vec<ChainStage>,
    retry: RetryPolicy,
    event_bus: Option<Arc<EventBus>>,
}

impl SequentialChain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            retry: RetryPolicy::default(),
            event_bus: None,
        }
    }

    pub fn then(mut self, step: Arc<dyn StepExecutor>) -> Self {
        self.stages.push(ChainStage::Step(step));
        self
    }

    pub fn then_parallel(mut self, chain: ParallelChain) -> Self {
        self.stages.push(ChainStage::Parallel(chain));
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub async fn run(&self, initial: SessionState) -> Result<ChainRun, StepError> {
        info!(chain = %self.name, stages = self.stages.len(), "Running chain");

        let mut state = initial;
        let mut output = None;

        for stage in &self.stages {
            match stage {
                ChainStage::Step(step) => {
                    let result = run_step(
                        step.as_ref(),
                        &mut state,
                        &self.retry,
                        self.event_bus.as_deref(),
                    )
                    .await?;
                    output = Some(result);
                }
                ChainStage::Parallel(parallel) => {
                    state = parallel.run(&state).await?;
                }
            }
        }

        Ok(ChainRun { output, state })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::LlmStep;
    use crate::test_helpers::ScriptedProvider;
    use agentloop_core::error::ProviderError;
    use agentloop_core::schema::{FieldKind, FieldSpec, OutputSchema};
    use async_trait::async_trait;

    /// Returns whatever it sees under `read`.
    struct EchoStep {
        name: String,
        read: String,
    }

    #[async_trait]
    impl StepExecutor for EchoStep {
        fn name(&self) -> &str {
            &self.name
        }

        fn output_key(&self) -> Option<&str> {
            None
        }

        async fn execute(&self, state: &SessionState, _attempt: u32) -> Result<StepResult, StepError> {
            tokio::task::yield_now().await;
            let seen = state.get(&self.read).map(|v| v.to_string()).unwrap_or_default();
            Ok(StepResult::Text(seen))
        }
    }

    fn echo(name: &str, read: &str) -> Arc<dyn StepExecutor> {
        Arc::new(EchoStep {
            name: name.into(),
            read: read.into(),
        })
    }

    #[tokio::test]
    async fn branches_see_the_same_snapshot() {
        let chain = ParallelChain::new("fanout")
            .with_branch(echo("a", "topic"))
            .with_branch(echo("b", "topic"))
            .with_branch(echo("topic_again", "a"));
        let mut input = SessionState::new();
        input.set("topic", "space exploration");

        let merged = chain.run(&input).await.unwrap();

        assert_eq!(merged.get_text("a"), Some("space exploration"));
        assert_eq!(merged.get_text("b"), Some("space exploration"));
        // Sibling outputs are not visible to other branches
        assert_eq!(merged.get_text("topic_again"), Some(""));
        // Input keys pass through
        assert_eq!(merged.get_text("topic"), Some("space exploration"));
        assert!(!input.contains("a"));
    }

    #[tokio::test]
    async fn merged_branches_report_completion() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let chain = ParallelChain::new("fanout")
            .with_branch(echo("summary", "topic"))
            .with_branch(echo("questions", "topic"))
            .with_event_bus(bus.clone());
        let mut input = SessionState::new();
        input.set("topic", "orbits");

        chain.run(&input).await.unwrap();

        let mut completed = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let LoopEvent::StepCompleted { step, output_key, .. } = event.as_ref() {
                assert_eq!(output_key.as_deref(), Some(step.as_str()));
                completed.push(step.clone());
            }
        }
        assert_eq!(completed, vec!["summary", "questions"]);
    }

    #[tokio::test]
    async fn one_failing_branch_fails_the_merge() {
        let failing = Arc::new(ScriptedProvider::with_results(vec![Err(ProviderError::Network(
            "unreachable".into(),
        ))]));
        let chain = ParallelChain::new("fanout")
            .with_branch(echo("ok", "topic"))
            .with_branch(Arc::new(LlmStep::new("broken", failing, "m").with_instruction("x")));

        let err = chain.run(&SessionState::new()).await.unwrap_err();
        assert!(matches!(err, StepError::Service { .. }));
    }

    #[tokio::test]
    async fn parallel_then_synthesis() {
        let summary = Arc::new(ScriptedProvider::texts(&["A short summary."]));
        let questions = Arc::new(ScriptedProvider::texts(&["1. Why? 2. How? 3. When?"]));
        let terms = Arc::new(ScriptedProvider::texts(&["orbit, rocket, probe"]));
        let synthesis = Arc::new(ScriptedProvider::texts(&["Final answer"]));

        let fanout = ParallelChain::new("map")
            .with_branch(Arc::new(
                LlmStep::new("summary", summary, "m").with_instruction("Summarize: {topic}"),
            ))
            .with_branch(Arc::new(
                LlmStep::new("questions", questions, "m").with_instruction("Questions about: {topic}"),
            ))
            .with_branch(Arc::new(
                LlmStep::new("key_terms", terms, "m").with_instruction("Key terms in: {topic}"),
            ));
        let chain = SequentialChain::new("synthesis")
            .then_parallel(fanout)
            .then(Arc::new(
                LlmStep::new("synthesize", synthesis.clone(), "m")
                    .with_instruction("Summary: {summary}\nQuestions: {questions}\nKey Terms: {key_terms}")
                    .with_output_key("answer"),
            ));

        let mut initial = SessionState::new();
        initial.set("topic", "The history of space exploration");
        let run = chain.run(initial).await.unwrap();

        assert_eq!(run.output, Some(StepResult::Text("Final answer".into())));
        assert_eq!(run.state.get_text("answer"), Some("Final answer"));
        let prompt = &synthesis.requests()[0].messages[0].content;
        assert!(prompt.contains("Summary: A short summary."));
        assert!(prompt.contains("Key Terms: orbit, rocket, probe"));
    }

    #[tokio::test]
    async fn extract_then_transform() {
        let extract = Arc::new(ScriptedProvider::texts(&["CPU: 3.5 GHz octa-core; RAM: 16GB; Storage: 1TB NVMe"]));
        let transform = Arc::new(ScriptedProvider::texts(&[
            r#"{"cpu": "3.5 GHz octa-core", "memory": "16GB", "storage": "1TB NVMe"}"#,
        ]));
        let schema = OutputSchema::new("Specifications")
            .field(FieldSpec::required("cpu", FieldKind::String))
            .field(FieldSpec::required("memory", FieldKind::String))
            .field(FieldSpec::required("storage", FieldKind::String));

        let chain = SequentialChain::new("specs")
            .then(Arc::new(
                LlmStep::new("extract", extract, "m")
                    .with_instruction("Extract the technical specifications from the following text:\n\n{text_input}")
                    .with_output_key("specifications"),
            ))
            .then(Arc::new(
                LlmStep::new("transform", transform.clone(), "m")
                    .with_instruction("Transform the following specifications into a JSON object:\n\n{specifications}")
                    .with_schema(schema),
            ));

        let mut initial = SessionState::new();
        initial.set("text_input", "The new laptop has a 3.5 GHz octa-core processor, 16GB of RAM, and a 1TB NVMe SSD.");
        let run = chain.run(initial).await.unwrap();

        let record = run.output.unwrap();
        assert_eq!(record.as_record().unwrap()["memory"], "16GB");
        assert!(transform.requests()[0].messages[0].content.contains("RAM: 16GB"));
    }
}
