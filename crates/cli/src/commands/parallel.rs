//! `agentloop parallel` — fan-out over one topic, then synthesis.

use super::{CommandResult, Progress};
use agentloop_agent::{LlmStep, ParallelChain, SequentialChain, StepExecutor};
use agentloop_core::event::EventBus;
use agentloop_core::provider::Provider;
use agentloop_core::state::SessionState;
use std::sync::Arc;

const DEFAULT_TOPIC: &str = "The history of space exploration";

const SYNTHESIS: &str = "Based on the following information:\n\
                         Summary: {summary}\n\
                         Related Questions: {questions}\n\
                         Key Terms: {key_terms}\n\
                         Synthesize a comprehensive answer.";

fn branch(
    name: &str,
    instruction: &str,
    provider: &Arc<dyn Provider>,
    model: &str,
    bus: &Arc<EventBus>,
) -> Arc<dyn StepExecutor> {
    Arc::new(
        LlmStep::new(name, provider.clone(), model)
            .with_instruction(instruction)
            .with_input("{topic}")
            .with_event_bus(bus.clone()),
    )
}

pub async fn run(topic: Option<String>) -> CommandResult {
    let config = super::load_config()?;
    let provider = super::default_provider(&config)?;
    let topic = topic.unwrap_or_else(|| DEFAULT_TOPIC.to_string());

    println!("🔀 Parallel chain for topic: '{topic}'");
    println!();

    let mut state = SessionState::new();
    state.set("topic", topic);

    let bus = Arc::new(EventBus::default());
    let progress = Progress::attach(&bus);

    let result = {
        let model = config.default_model.as_str();
        let fanout = ParallelChain::new("map")
            .with_branch(branch("summary", "Summarize the following topic concisely:", &provider, model, &bus))
            .with_branch(branch(
                "questions",
                "Generate three interesting questions about the following topic:",
                &provider,
                model,
                &bus,
            ))
            .with_branch(branch(
                "key_terms",
                "Identify 5-10 key terms from the following topic, separated by commas:",
                &provider,
                model,
                &bus,
            ))
            .with_event_bus(bus.clone());

        let synthesis = LlmStep::new("synthesis", provider.clone(), model)
            .with_instruction(SYNTHESIS)
            .with_input("Original topic: {topic}")
            .with_output_key("answer")
            .with_event_bus(bus.clone());

        SequentialChain::new("parallel_synthesis")
            .then_parallel(fanout)
            .then(Arc::new(synthesis))
            .with_event_bus(bus)
            .run(state)
            .await
    };
    progress.finish().await;

    let run = result?;
    println!();
    println!("--- Final Response ---");
    println!("{}", run.state.get_text("answer").unwrap_or_default());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentloop_agent::PromptTemplate;

    #[test]
    fn synthesis_reads_every_branch() {
        let template = PromptTemplate::new(SYNTHESIS);
        assert_eq!(template.variables(), vec!["summary", "questions", "key_terms"]);
    }
}
