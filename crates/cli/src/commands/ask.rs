//! `agentloop ask` — independent tool-agent queries, run concurrently.

use super::{CommandResult, Progress};
use agentloop_agent::ToolAgent;
use agentloop_core::event::EventBus;
use agentloop_core::state::SessionState;
use futures::future::join_all;
use std::sync::Arc;

const SAMPLE_QUERIES: [&str; 3] = [
    "What is the capital of France?",
    "What's the weather like in London?",
    "Tell me something about dogs.",
];

const INSTRUCTION: &str = "You are a helpful assistant. \
                           Use the `search_information` tool to look up facts before answering.";

pub async fn run(queries: Vec<String>) -> CommandResult {
    let config = super::load_config()?;
    let provider = super::default_provider(&config)?;

    let queries = if queries.is_empty() {
        SAMPLE_QUERIES.iter().map(|q| q.to_string()).collect()
    } else {
        queries
    };

    println!("💬 Running {} queries", queries.len());
    println!();

    let bus = Arc::new(EventBus::default());
    let progress = Progress::attach(&bus);

    let answers = {
        let agent = ToolAgent::new(
            "SearchAgent",
            provider,
            &config.default_model,
            Arc::new(agentloop_tools::default_registry()),
        )
        .with_instruction(INSTRUCTION)
        .with_temperature(config.default_temperature)
        .with_max_tokens(config.default_max_tokens)
        .with_event_bus(bus);

        // Each query gets its own state; nothing is shared between them
        let runs = queries.iter().map(|query| {
            let agent = &agent;
            async move {
                let mut state = SessionState::new();
                agent.run(query, &mut state).await
            }
        });
        join_all(runs).await
    };
    progress.finish().await;

    println!();
    for (query, answer) in queries.iter().zip(answers) {
        println!("👤 {query}");
        match answer {
            Ok(text) => println!("🤖 {text}"),
            Err(e) => println!("❌ {e}"),
        }
        println!();
    }

    Ok(())
}
