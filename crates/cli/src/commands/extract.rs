//! `agentloop extract` — prompt chaining.
//!
//! Step one pulls the technical specifications out of free text; step two
//! turns them into a validated `{CPU, RAM, Storage}` record.

use super::{CommandResult, Progress};
use agentloop_agent::{LlmStep, SequentialChain};
use agentloop_core::event::EventBus;
use agentloop_core::schema::{FieldKind, FieldSpec, OutputSchema};
use agentloop_core::state::SessionState;
use std::sync::Arc;

const SAMPLE_TEXT: &str = "The new laptop model features a 3.5 GHz octa-core processor, \
                           16GB of RAM, and a 1TB NVMe SSD.";

fn specifications_schema() -> OutputSchema {
    OutputSchema::new("Specifications")
        .field(FieldSpec::required("CPU", FieldKind::String))
        .field(FieldSpec::required("RAM", FieldKind::String))
        .field(FieldSpec::required("Storage", FieldKind::String))
}

pub async fn run(text: Option<String>) -> CommandResult {
    let config = super::load_config()?;
    let provider = super::default_provider(&config)?;

    let mut state = SessionState::new();
    state.set("text", text.unwrap_or_else(|| SAMPLE_TEXT.to_string()));

    let bus = Arc::new(EventBus::default());
    let progress = Progress::attach(&bus);

    let result = {
        let extract = LlmStep::new("extract", provider.clone(), &config.default_model)
            .with_instruction("Extract the technical specifications from the following text. text:\n{text}")
            .with_output_key("specifications")
            .with_temperature(0.0)
            .with_event_bus(bus.clone());
        let transform = LlmStep::new("transform", provider, &config.default_model)
            .with_instruction(
                "Transform the following technical specifications into a JSON object \
                 with keys 'CPU', 'RAM' and 'Storage':\n{specifications}",
            )
            .with_schema(specifications_schema())
            .with_output_key("specs_json")
            .with_temperature(0.0)
            .with_event_bus(bus.clone());

        SequentialChain::new("prompt_chaining")
            .then(Arc::new(extract))
            .then(Arc::new(transform))
            .with_event_bus(bus)
            .run(state)
            .await
    };
    progress.finish().await;

    let run = result?;
    println!();
    match run.output.as_ref().and_then(|o| o.as_record()) {
        Some(record) => println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::Value::Object(record.clone()))?
        ),
        None => println!("(no structured output)"),
    }

    Ok(())
}
