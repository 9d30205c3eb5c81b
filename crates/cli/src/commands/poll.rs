//! `agentloop poll` — the status-polling loop.
//!
//! The processing step reports `pending` until its iteration counter
//! reaches 3; the status condition stops the loop on `completed`.

use super::{CommandResult, Progress};
use agentloop_agent::{
    IterationCounter, LlmStep, LoopController, RetryPolicy, StatusCondition, StepTrace,
};
use agentloop_config::LoopConfig;
use agentloop_core::event::EventBus;
use agentloop_core::schema::{FieldKind, FieldSpec, OutputSchema};
use agentloop_core::state::SessionState;
use agentloop_session::{InMemorySessionService, SessionService};
use std::sync::Arc;
use std::time::Duration;

fn instruction(config: &LoopConfig) -> String {
    format!(
        "You are a step in a longer, multi-step process. \
         Current iteration: {{iterative}}. \
         If the iteration is 3 or higher, the process {field} should be {terminal}. \
         Otherwise, it should be {pending}.",
        field = config.status_field,
        terminal = config.terminal_status,
        pending = config.pending_status,
    )
}

fn schema(config: &LoopConfig) -> OutputSchema {
    OutputSchema::new("StatusResult").field(FieldSpec::required(
        &config.status_field,
        FieldKind::Literal(vec![
            config.terminal_status.clone(),
            config.pending_status.clone(),
        ]),
    ))
}

/// Counters as the polling session starts: one check already done, no
/// processing iterations yet.
fn initial_state() -> SessionState {
    let mut state = SessionState::new();
    state.set("checking", 1);
    state.set("iterative", 0);
    state
}

pub async fn run(max_iterations: Option<u32>, trace: bool) -> CommandResult {
    let config = super::load_config()?;
    let provider = super::default_provider(&config)?;
    let loop_config = &config.loop_config;

    let sessions = InMemorySessionService::new();
    let mut session = sessions
        .create_session(
            &config.session.app_name,
            &config.session.user_id,
            None,
            initial_state(),
        )
        .await?;

    println!("🔁 Status polling");
    println!("   Model:          {}", config.default_model);
    println!(
        "   Max iterations: {}",
        max_iterations.unwrap_or(loop_config.max_iterations)
    );
    println!();

    let bus = Arc::new(EventBus::default());
    let progress = Progress::attach(&bus);

    let result = {
        let step = LlmStep::new("ProcessingStep", provider, &config.default_model)
            .with_instruction(instruction(loop_config))
            .with_schema(schema(loop_config))
            .with_output_key(&loop_config.output_key)
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens)
            .with_event_bus(bus.clone());

        let mut controller = LoopController::new(
            Arc::new(step),
            Arc::new(StatusCondition::from_config(loop_config)),
        )
        .with_max_iterations(max_iterations.unwrap_or(loop_config.max_iterations))
        .with_retry(RetryPolicy::new(loop_config.max_attempts))
        .with_stage(IterationCounter::before("checking"))
        .with_stage(IterationCounter::before("iterative"))
        .with_event_bus(bus);

        if trace {
            controller = controller.with_stage(StepTrace::new(&loop_config.output_key));
        }
        if let Some(secs) = loop_config.time_budget_secs {
            controller = controller.with_time_budget(Duration::from_secs(secs));
        }

        controller.run(session.state.clone()).await
    };
    progress.finish().await;

    let run = result?;
    println!();
    println!("   Outcome: {}", run.outcome);
    println!("   Steps:   {}", run.steps_invoked);

    session.state = run.state;
    sessions.commit(&session).await?;
    let stored = sessions
        .get_session(&session.app_name, &session.user_id, &session.id)
        .await?;
    println!("   State:   {}", stored.state);

    Ok(())
}
