//! `agentloop login` — a tool-calling agent whose tools edit session state.

use super::{CommandResult, Progress};
use agentloop_agent::ToolAgent;
use agentloop_core::event::EventBus;
use agentloop_core::state::SessionState;
use agentloop_session::{InMemorySessionService, SessionService};
use std::sync::Arc;

const DEFAULT_MESSAGE: &str = "Hello, please show me my state!";

const APP_NAME: &str = "tool_app";
const USER_ID: &str = "user3";
const SESSION_ID: &str = "session3";

const INSTRUCTION: &str = "When the user says hello, respond with a greeting. \
                           Also call the `log_user_login` tool to track logins, \
                           then call `show_state` to display the updated session state.";

fn initial_state() -> SessionState {
    let mut state = SessionState::new();
    state.set("user:login_count", 0);
    state.set("task_status", "idle");
    state
}

pub async fn run(message: Option<String>) -> CommandResult {
    let message = message.unwrap_or_else(|| DEFAULT_MESSAGE.to_string());
    let config = super::load_config()?;
    let provider = super::default_provider(&config)?;

    let sessions = InMemorySessionService::new();
    let mut session = sessions
        .create_session(APP_NAME, USER_ID, Some(SESSION_ID), initial_state())
        .await?;

    println!("🔐 Session {APP_NAME}/{USER_ID}/{SESSION_ID}");
    println!("   Initial state: {}", session.state);
    println!();
    println!("👤 {message}");

    let bus = Arc::new(EventBus::default());
    let progress = Progress::attach(&bus);

    let result = {
        let agent = ToolAgent::new(
            "LoginAgent",
            provider,
            &config.default_model,
            Arc::new(agentloop_tools::default_registry()),
        )
        .with_instruction(INSTRUCTION)
        .with_output_key("last_greeting")
        .with_temperature(config.default_temperature)
        .with_max_tokens(config.default_max_tokens)
        .with_event_bus(bus);

        agent.run(&message, &mut session.state).await
    };
    progress.finish().await;

    let answer = result?;
    println!("🤖 {answer}");
    println!();
    println!("   Before commit: {}", session.state);

    sessions.commit(&session).await?;
    let stored = sessions.get_session(APP_NAME, USER_ID, SESSION_ID).await?;
    println!("   After commit:  {}", stored.state);

    Ok(())
}
