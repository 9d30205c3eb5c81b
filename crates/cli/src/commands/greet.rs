//! `agentloop greet` — one step whose answer is saved into the session.

use super::CommandResult;
use agentloop_agent::{LlmStep, RetryPolicy, run_step};
use agentloop_core::state::SessionState;
use agentloop_session::{InMemorySessionService, SessionService};

const DEFAULT_MESSAGE: &str = "Hello!";

pub async fn run(message: Option<String>) -> CommandResult {
    let message = message.unwrap_or_else(|| DEFAULT_MESSAGE.to_string());
    let config = super::load_config()?;
    let provider = super::default_provider(&config)?;

    let sessions = InMemorySessionService::new();
    let mut session = sessions
        .create_session(
            &config.session.app_name,
            &config.session.user_id,
            None,
            SessionState::new(),
        )
        .await?;

    println!("👋 Session {}", session.id);
    println!("   State before: {}", session.state);

    let greeter = LlmStep::new("Greeter", provider, &config.default_model)
        .with_instruction("Generate a short, friendly greeting.")
        .with_input("{temp:user_message}")
        .with_output_key("last_greeting")
        .with_temperature(config.default_temperature)
        .with_max_tokens(config.default_max_tokens);

    session.state.set("temp:user_message", message);
    let greeting = run_step(&greeter, &mut session.state, &RetryPolicy::none(), None).await?;
    sessions.commit(&session).await?;

    println!();
    println!("🤖 {greeting}");
    println!();

    let stored = sessions
        .get_session(&session.app_name, &session.user_id, &session.id)
        .await?;
    println!("   State after:  {}", stored.state);

    Ok(())
}
