//! Subcommand implementations plus the wiring they share.

pub mod ask;
pub mod config_cmd;
pub mod extract;
pub mod greet;
pub mod login;
pub mod parallel;
pub mod poll;

use agentloop_config::AppConfig;
use agentloop_core::event::{EventBus, LoopEvent};
use agentloop_core::provider::Provider;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    AppConfig::load().map_err(|e| format!("Failed to load config: {e}").into())
}

/// Resolve the configured default provider, failing early without a key.
pub fn default_provider(config: &AppConfig) -> Result<Arc<dyn Provider>, Box<dyn std::error::Error>> {
    let provider_has_key = config
        .providers
        .get(&config.default_provider)
        .is_some_and(|p| p.api_key.is_some());

    if !config.has_api_key() && !provider_has_key && config.default_provider != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    GOOGLE_API_KEY     (Gemini, the default provider)");
        eprintln!("    OPENAI_API_KEY     (with AGENTLOOP_PROVIDER=openai)");
        eprintln!("    AGENTLOOP_API_KEY  (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let router = agentloop_providers::build_from_config(config);
    Ok(router.default_provider()?)
}

/// Prints loop events as they arrive.
///
/// The printer stops once every handle to the bus is dropped, so drop the
/// loop (and everything holding the bus) before calling [`Progress::finish`].
pub struct Progress {
    handle: JoinHandle<()>,
}

impl Progress {
    pub fn attach(bus: &EventBus) -> Self {
        let mut rx = bus.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => print_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Progress output fell behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Self { handle }
    }

    pub async fn finish(self) {
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "Progress printer stopped abnormally");
        }
    }
}

fn print_event(event: &LoopEvent) {
    match event {
        LoopEvent::IterationStarted { iteration, .. } => {
            println!("  ── Iteration {iteration} ──");
        }
        LoopEvent::StepCompleted {
            step,
            output_key,
            preview,
            ..
        } => match output_key {
            Some(key) => println!("     {step} → {key}: {preview}"),
            None => println!("     {step}: {preview}"),
        },
        LoopEvent::StepRetried {
            step,
            attempt,
            reason,
            ..
        } => println!("     ⚠️  {step} attempt {attempt}: {reason}"),
        LoopEvent::ConditionEvaluated {
            status, terminate, ..
        } => {
            let verdict = if *terminate { "stop" } else { "continue" };
            println!("     status = {status} ({verdict})");
        }
        LoopEvent::LoopFinished {
            loop_name, outcome, ..
        } => println!("  ✅ {loop_name} {outcome}"),
        LoopEvent::ToolExecuted {
            tool_name,
            success,
            duration_ms,
            ..
        } => {
            let mark = if *success { "🛠️ " } else { "❌" };
            println!("     {mark} {tool_name} ({duration_ms} ms)");
        }
        LoopEvent::ResponseGenerated {
            model, tokens_used, ..
        } => tracing::debug!(model = %model, tokens_used, "Response generated"),
    }
}
