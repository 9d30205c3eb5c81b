//! agentloop CLI — the main entry point.
//!
//! Commands:
//! - `poll`      — Run the status-polling loop until completed or exhausted
//! - `extract`   — Prompt chaining: extract laptop specifications, then transform them to JSON
//! - `parallel`  — Fan out summary/questions/key terms, then synthesize
//! - `greet`     — One step whose answer is saved under an output key
//! - `login`     — Tool agent whose tools mutate session state
//! - `ask`       — Several tool-calling queries run concurrently
//! - `config`    — Show, locate, validate or initialize the config file

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "agentloop",
    about = "agentloop — bounded agent loops, chains and tool agents",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the status-polling loop
    Poll {
        /// Override the iteration bound from the config file
        #[arg(short, long)]
        max_iterations: Option<u32>,

        /// Log the status before and after every step
        #[arg(long)]
        trace: bool,
    },

    /// Extract technical specifications and transform them into JSON
    Extract {
        /// Text to extract from (a laptop description by default)
        text: Option<String>,
    },

    /// Summarize, question and tag a topic in parallel, then synthesize
    Parallel {
        /// Topic to process
        topic: Option<String>,
    },

    /// Generate a greeting and store it under `last_greeting`
    Greet {
        /// The user message
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Track a login through tools that mutate session state
    Login {
        /// The user message
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Ask questions answered with the search tool, concurrently
    Ask {
        /// Questions to ask (three samples by default)
        queries: Vec<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Validate the configuration
    Validate,
    /// Write a default config file if none exists
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Poll {
            max_iterations,
            trace,
        } => commands::poll::run(max_iterations, trace).await?,
        Commands::Extract { text } => commands::extract::run(text).await?,
        Commands::Parallel { topic } => commands::parallel::run(topic).await?,
        Commands::Greet { message } => commands::greet::run(message).await?,
        Commands::Login { message } => commands::login::run(message).await?,
        Commands::Ask { queries } => commands::ask::run(queries).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Init => commands::config_cmd::init().await?,
        },
    }

    Ok(())
}
