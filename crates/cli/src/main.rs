//! agentpi CLI — the main entry point.
//!
//! Commands:
//! - `chat`    — Send one message and stream the reply to stdout
//! - `models`  — List the models the registry knows about

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "agentpi",
    about = "agentpi — streaming LLM agent runtime",
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
    /// Send a single message to the agent
    Chat {
        /// The message to send
        #[arg(short, long)]
        message: String,

        /// Model id (defaults to `default_model` from config)
        #[arg(long)]
        model: Option<String>,

        /// Override the configured system prompt
        #[arg(long)]
        system: Option<String>,
    },

    /// List available models
    Models,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only model text
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Chat {
            message,
            model,
            system,
        } => commands::chat::run(message, model, system).await?,
        Commands::Models => commands::models::run().await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn chat_parses_flags() {
        let cli = Cli::parse_from([
            "agentpi", "chat", "-m", "hello", "--model", "gpt-4o", "--system", "Be brief.",
        ]);
        match cli.command {
            Commands::Chat {
                message,
                model,
                system,
            } => {
                assert_eq!(message, "hello");
                assert_eq!(model.as_deref(), Some("gpt-4o"));
                assert_eq!(system.as_deref(), Some("Be brief."));
            }
            Commands::Models => panic!("expected chat"),
        }
    }

    #[test]
    fn verbose_is_global() {
        let cli = Cli::parse_from(["agentpi", "models", "--verbose"]);
        assert!(cli.verbose);
    }
}
