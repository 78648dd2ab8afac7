//! `agentpi chat` — Send one message and stream the reply.

use std::io::Write;
use std::sync::Arc;

use agentpi_agent::{Agent, AgentError, AgentEvent, AgentLoopConfig};
use agentpi_config::AppConfig;
use agentpi_core::error::ProviderError;
use agentpi_core::event::AssistantMessageEvent;
use agentpi_core::provider::StreamOptions;
use agentpi_providers::build_from_config;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

pub async fn run(
    message: String,
    model: Option<String>,
    system: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let model_id = model.unwrap_or_else(|| config.default_model.clone());
    let model = config.resolve_model(&model_id)?;
    let router = Arc::new(build_from_config(&config));

    let keys = config.clone();
    let loop_config = AgentLoopConfig::new(model)
        .with_stream_options(StreamOptions {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            ..StreamOptions::default()
        })
        .with_api_key_provider(move |provider| {
            let key = keys.api_key_for(provider);
            async move { key }.boxed()
        });

    let mut agent = Agent::with_config(router, loop_config);
    agent.set_system_prompt(system.unwrap_or_else(|| config.system_prompt.clone()));
    agent.set_thinking_level(config.thinking_level);

    let _printer = agent.subscribe(|event| {
        if let Some(delta) = text_delta(event) {
            print!("{delta}");
            let _ = std::io::stdout().flush();
        }
    });

    // Ctrl-C cancels the run; the partial reply is kept
    let abort = agent.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.abort();
        }
    });

    let result = agent.prompt(message, CancellationToken::new()).await;
    println!();

    match result {
        Err(AgentError::Provider(ProviderError::MissingApiKey(provider))) => {
            eprintln!();
            eprintln!("  ERROR: No API key configured for '{provider}'!");
            eprintln!();
            eprintln!("  Set one of these environment variables:");
            eprintln!("    AGENTPI_API_KEY / OPENAI_API_KEY");
            eprintln!();
            eprintln!("  Or add it to your config file:");
            eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
            eprintln!();
            Err("No API key found. See above for setup instructions.".into())
        }
        Err(e) => Err(e.into()),
        Ok(()) => match &agent.state().error {
            Some(error) => Err(error.clone().into()),
            None => Ok(()),
        },
    }
}

/// The text fragment an event adds to the reply, if any.
fn text_delta(event: &AgentEvent) -> Option<&str> {
    match event {
        AgentEvent::MessageUpdate {
            assistant_event: AssistantMessageEvent::TextDelta { delta, .. },
            ..
        } => Some(delta),
        _ => None,
    }
}
