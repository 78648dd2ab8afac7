//! `agentpi models` — List known models.

use agentpi_config::AppConfig;
use agentpi_core::model::Model;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let registry = config.model_registry();

    println!("Available models ({})", registry.len());
    println!();
    println!("  {}", header());
    for model in registry.all() {
        let marker = if model.id == config.default_model { "*" } else { " " };
        println!("{marker} {}", row(model));
    }
    println!();
    println!("  * default model; override with --model <id> or AGENTPI_MODEL");

    Ok(())
}

fn header() -> String {
    format!(
        "{:<26} {:<16} {:<28} {:>9} {:>14}",
        "MODEL", "PROVIDER", "API", "CONTEXT", "$/M IN / OUT"
    )
}

fn row(model: &Model) -> String {
    format!(
        "{:<26} {:<16} {:<28} {:>9} {:>14}",
        model.id,
        model.provider,
        model.api,
        model.context_window,
        format!("{:.2} / {:.2}", model.cost.input, model.cost.output),
    )
}
