//! Model descriptions and the model registry.
//!
//! A [`Model`] is an immutable description of one backend model: where it
//! lives, which wire protocol (API) speaks to it, and what it costs. Models
//! are registered once at startup and only read afterwards.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::message::Cost;

/// Well-known API identifiers understood by the adapter dispatcher.
pub mod api {
    /// OpenAI-compatible `/chat/completions` streaming.
    pub const OPENAI_COMPLETIONS: &str = "openai-completions";
    /// OpenAI-compatible completions fronted by GitHub Copilot credentials.
    pub const COPILOT_COMPLETIONS: &str = "github-copilot-completions";
}

/// Input modality a model accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputModality {
    Text,
    Image,
}

/// Dollar rates per one million tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelCost {
    pub input: f64,
    pub output: f64,
    #[serde(default)]
    pub cache_read: f64,
    #[serde(default)]
    pub cache_write: f64,
}

impl ModelCost {
    /// Price the given token counts. Each component is `tokens * rate / 1M`.
    pub fn cost(&self, input: u64, output: u64, cache_read: u64, cache_write: u64) -> Cost {
        let per_m = |tokens: u64, rate: f64| tokens as f64 / 1_000_000.0 * rate;
        let input = per_m(input, self.input);
        let output = per_m(output, self.output);
        let cache_read = per_m(cache_read, self.cache_read);
        let cache_write = per_m(cache_write, self.cache_write);
        Cost {
            input,
            output,
            cache_read,
            cache_write,
            total: input + output + cache_read + cache_write,
        }
    }
}

/// A target model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Backend model id sent on the wire (e.g., "gpt-4o-mini")
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// API identifier used to pick the stream adapter
    pub api: String,

    /// Provider name (e.g., "openai", "github-copilot")
    pub provider: String,

    /// Base URL without trailing slash
    pub base_url: String,

    /// Whether the model supports extended reasoning
    #[serde(default)]
    pub reasoning: bool,

    #[serde(default = "default_input")]
    pub input: Vec<InputModality>,

    #[serde(default)]
    pub cost: ModelCost,

    pub context_window: u32,

    pub max_tokens: u32,

    /// Extra HTTP headers sent with every request to this model
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

fn default_input() -> Vec<InputModality> {
    vec![InputModality::Text]
}

impl Model {
    /// Copy of this model pointed at another base URL.
    pub fn with_base_url(&self, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..self.clone()
        }
    }
}

/// Registry of known models, keyed by id.
///
/// Per-provider listings preserve registration order.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, Model>,
    order: Vec<String>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the built-in catalog.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for model in builtin_models() {
            registry.register(model);
        }
        registry
    }

    /// Register a model. Replaces an existing entry with the same id.
    pub fn register(&mut self, model: Model) {
        if !self.models.contains_key(&model.id) {
            self.order.push(model.id.clone());
        }
        self.models.insert(model.id.clone(), model);
    }

    pub fn get(&self, id: &str) -> Option<&Model> {
        self.models.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.models.contains_key(id)
    }

    /// All models for a provider, in registration order.
    pub fn for_provider(&self, provider: &str) -> Vec<&Model> {
        self.all()
            .into_iter()
            .filter(|m| m.provider == provider)
            .collect()
    }

    /// All models, in registration order.
    pub fn all(&self) -> Vec<&Model> {
        self.order.iter().filter_map(|id| self.models.get(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

fn openai_model(id: &str, name: &str, cost: ModelCost, context_window: u32, max_tokens: u32) -> Model {
    Model {
        id: id.into(),
        name: name.into(),
        api: api::OPENAI_COMPLETIONS.into(),
        provider: "openai".into(),
        base_url: "https://api.openai.com/v1".into(),
        reasoning: false,
        input: vec![InputModality::Text, InputModality::Image],
        cost,
        context_window,
        max_tokens,
        headers: HashMap::new(),
    }
}

fn copilot_model(id: &str, name: &str, reasoning: bool, context_window: u32, max_tokens: u32) -> Model {
    Model {
        id: id.into(),
        name: name.into(),
        api: api::COPILOT_COMPLETIONS.into(),
        provider: "github-copilot".into(),
        base_url: "https://api.individual.githubcopilot.com".into(),
        reasoning,
        input: vec![InputModality::Text, InputModality::Image],
        // Billed by subscription, not per token
        cost: ModelCost::default(),
        context_window,
        max_tokens,
        headers: HashMap::new(),
    }
}

fn builtin_models() -> Vec<Model> {
    vec![
        openai_model(
            "gpt-4o",
            "GPT-4o",
            ModelCost { input: 2.5, output: 10.0, cache_read: 1.25, cache_write: 0.0 },
            128_000,
            16_384,
        ),
        openai_model(
            "gpt-4o-mini",
            "GPT-4o mini",
            ModelCost { input: 0.15, output: 0.6, cache_read: 0.075, cache_write: 0.0 },
            128_000,
            16_384,
        ),
        openai_model(
            "gpt-4.1",
            "GPT-4.1",
            ModelCost { input: 2.0, output: 8.0, cache_read: 0.5, cache_write: 0.0 },
            1_047_576,
            32_768,
        ),
        openai_model(
            "gpt-4.1-mini",
            "GPT-4.1 mini",
            ModelCost { input: 0.4, output: 1.6, cache_read: 0.1, cache_write: 0.0 },
            1_047_576,
            32_768,
        ),
        copilot_model("gpt-4o-copilot", "GPT-4o (Copilot)", false, 128_000, 16_384),
        copilot_model("claude-sonnet-4-copilot", "Claude Sonnet 4 (Copilot)", true, 128_000, 16_000),
    ]
}
