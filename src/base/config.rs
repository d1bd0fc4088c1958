//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, sync::Arc};

use serde::Deserialize;

use crate::base::prompts;

use super::types::Res;

/// Default OpenAI chat model to use
fn default_openai_model() -> String {
    "gpt-4o".to_string()
}

/// Default OpenAI embedding model to use
fn default_openai_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}

/// Default sampling temperature for the chat model
fn default_openai_temperature() -> f32 {
    0.7
}

/// Default system instructions for the assistant.
fn default_system_instructions() -> String {
    prompts::DEFAULT_SYSTEM_INSTRUCTIONS.to_string()
}

/// Default webhook listen port
fn default_port() -> u16 {
    3000
}

/// Default embedding vector dimension (matches the default embedding model)
fn default_embedding_dimension() -> usize {
    1536
}

/// Default passage count for a retrieval query
fn default_retrieval_top_k() -> usize {
    3
}

/// What to do with a turn when the retrieval call fails.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalPolicy {
    /// Proceed with empty retrieved-context.
    #[default]
    BestEffort,
    /// Fail the turn.
    Fatal,
}

/// Configuration for the concierge-bot application.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Shared, reference-counted configuration body.
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// The deserialized configuration body shared behind [`Config`].
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConfigInner {
    /// Slack bot token (`SLACK_BOT_TOKEN`).
    pub slack_bot_token: String,
    /// Slack signing secret used to verify inbound webhooks (`SLACK_SIGNING_SECRET`).
    pub slack_signing_secret: String,
    /// Port for the inbound event webhook (`PORT`).
    #[serde(default = "default_port")]
    pub port: u16,
    /// OpenAI API key (`OPENAI_API_KEY`).
    pub openai_api_key: String,
    /// OpenAI chat model to use (`OPENAI_MODEL`).
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    /// Sampling temperature for the chat model (`OPENAI_TEMPERATURE`).
    /// Value between 0 and 2.
    #[serde(default = "default_openai_temperature")]
    pub openai_temperature: f32,
    /// System instructions prepended to every inference call (`SYSTEM_INSTRUCTIONS`).
    #[serde(default = "default_system_instructions")]
    pub system_instructions: String,
    /// OpenAI embedding model for retrieval queries (`OPENAI_EMBEDDING_MODEL`).
    #[serde(default = "default_openai_embedding_model")]
    pub openai_embedding_model: String,
    /// Dimension of the embedding vectors (`EMBEDDING_DIMENSION`).
    /// Must match the embedding model's output dimension.
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
    /// Database endpoint URL, e.g. `ws://localhost:8000` or `mem://` (`DB_ENDPOINT`).
    pub db_endpoint: String,
    /// Database username; empty skips authentication (`DB_USERNAME`).
    #[serde(default)]
    pub db_username: String,
    /// Database password (`DB_PASSWORD`).
    #[serde(default)]
    pub db_password: String,
    /// Whether to augment prompts with retrieved passages (`RETRIEVAL_ENABLED`).
    #[serde(default)]
    pub retrieval_enabled: bool,
    /// Whether a retrieval failure fails the turn (`RETRIEVAL_POLICY`, `fatal` or `best_effort`).
    #[serde(default)]
    pub retrieval_policy: RetrievalPolicy,
    /// Number of passages to retrieve per query (`RETRIEVAL_TOP_K`).
    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,
}

impl Config {
    /// Load configuration from the environment and an optional config file,
    /// validating the result.
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(config::Environment::default());

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        if result.openai_temperature < 0.0 || result.openai_temperature > 2.0 {
            return Err(anyhow::anyhow!("OpenAI temperature must be between 0 and 2.").into());
        }

        if result.retrieval_top_k < 1 {
            return Err(anyhow::anyhow!("Retrieval top-k must be at least 1.").into());
        }

        if result.embedding_dimension < 1 {
            return Err(anyhow::anyhow!("Embedding dimension must be at least 1.").into());
        }

        Ok(result)
    }
}
