//! Library root for `concierge-bot`.
//!
//! Concierge-bot is an OpenAI-powered assistant for Slack designed to:
//! - Answer direct messages and @-mentions in their threads
//! - Carry per-thread conversation history across turns
//! - Optionally ground answers in retrieved knowledge passages
//! - Render model output in Slack's mrkdwn dialect
//!
//! The bot integrates with Slack for chat, SurrealDB for storage,
//! and OpenAI for responses and embeddings. The architecture is built around
//! extensible traits that allow for different implementations of each service.

#[deny(missing_docs)]
pub mod base;
pub mod interaction;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use rustls::crypto;
use service::{db::DbClient, llm::LlmClient, retrieval::{PassageRecord, RetrievalClient}};
use tracing::info;

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the concierge-bot runtime:
/// - Initializes the crypto provider
/// - Creates the runtime context with database, LLM, retrieval, and chat clients
/// - Starts the webhook server for processing events
pub async fn start(config: Config) -> Void {
    info!("Starting concierge-bot ...");

    // Start the crypto provider.
    crypto::ring::default_provider().install_default().unwrap();

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config).await?;

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}

/// Ingest a knowledge file into the retrieval collection.
///
/// The file is JSON Lines: one `{"id": …, "text": …, "metadata": {…}}` object
/// per line (blank lines are skipped). Each passage is embedded and upserted,
/// so reloading the same file is idempotent.
pub async fn load_knowledge(config: Config, path: &std::path::Path) -> Void {
    info!("Loading knowledge from {} ...", path.display());

    crypto::ring::default_provider().install_default().unwrap();

    let db = DbClient::new(&config).await?;
    let llm = LlmClient::openai(&config);
    let retrieval = RetrievalClient::surreal(&config, db, llm);

    retrieval.ensure_collection().await?;

    let contents = std::fs::read_to_string(path)?;
    let passages = contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(serde_json::from_str::<PassageRecord>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow::anyhow!("invalid knowledge file: {e}"))?;

    let indexed = retrieval.index_passages(&passages).await?;

    info!("Successfully added {indexed} knowledge entries.");

    Ok(())
}
