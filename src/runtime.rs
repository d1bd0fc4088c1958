//! Runtime services and shared state for concierge-bot.

use tracing::instrument;

use crate::{
    base::{
        config::Config,
        types::{Res, Void},
    },
    service::{chat::ChatClient, db::DbClient, llm::LlmClient, retrieval::RetrievalClient},
};

/// Runtime service context that can be shared across the application.
///
/// This struct holds the database, LLM, retrieval, and chat clients plus the
/// configuration. It is the composition root: every service handle is
/// constructed here and injected, never referenced as an ambient singleton.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The database client instance.
    pub db: DbClient,
    /// The LLM client instance.
    pub llm: LlmClient,
    /// The retrieval client instance.
    pub retrieval: RetrievalClient,
    /// The chat client instance.
    pub chat: ChatClient,
}

impl Runtime {
    /// Create a new runtime instance.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<Self> {
        // Initialize the database.
        let db = DbClient::new(&config).await?;

        // Initialize the LLM client.
        let llm = LlmClient::openai(&config);

        // Initialize the retrieval client, bootstrapping its collection when
        // retrieval is in use.
        let retrieval = RetrievalClient::surreal(&config, db.clone(), llm.clone());

        if config.retrieval_enabled {
            retrieval.ensure_collection().await?;
        }

        // Initialize the Slack client.
        let chat = ChatClient::slack(&config, db.clone(), llm.clone(), retrieval.clone()).await?;

        Ok(Self { config, db, llm, retrieval, chat })
    }

    pub async fn start(&self) -> Void {
        self.chat.start().await
    }
}
