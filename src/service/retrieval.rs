//! Similarity search over a knowledge-passage collection.
//!
//! Passages live in the datastore alongside the conversation log: a `passage`
//! table carrying the text, a string-to-string metadata map, and an embedding
//! vector indexed for cosine knn. Query embedding is delegated to the LLM
//! client.

use std::{collections::BTreeMap, ops::Deref, sync::Arc};

use crate::base::{
    config::Config,
    types::{BotError, Res, Void},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::{db::DbClient, llm::LlmClient};

// Traits.

/// Generic retrieval client trait that clients must implement.
#[async_trait]
pub trait GenericRetrievalClient {
    /// Idempotently create the passage collection and its vector index.
    async fn ensure_collection(&self) -> Void;
    /// Return up to `top_k` passages most relevant to `query`, best first.
    async fn retrieve(&self, query: &str, top_k: usize) -> Res<Vec<RetrievedPassage>>;
    /// Embed and index a batch of passages. Returns the number indexed.
    async fn index_passages(&self, passages: &[PassageRecord]) -> Res<usize>;
}

// Structs.

/// A passage returned from a similarity search. Ephemeral; produced per query
/// and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub text: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// One passage of the knowledge file handed to `index_passages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassageRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Retrieval client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct RetrievalClient {
    inner: Arc<dyn GenericRetrievalClient + Send + Sync + 'static>,
}

impl Deref for RetrievalClient {
    type Target = dyn GenericRetrievalClient + Send + Sync + 'static;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl RetrievalClient {
    /// Wrap an arbitrary implementation (used by tests).
    pub fn new(inner: Arc<dyn GenericRetrievalClient + Send + Sync + 'static>) -> Self {
        Self { inner }
    }

    /// Creates a datastore-backed retrieval client.
    pub fn surreal(config: &Config, db: DbClient, llm: LlmClient) -> Self {
        let client = SurrealRetrievalClient::new(config, db, llm);
        Self { inner: Arc::new(client) }
    }
}

// Specific implementations.

/// Row shape stored in the `passage` table.
#[derive(Debug, Serialize)]
struct PassageRow {
    text: String,
    metadata: BTreeMap<String, String>,
    embedding: Vec<f32>,
}

/// Retrieval over the datastore's MTREE cosine index.
#[derive(Clone)]
pub struct SurrealRetrievalClient {
    db: DbClient,
    llm: LlmClient,
    dimension: usize,
}

impl SurrealRetrievalClient {
    pub fn new(config: &Config, db: DbClient, llm: LlmClient) -> Self {
        Self {
            db,
            llm,
            dimension: config.embedding_dimension,
        }
    }
}

#[async_trait]
impl GenericRetrievalClient for SurrealRetrievalClient {
    #[instrument(skip_all)]
    async fn ensure_collection(&self) -> Void {
        self.db.query("DEFINE TABLE IF NOT EXISTS passage SCHEMALESS").await.map_err(retrieval_unavailable)?;

        self.db
            .query(format!(
                "DEFINE INDEX IF NOT EXISTS passage_embedding ON passage FIELDS embedding MTREE DIMENSION {} DIST COSINE",
                self.dimension
            ))
            .await
            .map_err(retrieval_unavailable)?;

        info!("Passage collection is ready.");

        Ok(())
    }

    #[instrument(skip(self))]
    async fn retrieve(&self, query: &str, top_k: usize) -> Res<Vec<RetrievedPassage>> {
        let vector = self.llm.embed(query).await.map_err(|err| BotError::RetrievalUnavailable(anyhow::Error::new(err)))?;

        let mut response = self
            .db
            .query(format!(
                "SELECT text, metadata, vector::distance::knn() AS distance FROM passage WHERE embedding <|{top_k}|> $query_embedding ORDER BY distance ASC"
            ))
            .bind(("query_embedding", vector))
            .await
            .map_err(retrieval_unavailable)?;

        let passages: Vec<RetrievedPassage> = response.take(0).map_err(retrieval_unavailable)?;

        debug!("Retrieved {} passages.", passages.len());

        Ok(passages)
    }

    #[instrument(skip_all)]
    async fn index_passages(&self, passages: &[PassageRecord]) -> Res<usize> {
        let mut indexed = 0usize;

        for passage in passages {
            let embedding = self.llm.embed(&passage.text).await.map_err(|err| BotError::RetrievalUnavailable(anyhow::Error::new(err)))?;

            let row = PassageRow {
                text: passage.text.clone(),
                metadata: passage.metadata.clone(),
                embedding,
            };

            let id = passage.id.clone().unwrap_or_else(|| surrealdb::sql::Id::ulid().to_string());

            // Upsert keeps reloading the same knowledge file idempotent.
            let _stored: Option<RetrievedPassage> = self.db.upsert(("passage", id)).content(row).await.map_err(retrieval_unavailable)?;

            indexed += 1;
        }

        info!("Indexed {indexed} passages.");

        Ok(indexed)
    }
}

fn retrieval_unavailable(err: surrealdb::Error) -> BotError {
    BotError::RetrievalUnavailable(err.into())
}
