//! SurrealDB implementation for conversation storage.

use std::ops::Deref;

use crate::base::{
    config::Config,
    types::{BotError, ChatTurn, Res, TurnRole, Void},
};
use serde::{Deserialize, Serialize};
use surrealdb::{
    Surreal,
    engine::any::{Any, connect},
    opt::auth::Root,
};
use tracing::{info, instrument};

/// Database client for concierge-bot.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct DbClient {
    /// The SurrealDB client instance.
    db: Surreal<Any>,
}

impl Deref for DbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// A persisted conversation message. Append-only; rows are never updated or
/// deleted.
#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub thread_ts: String,
    pub channel: String,
    pub author_id: String,
    pub text: String,
    pub role: TurnRole,
    pub created_at: surrealdb::sql::Datetime,
}

impl DbClient {
    /// Create a new database client from configuration.
    ///
    /// The endpoint is any SurrealDB `engine::any` address, e.g.
    /// `ws://localhost:8000` or `mem://`. Credentials are applied only when a
    /// username is configured.
    #[instrument(skip_all)]
    pub async fn new(config: &Config) -> Res<Self> {
        let db = connect(&config.db_endpoint).await.map_err(store_unavailable)?;

        if !config.db_username.is_empty() {
            db.signin(Root {
                username: &config.db_username,
                password: &config.db_password,
            })
            .await
            .map_err(store_unavailable)?;
        }

        Self::initialize(db).await
    }

    /// Create an in-memory database client. Used by tests and by local runs
    /// with `DB_ENDPOINT=mem://`.
    pub async fn memory() -> Res<Self> {
        let db = connect("mem://").await.map_err(store_unavailable)?;

        Self::initialize(db).await
    }

    async fn initialize(db: Surreal<Any>) -> Res<Self> {
        db.use_ns("concierge").use_db("bot").await.map_err(store_unavailable)?;

        // Schema for the append-only conversation log, keyed for range scans
        // by thread and time.
        db.query("DEFINE TABLE IF NOT EXISTS thread_message SCHEMALESS").await.map_err(store_unavailable)?;
        db.query("DEFINE INDEX IF NOT EXISTS thread_message_by_thread ON thread_message FIELDS thread_ts, created_at")
            .await
            .map_err(store_unavailable)?;

        info!("Database initialized successfully.");

        Ok(Self { db })
    }

    /// Append one message to a thread's history.
    #[instrument(skip(self, text))]
    pub async fn append_message(&self, thread_ts: &str, channel: &str, author_id: &str, text: &str, role: TurnRole) -> Void {
        let message = ThreadMessage {
            id: None,
            thread_ts: thread_ts.to_string(),
            channel: channel.to_string(),
            author_id: author_id.to_string(),
            text: text.to_string(),
            role,
            created_at: surrealdb::sql::Datetime::from(chrono::Utc::now()),
        };

        // ULID record ids are time-ordered, so `(created_at, id)` preserves
        // insertion order even when timestamps collide.
        let _created: Option<ThreadMessage> = self
            .db
            .create(("thread_message", surrealdb::sql::Id::ulid().to_string()))
            .content(message)
            .await
            .map_err(store_unavailable)?;

        Ok(())
    }

    /// Read a thread's history, oldest first. Unknown threads yield an empty
    /// sequence.
    #[instrument(skip(self))]
    pub async fn thread_history(&self, thread_ts: &str) -> Res<Vec<ChatTurn>> {
        let mut response = self
            .db
            .query("SELECT * FROM thread_message WHERE thread_ts = $thread_ts ORDER BY created_at ASC, id ASC")
            .bind(("thread_ts", thread_ts.to_string()))
            .await
            .map_err(store_unavailable)?;

        let messages: Vec<ThreadMessage> = response.take(0).map_err(store_unavailable)?;

        Ok(messages.into_iter().map(|m| ChatTurn::new(m.role, m.text)).collect())
    }
}

fn store_unavailable(err: surrealdb::Error) -> BotError {
    BotError::StoreUnavailable(err.into())
}
