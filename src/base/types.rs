//! Common types and result aliases shared across the crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure taxonomy for a single bot turn.
///
/// Intentionally ignored events are not errors; they are `Skip` variants of
/// the event classification. Everything here represents a real failure that
/// the dispatcher boundary converts into one generic user-visible reply.
#[derive(Debug, Error)]
pub enum BotError {
    /// The datastore could not be reached, or a statement failed.
    #[error("datastore unavailable: {0}")]
    StoreUnavailable(#[source] anyhow::Error),
    /// The similarity-search service (embedding or knn query) failed.
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(#[source] anyhow::Error),
    /// The LLM inference call failed.
    #[error("inference failure: {0}")]
    InferenceFailure(#[source] anyhow::Error),
    /// Anything outside the service taxonomy (config, IO, platform calls).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for BotError {
    fn from(err: std::io::Error) -> Self {
        Self::Other(err.into())
    }
}

impl From<config::ConfigError> for BotError {
    fn from(err: config::ConfigError) -> Self {
        Self::Other(err.into())
    }
}

/// The crate's error type.
pub type Err = BotError;
/// Result specialized to the crate's error type.
pub type Res<T> = Result<T, Err>;
/// Result with no success payload.
pub type Void = Res<()>;

/// Role of a conversation turn as handed to the inference API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// System instructions or synthesized context.
    System,
    /// A message from the human user.
    User,
    /// A message generated by the assistant.
    Assistant,
}

/// One normalized unit of conversation, built fresh per request from the
/// persisted history plus at most one synthesized system entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// The role that produced this turn.
    pub role: TurnRole,
    /// The textual content of the turn.
    pub content: String,
}

impl ChatTurn {
    /// Construct a turn from a role and its content.
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}
