//! Assembly of the ordered conversation handed to the inference call.

use tracing::{debug, instrument, warn};

use crate::{
    base::{
        config::RetrievalPolicy,
        prompts,
        types::{ChatTurn, Res, TurnRole},
    },
    service::{db::DbClient, retrieval::RetrievalClient},
};

/// Build the ordered turn sequence for one request: synthesized retrieval
/// context (if any) → persisted history → the current user message.
///
/// The current message has already been persisted by the caller, so it also
/// appears at the tail of the history; the sequence is handed over without
/// reordering or deduplication.
#[instrument(skip_all)]
pub async fn assemble(
    db: &DbClient,
    retrieval: &RetrievalClient,
    policy: RetrievalPolicy,
    top_k: usize,
    thread_ts: &str,
    query: &str,
    use_retrieval: bool,
) -> Res<Vec<ChatTurn>> {
    let mut turns = Vec::new();

    if use_retrieval {
        match retrieval.retrieve(query, top_k).await {
            Ok(passages) if !passages.is_empty() => {
                let body = passages.iter().map(|p| p.text.as_str()).collect::<Vec<_>>().join("\n\n");
                turns.push(ChatTurn::new(TurnRole::System, format!("{}{}", prompts::RETRIEVAL_CONTEXT_PREAMBLE, body)));
            }
            Ok(_) => {
                debug!("Retrieval returned no passages; no context turn synthesized.");
            }
            Err(err) => match policy {
                RetrievalPolicy::Fatal => return Err(err),
                RetrievalPolicy::BestEffort => {
                    warn!("Retrieval unavailable, continuing without context: {err}");
                }
            },
        }
    }

    turns.extend(db.thread_history(thread_ts).await?);
    turns.push(ChatTurn::new(TurnRole::User, query));

    Ok(turns)
}
