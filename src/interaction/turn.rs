//! The turn pipeline: persist, assemble, infer, format, reply.
//!
//! This is the dispatcher's terminal stage. Every failure past classification
//! is caught here, logged, and converted into one fixed user-visible reply;
//! nothing is retried and nothing propagates to the platform.

use tracing::{Instrument, error, info, instrument};

use crate::{
    base::{config::Config, mrkdwn, types::TurnRole},
    interaction::{assemble::assemble, classify::TurnRequest},
    service::{chat::ChatClient, db::DbClient, llm::LlmClient, retrieval::RetrievalClient},
};

/// The single reply sent for any failed turn.
pub const ERROR_REPLY: &str = "Sorry, something went wrong.";

/// Service handles a turn needs, injected by the composition root.
#[derive(Clone)]
pub struct TurnContext {
    pub config: Config,
    pub db: DbClient,
    pub llm: LlmClient,
    pub retrieval: RetrievalClient,
    pub chat: ChatClient,
}

/// Handle one turn on a spawned task so the webhook can acknowledge
/// immediately.
#[instrument(skip_all)]
pub fn spawn_turn(request: TurnRequest, ctx: TurnContext) {
    tokio::spawn(async move { process_turn(request, ctx).in_current_span().await });
}

/// Run one turn to completion, converting any failure into the fixed error
/// reply. Terminal after one reply or one error path.
#[instrument(skip_all, fields(channel = %request.channel, thread_ts = %request.thread_ts))]
pub async fn process_turn(request: TurnRequest, ctx: TurnContext) {
    if let Err(err) = run_turn(&request, &ctx).await {
        error!("Error while handling turn: {err:#}");

        if let Err(reply_err) = ctx.chat.post_reply(&request.channel, &request.thread_ts, ERROR_REPLY).await {
            error!("Failed to deliver error reply: {reply_err:#}");
        }
    }
}

async fn run_turn(request: &TurnRequest, ctx: &TurnContext) -> crate::base::types::Void {
    // Persist the user's turn first; history is an append-only audit log and
    // a store failure here surfaces as a failed turn.
    ctx.db
        .append_message(&request.thread_ts, &request.channel, &request.author, &request.text, TurnRole::User)
        .await?;

    let turns = assemble(
        &ctx.db,
        &ctx.retrieval,
        ctx.config.retrieval_policy,
        ctx.config.retrieval_top_k,
        &request.thread_ts,
        &request.text,
        ctx.config.retrieval_enabled,
    )
    .await?;

    let completion = ctx.llm.complete(&turns).await?;
    let reply = mrkdwn::to_mrkdwn(&completion);

    ctx.db
        .append_message(&request.thread_ts, &request.channel, ctx.chat.bot_user_id(), &reply, TurnRole::Assistant)
        .await?;

    ctx.chat.post_reply(&request.channel, &request.thread_ts, &reply).await?;

    info!("Turn completed.");

    Ok(())
}
