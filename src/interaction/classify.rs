//! Classification of inbound Slack push events.
//!
//! One inbound event maps to exactly one of: a webhook handshake to echo, a
//! conversation turn to process, or a skip. Skips are a first-class outcome,
//! not an error channel.

use slack_morphism::prelude::*;

/// Outcome of classifying one inbound push event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// URL-verification handshake; the challenge must be echoed verbatim.
    Handshake(String),
    /// A message the bot should answer.
    Turn(TurnRequest),
    /// An event the bot intentionally ignores.
    Skip(SkipReason),
}

/// The extracted, normalized request for one conversation turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    pub channel: String,
    pub author: String,
    /// Message text with any bot self-mention already stripped.
    pub text: String,
    /// Thread marker; the event's own timestamp when it starts a new thread.
    pub thread_ts: String,
}

/// Why an event was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Channel message that neither mentions the bot nor is a DM.
    AmbientMessage,
    /// A message the bot itself sent (or another bot's message).
    OwnMessage,
    /// Channel message mentioning the bot; the matching `app_mention` event
    /// carries the turn.
    DeferredToMention,
    /// Event shape the bot does not handle (subtyped messages, reactions, …).
    UnsupportedEvent,
    /// Event is missing a field required to build a turn.
    MalformedEvent,
}

/// Classify one inbound push event.
pub fn classify(event: &SlackPushEvent, bot_user_id: &str) -> Classification {
    match event {
        SlackPushEvent::UrlVerification(handshake) => Classification::Handshake(handshake.challenge.clone()),
        SlackPushEvent::EventCallback(callback) => classify_callback(&callback.event, bot_user_id),
        _ => Classification::Skip(SkipReason::UnsupportedEvent),
    }
}

/// Classify the body of an event callback.
pub fn classify_callback(body: &SlackEventCallbackBody, bot_user_id: &str) -> Classification {
    let mention_token = mention_token(bot_user_id);

    match body {
        SlackEventCallbackBody::AppMention(mention) => {
            let text = mention.content.text.clone().unwrap_or_default();
            let text = text.replace(&mention_token, "").trim().to_string();
            let thread_ts = mention.origin.thread_ts.clone().unwrap_or_else(|| mention.origin.ts.clone());

            Classification::Turn(TurnRequest {
                channel: mention.channel.0.clone(),
                author: mention.user.0.clone(),
                text,
                thread_ts: thread_ts.0,
            })
        }
        SlackEventCallbackBody::Message(message) => {
            // Bot-authored messages (including our own replies echoed back in
            // DMs) never start a turn.
            if message.sender.bot_id.is_some() || message.sender.user.as_ref().map(|u| u.0 == bot_user_id).unwrap_or(false) {
                return Classification::Skip(SkipReason::OwnMessage);
            }

            // Edits, joins, and other subtyped messages are not turns.
            if message.subtype.is_some() {
                return Classification::Skip(SkipReason::UnsupportedEvent);
            }

            let text = message.content.as_ref().and_then(|c| c.text.clone()).unwrap_or_default();
            let is_direct = message.origin.channel_type.as_ref().map(|ct| ct.0 == "im").unwrap_or(false);

            if !is_direct {
                // Public-channel traffic: the app_mention event is the one
                // that triggers a reply.
                if text.contains(&mention_token) {
                    return Classification::Skip(SkipReason::DeferredToMention);
                }

                return Classification::Skip(SkipReason::AmbientMessage);
            }

            let Some(channel) = message.origin.channel.as_ref() else {
                return Classification::Skip(SkipReason::MalformedEvent);
            };
            let Some(author) = message.sender.user.as_ref() else {
                return Classification::Skip(SkipReason::MalformedEvent);
            };

            let thread_ts = message.origin.thread_ts.clone().unwrap_or_else(|| message.origin.ts.clone());

            // Direct messages are accepted unconditionally, empty text included.
            Classification::Turn(TurnRequest {
                channel: channel.0.clone(),
                author: author.0.clone(),
                text: text.trim().to_string(),
                thread_ts: thread_ts.0,
            })
        }
        _ => Classification::Skip(SkipReason::UnsupportedEvent),
    }
}

fn mention_token(bot_user_id: &str) -> String {
    format!("<@{bot_user_id}>")
}
