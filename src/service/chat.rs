//! Wrapper around chat clients.
//!
//! The Slack implementation serves the inbound events webhook (signature
//! verification handled by slack-morphism's axum layer), answers handshake
//! challenges, hands accepted events to the dispatcher, and posts replies.

use crate::{
    base::{
        config::Config,
        types::{Void, BotError},
    },
    interaction::{
        classify::{Classification, classify},
        turn::{TurnContext, spawn_turn},
    },
};
use async_trait::async_trait;
use axum::Extension;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use slack_morphism::prelude::*;
use tracing::{debug, error, info, instrument};

use std::{net::SocketAddr, ops::Deref, sync::Arc};

use super::{db::DbClient, llm::LlmClient, retrieval::RetrievalClient};

// Type aliases.

type FullClient = slack_morphism::SlackClient<SlackClientHyperConnector<HttpsConnector<HttpConnector>>>;

// Traits.

/// Generic "chat" trait that clients must implement.
#[async_trait]
pub trait GenericChatClient {
    /// Get the bot user ID.
    fn bot_user_id(&self) -> &str;
    /// Start the chat client listener.
    async fn start(&self) -> Void;
    /// Post a reply into a channel thread.
    async fn post_reply(&self, channel_id: &str, thread_ts: &str, text: &str) -> Void;
}

// Structs.

/// Chat client for the application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<dyn GenericChatClient + Send + Sync + 'static>,
}

impl Deref for ChatClient {
    type Target = dyn GenericChatClient + Send + Sync + 'static;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl ChatClient {
    /// Wrap an arbitrary implementation (used by tests).
    pub fn new(inner: Arc<dyn GenericChatClient + Send + Sync + 'static>) -> Self {
        Self { inner }
    }

    /// Creates a new Slack chat client.
    pub async fn slack(config: &Config, db: DbClient, llm: LlmClient, retrieval: RetrievalClient) -> crate::base::types::Res<Self> {
        let client = SlackChatClient::new(config, db, llm, retrieval).await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

impl From<SlackChatClient> for ChatClient {
    fn from(client: SlackChatClient) -> Self {
        Self { inner: Arc::new(client) }
    }
}

// Specific implementations.

/// Slack client implementation.
#[derive(Clone)]
pub struct SlackChatClient {
    bot_token: SlackApiToken,
    signing_secret: SlackSigningSecret,
    bot_user_id: String,
    port: u16,
    client: Arc<FullClient>,
    config: Config,
    db: DbClient,
    llm: LlmClient,
    retrieval: RetrievalClient,
}

impl SlackChatClient {
    /// Create a new Slack chat client.
    ///
    /// Resolves the bot's own identity once via `auth.test`; the dispatcher
    /// uses it for mention stripping and self-message filtering.
    #[instrument(name = "SlackChatClient::new", skip_all)]
    pub async fn new(config: &Config, db: DbClient, llm: LlmClient, retrieval: RetrievalClient) -> crate::base::types::Res<Self> {
        // Initialize tokens.

        let bot_token = SlackApiToken::new(SlackApiTokenValue(config.slack_bot_token.clone()));
        let signing_secret: SlackSigningSecret = config.slack_signing_secret.clone().into();

        // Initialize the Slack client.

        let https_connector = HttpsConnector::<HttpConnector>::builder()
            .with_native_roots()
            .map_err(|e| BotError::Other(e.into()))?
            .https_only()
            .enable_all_versions()
            .build();
        let connector = SlackClientHyperConnector::with_connector(https_connector);
        let client = Arc::new(slack_morphism::SlackClient::new(connector));

        // Get the bot's user ID.

        let session = client.open_session(&bot_token);
        let bot_user = session.auth_test().await.map_err(|e| BotError::Other(anyhow::anyhow!("auth.test failed: {e}")))?;
        let bot_user_id = bot_user.user_id.0;

        info!("Slack bot user ID: {}", bot_user_id);

        Ok(Self {
            bot_token,
            signing_secret,
            bot_user_id,
            port: config.port,
            client,
            config: config.clone(),
            db,
            llm,
            retrieval,
        })
    }
}

#[async_trait]
impl GenericChatClient for SlackChatClient {
    fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    async fn start(&self) -> Void {
        // Bundle the service handles the dispatcher needs; the webhook
        // handler receives them as an axum extension.

        let ctx = TurnContext {
            config: self.config.clone(),
            db: self.db.clone(),
            llm: self.llm.clone(),
            retrieval: self.retrieval.clone(),
            chat: ChatClient::from(self.clone()),
        };

        // Initialize the events listener; its layer verifies the request
        // signature and injects the parsed push event.

        let listener_environment = Arc::new(SlackClientEventsListenerEnvironment::new(self.client.clone()).with_error_handler(listener_error_handler));
        let listener = SlackEventsAxumListener::<SlackHyperHttpsConnector>::new(listener_environment);

        let app = axum::routing::Router::new().route(
            "/events",
            axum::routing::post(push_event_handler)
                .layer::<_, std::convert::Infallible>(listener.events_layer(&self.signing_secret).with_event_extractor(SlackEventsExtractors::push_event()))
                .layer(Extension(ctx)),
        );

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let tcp_listener = tokio::net::TcpListener::bind(&addr).await?;

        info!("Listening for Slack events on {addr}.");

        axum::serve(tcp_listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;

        Ok(())
    }

    #[instrument(skip(self, text))]
    async fn post_reply(&self, channel_id: &str, thread_ts: &str, text: &str) -> Void {
        let message = SlackMessageContent::new().with_text(text.to_string());

        let request = SlackApiChatPostMessageRequest::new(SlackChannelId(channel_id.to_string()), message)
            .with_thread_ts(SlackTs(thread_ts.to_string()))
            .with_link_names(true);

        let session = self.client.open_session(&self.bot_token);

        let _ = session.chat_post_message(&request).await.map_err(|e| BotError::Other(anyhow::anyhow!("Failed to post reply: {e}")))?;

        Ok(())
    }
}

// Webhook handlers.

/// Handles push events delivered to the webhook: echo handshakes, dispatch
/// accepted turns, acknowledge everything else.
#[instrument(skip_all)]
async fn push_event_handler(
    Extension(_environment): Extension<Arc<SlackHyperListenerEnvironment>>,
    Extension(ctx): Extension<TurnContext>,
    Extension(event): Extension<SlackPushEvent>,
) -> axum::response::Response {
    match classify(&event, ctx.chat.bot_user_id()) {
        Classification::Handshake(challenge) => axum::response::Response::new(axum::body::Body::from(challenge)),
        Classification::Skip(reason) => {
            debug!("Ignoring event: {reason:?}");
            axum::response::Response::new(axum::body::Body::empty())
        }
        Classification::Turn(request) => {
            // Acknowledge immediately; the turn proceeds on its own task.
            spawn_turn(request, ctx.clone());
            axum::response::Response::new(axum::body::Body::empty())
        }
    }
}

/// Logs errors surfaced by the events layer (bad signatures, parse failures).
fn listener_error_handler(err: Box<dyn std::error::Error + Send + Sync>, _client: Arc<SlackHyperClient>, _states: SlackClientEventsUserState) -> HttpStatusCode {
    error!("Slack events listener error: {err}");
    HttpStatusCode::BAD_REQUEST
}
