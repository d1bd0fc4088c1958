//! Thin wrapper around async-openai for chat completion and embedding calls.

use std::{ops::Deref, sync::Arc};

use crate::base::{
    config::Config,
    types::{BotError, ChatTurn, Res, TurnRole},
};
use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
        CreateEmbeddingRequestArgs,
    },
};
use async_trait::async_trait;
use tracing::{debug, instrument};

// Traits.

/// Generic LLM client trait that clients must implement.
#[async_trait]
pub trait GenericLlmClient {
    /// Generate a completion for an ordered sequence of conversation turns.
    async fn complete(&self, turns: &[ChatTurn]) -> Res<String>;
    /// Produce an embedding vector for a piece of text.
    async fn embed(&self, text: &str) -> Res<Vec<f32>>;
}

// Structs.

/// LLM client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct LlmClient {
    inner: Arc<dyn GenericLlmClient + Send + Sync + 'static>,
}

impl Deref for LlmClient {
    type Target = dyn GenericLlmClient + Send + Sync + 'static;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl LlmClient {
    /// Wrap an arbitrary implementation (used by tests).
    pub fn new(inner: Arc<dyn GenericLlmClient + Send + Sync + 'static>) -> Self {
        Self { inner }
    }

    /// Creates a new OpenAI-backed LLM client.
    pub fn openai(config: &Config) -> Self {
        let client = OpenAiLlmClient::new(config);
        Self { inner: Arc::new(client) }
    }
}

// Specific implementations.

/// OpenAI LLM client implementation.
#[derive(Clone)]
pub struct OpenAiLlmClient {
    client: Client<OpenAIConfig>,
    model: String,
    embedding_model: String,
    system_instructions: String,
    temperature: f32,
}

impl OpenAiLlmClient {
    pub fn new(config: &Config) -> Self {
        let cfg = OpenAIConfig::new().with_api_key(config.openai_api_key.clone());

        Self {
            client: Client::with_config(cfg),
            model: config.openai_model.clone(),
            embedding_model: config.openai_embedding_model.clone(),
            system_instructions: config.system_instructions.clone(),
            temperature: config.openai_temperature,
        }
    }
}

#[async_trait]
impl GenericLlmClient for OpenAiLlmClient {
    /// Generate a completion for an ordered sequence of conversation turns.
    ///
    /// The configured system instructions are always the first message; the
    /// provided turns follow in order, unmodified.
    #[instrument(skip_all)]
    async fn complete(&self, turns: &[ChatTurn]) -> Res<String> {
        debug!("Requesting completion for {} turns", turns.len());

        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(turns.len() + 1);

        messages.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(self.system_instructions.clone())
                .build()
                .map_err(inference_failure)?
                .into(),
        );

        for turn in turns {
            let message = match turn.role {
                TurnRole::System => ChatCompletionRequestSystemMessageArgs::default().content(turn.content.clone()).build().map_err(inference_failure)?.into(),
                TurnRole::User => ChatCompletionRequestUserMessageArgs::default().content(turn.content.clone()).build().map_err(inference_failure)?.into(),
                TurnRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default().content(turn.content.clone()).build().map_err(inference_failure)?.into(),
            };

            messages.push(message);
        }

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .build()
            .map_err(inference_failure)?;

        let response = self.client.chat().create(request).await.map_err(inference_failure)?;
        let content = response.choices.first().and_then(|choice| choice.message.content.clone()).unwrap_or_default();

        Ok(content)
    }

    /// Produce an embedding vector for a piece of text.
    #[instrument(skip_all)]
    async fn embed(&self, text: &str) -> Res<Vec<f32>> {
        let request = CreateEmbeddingRequestArgs::default().model(&self.embedding_model).input(text).build().map_err(inference_failure)?;

        let response = self.client.embeddings().create(request).await.map_err(inference_failure)?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| BotError::InferenceFailure(anyhow::anyhow!("embedding response contained no data")))?;

        Ok(embedding)
    }
}

fn inference_failure(err: OpenAIError) -> BotError {
    BotError::InferenceFailure(err.into())
}
