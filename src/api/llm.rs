//! Answer generation through a chat model

use crate::config::LlmConfig;
use crate::error::{LeaseError, Result};
use crate::ml::embedding::openai_client;
use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequestArgs,
};

/// Opaque LLM: instruction plus user message in, text out
pub trait AnswerGenerator: Send + Sync {
    fn generate(&self, system: &str, user: &str) -> Result<String>;
}

/// Chat completions from an OpenAI-compatible API, driven on a private runtime
pub struct OpenAiChat {
    client: Client<OpenAIConfig>,
    runtime: tokio::runtime::Runtime,
    config: LlmConfig,
}

impl OpenAiChat {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            LeaseError::Config(format!(
                "Environment variable {} is not set",
                config.api_key_env
            ))
        })?;
        let client = openai_client(&api_key, config.api_base.as_deref(), config.timeout_secs)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            client,
            runtime,
            config,
        })
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let messages = vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: ChatCompletionRequestSystemMessageContent::Text(system.to_string()),
                name: None,
            }),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(user.to_string()),
                name: None,
            }),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.config.model)
            .messages(messages)
            .max_tokens(self.config.max_tokens)
            .temperature(self.config.temperature)
            .build()?;

        let response = self.client.chat().create(request).await?;
        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| {
                log::error!("No content in chat response: {:?}", response);
                LeaseError::Llm("No content in response".to_string())
            })
    }
}

impl AnswerGenerator for OpenAiChat {
    fn generate(&self, system: &str, user: &str) -> Result<String> {
        log::debug!("Sending {} context chars to {}", user.len(), self.config.model);
        self.runtime.block_on(self.complete(system, user))
    }
}
