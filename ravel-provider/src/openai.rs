//! OpenAI provider implementation using the async-openai crate.
//!
//! Speaks the chat completions API, which OpenAI-compatible services
//! (DeepSeek, local gateways) also accept.

use async_openai::config::OpenAIConfig;
use async_openai::error::{ApiError, OpenAIError};
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    ResponseFormat as OpenAIResponseFormat,
    ResponseFormatJsonSchema as OpenAIResponseFormatJsonSchema,
};
use async_openai::Client;
use async_trait::async_trait;
use ravel_core::error::AiError;
use ravel_core::provider::Provider;
use ravel_core::types::*;
use std::sync::Arc;

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
/// Environment variable overriding the API base URL
pub const API_BASE_ENV: &str = "OPENAI_BASE_URL";
/// Environment variable holding the organization id
pub const ORG_ID_ENV: &str = "OPENAI_ORG_ID";

/// OpenAI provider using async-openai
#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    info: Arc<ProviderInfo>,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("info", &self.info)
            .finish()
    }
}

impl OpenAiProvider {
    /// Create a new OpenAI provider with default configuration
    pub fn new(api_key: impl Into<String>) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);

        Self {
            client: Client::with_config(config),
            info: openai_info(),
        }
    }

    /// Create a builder for more configuration options
    pub fn builder() -> OpenAiBuilder {
        OpenAiBuilder::default()
    }

    /// Create a provider from `OPENAI_API_KEY`, `OPENAI_BASE_URL` and `OPENAI_ORG_ID`.
    pub fn from_env() -> Result<Self, AiError> {
        OpenAiBuilder::from_env()?.build()
    }

    fn convert_message(msg: &Message) -> Result<ChatCompletionRequestMessage, AiError> {
        let content = msg.text();

        match msg.role {
            Role::System => {
                let mut args = ChatCompletionRequestSystemMessageArgs::default();
                args.content(content);
                if let Some(name) = &msg.name {
                    args.name(name.clone());
                }
                let msg = args.build().map_err(|e| {
                    AiError::provider(format!("Failed to build system message: {}", e))
                })?;
                Ok(ChatCompletionRequestMessage::System(msg))
            }
            Role::User => {
                let mut args = ChatCompletionRequestUserMessageArgs::default();
                args.content(content);
                if let Some(name) = &msg.name {
                    args.name(name.clone());
                }
                let msg = args.build().map_err(|e| {
                    AiError::provider(format!("Failed to build user message: {}", e))
                })?;
                Ok(ChatCompletionRequestMessage::User(msg))
            }
            Role::Assistant => {
                let mut args = ChatCompletionRequestAssistantMessageArgs::default();
                args.content(content);
                if let Some(name) = &msg.name {
                    args.name(name.clone());
                }
                let msg = args.build().map_err(|e| {
                    AiError::provider(format!("Failed to build assistant message: {}", e))
                })?;
                Ok(ChatCompletionRequestMessage::Assistant(msg))
            }
        }
    }

    fn convert_response_format(format: &ResponseFormat) -> OpenAIResponseFormat {
        match format {
            ResponseFormat::Text => OpenAIResponseFormat::Text,
            ResponseFormat::JsonObject => OpenAIResponseFormat::JsonObject,
            ResponseFormat::JsonSchema {
                name,
                schema,
                strict,
            } => OpenAIResponseFormat::JsonSchema {
                json_schema: OpenAIResponseFormatJsonSchema {
                    name: name.clone(),
                    schema: Some(schema.clone()),
                    strict: Some(*strict),
                    description: None,
                },
            },
        }
    }

    fn build_request(req: &ChatCompletionRequest) -> Result<CreateChatCompletionRequest, AiError> {
        let messages: Result<Vec<_>, _> = req.messages.iter().map(Self::convert_message).collect();

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(&req.model).messages(messages?);

        if let Some(max_tokens) = req.max_tokens {
            builder.max_completion_tokens(max_tokens);
        }
        if let Some(temperature) = req.temperature {
            builder.temperature(temperature);
        }
        if let Some(response_format) = &req.response_format {
            builder.response_format(Self::convert_response_format(response_format));
        }

        builder
            .build()
            .map_err(|e| AiError::invalid_request(format!("Failed to build request: {}", e)))
    }

    fn convert_response(response: CreateChatCompletionResponse) -> ChatCompletionResponse {
        let choices = response
            .choices
            .into_iter()
            .map(|choice| {
                let mut content = Vec::new();
                if let Some(text) = choice.message.content {
                    content.push(ContentPart::Text { text });
                }
                if let Some(refusal) = choice.message.refusal {
                    content.push(ContentPart::Refusal { refusal });
                }

                let finish_reason = choice
                    .finish_reason
                    .map_or(FinishReason::Stop, |r| match r {
                        async_openai::types::FinishReason::Stop => FinishReason::Stop,
                        async_openai::types::FinishReason::Length => FinishReason::Length,
                        async_openai::types::FinishReason::ToolCalls => FinishReason::ToolCalls,
                        async_openai::types::FinishReason::ContentFilter => {
                            FinishReason::ContentFilter
                        }
                        other => FinishReason::Other(format!("{:?}", other)),
                    });

                Choice {
                    index: choice.index,
                    message: Message {
                        role: Role::Assistant,
                        content,
                        name: None,
                    },
                    finish_reason,
                }
            })
            .collect();

        let usage = response.usage.map_or_else(Usage::default, |u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        ChatCompletionResponse {
            id: response.id,
            model: response.model,
            choices,
            usage,
            created: Some(response.created as u64),
        }
    }
}

fn openai_info() -> Arc<ProviderInfo> {
    Arc::new(ProviderInfo {
        id: "openai".to_string(),
        name: "OpenAI".to_string(),
    })
}

/// Map an async-openai error onto the transport error taxonomy.
pub(crate) fn convert_error(err: OpenAIError) -> AiError {
    match err {
        OpenAIError::Reqwest(e) => AiError::Network(e),
        OpenAIError::ApiError(api) => convert_api_error(api),
        OpenAIError::JSONDeserialize(e, content) => AiError::provider(format!(
            "Malformed OpenAI response: {}; body: {}",
            e,
            truncate(&content, MAX_BODY_PREVIEW)
        )),
        OpenAIError::InvalidArgument(msg) => AiError::invalid_request(msg),
        other => AiError::provider(format!("OpenAI API error: {}", other)),
    }
}

/// Characters of an undecodable body kept in the error message
const MAX_BODY_PREVIEW: usize = 256;

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

fn convert_api_error(api: ApiError) -> AiError {
    let kinds = [api.code.as_deref(), api.r#type.as_deref()];
    let is_kind = |names: &[&str]| kinds.iter().flatten().any(|kind| names.contains(kind));

    if is_kind(&["invalid_api_key", "authentication_error", "invalid_authentication"]) {
        AiError::authentication(api.message)
    } else if is_kind(&["rate_limit_exceeded", "rate_limit_error", "insufficient_quota"]) {
        AiError::rate_limit(api.message)
    } else if is_kind(&["model_not_found"]) {
        AiError::model_not_found(api.message)
    } else if is_kind(&["invalid_request_error", "context_length_exceeded"]) {
        AiError::invalid_request(api.message)
    } else {
        AiError::provider(format!("OpenAI API error: {}", api.message))
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn info(&self) -> Arc<ProviderInfo> {
        self.info.clone()
    }

    async fn chat_completion(
        &self,
        req: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, AiError> {
        let openai_req = Self::build_request(&req)?;

        let response = self
            .client
            .chat()
            .create(openai_req)
            .await
            .map_err(convert_error)?;

        Ok(Self::convert_response(response))
    }
}

/// Builder for OpenAI provider with custom configuration
#[derive(Default)]
pub struct OpenAiBuilder {
    api_key: Option<String>,
    api_base: Option<String>,
    org_id: Option<String>,
}

impl std::fmt::Debug for OpenAiBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBuilder")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("org_id", &self.org_id)
            .finish()
    }
}

impl OpenAiBuilder {
    /// Seed a builder from the process environment
    pub fn from_env() -> Result<Self, AiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AiError> {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_key = non_empty(API_KEY_ENV).ok_or_else(|| {
            AiError::configuration(format!("{} environment variable not set", API_KEY_ENV))
        })?;

        Ok(Self {
            api_key: Some(api_key),
            api_base: non_empty(API_BASE_ENV),
            org_id: non_empty(ORG_ID_ENV),
        })
    }

    /// Set API key
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set API base URL (for OpenAI-compatible APIs like DeepSeek)
    pub fn api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = Some(api_base.into());
        self
    }

    /// Set organization ID
    pub fn organization(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    /// Build the provider
    pub fn build(self) -> Result<OpenAiProvider, AiError> {
        self.build_with_id("openai", "OpenAI")
    }

    /// Build a provider with a custom provider ID and name
    ///
    /// The id drives JSON output strategy detection, so OpenAI-compatible
    /// services without JSON Schema support should pass their own id.
    pub fn build_with_id(
        self,
        provider_id: impl Into<String>,
        provider_name: impl Into<String>,
    ) -> Result<OpenAiProvider, AiError> {
        let api_key = self
            .api_key
            .ok_or_else(|| AiError::configuration("API key is required"))?;

        let mut config = OpenAIConfig::new().with_api_key(api_key);

        if let Some(api_base) = self.api_base {
            config = config.with_api_base(api_base);
        }

        if let Some(org_id) = self.org_id {
            config = config.with_org_id(org_id);
        }

        Ok(OpenAiProvider {
            client: Client::with_config(config),
            info: Arc::new(ProviderInfo {
                id: provider_id.into(),
                name: provider_name.into(),
            }),
        })
    }
}
