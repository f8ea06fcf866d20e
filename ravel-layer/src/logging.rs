//! Logging layer for transport calls.

use async_trait::async_trait;
use ravel_core::error::AiError;
use ravel_core::layer::{Layer, LayeredProvider};
use ravel_core::provider::Provider;
use ravel_core::types::*;

/// Logging layer that records each transport call and its outcome.
#[derive(Debug, Clone)]
pub struct LoggingLayer {
    prefix: String,
}

impl LoggingLayer {
    /// Create a new logging layer
    pub fn new() -> Self {
        Self {
            prefix: "[ravel]".to_string(),
        }
    }

    /// Create a logging layer with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for LoggingLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Provider> Layer<P> for LoggingLayer {
    type LayeredProvider = LoggingProvider<P>;

    fn layer(&self, inner: P) -> Self::LayeredProvider {
        LoggingProvider {
            inner,
            prefix: self.prefix.clone(),
        }
    }
}

/// Provider wrapped with logging
#[derive(Debug)]
pub struct LoggingProvider<P> {
    inner: P,
    prefix: String,
}

fn format_kind(format: Option<&ResponseFormat>) -> &'static str {
    match format {
        None | Some(ResponseFormat::Text) => "text",
        Some(ResponseFormat::JsonObject) => "json_object",
        Some(ResponseFormat::JsonSchema { .. }) => "json_schema",
    }
}

#[async_trait]
impl<P: Provider> LayeredProvider for LoggingProvider<P> {
    type Inner = P;

    fn inner(&self) -> &Self::Inner {
        &self.inner
    }

    async fn layered_chat_completion(
        &self,
        req: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, AiError> {
        tracing::debug!(
            "{} chat_completion request: model={}, messages={}, format={}, max_tokens={:?}",
            self.prefix,
            req.model,
            req.messages.len(),
            format_kind(req.response_format.as_ref()),
            req.max_tokens
        );

        let start = std::time::Instant::now();
        let result = self.inner.chat_completion(req).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::debug!(
                    "{} chat_completion success: id={}, tokens={}, elapsed={:?}",
                    self.prefix,
                    response.id,
                    response.usage.total_tokens,
                    elapsed
                );
            }
            Err(e) => {
                tracing::error!(
                    "{} chat_completion error: {:?}, elapsed={:?}",
                    self.prefix,
                    e,
                    elapsed
                );
            }
        }

        result
    }
}

ravel_core::impl_layered_provider!(LoggingProvider<P>);
