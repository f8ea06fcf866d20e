//! Provider trait: the transport boundary.

use crate::error::AiError;
use crate::types::*;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// Core provider trait for remote text-generation services.
///
/// A provider issues exactly one outbound request per `chat_completion` call
/// and returns the raw payload. It must not retry, validate or keep per-call
/// state; the same handle is shared read-only by every caller of a
/// [`CompletionClient`](crate::CompletionClient).
#[async_trait]
pub trait Provider: Send + Sync + Debug + 'static {
    /// Get provider information
    fn info(&self) -> Arc<ProviderInfo>;

    /// Chat completion (non-streaming)
    ///
    /// The schema constraint, when present, travels in
    /// `req.response_format`.
    async fn chat_completion(
        &self,
        req: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, AiError>;
}

#[async_trait]
impl<P: Provider + ?Sized> Provider for Arc<P> {
    fn info(&self) -> Arc<ProviderInfo> {
        (**self).info()
    }

    async fn chat_completion(
        &self,
        req: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, AiError> {
        (**self).chat_completion(req).await
    }
}
