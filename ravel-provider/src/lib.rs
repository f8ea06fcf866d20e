//! # Ravel Providers
//!
//! Transport implementations for remote text-generation services.

pub mod openai;

// Re-exports
pub use openai::{OpenAiBuilder, OpenAiProvider};

use ravel_core::error::AiError;

/// Create a DeepSeek provider (OpenAI-compatible)
///
/// DeepSeek speaks the OpenAI protocol on a different endpoint and only
/// supports JSON object mode, which its provider id selects.
///
/// # Example
///
/// ```ignore
/// use ravel_provider::deepseek;
///
/// let provider = deepseek("your-api-key")?;
/// ```
pub fn deepseek(api_key: impl Into<String>) -> Result<OpenAiProvider, AiError> {
    OpenAiProvider::builder()
        .api_key(api_key)
        .api_base("https://api.deepseek.com/v1")
        .build_with_id("deepseek", "DeepSeek")
}
