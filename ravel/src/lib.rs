//! # Ravel
//!
//! Resilient raw and structured model completions.
//!
//! Ravel wraps a text-generation transport with two entry points:
//!
//! - **Raw completions**: one request, the first choice's text, no retry
//! - **Structured completions**: a schema-bound request whose answer is
//!   parsed and validated into your type, retried within a bounded budget
//!   with a configurable backoff
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! ravel = { version = "0.1", features = ["openai", "layers", "schema"] }
//! ```
//!
//! ```ignore
//! use ravel::prelude::*;
//! use ravel::schemars::JsonSchema;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize, JsonSchema)]
//! struct Summary {
//!     headline: String,
//!     risks: Vec<String>,
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CompletionClient::builder(OpenAiProvider::from_env()?)
//!     .layer(LoggingLayer::new())
//!     .finish();
//!
//! let text = client.complete("What is Rust?", "gpt-4.1").await?;
//!
//! let request = CompletionRequest::new("Summarize the quarter");
//! let summary: Summary = client
//!     .complete_structured(&request, RetryPolicy::new().with_max_retries(3))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `default`: `openai` and `layers`
//! - `openai`: OpenAI (and compatible) transport
//! - `layers`: built-in transport layers (logging)
//! - `sqlite`: SQLite metadata source for prompt context
//! - `schema`: re-export `schemars` for deriving `JsonSchema`
//! - `full`: all features enabled

// Re-export core types and traits
pub use ravel_core::*;

// Re-export providers under `provider` module
#[cfg(feature = "ravel-provider")]
pub mod provider {
    //! Transport implementations.
    pub use ravel_provider::*;
}

// Re-export layers under `layer` module
#[cfg(feature = "ravel-layer")]
pub mod layer {
    //! Built-in transport layers.
    pub use ravel_layer::*;
}

// Re-export the SQLite metadata source under `sqlite` module
#[cfg(feature = "ravel-sqlite")]
pub mod sqlite {
    //! SQLite metadata source.
    pub use ravel_sqlite::*;
}

// Re-export schemars when schema feature is enabled
#[cfg(feature = "schema")]
pub mod schemars {
    pub use ::schemars::*;
}

/// Prelude module for convenient imports
pub mod prelude {
    //! Prelude module containing the most commonly used types and traits.
    //!
    //! ```
    //! use ravel::prelude::*;
    //! ```

    pub use crate::{
        AiError, Backoff, CompletionClient, CompletionRequest, Layer, MetadataSource,
        OutputSchema, Provider, Result, RetryCondition, RetryPolicy, RuntimeSchema, TypedSchema,
    };

    #[cfg(feature = "ravel-provider")]
    pub use crate::provider::*;

    #[cfg(feature = "ravel-layer")]
    pub use crate::layer::*;

    #[cfg(feature = "ravel-sqlite")]
    pub use crate::sqlite::*;
}
