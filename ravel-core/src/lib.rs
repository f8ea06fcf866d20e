//! # Ravel Core
//!
//! Core abstractions and runtime for resilient model completions.
//!
//! This crate provides the transport trait, layer composition, output schemas,
//! the retry policy and the [`CompletionClient`] that ties them together:
//! raw text completions without retry, and structured completions that are
//! validated against a schema and retried within a bounded budget.

pub mod error;
pub mod layer;
pub mod metadata;
pub mod provider;
pub mod retry;
pub mod runtime;
pub mod schema;
pub mod strategy;
pub mod types;

// Re-exports
pub use error::AiError;
pub use layer::{Layer, LayeredProvider};
pub use metadata::{render_metadata, MetadataSource, TableMetadata};
pub use provider::Provider;
pub use retry::{Attempt, AttemptOutcome, Backoff, RetryCondition, RetryPolicy};
pub use runtime::{CompletionClient, CompletionClientBuilder};
pub use schema::{OutputSchema, RuntimeSchema, TypedSchema};
pub use strategy::{JsonModeStrategy, JsonOutputStrategy, JsonSchemaStrategy};
pub use types::*;

/// Result type alias for completion operations
pub type Result<T> = std::result::Result<T, AiError>;
