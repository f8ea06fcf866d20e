//! Runtime layer for Ravel.
//!
//! Sits between callers and the transport. It:
//! - converts caller requests into chat completion requests
//! - selects the JSON output strategy for the provider
//! - runs the bounded retry loop for structured completions

pub mod client;

pub use client::{CompletionClient, CompletionClientBuilder};
