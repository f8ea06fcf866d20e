//! # Ravel Layers
//!
//! Built-in transport layers.
//!
//! - `LoggingLayer`: logs every transport call with timing information
//!
//! Retrying is not a transport concern here: structured completions retry
//! inside `CompletionClient`, and raw completions never retry.
//!
//! ## Usage
//!
//! ```ignore
//! use ravel_core::CompletionClient;
//! use ravel_layer::LoggingLayer;
//!
//! let client = CompletionClient::builder(provider)
//!     .layer(LoggingLayer::new())
//!     .finish();
//! ```

pub mod logging;

// Re-exports
pub use logging::{LoggingLayer, LoggingProvider};
