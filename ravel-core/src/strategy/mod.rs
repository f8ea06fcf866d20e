//! Strategy layer for provider-specific behaviors.
//!
//! Providers differ in how they accept a schema constraint (JSON Schema vs
//! JSON object mode); strategies hide that difference from the orchestrator.

pub mod json_output;

pub use json_output::{detect_json_strategy, JsonModeStrategy, JsonOutputStrategy, JsonSchemaStrategy};
