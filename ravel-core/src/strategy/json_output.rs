//! JSON output strategies for different providers.
//!
//! - `JsonSchemaStrategy`: providers that accept a strict JSON Schema constraint (OpenAI)
//! - `JsonModeStrategy`: providers that only support basic JSON object mode (DeepSeek)

use crate::error::AiError;
use crate::types::{ChatCompletionRequest, ContentPart, Message, ResponseFormat, Role};

/// Strategy for attaching a schema constraint to a chat completion request.
pub trait JsonOutputStrategy: Send + Sync {
    /// Get the strategy name for debugging
    fn name(&self) -> &str;

    /// Constrain `req` so the model answers with JSON matching `schema`.
    ///
    /// `schema_name` is already sanitized for provider use.
    fn apply(
        &self,
        req: &mut ChatCompletionRequest,
        schema_name: &str,
        schema: &serde_json::Value,
    ) -> Result<(), AiError>;
}

/// JSON Schema strategy for providers that support `response_format.json_schema`.
#[derive(Debug, Clone)]
pub struct JsonSchemaStrategy {
    /// Whether to enable strict mode
    pub strict: bool,
}

impl JsonSchemaStrategy {
    /// Create a new JSON Schema strategy with strict mode enabled
    pub fn new() -> Self {
        Self { strict: true }
    }

    /// Create a new JSON Schema strategy with configurable strict mode
    pub fn with_strict(strict: bool) -> Self {
        Self { strict }
    }
}

impl Default for JsonSchemaStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonOutputStrategy for JsonSchemaStrategy {
    fn name(&self) -> &str {
        "JsonSchemaStrategy"
    }

    fn apply(
        &self,
        req: &mut ChatCompletionRequest,
        schema_name: &str,
        schema: &serde_json::Value,
    ) -> Result<(), AiError> {
        req.response_format = Some(ResponseFormat::JsonSchema {
            name: schema_name.to_string(),
            schema: schema.clone(),
            strict: self.strict,
        });

        Ok(())
    }
}

/// JSON Mode strategy for providers without JSON Schema support.
///
/// Sets `response_format` to `JsonObject` and injects the schema into the
/// conversation as an instruction.
#[derive(Debug, Clone)]
pub struct JsonModeStrategy {
    /// Inject as a leading system message (true) or append to the last user message (false)
    pub use_system_message: bool,
}

impl JsonModeStrategy {
    /// Create a new JSON Mode strategy that uses system messages
    pub fn new() -> Self {
        Self {
            use_system_message: true,
        }
    }

    /// Create a new JSON Mode strategy with configurable message injection
    pub fn with_system_message(use_system_message: bool) -> Self {
        Self { use_system_message }
    }

    fn build_json_instruction(
        schema_name: &str,
        schema: &serde_json::Value,
    ) -> Result<String, AiError> {
        let schema_str = serde_json::to_string_pretty(schema)?;
        Ok(format!(
            "You must respond with a valid JSON `{}` object that matches this schema:\n```json\n{}\n```\n\nIMPORTANT:\n\
            1. Only return the JSON object, nothing else\n\
            2. Ensure all required fields are present\n\
            3. Follow the schema structure exactly\n\
            4. Use the correct data types for each field",
            schema_name, schema_str
        ))
    }
}

impl Default for JsonModeStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonOutputStrategy for JsonModeStrategy {
    fn name(&self) -> &str {
        "JsonModeStrategy"
    }

    fn apply(
        &self,
        req: &mut ChatCompletionRequest,
        schema_name: &str,
        schema: &serde_json::Value,
    ) -> Result<(), AiError> {
        req.response_format = Some(ResponseFormat::JsonObject);

        let instruction = Self::build_json_instruction(schema_name, schema)?;

        if self.use_system_message {
            req.messages.insert(0, Message::system(instruction));
        } else if let Some(last_msg) = req
            .messages
            .iter_mut()
            .rev()
            .find(|m| m.role == Role::User)
        {
            last_msg.content.push(ContentPart::Text {
                text: format!("\n\n{}", instruction),
            });
        } else {
            req.messages.push(Message::user(instruction));
        }

        Ok(())
    }
}

/// Pick the JSON output strategy recommended for a provider id.
pub fn detect_json_strategy(provider_id: &str) -> Box<dyn JsonOutputStrategy> {
    match provider_id {
        "openai" | "anthropic" | "azure" => Box::new(JsonSchemaStrategy::new()),
        // Unknown providers get JSON mode: it needs nothing beyond `json_object`
        _ => Box::new(JsonModeStrategy::new()),
    }
}
