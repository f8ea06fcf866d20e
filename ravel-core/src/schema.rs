//! Output schemas: turning raw model text into validated values.
//!
//! The orchestrator is generic over [`OutputSchema`], so any schema mechanism
//! can drive it. Two are provided:
//! - [`TypedSchema`]: compile-time Rust types deriving `JsonSchema` + `Deserialize`
//! - [`RuntimeSchema`]: a JSON Schema document validated with `jsonschema`

use crate::error::AiError;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use jsonschema::Validator;
use serde_json::{Map, Value};
use std::marker::PhantomData;
use std::sync::Arc;

/// Capability to describe and parse one structured output shape.
pub trait OutputSchema: Send + Sync {
    /// The validated value handed back to the caller
    type Output: Send;

    /// Schema name, restricted to `[A-Za-z0-9_-]`
    fn name(&self) -> String;

    /// JSON Schema document sent to the provider
    fn json_schema(&self) -> Result<Value, AiError>;

    /// Parse and validate raw model output.
    ///
    /// Must return `AiError::Validation` (or another validation-family error)
    /// rather than a partially populated value.
    fn parse(&self, raw: &str) -> Result<Self::Output, AiError>;
}

/// Schema derived from a Rust type via `schemars`.
pub struct TypedSchema<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedSchema<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for TypedSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for TypedSchema<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedSchema")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> OutputSchema for TypedSchema<T>
where
    T: JsonSchema + DeserializeOwned + Send,
{
    type Output = T;

    fn name(&self) -> String {
        sanitize_schema_name(&T::schema_name())
    }

    fn json_schema(&self) -> Result<Value, AiError> {
        let schema = schemars::schema_for!(T).to_value();
        Ok(normalize_for_strict_mode(schema))
    }

    fn parse(&self, raw: &str) -> Result<T, AiError> {
        let json = extract_json(raw);
        serde_json::from_str(json).map_err(|e| AiError::validation(self.name(), e.to_string()))
    }
}

/// Schema supplied at runtime as a JSON Schema document.
///
/// The document is compiled once with `jsonschema`; every keyword the
/// validator understands (`$ref`, `anyOf`, `additionalProperties`, numeric
/// and string bounds, ...) is enforced on parsed output.
#[derive(Clone)]
pub struct RuntimeSchema {
    name: String,
    schema: Value,
    validator: Result<Arc<Validator>, String>,
}

impl RuntimeSchema {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        let validator = Validator::new(&schema)
            .map(Arc::new)
            .map_err(|e| e.to_string());
        Self {
            name: sanitize_schema_name(&name.into()),
            schema,
            validator,
        }
    }

    /// Check `value` against this schema, reporting every violation
    pub fn validate(&self, value: &Value) -> Result<(), AiError> {
        let validator = self.validator()?;
        let errors: Vec<String> = validator
            .iter_errors(value)
            .map(|error| {
                let path = error.instance_path.to_string();
                let path = if path.is_empty() { "/".to_string() } else { path };
                format!("at {path}: {error}")
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AiError::validation(&self.name, errors.join("; ")))
        }
    }

    fn validator(&self) -> Result<&Validator, AiError> {
        self.validator.as_deref().map_err(|e| {
            AiError::invalid_request(format!("schema `{}` does not compile: {e}", self.name))
        })
    }
}

impl std::fmt::Debug for RuntimeSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeSchema")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .field("compiled", &self.validator.is_ok())
            .finish()
    }
}

impl OutputSchema for RuntimeSchema {
    type Output = Value;

    fn name(&self) -> String {
        self.name.clone()
    }

    fn json_schema(&self) -> Result<Value, AiError> {
        if !self.schema.is_object() {
            return Err(AiError::invalid_request(format!(
                "schema `{}` must be a JSON object",
                self.name
            )));
        }
        self.validator()?;
        Ok(self.schema.clone())
    }

    fn parse(&self, raw: &str) -> Result<Value, AiError> {
        let value: Value = serde_json::from_str(extract_json(raw))
            .map_err(|e| AiError::validation(&self.name, e.to_string()))?;
        self.validate(&value)?;
        Ok(value)
    }
}

/// Strip surrounding whitespace and a Markdown code fence, if present.
pub fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`, `JSON`, ...) on the opening fence line
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Restrict a schema name to the characters OpenAI accepts.
pub fn sanitize_schema_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect();

    if sanitized.is_empty() {
        "response".to_string()
    } else {
        sanitized
    }
}

/// Keywords rejected by strict structured-output APIs.
const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "$schema",
    "title",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "multipleOf",
    "minLength",
    "maxLength",
    "minItems",
    "maxItems",
    "uniqueItems",
    "minProperties",
    "maxProperties",
    "default",
];

/// String formats accepted in strict mode.
const SUPPORTED_FORMATS: &[&str] = &[
    "date-time", "time", "date", "duration", "email", "hostname", "uri", "ipv4", "ipv6", "uuid",
];

/// Normalize a generated schema for strict structured-output mode.
///
/// - every object gets `additionalProperties: false`
/// - every declared property becomes required
/// - unsupported keywords and string formats are removed
pub fn normalize_for_strict_mode(mut schema: Value) -> Value {
    match &mut schema {
        Value::Object(obj) => normalize_object(obj),
        Value::Array(items) => {
            for item in items.iter_mut() {
                *item = normalize_for_strict_mode(item.take());
            }
        }
        _ => {}
    }
    schema
}

fn normalize_object(obj: &mut Map<String, Value>) {
    for keyword in UNSUPPORTED_KEYWORDS {
        if obj.remove(*keyword).is_some() {
            tracing::trace!(keyword = *keyword, "removed unsupported schema keyword");
        }
    }

    let keep_format = obj
        .get("format")
        .and_then(Value::as_str)
        .is_some_and(|format| SUPPORTED_FORMATS.contains(&format));
    if !keep_format {
        obj.remove("format");
    }

    if let Some(Value::Object(properties)) = obj.get_mut("properties") {
        for value in properties.values_mut() {
            *value = normalize_for_strict_mode(value.take());
        }
        let required = properties.keys().cloned().map(Value::String).collect();
        obj.insert("required".to_string(), Value::Array(required));
        obj.insert("additionalProperties".to_string(), Value::Bool(false));
    }

    for defs_key in ["$defs", "definitions"] {
        if let Some(Value::Object(defs)) = obj.get_mut(defs_key) {
            for value in defs.values_mut() {
                *value = normalize_for_strict_mode(value.take());
            }
        }
    }

    for key in ["items", "anyOf", "oneOf", "allOf"] {
        if let Some(value) = obj.get_mut(key) {
            *value = normalize_for_strict_mode(value.take());
        }
    }
}
