//! Error types for Ravel operations.

/// The main error type for completion operations.
///
/// Variants fall into two families. Transport failures (`Provider`,
/// `Network`, `Authentication`, `RateLimit`, `InvalidRequest`,
/// `ModelNotFound`, `Timeout`) originate from the remote call. Validation
/// failures (`Validation`, `Serialization`, `LengthLimit`, `Refusal`) mean the
/// payload arrived but could not be turned into the requested schema.
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    /// Provider-specific errors
    #[error("Provider error: {0}")]
    Provider(String),

    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication errors
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Rate limit errors
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// Invalid request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Model not found errors
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Timeout errors
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// The payload does not conform to the requested schema
    #[error("Validation error ({schema}): {message}")]
    Validation { schema: String, message: String },

    /// The model stopped because it ran out of output tokens
    #[error("Output truncated by token limit: {0}")]
    LengthLimit(String),

    /// The model refused to produce the requested output
    #[error("Model refused request: {0}")]
    Refusal(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AiError {
    /// Create a provider error
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create an authentication error
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limit(msg: impl Into<String>) -> Self {
        Self::RateLimit(msg.into())
    }

    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a model not found error
    pub fn model_not_found(msg: impl Into<String>) -> Self {
        Self::ModelNotFound(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a validation error for the named schema
    pub fn validation(schema: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            schema: schema.into(),
            message: message.into(),
        }
    }

    /// Create a token limit error
    pub fn length_limit(msg: impl Into<String>) -> Self {
        Self::LengthLimit(msg.into())
    }

    /// Create a refusal error
    pub fn refusal(msg: impl Into<String>) -> Self {
        Self::Refusal(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Check if this is a transient error worth another attempt.
    ///
    /// Only consulted under [`RetryCondition::Transient`](crate::retry::RetryCondition);
    /// the default condition retries every failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AiError::Network(_)
                | AiError::Timeout(_)
                | AiError::RateLimit(_)
                | AiError::Validation { .. }
                | AiError::Serialization(_)
                | AiError::LengthLimit(_)
        )
    }
}
