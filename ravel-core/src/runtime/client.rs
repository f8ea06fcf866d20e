//! CompletionClient implementation.
//!
//! The client owns one shared transport handle and offers two paths:
//! - [`CompletionClient::complete`]: raw text, one transport call, no retry
//! - [`CompletionClient::complete_structured`]: schema-bound, validated,
//!   bounded retry with backoff

use crate::error::AiError;
use crate::layer::Layer;
use crate::provider::Provider;
use crate::retry::{Attempt, AttemptOutcome, RetryPolicy};
use crate::schema::{OutputSchema, TypedSchema};
use crate::strategy::{detect_json_strategy, JsonOutputStrategy};
use crate::types::*;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::Instrument;

/// Type-erased provider that can be shared across tasks
type BoxedProvider = Arc<dyn Provider>;

/// Builder for a [`CompletionClient`].
///
/// Layers wrap the provider with static dispatch; the final provider is
/// erased once in [`finish`](Self::finish).
///
/// # Example
///
/// ```ignore
/// let client = CompletionClient::builder(openai_provider)
///     .layer(LoggingLayer::new())
///     .default_retry_policy(RetryPolicy::new().with_max_retries(3))
///     .finish();
/// ```
pub struct CompletionClientBuilder<P> {
    provider: P,
    json_strategy: Option<Box<dyn JsonOutputStrategy>>,
    default_model: String,
    default_max_output_tokens: u32,
    default_retry_policy: RetryPolicy,
}

impl<P: Provider> CompletionClientBuilder<P> {
    /// Create a new builder with a provider
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            json_strategy: None,
            default_model: DEFAULT_MODEL.to_string(),
            default_max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            default_retry_policy: RetryPolicy::default(),
        }
    }

    /// Add a layer to wrap the provider
    pub fn layer<L>(self, layer: L) -> CompletionClientBuilder<L::LayeredProvider>
    where
        L: Layer<P>,
    {
        CompletionClientBuilder {
            provider: layer.layer(self.provider),
            json_strategy: self.json_strategy,
            default_model: self.default_model,
            default_max_output_tokens: self.default_max_output_tokens,
            default_retry_policy: self.default_retry_policy,
        }
    }

    /// Set a custom JSON output strategy
    ///
    /// If not set, the strategy is detected from the provider id.
    pub fn json_strategy(mut self, strategy: Box<dyn JsonOutputStrategy>) -> Self {
        self.json_strategy = Some(strategy);
        self
    }

    /// Model used by [`CompletionClient::request`]
    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Token budget used by [`CompletionClient::request`]
    pub fn default_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.default_max_output_tokens = max_output_tokens;
        self
    }

    /// Policy used by [`CompletionClient::complete_structured_default`]
    pub fn default_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.default_retry_policy = policy;
        self
    }

    /// Finish building and create a CompletionClient
    pub fn finish(self) -> CompletionClient {
        let provider: BoxedProvider = Arc::new(self.provider);
        let json_strategy = self
            .json_strategy
            .unwrap_or_else(|| detect_json_strategy(&provider.info().id));

        CompletionClient {
            provider,
            json_strategy: Arc::from(json_strategy),
            default_model: Arc::from(self.default_model),
            default_max_output_tokens: self.default_max_output_tokens,
            default_retry_policy: self.default_retry_policy,
        }
    }
}

/// Client for raw and structured completions.
///
/// Cloning is cheap and every clone shares the same transport handle, so one
/// client built at startup can serve any number of concurrent tasks. No
/// per-call state lives in the client.
#[derive(Clone)]
pub struct CompletionClient {
    provider: BoxedProvider,
    json_strategy: Arc<dyn JsonOutputStrategy>,
    default_model: Arc<str>,
    default_max_output_tokens: u32,
    default_retry_policy: RetryPolicy,
}

impl std::fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionClient")
            .field("provider", &self.provider)
            .field("json_strategy", &self.json_strategy.name())
            .field("default_model", &self.default_model)
            .field("default_max_output_tokens", &self.default_max_output_tokens)
            .field("default_retry_policy", &self.default_retry_policy)
            .finish()
    }
}

impl CompletionClient {
    /// Create a new builder
    pub fn builder<P: Provider>(provider: P) -> CompletionClientBuilder<P> {
        CompletionClientBuilder::new(provider)
    }

    /// Get provider information
    pub fn info(&self) -> Arc<ProviderInfo> {
        self.provider.info()
    }

    /// Build a request using the client's default model and token budget
    pub fn request(&self, prompt: impl Into<String>) -> CompletionRequest {
        CompletionRequest::new(prompt)
            .with_model(&*self.default_model)
            .with_max_output_tokens(self.default_max_output_tokens)
    }

    /// The policy used by [`complete_structured_default`](Self::complete_structured_default)
    pub fn default_retry_policy(&self) -> &RetryPolicy {
        &self.default_retry_policy
    }

    /// Raw completion: return the first choice's text, unmodified.
    ///
    /// Exactly one transport call. Every transport error is returned as is;
    /// this path never retries.
    pub async fn complete(
        &self,
        prompt: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<String, AiError> {
        let prompt = prompt.into();
        ensure_prompt(&prompt)?;
        let chat_req = ChatCompletionRequest::new(model, vec![Message::user(prompt)]);
        self.send_raw(chat_req).await
    }

    /// Raw completion honouring the request's token budget.
    pub async fn complete_request(&self, request: &CompletionRequest) -> Result<String, AiError> {
        ensure_prompt(request.prompt())?;
        self.send_raw(ChatCompletionRequest::from(request)).await
    }

    async fn send_raw(&self, chat_req: ChatCompletionRequest) -> Result<String, AiError> {
        let chat_req = chat_req.with_response_format(ResponseFormat::Text);
        tracing::debug!(model = %chat_req.model, "sending raw completion");

        let response = self.provider.chat_completion(chat_req).await?;
        let first_choice = response.first_choice()?;
        Ok(first_choice.message.text())
    }

    /// Structured completion into a Rust type.
    ///
    /// The schema is generated from `T`, and the response is deserialized and
    /// validated against it. See [`complete_structured_with`](Self::complete_structured_with)
    /// for the retry semantics.
    pub async fn complete_structured<T>(
        &self,
        request: &CompletionRequest,
        policy: RetryPolicy,
    ) -> Result<T, AiError>
    where
        T: JsonSchema + DeserializeOwned + Send,
    {
        self.complete_structured_with(request, &TypedSchema::<T>::new(), policy)
            .await
    }

    /// Structured completion using the client defaults for model, token
    /// budget and retry policy.
    pub async fn complete_structured_default<T>(
        &self,
        prompt: impl Into<String>,
    ) -> Result<T, AiError>
    where
        T: JsonSchema + DeserializeOwned + Send,
    {
        let request = self.request(prompt);
        self.complete_structured(&request, self.default_retry_policy.clone())
            .await
    }

    /// Structured completion against any [`OutputSchema`].
    ///
    /// Attempts run strictly one after another, at most
    /// `policy.max_retries() + 1` of them. The first validated value is
    /// returned. A retryable failure with budget left sleeps for the backoff
    /// delay and tries again; otherwise that attempt's error is returned
    /// unchanged. A partially valid value is never returned.
    ///
    /// Dropping the returned future cancels the call; no further attempts
    /// are started.
    pub async fn complete_structured_with<S>(
        &self,
        request: &CompletionRequest,
        schema: &S,
        policy: RetryPolicy,
    ) -> Result<S::Output, AiError>
    where
        S: OutputSchema,
    {
        ensure_prompt(request.prompt())?;
        let schema_name = schema.name();
        let chat_req = self.structured_request(request, &schema_name, schema)?;

        let span = tracing::debug_span!(
            "complete_structured",
            request_id = %uuid::Uuid::new_v4(),
            model = request.model(),
            schema = %schema_name,
        );

        self.run_with_retry(chat_req, schema, &policy)
            .instrument(span)
            .await
    }

    fn structured_request<S: OutputSchema>(
        &self,
        request: &CompletionRequest,
        schema_name: &str,
        schema: &S,
    ) -> Result<ChatCompletionRequest, AiError> {
        let mut chat_req = ChatCompletionRequest::from(request);
        let json_schema = schema.json_schema()?;
        self.json_strategy
            .apply(&mut chat_req, schema_name, &json_schema)?;
        Ok(chat_req)
    }

    async fn run_with_retry<S: OutputSchema>(
        &self,
        chat_req: ChatCompletionRequest,
        schema: &S,
        policy: &RetryPolicy,
    ) -> Result<S::Output, AiError> {
        let max_retries = policy.max_retries();
        let mut index = 0;

        loop {
            let attempt = self.attempt(index, chat_req.clone(), schema, policy).await;

            match attempt.outcome {
                AttemptOutcome::Success(value) => {
                    tracing::debug!(attempt = index, "structured completion succeeded");
                    return Ok(value);
                }
                AttemptOutcome::RetryableFailure(err) if index < max_retries => {
                    let delay = policy.backoff().delay_for(index);
                    tracing::warn!(
                        attempt = index,
                        max_retries,
                        ?delay,
                        error = %err,
                        "structured completion attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                AttemptOutcome::RetryableFailure(err) => {
                    tracing::error!(
                        attempts = index + 1,
                        error = %err,
                        "structured completion failed, retries exhausted"
                    );
                    return Err(err);
                }
                AttemptOutcome::FatalFailure(err) => {
                    tracing::error!(
                        attempt = index,
                        error = %err,
                        "structured completion failed with non-retryable error"
                    );
                    return Err(err);
                }
            }

            index += 1;
        }
    }

    async fn attempt<S: OutputSchema>(
        &self,
        index: u32,
        chat_req: ChatCompletionRequest,
        schema: &S,
        policy: &RetryPolicy,
    ) -> Attempt<S::Output> {
        tracing::debug!(attempt = index, "sending structured completion attempt");
        let result = self.fetch_structured(chat_req, schema).await;
        Attempt {
            index,
            outcome: policy.classify(result),
        }
    }

    async fn fetch_structured<S: OutputSchema>(
        &self,
        chat_req: ChatCompletionRequest,
        schema: &S,
    ) -> Result<S::Output, AiError> {
        let response = self.provider.chat_completion(chat_req).await?;
        let first_choice = response.first_choice()?;

        if let Some(refusal) = first_choice.message.refusal() {
            return Err(AiError::refusal(refusal));
        }
        if first_choice.finish_reason == FinishReason::Length {
            return Err(AiError::length_limit(format!(
                "response stopped after {} completion tokens",
                response.usage.completion_tokens
            )));
        }

        schema.parse(&first_choice.message.text())
    }
}

fn ensure_prompt(prompt: &str) -> Result<(), AiError> {
    if prompt.trim().is_empty() {
        return Err(AiError::invalid_request("prompt must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{Backoff, RetryCondition};
    use crate::schema::RuntimeSchema;
    use crate::strategy::JsonModeStrategy;
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Verdict {
        label: String,
        confidence: f64,
    }

    const VALID_VERDICT: &str = r#"{"label": "healthy", "confidence": 0.9}"#;

    fn response(text: &str, finish_reason: FinishReason) -> ChatCompletionResponse {
        ChatCompletionResponse {
            id: "resp-test".to_string(),
            model: "test-model".to_string(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(text),
                finish_reason,
            }],
            usage: Usage {
                prompt_tokens: 10,
                completion_tokens: 20,
                total_tokens: 30,
            },
            created: None,
        }
    }

    fn ok(text: &str) -> Result<ChatCompletionResponse, AiError> {
        Ok(response(text, FinishReason::Stop))
    }

    /// Replays scripted results in order and records every call.
    #[derive(Debug)]
    struct ScriptedProvider {
        info: Arc<ProviderInfo>,
        script: Mutex<VecDeque<Result<ChatCompletionResponse, AiError>>>,
        calls: Mutex<Vec<(Instant, ChatCompletionRequest)>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<ChatCompletionResponse, AiError>>) -> Arc<Self> {
            Self::with_id("openai", script)
        }

        fn with_id(id: &str, script: Vec<Result<ChatCompletionResponse, AiError>>) -> Arc<Self> {
            Arc::new(Self {
                info: Arc::new(ProviderInfo {
                    id: id.to_string(),
                    name: "Scripted".to_string(),
                }),
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().iter().map(|(t, _)| *t).collect()
        }

        fn request(&self, index: usize) -> ChatCompletionRequest {
            self.calls.lock().unwrap()[index].1.clone()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn info(&self) -> Arc<ProviderInfo> {
            self.info.clone()
        }

        async fn chat_completion(
            &self,
            req: ChatCompletionRequest,
        ) -> Result<ChatCompletionResponse, AiError> {
            self.calls.lock().unwrap().push((Instant::now(), req));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AiError::provider("script exhausted")))
        }
    }

    fn client_for(provider: &Arc<ScriptedProvider>) -> CompletionClient {
        CompletionClient::builder(provider.clone()).finish()
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_retries(max_retries)
            .with_delay(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_raw_returns_first_choice_with_single_call() {
        // A second call would fail, so success proves there was only one.
        let provider = ScriptedProvider::new(vec![ok("pong"), Err(AiError::provider("unused"))]);
        let client = client_for(&provider);

        let answer = client.complete("ping", "gpt-4.1").await.unwrap();

        assert_eq!(answer, "pong");
        assert_eq!(provider.call_count(), 1);
        let sent = provider.request(0);
        assert_eq!(sent.model, "gpt-4.1");
        assert_eq!(sent.messages[0].text(), "ping");
        assert_eq!(sent.response_format, Some(ResponseFormat::Text));
        assert_eq!(sent.max_tokens, None);
    }

    #[tokio::test]
    async fn test_raw_propagates_error_without_retry() {
        let provider = ScriptedProvider::new(vec![Err(AiError::rate_limit("429")), ok("late")]);
        let client = client_for(&provider);

        let err = client.complete("ping", "gpt-4.1").await.unwrap_err();

        assert!(matches!(err, AiError::RateLimit(ref msg) if msg == "429"));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_raw_returns_text_unmodified() {
        let provider = ScriptedProvider::new(vec![ok("  not json {, still returned\n")]);
        let client = client_for(&provider);

        let answer = client.complete("anything", "gpt-4.1").await.unwrap();
        assert_eq!(answer, "  not json {, still returned\n");
    }

    #[tokio::test]
    async fn test_raw_without_choices_is_provider_error() {
        let mut empty = response("", FinishReason::Stop);
        empty.choices.clear();
        let provider = ScriptedProvider::new(vec![Ok(empty)]);
        let client = client_for(&provider);

        let err = client.complete("ping", "gpt-4.1").await.unwrap_err();
        assert!(matches!(err, AiError::Provider(_)));
    }

    #[tokio::test]
    async fn test_complete_request_sends_token_budget() {
        let provider = ScriptedProvider::new(vec![ok("fine")]);
        let client = client_for(&provider);
        let request = CompletionRequest::new("status?").with_max_output_tokens(64);

        assert_eq!(client.complete_request(&request).await.unwrap(), "fine");
        assert_eq!(provider.request(0).max_tokens, Some(64));
    }

    #[tokio::test]
    async fn test_empty_prompt_is_rejected_before_transport() {
        let provider = ScriptedProvider::new(vec![ok("pong")]);
        let client = client_for(&provider);

        let raw = client.complete("   ", "gpt-4.1").await.unwrap_err();
        assert!(matches!(raw, AiError::InvalidRequest(_)));

        let structured = client
            .complete_structured::<Verdict>(&CompletionRequest::new(""), RetryPolicy::new())
            .await
            .unwrap_err();
        assert!(matches!(structured, AiError::InvalidRequest(_)));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_structured_succeeds_on_third_attempt() {
        let provider = ScriptedProvider::new(vec![
            Err(AiError::timeout("first")),
            Err(AiError::provider("second")),
            ok(VALID_VERDICT),
        ]);
        let client = client_for(&provider);

        let verdict: Verdict = client
            .complete_structured(&CompletionRequest::new("judge"), RetryPolicy::new())
            .await
            .unwrap();

        assert_eq!(
            verdict,
            Verdict {
                label: "healthy".to_string(),
                confidence: 0.9,
            }
        );
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_structured_returns_last_error_when_exhausted() {
        let provider = ScriptedProvider::new(vec![
            Err(AiError::provider("first")),
            Err(AiError::timeout("second")),
            Err(AiError::rate_limit("third")),
            ok(VALID_VERDICT),
        ]);
        let client = client_for(&provider);

        let err = client
            .complete_structured::<Verdict>(&CompletionRequest::new("judge"), RetryPolicy::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AiError::RateLimit(ref msg) if msg == "third"));
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_constant_delay_between_attempts() {
        let delay = Duration::from_millis(1500);
        let provider = ScriptedProvider::new(vec![
            Err(AiError::provider("a")),
            Err(AiError::provider("b")),
            ok(VALID_VERDICT),
        ]);
        let client = client_for(&provider);

        client
            .complete_structured::<Verdict>(
                &CompletionRequest::new("judge"),
                RetryPolicy::new().with_delay(delay),
            )
            .await
            .unwrap();

        let times = provider.call_times();
        assert_eq!(times.len(), 3);
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= delay);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_delay_between_attempts() {
        let provider = ScriptedProvider::new(vec![
            Err(AiError::provider("a")),
            Err(AiError::provider("b")),
            ok(VALID_VERDICT),
        ]);
        let client = client_for(&provider);
        let policy = RetryPolicy::new().with_backoff(Backoff::Exponential {
            initial: Duration::from_millis(100),
            multiplier: 2.0,
            max: Duration::from_secs(5),
        });

        client
            .complete_structured::<Verdict>(&CompletionRequest::new("judge"), policy)
            .await
            .unwrap();

        let times = provider.call_times();
        assert!(times[1] - times[0] >= Duration::from_millis(100));
        assert!(times[2] - times[1] >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_zero_retries_makes_one_attempt() {
        let failing = ScriptedProvider::new(vec![Err(AiError::timeout("slow")), ok(VALID_VERDICT)]);
        let err = client_for(&failing)
            .complete_structured::<Verdict>(&CompletionRequest::new("judge"), RetryPolicy::none())
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::Timeout(_)));
        assert_eq!(failing.call_count(), 1);

        let succeeding = ScriptedProvider::new(vec![ok(VALID_VERDICT)]);
        client_for(&succeeding)
            .complete_structured::<Verdict>(&CompletionRequest::new("judge"), RetryPolicy::none())
            .await
            .unwrap();
        assert_eq!(succeeding.call_count(), 1);
    }

    #[tokio::test]
    async fn test_validation_failure_is_retried() {
        let provider = ScriptedProvider::new(vec![ok("not json at all"), ok(VALID_VERDICT)]);
        let client = client_for(&provider);

        let verdict: Verdict = client
            .complete_structured(&CompletionRequest::new("judge"), fast_policy(2))
            .await
            .unwrap();

        assert_eq!(verdict.label, "healthy");
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_partial_object_is_never_returned() {
        let partial = r#"{"label": "healthy"}"#;
        let provider = ScriptedProvider::new(vec![ok(partial), ok(partial), ok(partial)]);
        let client = client_for(&provider);

        let err = client
            .complete_structured::<Verdict>(&CompletionRequest::new("judge"), fast_policy(2))
            .await
            .unwrap_err();

        match err {
            AiError::Validation { schema, message } => {
                assert_eq!(schema, "Verdict");
                assert!(message.contains("confidence"), "{message}");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_length_and_refusal_count_as_failed_attempts() {
        let refusal = ChatCompletionResponse {
            choices: vec![Choice {
                index: 0,
                message: Message {
                    role: Role::Assistant,
                    content: vec![ContentPart::Refusal {
                        refusal: "I can't help with that".to_string(),
                    }],
                    name: None,
                },
                finish_reason: FinishReason::Stop,
            }],
            ..response("", FinishReason::Stop)
        };
        let provider = ScriptedProvider::new(vec![
            Ok(response(r#"{"label": "hea"#, FinishReason::Length)),
            Ok(refusal),
        ]);
        let client = client_for(&provider);

        let err = client
            .complete_structured::<Verdict>(&CompletionRequest::new("judge"), fast_policy(1))
            .await
            .unwrap_err();

        assert!(matches!(err, AiError::Refusal(_)));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_transient_condition_stops_on_fatal_error() {
        let provider = ScriptedProvider::new(vec![
            Err(AiError::authentication("invalid api key")),
            ok(VALID_VERDICT),
        ]);
        let client = client_for(&provider);
        let policy = fast_policy(2).with_retry_on(RetryCondition::Transient);

        let err = client
            .complete_structured::<Verdict>(&CompletionRequest::new("judge"), policy)
            .await
            .unwrap_err();

        assert!(matches!(err, AiError::Authentication(_)));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_structured_request_carries_schema_and_budget() {
        let provider = ScriptedProvider::new(vec![ok(VALID_VERDICT)]);
        let client = client_for(&provider);
        let request = CompletionRequest::new("judge")
            .with_model("gpt-4o-mini")
            .with_max_output_tokens(300);

        client
            .complete_structured::<Verdict>(&request, RetryPolicy::none())
            .await
            .unwrap();

        let sent = provider.request(0);
        assert_eq!(sent.model, "gpt-4o-mini");
        assert_eq!(sent.max_tokens, Some(300));
        match sent.response_format {
            Some(ResponseFormat::JsonSchema {
                name,
                schema,
                strict,
            }) => {
                assert_eq!(name, "Verdict");
                assert!(strict);
                assert_eq!(schema["additionalProperties"], serde_json::json!(false));
            }
            other => panic!("expected JsonSchema response format, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_json_mode_provider_accepts_fenced_output() {
        let provider = ScriptedProvider::with_id(
            "deepseek",
            vec![ok("```json\n{\"label\": \"ok\", \"confidence\": 1.0}\n```")],
        );
        let client = client_for(&provider);

        let verdict: Verdict = client
            .complete_structured(&CompletionRequest::new("judge"), RetryPolicy::none())
            .await
            .unwrap();

        assert_eq!(verdict.label, "ok");
        let sent = provider.request(0);
        assert_eq!(sent.response_format, Some(ResponseFormat::JsonObject));
        assert_eq!(sent.messages[0].role, Role::System);
    }

    #[tokio::test]
    async fn test_custom_strategy_overrides_detection() {
        let provider = ScriptedProvider::new(vec![ok(VALID_VERDICT)]);
        let client = CompletionClient::builder(provider.clone())
            .json_strategy(Box::new(JsonModeStrategy::with_system_message(false)))
            .finish();

        client
            .complete_structured::<Verdict>(&CompletionRequest::new("judge"), RetryPolicy::none())
            .await
            .unwrap();

        let sent = provider.request(0);
        assert_eq!(sent.response_format, Some(ResponseFormat::JsonObject));
        assert_eq!(sent.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_runtime_schema_orchestration() {
        let schema = RuntimeSchema::new(
            "table_count",
            serde_json::json!({
                "type": "object",
                "properties": {"tables": {"type": "integer"}},
                "required": ["tables"]
            }),
        );
        let provider = ScriptedProvider::new(vec![ok(r#"{"tables": "two"}"#), ok(r#"{"tables": 2}"#)]);
        let client = client_for(&provider);

        let value = client
            .complete_structured_with(&CompletionRequest::new("count"), &schema, fast_policy(1))
            .await
            .unwrap();

        assert_eq!(value["tables"], 2);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_schema_build_failure_makes_no_calls() {
        let provider = ScriptedProvider::new(vec![ok(r#"{"tables": 2}"#)]);
        let client = client_for(&provider);
        let request = CompletionRequest::new("count");

        for document in [serde_json::json!(true), serde_json::json!({"type": 12})] {
            let schema = RuntimeSchema::new("broken", document);
            let err = client
                .complete_structured_with(&request, &schema, fast_policy(3))
                .await
                .unwrap_err();
            assert!(matches!(err, AiError::InvalidRequest(_)), "{err}");
        }

        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_further_attempts() {
        let provider = ScriptedProvider::new(vec![
            Err(AiError::provider("a")),
            Err(AiError::provider("b")),
            ok(VALID_VERDICT),
        ]);
        let client = client_for(&provider);
        let request = CompletionRequest::new("judge");

        let result = tokio::time::timeout(
            Duration::from_millis(1500),
            client.complete_structured::<Verdict>(&request, RetryPolicy::new()),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(provider.call_count(), 2);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_policy_and_request_from_builder() {
        let provider = ScriptedProvider::new(vec![Err(AiError::provider("a")), ok(VALID_VERDICT)]);
        let client = CompletionClient::builder(provider.clone())
            .default_model("gpt-4o-mini")
            .default_max_output_tokens(128)
            .default_retry_policy(RetryPolicy::new().with_max_retries(1))
            .finish();

        let verdict: Verdict = client.complete_structured_default("judge").await.unwrap();

        assert_eq!(verdict.label, "healthy");
        assert_eq!(provider.call_count(), 2);
        assert_eq!(provider.request(1).model, "gpt-4o-mini");
        assert_eq!(provider.request(1).max_tokens, Some(128));
    }

    /// Always fails for prompts containing "bad", succeeds otherwise.
    #[derive(Debug, Default)]
    struct PromptRoutedProvider {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Provider for PromptRoutedProvider {
        fn info(&self) -> Arc<ProviderInfo> {
            Arc::new(ProviderInfo {
                id: "openai".to_string(),
                name: "Routed".to_string(),
            })
        }

        async fn chat_completion(
            &self,
            req: ChatCompletionRequest,
        ) -> Result<ChatCompletionResponse, AiError> {
            let prompt = req
                .messages
                .iter()
                .find(|m| m.role == Role::User)
                .map(Message::text)
                .unwrap_or_default();
            self.calls.lock().unwrap().push(prompt.clone());
            tokio::task::yield_now().await;
            if prompt.contains("bad") {
                Err(AiError::timeout("upstream stalled"))
            } else {
                ok(VALID_VERDICT)
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_keep_independent_budgets() {
        let provider = Arc::new(PromptRoutedProvider::default());
        let client = CompletionClient::builder(provider.clone()).finish();
        let good = client.request("good table");
        let bad = client.request("bad table");

        let (good_result, bad_result) = futures::join!(
            client.complete_structured::<Verdict>(&good, RetryPolicy::new()),
            client.complete_structured::<Verdict>(&bad, RetryPolicy::new()),
        );

        assert!(good_result.is_ok());
        assert!(matches!(bad_result, Err(AiError::Timeout(_))));

        let calls = provider.calls.lock().unwrap();
        assert_eq!(calls.iter().filter(|p| p.contains("good")).count(), 1);
        assert_eq!(calls.iter().filter(|p| p.contains("bad")).count(), 3);
    }

    #[tokio::test]
    async fn test_client_clones_share_transport() {
        let provider = ScriptedProvider::new(vec![ok("one"), ok("two")]);
        let client = client_for(&provider);
        let clone = client.clone();

        tokio::spawn(async move { clone.complete("first", "gpt-4.1").await })
            .await
            .unwrap()
            .unwrap();
        client.complete("second", "gpt-4.1").await.unwrap();

        assert_eq!(provider.call_count(), 2);
    }
}
