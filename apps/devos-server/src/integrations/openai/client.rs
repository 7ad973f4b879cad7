//! OpenAI client with timeout and circuit breaker protection.
//!
//! Every operation resolves its own deadline from the timeout policy and
//! runs inside the breaker, so a degraded API fails fast instead of
//! stacking up waiting requests. Without an API key the client runs in mock
//! mode: operations return deterministic placeholder output and never touch
//! the network, which keeps development setups and tests runnable offline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;

use super::api_types::{
    ApiErrorResponse, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Usage,
};
use crate::config::TimeoutPolicy;
use crate::health::{DependencyProbe, ProbeOutcome};
use crate::resilience::{CallError, CircuitBreaker, CircuitBreakerSnapshot};

/// Default API base URL.
const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Model used for connectivity probes.
const PROBE_MODEL: &str = "gpt-3.5-turbo";

const ANALYZE_SYSTEM_PROMPT: &str = "You are an expert code analyst. Provide detailed analysis of code quality, performance, and suggestions for improvement.";
const EXPLAIN_SYSTEM_PROMPT: &str = "You are an expert code explainer. Provide clear, detailed explanations of code functionality, structure, and purpose.";
const OPTIMIZE_SYSTEM_PROMPT: &str = "You are an expert code optimizer. Provide optimized versions of code with improved performance, readability, and maintainability.";
const GENERATE_SYSTEM_PROMPT: &str = "You are an expert code generator. Generate clean, efficient, and well-documented code that follows best practices.";
const TESTS_SYSTEM_PROMPT: &str = "You are an expert test generator. Create comprehensive, well-structured tests that cover functionality, edge cases, and error conditions.";

/// OpenAI client configuration.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key; absent means mock mode.
    pub api_key: Option<String>,
    /// API base URL.
    pub base_url: String,
    /// Model for code operations.
    pub model: String,
    /// Completion token budget.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: "gpt-4".to_string(),
            max_tokens: 4000,
            temperature: 0.7,
        }
    }
}

impl OpenAiConfig {
    /// Read configuration from the environment.
    ///
    /// Recognized variables: `OPENAI_API_KEY`, `OPENAI_BASE_URL`,
    /// `OPENAI_MODEL`, `OPENAI_MAX_TOKENS`, `OPENAI_TEMPERATURE`.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|key| !key.is_empty()),
            base_url: std::env::var("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            model: std::env::var("OPENAI_MODEL").unwrap_or(defaults.model),
            max_tokens: std::env::var("OPENAI_MAX_TOKENS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_tokens),
            temperature: std::env::var("OPENAI_TEMPERATURE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.temperature),
        }
    }
}

/// OpenAI API errors.
#[derive(Debug, Error)]
pub enum OpenAiError {
    /// Network-level failure.
    #[error("network error: {0}")]
    Network(String),
    /// The API returned an error status.
    #[error("OpenAI API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// API error message.
        message: String,
    },
    /// The response body could not be parsed.
    #[error("failed to parse OpenAI response: {0}")]
    JsonParse(String),
    /// The response carried no completion choices.
    #[error("OpenAI response contained no choices")]
    EmptyResponse,
}

/// Output of one chat-backed operation.
#[derive(Debug, Clone)]
pub struct ChatOutput {
    /// Generated text.
    pub content: String,
    /// Token accounting, when reported (absent in mock mode).
    pub usage: Option<Usage>,
}

/// OpenAI client guarded by a circuit breaker and per-operation deadlines.
pub struct OpenAiClient {
    config: OpenAiConfig,
    http: reqwest::Client,
    timeouts: TimeoutPolicy,
    breaker: Arc<CircuitBreaker>,
}

impl OpenAiClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns [`OpenAiError::Network`] if the HTTP client cannot be built.
    pub fn new(
        config: OpenAiConfig,
        timeouts: TimeoutPolicy,
        breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, OpenAiError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| OpenAiError::Network(e.to_string()))?;

        if config.api_key.is_none() {
            tracing::warn!("No OPENAI_API_KEY configured; OpenAI client running in mock mode");
        }

        Ok(Self {
            config,
            http,
            timeouts,
            breaker,
        })
    }

    /// Whether the client runs against the real API.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    /// This client's circuit breaker.
    #[must_use]
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Analyze code quality and suggest improvements.
    pub async fn analyze_code(&self, prompt: &str) -> Result<ChatOutput, CallError<OpenAiError>> {
        self.operation(
            "analyze_code",
            ANALYZE_SYSTEM_PROMPT,
            prompt,
            "Mock analysis: code quality assessment would appear here with an API key configured.",
        )
        .await
    }

    /// Explain what a piece of code does.
    pub async fn explain_code(&self, prompt: &str) -> Result<ChatOutput, CallError<OpenAiError>> {
        self.operation(
            "explain_code",
            EXPLAIN_SYSTEM_PROMPT,
            prompt,
            "Mock explanation: a detailed code explanation would appear here with an API key configured.",
        )
        .await
    }

    /// Produce an optimized version of code.
    pub async fn optimize_code(&self, prompt: &str) -> Result<ChatOutput, CallError<OpenAiError>> {
        self.operation(
            "optimize_code",
            OPTIMIZE_SYSTEM_PROMPT,
            prompt,
            "# Mock optimized code: an optimized version would appear here with an API key configured.",
        )
        .await
    }

    /// Generate code from a description.
    pub async fn generate_code(&self, prompt: &str) -> Result<ChatOutput, CallError<OpenAiError>> {
        self.operation(
            "generate_code",
            GENERATE_SYSTEM_PROMPT,
            prompt,
            "# Mock code: generated code would appear here with an API key configured.",
        )
        .await
    }

    /// Generate tests for code.
    pub async fn generate_tests(&self, prompt: &str) -> Result<ChatOutput, CallError<OpenAiError>> {
        self.operation(
            "generate_tests",
            TESTS_SYSTEM_PROMPT,
            prompt,
            "# Mock tests: test cases would be generated here with an API key configured.",
        )
        .await
    }

    /// Probe API connectivity with a minimal completion.
    pub async fn test_connection(&self) -> Result<(), CallError<OpenAiError>> {
        let timeout = self.timeouts.get_timeout("test_connection");
        let request = ChatCompletionRequest {
            model: PROBE_MODEL.to_string(),
            messages: vec![ChatMessage::user("Hello")],
            max_tokens: 10,
            temperature: 0.0,
        };

        self.breaker
            .call("test_connection", timeout, async {
                self.send_chat(&request).await.map(|_| ())
            })
            .await
    }

    /// Run one chat-backed operation under its resolved deadline.
    async fn operation(
        &self,
        operation: &str,
        system_prompt: &str,
        prompt: &str,
        mock_output: &str,
    ) -> Result<ChatOutput, CallError<OpenAiError>> {
        if self.config.api_key.is_none() {
            return Ok(ChatOutput {
                content: mock_output.to_string(),
                usage: None,
            });
        }

        let timeout = self.timeouts.get_timeout(operation);
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user(prompt),
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        self.breaker
            .call(operation, timeout, self.send_chat(&request))
            .await
    }

    /// POST a chat completion and parse the response.
    async fn send_chat(&self, request: &ChatCompletionRequest) -> Result<ChatOutput, OpenAiError> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);
        let api_key = self.config.api_key.as_deref().unwrap_or_default();

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| OpenAiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map_or(body, |err| err.error.message);
            return Err(OpenAiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| OpenAiError::JsonParse(e.to_string()))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or(OpenAiError::EmptyResponse)?;

        Ok(ChatOutput {
            content: choice.message.content,
            usage: completion.usage,
        })
    }
}

#[async_trait]
impl DependencyProbe for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn probe(&self) -> ProbeOutcome {
        if !self.is_configured() {
            return ProbeOutcome::unknown("no OpenAI API key configured");
        }

        match self.test_connection().await {
            Ok(()) => ProbeOutcome::healthy(json!({
                "message": "OpenAI API connection successful",
            })),
            Err(e) => ProbeOutcome::unhealthy(e.to_string()),
        }
    }

    fn breaker_snapshot(&self) -> CircuitBreakerSnapshot {
        self.breaker.snapshot()
    }

    fn timeout_table(&self) -> Value {
        self.timeouts.as_json()
    }

    fn probe_timeout(&self) -> Duration {
        self.timeouts.get_timeout("test_connection")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::CircuitBreakerConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn mock_client() -> OpenAiClient {
        OpenAiClient::new(
            OpenAiConfig::default(),
            TimeoutPolicy::openai(),
            Arc::new(CircuitBreaker::new(
                "openai",
                CircuitBreakerConfig::default(),
            )),
        )
        .unwrap()
    }

    fn live_client(base_url: String, breaker_config: CircuitBreakerConfig) -> OpenAiClient {
        OpenAiClient::new(
            OpenAiConfig {
                api_key: Some("test-key".to_string()),
                base_url,
                ..OpenAiConfig::default()
            },
            TimeoutPolicy::openai(),
            Arc::new(CircuitBreaker::new("openai", breaker_config)),
        )
        .unwrap()
    }

    fn completion_body(content: &str) -> serde_json::Value {
        json!({
            "choices": [{"message": {"role": "assistant", "content": content}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        })
    }

    #[tokio::test]
    async fn mock_mode_returns_placeholder() {
        let client = mock_client();
        assert!(!client.is_configured());

        let output = client.analyze_code("fn main() {}").await.unwrap();
        assert!(output.content.starts_with("Mock analysis"));
        assert!(output.usage.is_none());
    }

    #[tokio::test]
    async fn mock_mode_probe_is_unknown() {
        let client = mock_client();
        let outcome = client.probe().await;
        assert_eq!(outcome.status, crate::health::HealthStatus::Unknown);
    }

    #[tokio::test]
    async fn analyze_code_parses_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("looks fine")))
            .mount(&server)
            .await;

        let client = live_client(server.uri(), CircuitBreakerConfig::default());
        let output = client.analyze_code("fn main() {}").await.unwrap();

        assert_eq!(output.content, "looks fine");
        assert_eq!(output.usage.unwrap().total_tokens, 15);
    }

    #[tokio::test]
    async fn api_error_is_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(json!({"error": {"message": "server exploded"}})),
            )
            .mount(&server)
            .await;

        let client = live_client(server.uri(), CircuitBreakerConfig::default());
        let err = client.analyze_code("fn main() {}").await.unwrap_err();

        match err {
            CallError::Inner(OpenAiError::Api { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "server exploded");
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn repeated_failures_trip_the_breaker() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = live_client(
            server.uri(),
            CircuitBreakerConfig {
                failure_threshold: 2,
                ..CircuitBreakerConfig::default()
            },
        );

        for _ in 0..2 {
            let err = client.analyze_code("x").await.unwrap_err();
            assert!(matches!(err, CallError::Inner(_)));
        }

        // Breaker is now open; the call is rejected before reaching the API.
        let err = client.analyze_code("x").await.unwrap_err();
        assert!(matches!(err, CallError::Open(_)));

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 2);
    }

    #[tokio::test]
    async fn probe_reports_unhealthy_on_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(
                json!({"error": {"message": "bad key"}}),
            ))
            .mount(&server)
            .await;

        let client = live_client(server.uri(), CircuitBreakerConfig::default());
        let outcome = client.probe().await;

        assert_eq!(outcome.status, crate::health::HealthStatus::Unhealthy);
        assert!(outcome.error_message.unwrap().contains("bad key"));
    }
}
