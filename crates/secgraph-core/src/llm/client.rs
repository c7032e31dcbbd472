//! HTTP completion client
//!
//! Async client for OpenAI-compatible chat completion endpoints with
//! rate-limit handling and exponential backoff.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::llm::types::{ChatRequest, ChatResponse, Message};

/// Default API base URL
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Maximum number of retry attempts for rate-limited requests
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (in milliseconds)
const BACKOFF_BASE_MS: u64 = 1000;

/// The completion collaborator seam
///
/// The engine only needs prompt messages in and text out; everything else
/// about the model service is opaque. Tests inject fakes through this
/// trait.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Generate a completion for the given messages
    async fn complete(&self, messages: Vec<Message>) -> Result<String>;
}

/// Completion client for OpenAI-compatible APIs
#[derive(Clone)]
pub struct HttpCompletionClient {
    http_client: HttpClient,
    config: LlmConfig,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for HttpCompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCompletionClient")
            .field("base_url", &self.base_url)
            .field("model", &self.config.model)
            .finish()
    }
}

/// Builder for creating an HttpCompletionClient
pub struct HttpCompletionClientBuilder {
    config: Option<LlmConfig>,
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

impl Default for HttpCompletionClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpCompletionClientBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            config: None,
            api_key: None,
            base_url: None,
            timeout_secs: None,
        }
    }

    /// Set the LLM configuration
    pub fn config(mut self, config: LlmConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the API key
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<HttpCompletionClient> {
        let config = self.config.unwrap_or_default();
        let api_key = self
            .api_key
            .ok_or_else(|| Error::CompletionError("API key is required".to_string()))?;

        let timeout_secs = self.timeout_secs.unwrap_or(config.timeout_secs);

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(Error::NetworkError)?;

        let base_url = self
            .base_url
            .or_else(|| config.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(HttpCompletionClient {
            http_client,
            config,
            api_key,
            base_url,
        })
    }
}

impl HttpCompletionClient {
    /// Create a new client with the given configuration and API key
    pub fn new(config: LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        HttpCompletionClientBuilder::new()
            .config(config)
            .api_key(api_key)
            .build()
    }

    /// Create a new builder
    pub fn builder() -> HttpCompletionClientBuilder {
        HttpCompletionClientBuilder::new()
    }

    /// Get the configured model
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Execute a chat request with retry on rate limiting
    async fn execute_request(&self, request: &ChatRequest) -> Result<String> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.send_request(request).await {
                Ok(content) => return Ok(content),
                Err(Error::RateLimited(wait_secs)) if attempts < MAX_RETRY_ATTEMPTS => {
                    let backoff = calculate_backoff(attempts, wait_secs);
                    warn!(
                        attempt = attempts,
                        wait_ms = backoff,
                        "Rate limited, retrying after backoff"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Send a single request to the API
    async fn send_request(&self, request: &ChatRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Sending chat completion request"
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(Error::NetworkError)?;

        let status = response.status();

        if !status.is_success() {
            return self.handle_error_response(status, response).await;
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::CompletionError(format!("Failed to parse response: {}", e)))?;

        if let Some(usage) = &chat_response.usage {
            info!(
                model = %chat_response.model,
                tokens = usage.total_tokens,
                "Chat completion successful"
            );
        }

        chat_response
            .first_content()
            .ok_or_else(|| Error::CompletionError("Empty response from API".to_string()))
    }

    /// Handle error responses from the API
    async fn handle_error_response<T>(
        &self,
        status: reqwest::StatusCode,
        response: reqwest::Response,
    ) -> Result<T> {
        let body = response.text().await.unwrap_or_default();

        match status.as_u16() {
            401 => Err(Error::CompletionError(
                "Unauthorized: Invalid API key. Set SECGRAPH_API_KEY or OPENAI_API_KEY environment variable.".to_string(),
            )),
            429 => {
                let wait_secs = extract_retry_after(&body).unwrap_or(60);
                Err(Error::RateLimited(wait_secs))
            }
            400 => Err(Error::CompletionError(format!("Bad request: {}", body))),
            402 => Err(Error::CompletionError(
                "Payment required: Insufficient credits".to_string(),
            )),
            403 => Err(Error::CompletionError(format!("Forbidden: {}", body))),
            404 => Err(Error::CompletionError(format!(
                "Model not found or endpoint unavailable: {}",
                body
            ))),
            500..=599 => Err(Error::CompletionError(format!(
                "Server error ({}): {}",
                status, body
            ))),
            _ => Err(Error::CompletionError(format!(
                "HTTP error {}: {}",
                status, body
            ))),
        }
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, messages: Vec<Message>) -> Result<String> {
        let request = ChatRequest::new(&self.config.model, messages)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);

        self.execute_request(&request).await
    }
}

/// Calculate backoff delay with jitter
fn calculate_backoff(attempt: u32, suggested_wait: u64) -> u64 {
    let base = BACKOFF_BASE_MS * 2u64.pow(attempt - 1);
    let max_wait = suggested_wait * 1000; // Convert to ms

    // Use the larger of calculated backoff or suggested wait
    let delay = base.max(max_wait);

    // Add some jitter (10% variation)
    let jitter = delay / 10;
    delay + (clock_jitter() % jitter.max(1))
}

/// Generate a pseudo-random jitter value
fn clock_jitter() -> u64 {
    use std::time::SystemTime;
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64 % 1000)
        .unwrap_or(0)
}

/// Extract retry-after value from error response
fn extract_retry_after(body: &str) -> Option<u64> {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(retry_after) = json.get("retry_after").and_then(|v| v.as_u64()) {
            return Some(retry_after);
        }
        if let Some(error) = json.get("error")
            && let Some(retry_after) = error.get("retry_after").and_then(|v| v.as_u64())
        {
            return Some(retry_after);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> LlmConfig {
        LlmConfig {
            api_key: None,
            model: "test/model".to_string(),
            base_url: None,
            temperature: 0.7,
            max_tokens: 1024,
            timeout_secs: 30,
        }
    }

    #[test]
    fn test_client_builder() {
        let client = HttpCompletionClient::builder()
            .config(test_config())
            .api_key("test-key")
            .base_url("https://example.com")
            .timeout_secs(60)
            .build()
            .unwrap();

        assert_eq!(client.model(), "test/model");
        assert_eq!(client.base_url, "https://example.com");
    }

    #[test]
    fn test_client_builder_requires_api_key() {
        let result = HttpCompletionClient::builder().config(test_config()).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_client_defaults_base_url() {
        let client = HttpCompletionClient::new(test_config(), "test-key").unwrap();
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_client_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HttpCompletionClient>();
    }

    #[test]
    fn test_calculate_backoff() {
        let backoff1 = calculate_backoff(1, 0);
        assert!(backoff1 >= BACKOFF_BASE_MS);

        let backoff2 = calculate_backoff(2, 0);
        assert!(backoff2 >= BACKOFF_BASE_MS * 2);

        // With suggested wait
        let backoff_with_wait = calculate_backoff(1, 5);
        assert!(backoff_with_wait >= 5000);
    }

    #[test]
    fn test_extract_retry_after() {
        let body = r#"{"retry_after": 30}"#;
        assert_eq!(extract_retry_after(body), Some(30));

        let body = r#"{"error": {"retry_after": 60}}"#;
        assert_eq!(extract_retry_after(body), Some(60));

        let body = r#"{"message": "rate limited"}"#;
        assert_eq!(extract_retry_after(body), None);
    }
}
