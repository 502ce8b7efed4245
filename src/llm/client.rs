//! LLM client trait and the one real provider implementation (spec §2: the
//! LLM is "an opaque text-in/text-out capability"; the core never depends
//! on a particular model or provider).
//!
//! Grounded on the teacher's `AnthropicClient` wire format and its
//! `build_http_client` proxy-auto-detection panic-catch fallback
//! (`client.rs`), narrowed to a single provider and a single capability
//! trait instead of a multi-provider/cost-tracked/smart-routed surface.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

use super::types::{LlmRequest, LlmResponse};

/// The opaque text-in/text-out capability analyzers depend on (spec §2).
/// A cancellation token honors spec §4.7's suspension-point rule ("every
/// LLM call accepts a deadline/cancel token").
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: LlmRequest, cancel: &CancellationToken) -> Result<LlmResponse>;
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            model: "claude-3-5-sonnet-20241022".to_string(),
            timeout_secs: 60,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Some sandboxed environments panic during proxy auto-detection in
/// reqwest's default client builder; fall back to no-proxy in that case.
fn build_http_client(timeout_secs: u64) -> Client {
    let timeout = Duration::from_secs(timeout_secs);
    match catch_unwind(AssertUnwindSafe(|| Client::builder().timeout(timeout).build())) {
        Ok(Ok(client)) => client,
        Ok(Err(_)) | Err(_) => Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client"),
    }
}

pub struct AnthropicClient {
    config: ClientConfig,
    http: Client,
}

impl AnthropicClient {
    const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com";
    const API_VERSION: &'static str = "2023-06-01";

    pub fn new(config: ClientConfig) -> Self {
        let http = build_http_client(config.timeout_secs);
        Self { config, http }
    }

    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(Self::DEFAULT_BASE_URL)
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

/// Maps an Anthropic error body to spec §7's LLM error taxonomy. All three
/// are fatal with no fallback (spec §7 "Exceeding the limit is fatal").
fn classify_error(status: reqwest::StatusCode, error_type: &str, message: &str) -> Error {
    match error_type {
        "invalid_request_error" if message.contains("maximum context length") => {
            Error::LLMContextLengthExceeded(message.to_string())
        }
        "not_found_error" => Error::LLMModelNotFound(message.to_string()),
        _ => Error::LLMAPIError {
            provider: "anthropic".to_string(),
            message: format!("{} ({}): {}", error_type, status, message),
        },
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: LlmRequest, cancel: &CancellationToken) -> Result<LlmResponse> {
        let api_request = AnthropicRequest {
            model: &self.config.model,
            messages: vec![AnthropicMessage {
                role: "user",
                content: &request.prompt,
            }],
            max_tokens: request.max_tokens,
            system: request.system.as_deref(),
            temperature: request.temperature,
        };

        let url = format!("{}/v1/messages", self.base_url());
        let send = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", Self::API_VERSION)
            .header("content-type", "application/json")
            .json(&api_request)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = send => result.map_err(|e| Error::LLMAPIError {
                provider: "anthropic".to_string(),
                message: format!("request failed: {e}"),
            })?,
        };

        let status = response.status();
        let body = response.text().await.map_err(|e| Error::LLMAPIError {
            provider: "anthropic".to_string(),
            message: format!("failed to read response: {e}"),
        })?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<AnthropicError>(&body) {
                return Err(classify_error(status, &err.error.error_type, &err.error.message));
            }
            return Err(Error::LLMAPIError {
                provider: "anthropic".to_string(),
                message: format!("{}: {}", status, body),
            });
        }

        let api_response: AnthropicResponse = serde_json::from_str(&body).map_err(|e| Error::LLMAPIError {
            provider: "anthropic".to_string(),
            message: format!("failed to parse response: {e}"),
        })?;

        let text = api_response
            .content
            .iter()
            .filter_map(|c| c.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        Ok(LlmResponse {
            text,
            input_tokens: api_response.usage.input_tokens,
            output_tokens: api_response.usage.output_tokens,
        })
    }
}

/// Deterministic stand-in for `TEST_MODE=demo` (spec §6.2: "controls
/// LLM-mock substitution"). Never makes a network call.
pub struct MockLlmClient {
    pub fixed_response: String,
}

impl MockLlmClient {
    pub fn new(fixed_response: impl Into<String>) -> Self {
        Self {
            fixed_response: fixed_response.into(),
        }
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new("mock analysis: no anomalies detected")
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: LlmRequest, cancel: &CancellationToken) -> Result<LlmResponse> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(LlmResponse {
            text: self.fixed_response.clone(),
            input_tokens: request.prompt.len() as u64 / 4,
            output_tokens: self.fixed_response.len() as u64 / 4,
        })
    }
}
