//! Ollama generation provider.
//!
//! Uses the non-streaming chat endpoint (`POST /api/chat`) so the system
//! instruction and the user turn travel as separate messages.

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use crate::types::DEFAULT_OLLAMA_URL;
use grounded_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<SamplingOptions>,
}

#[derive(Debug, Serialize, PartialEq)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize, PartialEq)]
struct SamplingOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    message: ReplyMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: String,
}

/// Ollama chat client.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl OllamaClient {
    /// Client for the default local endpoint, without a request timeout.
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            client: reqwest::Client::new(),
            timeout: None,
        }
    }

    /// Client for `base_url` whose requests fail after `timeout`.
    pub fn with_options(base_url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            timeout: Some(timeout),
        })
    }

    fn chat_request<'a>(request: &'a LlmRequest) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let options = (request.temperature.is_some() || request.max_tokens.is_some()).then(|| {
            SamplingOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            }
        });

        ChatRequest {
            model: &request.model,
            messages,
            stream: false,
            options,
        }
    }

    fn send_error(&self, error: reqwest::Error) -> AppError {
        match self.timeout {
            Some(timeout) if error.is_timeout() => AppError::Llm(format!(
                "Ollama did not answer within {}s",
                timeout.as_secs_f64()
            )),
            _ if error.is_connect() => AppError::Llm(format!(
                "Cannot reach Ollama at {}: {}",
                self.base_url, error
            )),
            _ => AppError::Llm(format!("Request to Ollama failed: {}", error)),
        }
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ChatResponse> for LlmResponse {
    fn from(response: ChatResponse) -> Self {
        LlmResponse {
            content: response.message.content,
            model: response.model,
            usage: LlmUsage::new(
                response.prompt_eval_count.unwrap_or(0),
                response.eval_count.unwrap_or(0),
            ),
            finish_reason: response.done_reason,
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::debug!(prompt_chars = request.prompt.len(), "Sending chat request to Ollama");

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&Self::chat_request(request))
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Llm(format!(
                "Ollama returned {} for model '{}': {}",
                status,
                request.model,
                body.trim()
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Malformed Ollama chat response: {}", e)))?;

        let response = LlmResponse::from(chat);
        if response.is_truncated() {
            tracing::warn!("Generation stopped at the token limit");
        }
        tracing::debug!(tokens = response.usage.total(), "Received chat reply from Ollama");

        Ok(response)
    }
}
