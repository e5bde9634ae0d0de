//! Completion backend abstraction
//!
//! Provides a unified interface to OpenAI-compatible chat-completion
//! services:
//! - OpenRouter (the production path for all three pipeline stages)
//! - Mock backend for tests and offline development
//!
//! One backend instance serves every stage; the model and sampling
//! parameters travel with each call.

use crate::config::CompletionConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-stage generation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Model identifier sent to the backend
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Output token cap; None leaves the backend default
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.2
}

/// Trait for text completion
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Complete a single prompt, returning the model's raw text
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String>;

    /// Backend name for logs
    fn name(&self) -> &str;
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageBody,
}

#[derive(Deserialize)]
struct ChatMessageBody {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// OpenRouter chat-completion client (OpenAI-compatible wire format)
pub struct OpenRouterBackend {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl OpenRouterBackend {
    /// Create a new backend client
    pub fn new(api_key: String, api_base: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_base,
            api_key,
        })
    }

    async fn request(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_base);

        // Each template already carries its full instructions, so the
        // prompt goes out as a single user message.
        let request = ChatRequest {
            model: params.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: params.temperature,
            max_tokens: params.max_output_tokens,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::BackendUnavailable {
                        message: format!("Request timed out: {}", e),
                    }
                } else {
                    AppError::BackendUnavailable {
                        message: format!("Request failed: {}", e),
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::BackendUnavailable {
                message: format!("API error {}: {}", status, body),
            });
        }

        let chat_response: ChatResponse =
            response.json().await.map_err(|e| AppError::BackendUnavailable {
                message: format!("Failed to parse response: {}", e),
            })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AppError::BackendUnavailable {
                message: "Empty response from model".to_string(),
            })
    }
}

#[async_trait]
impl CompletionBackend for OpenRouterBackend {
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let started = Instant::now();
        let result = self.request(prompt, params).await;

        crate::metrics::record_backend(
            started.elapsed().as_secs_f64(),
            &params.model,
            result.is_ok(),
        );

        if let Err(ref err) = result {
            tracing::warn!(
                model = %params.model,
                error = %err,
                "Completion request failed"
            );
        }

        result
    }

    fn name(&self) -> &str {
        "openrouter"
    }
}

/// Mock backend for testing
pub struct MockBackend {
    reply: String,
}

impl MockBackend {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new("The provided documents do not contain sufficient information about this topic.")
    }
}

#[async_trait]
impl CompletionBackend for MockBackend {
    async fn complete(&self, _prompt: &str, _params: &GenerationParams) -> Result<String> {
        Ok(self.reply.clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Create a completion backend based on configuration
pub fn create_backend(config: &CompletionConfig) -> Result<Arc<dyn CompletionBackend>> {
    match config.provider.as_str() {
        "openrouter" => {
            let api_key = config.resolve_api_key().ok_or_else(|| AppError::Configuration {
                message: "Completion API key not set (completion.api_key or OPENROUTER_API_KEY)"
                    .to_string(),
            })?;

            Ok(Arc::new(OpenRouterBackend::new(
                api_key,
                config.api_base.clone(),
                config.timeout(),
            )?))
        }
        "mock" => Ok(Arc::new(MockBackend::default())),
        other => {
            tracing::warn!(provider = other, "Unknown completion provider, using mock");
            Ok(Arc::new(MockBackend::default()))
        }
    }
}
