//! LLM Gateway for code generation
//!
//! Sends the conversation window to the model provider and returns the raw
//! reply text. Transport failures, error statuses and envelopes without the
//! expected content path are retried with exponential backoff; the caller
//! only ever sees text or `None`.

use crate::retry::RetryPolicy;
use anyhow::Result;
use async_trait::async_trait;
use autosolve_common::config::{LlmConfig, LlmProvider};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One message of the conversation sent to the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("undecodable response body: {0}")]
    Decode(String),
    #[error("response envelope has no text content")]
    MissingContent,
}

/// Anything that can complete a conversation
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Reply text, or `None` once every retry has been spent
    async fn complete(&self, history: &[Turn]) -> Option<String>;
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<Choice>>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// HTTP gateway speaking either the Gemini or the OpenAI-compatible envelope
pub struct HttpGateway {
    client: Client,
    config: LlmConfig,
    retry: RetryPolicy,
}

impl HttpGateway {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let retry = RetryPolicy::new(config.max_retries, Duration::from_millis(config.base_delay_ms));
        Self::with_retry(config, retry)
    }

    /// Gateway that makes exactly one provider call per `complete`, for
    /// callers that run their own retry loop (the challenge parser)
    pub fn single_attempt(config: LlmConfig) -> Result<Self> {
        let base_delay = Duration::from_millis(config.base_delay_ms);
        Self::with_retry(config, RetryPolicy::new(1, base_delay))
    }

    pub fn with_retry(config: LlmConfig, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        info!(provider = ?config.provider, model = %config.model, "LLM gateway ready");
        Ok(Self {
            client,
            config,
            retry,
        })
    }

    fn endpoint(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        match self.config.provider {
            LlmProvider::Gemini => format!("{}/models/{}:generateContent", base, self.config.model),
            LlmProvider::OpenAi => format!("{}/chat/completions", base),
        }
    }

    fn request_body(&self, history: &[Turn]) -> Value {
        match self.config.provider {
            LlmProvider::Gemini => {
                let contents: Vec<Value> = history
                    .iter()
                    .map(|t| {
                        let role = match t.role {
                            Role::User => "user",
                            Role::Model => "model",
                        };
                        json!({"role": role, "parts": [{"text": t.text}]})
                    })
                    .collect();
                json!({
                    "contents": contents,
                    "generationConfig": {
                        "temperature": self.config.temperature,
                        "maxOutputTokens": self.config.max_output_tokens,
                    }
                })
            }
            LlmProvider::OpenAi => {
                let messages: Vec<Value> = history
                    .iter()
                    .map(|t| {
                        let role = match t.role {
                            Role::User => "user",
                            Role::Model => "assistant",
                        };
                        json!({"role": role, "content": t.text})
                    })
                    .collect();
                json!({
                    "model": self.config.model,
                    "messages": messages,
                    "temperature": self.config.temperature,
                    "max_tokens": self.config.max_output_tokens,
                })
            }
        }
    }

    fn extract_text(&self, body: &str) -> Result<String, GatewayError> {
        let text = match self.config.provider {
            LlmProvider::Gemini => {
                let parsed: GeminiResponse =
                    serde_json::from_str(body).map_err(|e| GatewayError::Decode(e.to_string()))?;
                parsed
                    .candidates
                    .and_then(|c| c.into_iter().next())
                    .and_then(|c| c.content)
                    .and_then(|c| c.parts)
                    .and_then(|p| p.into_iter().next())
                    .and_then(|p| p.text)
            }
            LlmProvider::OpenAi => {
                let parsed: ChatResponse =
                    serde_json::from_str(body).map_err(|e| GatewayError::Decode(e.to_string()))?;
                parsed
                    .choices
                    .and_then(|c| c.into_iter().next())
                    .and_then(|c| c.message)
                    .and_then(|m| m.content)
            }
        };
        text.ok_or(GatewayError::MissingContent)
    }

    async fn call_once(&self, history: &[Turn]) -> Result<String, GatewayError> {
        let mut request = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .json(&self.request_body(history));

        request = match self.config.provider {
            LlmProvider::Gemini => request.header("x-goog-api-key", &self.config.api_key),
            LlmProvider::OpenAi => {
                request.header("Authorization", format!("Bearer {}", self.config.api_key))
            }
        };

        let resp = request.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }
        self.extract_text(&body)
    }
}

#[async_trait]
impl ModelGateway for HttpGateway {
    async fn complete(&self, history: &[Turn]) -> Option<String> {
        for attempt in 1..=self.retry.max_attempts {
            debug!(attempt, turns = history.len(), "Calling model provider");
            match self.call_once(history).await {
                Ok(text) => return Some(text),
                Err(e) => {
                    warn!(attempt, max_attempts = self.retry.max_attempts, error = %e, "Model call failed");
                    if attempt < self.retry.max_attempts {
                        tokio::time::sleep(self.retry.next_delay(attempt)).await;
                    }
                }
            }
        }
        warn!(max_attempts = self.retry.max_attempts, "Model call retries exhausted");
        None
    }
}
