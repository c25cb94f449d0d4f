//! HTTP implementation of the inference client port.
//!
//! Talks to a chat-completions style endpoint. Failures are classified
//! so the retry engine only re-attempts what is actually transient:
//! 429 and 5xx retry, other 4xx fail fast.

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{ChatMessage, ChatOptions, ChatResponse, ChatUsage, InferenceClient};

/// Configuration for the HTTP inference client.
#[derive(Debug, Clone)]
pub struct HttpInferenceConfig {
    pub base_url: String,
    pub api_key: String,
    /// Model used when a call does not name one.
    pub default_model: String,
    pub timeout_secs: u64,
}

pub struct HttpInferenceClient {
    http_client: ReqwestClient,
    config: HttpInferenceConfig,
}

impl HttpInferenceClient {
    pub fn new(config: HttpInferenceConfig) -> DomainResult<Self> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| DomainError::Transient(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http_client,
            config,
        })
    }

    fn classify_status(status: StatusCode, body: String) -> DomainError {
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            DomainError::Transient(format!("inference endpoint returned {status}: {body}"))
        } else {
            DomainError::InvalidInput(format!("inference request rejected ({status}): {body}"))
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<bool>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    message: String,
    model: String,
    #[serde(default)]
    usage: CompletionUsage,
}

#[derive(Deserialize, Default)]
struct CompletionUsage {
    total_tokens: u64,
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: ChatOptions,
    ) -> DomainResult<ChatResponse> {
        let model = options
            .model
            .as_deref()
            .unwrap_or(&self.config.default_model);
        let request = CompletionRequest {
            model,
            messages,
            max_tokens: options.max_tokens,
            reasoning: options.reasoning,
        };

        let response = self
            .http_client
            .post(format!("{}/v1/chat", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| DomainError::Transient(format!("inference request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, body));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| DomainError::Serialization(e.to_string()))?;

        Ok(ChatResponse {
            message: parsed.message,
            usage: ChatUsage {
                total_tokens: parsed.usage.total_tokens,
            },
            model: parsed.model,
        })
    }
}
