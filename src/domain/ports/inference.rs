//! Inference client port.
//!
//! The substrate consumes inference as an external collaborator: model
//! ids are opaque strings, calls may suspend, and transient failures
//! propagate as retriable errors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;

/// Role of a chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message in a chat exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatOptions {
    /// Opaque model id; the caller's tier decides what it may request.
    pub model: Option<String>,
    /// Extended reasoning toggle, where the backing model supports it.
    pub reasoning: Option<bool>,
    pub max_tokens: Option<u32>,
}

/// Token accounting for one call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ChatUsage {
    pub total_tokens: u64,
}

/// Result of one chat call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: String,
    pub usage: ChatUsage,
    /// Model that actually served the call.
    pub model: String,
}

/// External inference collaborator.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: ChatOptions,
    ) -> DomainResult<ChatResponse>;
}
