use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::stream::StreamEvent;

/// A single message in the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Function tool offered to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A tool call extracted from the model response. `arguments` is the raw
/// JSON string the model produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: String,
}

/// Request to an LLM provider.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    /// Prepended as the `system` message.
    pub system: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub stream: bool,
    /// Tools to expose. Empty for plain chat.
    pub tools: Vec<ToolDefinition>,
    /// Force a call to the named tool.
    pub tool_choice: Option<String>,
}

/// Response from an LLM provider (non-streaming).
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub stop_reason: String,
    /// Tool calls requested by the model. Empty when no tools were called.
    pub tool_calls: Vec<ToolCall>,
}

/// Common interface for the upstream gateway and the scripted fallback.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging and error messages.
    fn name(&self) -> &str;

    /// Send a non-streaming chat request, wait for full response.
    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Stream response events through a channel.
    ///
    /// An `Err` return means the request failed before streaming began;
    /// failures after that arrive as a terminal `StreamEvent::Error`.
    /// Default: falls back to non-streaming send, emits one delta + Done.
    async fn send_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let resp = self.send(req).await?;
        if !resp.content.is_empty() {
            let _ = tx.send(StreamEvent::TextDelta { text: resp.content }).await;
        }
        let _ = tx.send(StreamEvent::Done).await;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Upstream credits exhausted")]
    CreditsRequired,

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

impl From<ProviderError> for simplificator_core::SimplificatorError {
    fn from(err: ProviderError) -> Self {
        use simplificator_core::SimplificatorError;
        match err {
            ProviderError::RateLimited { retry_after_ms } => {
                SimplificatorError::RateLimited { retry_after_ms }
            }
            ProviderError::CreditsRequired => SimplificatorError::CreditsRequired,
            ProviderError::Parse(msg) => SimplificatorError::Upstream(format!("parse: {msg}")),
            other => SimplificatorError::Upstream(other.to_string()),
        }
    }
}
