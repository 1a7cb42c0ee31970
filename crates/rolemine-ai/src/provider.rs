use async_trait::async_trait;
use rolemine_core::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A message in the completion conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Sampling parameters for a completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionParams {
    pub temperature: f32,
    pub max_tokens: usize,
    /// Ask the provider for a JSON-object response when supported.
    pub json_mode: bool,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 1000,
            json_mode: true,
        }
    }
}

/// Raw completion returned by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Completion backend. The single production implementation is
/// [`crate::AzureOpenAiProvider`]; tests inject fakes to exercise the
/// orchestrator without a network.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run one chat completion. Implementations own their timeout and
    /// transient-failure retry policy; an error returned here is final.
    async fn complete(&self, messages: &[ChatMessage], params: &CompletionParams)
        -> Result<LlmResponse>;

    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;
}
