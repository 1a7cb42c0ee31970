use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rolemine_core::{LlmConfig, Result, RoleMineError};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::provider::{ChatMessage, CompletionParams, LlmProvider, LlmResponse};

/// Configuration for the Azure OpenAI chat-completions provider.
#[derive(Debug, Clone)]
pub struct AzureOpenAiConfig {
    /// Resource endpoint, e.g. "https://myresource.openai.azure.com".
    pub endpoint: String,
    /// Deployment name (e.g. "gpt-4o").
    pub deployment: String,
    pub api_version: String,
    pub api_key: String,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum retries for transient failures.
    pub max_retries: u32,
}

impl AzureOpenAiConfig {
    pub fn from_settings(llm: &LlmConfig) -> Result<Self> {
        let api_key = llm
            .api_key
            .as_ref()
            .map(|k| k.expose_secret().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                RoleMineError::InvalidOperation(
                    "LLM API key is not configured; set ROLEMINE__LLM__API_KEY".to_string(),
                )
            })?;
        if llm.endpoint.trim().is_empty() {
            return Err(RoleMineError::InvalidOperation(
                "LLM endpoint is not configured; set ROLEMINE__LLM__ENDPOINT".to_string(),
            ));
        }
        Ok(Self {
            endpoint: llm.endpoint.trim_end_matches('/').to_string(),
            deployment: llm.deployment.clone(),
            api_version: llm.api_version.clone(),
            api_key,
            timeout_secs: llm.timeout_secs,
            max_retries: llm.max_retries,
        })
    }
}

enum RequestError {
    /// Transport failure, timeout, 429 or 5xx. Worth another attempt.
    Transient(String),
    /// Anything else; retrying will not help.
    Permanent(String),
}

impl RequestError {
    fn message(self) -> String {
        match self {
            RequestError::Transient(m) | RequestError::Permanent(m) => m,
        }
    }
}

/// Azure OpenAI chat-completions provider with per-call timeout and
/// bounded exponential-backoff retry on transient failures.
pub struct AzureOpenAiProvider {
    config: AzureOpenAiConfig,
    client: Client,
}

impl AzureOpenAiProvider {
    pub fn new(config: AzureOpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RoleMineError::Llm(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.config.endpoint, self.config.deployment, self.config.api_version
        )
    }

    /// Send a request with retry. Backoff doubles per attempt: 1s, 2s, 4s.
    async fn send_request(
        &self,
        messages: &[ChatMessage],
        params: &CompletionParams,
    ) -> Result<ChatCompletionsResponse> {
        let mut last_error: Option<String> = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(2u64.pow(attempt - 1));
                tokio::time::sleep(delay).await;
            }

            match self.try_request(messages, params).await {
                Ok(response) => return Ok(response),
                Err(RequestError::Permanent(msg)) => {
                    return Err(RoleMineError::Llm(msg));
                }
                Err(RequestError::Transient(msg)) => {
                    if attempt < self.config.max_retries {
                        tracing::warn!(
                            "Azure OpenAI request failed (attempt {}/{}), retrying: {}",
                            attempt + 1,
                            self.config.max_retries + 1,
                            msg
                        );
                    }
                    last_error = Some(msg);
                }
            }
        }

        Err(RoleMineError::RetryExhausted(
            last_error.unwrap_or_else(|| "all retry attempts failed".to_string()),
        ))
    }

    async fn try_request(
        &self,
        messages: &[ChatMessage],
        params: &CompletionParams,
    ) -> std::result::Result<ChatCompletionsResponse, RequestError> {
        let request = ChatCompletionsRequest {
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            response_format: params
                .json_mode
                .then(|| ResponseFormat { format_type: "json_object".to_string() }),
        };

        let response = self
            .client
            .post(self.completions_url())
            .header("api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                // Connect errors and timeouts are transient.
                RequestError::Transient(format!("request to Azure OpenAI failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            let msg = format!("Azure OpenAI API error ({}): {}", status, body);
            return if status.as_u16() == 429 || status.is_server_error() {
                Err(RequestError::Transient(msg))
            } else {
                Err(RequestError::Permanent(msg))
            };
        }

        response
            .json::<ChatCompletionsResponse>()
            .await
            .map_err(|e| {
                RequestError::Transient(format!("failed to decode Azure OpenAI response: {}", e))
            })
    }
}

#[async_trait]
impl LlmProvider for AzureOpenAiProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &CompletionParams,
    ) -> Result<LlmResponse> {
        let response = self.send_request(messages, params).await?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RoleMineError::Llm("no choices in completion response".to_string()))?;

        Ok(LlmResponse {
            content: choice.message.content,
            model: response.model.unwrap_or_else(|| self.config.deployment.clone()),
            total_tokens: response.usage.map(|u| u.total_tokens),
            finish_reason: choice.finish_reason,
        })
    }

    fn provider_name(&self) -> &str {
        "azure-openai"
    }

    fn model_name(&self) -> &str {
        &self.config.deployment
    }
}

// Wire types for the Azure OpenAI chat-completions API.

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest {
    messages: Vec<WireMessage>,
    temperature: f32,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolemine_core::LlmConfig;
    use secrecy::SecretString;

    #[test]
    fn config_requires_key_and_endpoint() {
        let mut llm = LlmConfig::default();
        assert!(AzureOpenAiConfig::from_settings(&llm).is_err());

        llm.api_key = Some(SecretString::from("secret"));
        assert!(AzureOpenAiConfig::from_settings(&llm).is_err());

        llm.endpoint = "https://myresource.openai.azure.com/".to_string();
        let config = AzureOpenAiConfig::from_settings(&llm).unwrap();
        assert_eq!(config.endpoint, "https://myresource.openai.azure.com");
        assert_eq!(config.deployment, "gpt-4o");
    }

    #[test]
    fn completions_url_embeds_deployment_and_version() {
        let provider = AzureOpenAiProvider::new(AzureOpenAiConfig {
            endpoint: "https://r.openai.azure.com".to_string(),
            deployment: "gpt-4o".to_string(),
            api_version: "2024-02-01".to_string(),
            api_key: "k".to_string(),
            timeout_secs: 5,
            max_retries: 0,
        })
        .unwrap();
        assert_eq!(
            provider.completions_url(),
            "https://r.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-02-01"
        );
    }

    use crate::provider::MessageRole;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const COMPLETION_BODY: &str = r#"{"model":"gpt-4o","choices":[{"message":{"role":"assistant","content":"ok"},"finish_reason":"stop"}],"usage":{"total_tokens":12}}"#;

    /// Minimal HTTP endpoint that answers each accepted connection with
    /// the next scripted (status, body) pair, counting requests served.
    async fn scripted_endpoint(
        responses: Vec<(u16, &'static str)>,
    ) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        let served = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&served);
        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                read_request(&mut socket).await;
                let reply = format!(
                    "HTTP/1.1 {} scripted\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        (endpoint, served)
    }

    /// Drain the incoming request (headers plus Content-Length body) so
    /// the client never sees a reset before the scripted reply.
    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let Ok(n) = socket.read(&mut chunk).await else {
                return;
            };
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..pos]).to_ascii_lowercase();
                let body_len = headers
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() - pos - 4 >= body_len {
                    return;
                }
            }
        }
    }

    fn provider_for(endpoint: &str, max_retries: u32) -> AzureOpenAiProvider {
        AzureOpenAiProvider::new(AzureOpenAiConfig {
            endpoint: endpoint.to_string(),
            deployment: "gpt-4o".to_string(),
            api_version: "2024-02-01".to_string(),
            api_key: "k".to_string(),
            timeout_secs: 5,
            max_retries,
        })
        .unwrap()
    }

    fn chat_messages() -> Vec<ChatMessage> {
        vec![
            ChatMessage {
                role: MessageRole::System,
                content: "system".to_string(),
            },
            ChatMessage {
                role: MessageRole::User,
                content: "user".to_string(),
            },
        ]
    }

    #[tokio::test]
    async fn transient_server_error_is_retried_until_success() {
        let (endpoint, served) = scripted_endpoint(vec![
            (500, r#"{"error":"overloaded"}"#),
            (200, COMPLETION_BODY),
        ])
        .await;
        let provider = provider_for(&endpoint, 2);

        let response = provider
            .complete(&chat_messages(), &CompletionParams::default())
            .await
            .unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(response.total_tokens, Some(12));
        assert_eq!(served.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn client_error_is_permanent_and_not_retried() {
        // Extra scripted replies would absorb any bogus retry; the
        // counter proves none happened.
        let (endpoint, served) = scripted_endpoint(vec![
            (400, r#"{"error":"bad request"}"#),
            (400, r#"{"error":"bad request"}"#),
        ])
        .await;
        let provider = provider_for(&endpoint, 3);

        let err = provider
            .complete(&chat_messages(), &CompletionParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RoleMineError::Llm(_)));
        assert_eq!(served.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_transient_retries_surface_retry_exhausted() {
        let (endpoint, served) = scripted_endpoint(vec![
            (503, r#"{"error":"unavailable"}"#),
            (503, r#"{"error":"unavailable"}"#),
        ])
        .await;
        let provider = provider_for(&endpoint, 1);

        let err = provider
            .complete(&chat_messages(), &CompletionParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RoleMineError::RetryExhausted(_)));
        assert_eq!(served.load(Ordering::SeqCst), 2);
    }
}
