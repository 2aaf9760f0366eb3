//! LLM answer generation.
//!
//! [`LlmClient`] is the single capability the service needs from a language
//! model: `generate(system_prompt, user_message) -> text`. Two HTTP backends
//! are provided, OpenAI chat completions and Ollama `/api/chat`. Both use a
//! bounded request timeout and make one attempt.
//!
//! LLM availability is optional. [`create_client`] returns `None` (with a
//! warning) when the provider is disabled or its credential is missing, and
//! the service answers with a placeholder instead.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::LlmConfig;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Errors surfaced while generating an answer.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Provider unreachable or timed out.
    #[error("LLM provider unavailable: {0}")]
    Unavailable(String),
    /// Provider returned an error response.
    #[error("LLM generation failed: {0}")]
    Failed(String),
    /// Provider response could not be parsed.
    #[error("Malformed LLM response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;
    /// Produce a completion for a system instruction plus one user message.
    async fn generate(&self, system_prompt: &str, user_message: &str) -> Result<String, LlmError>;
}

/// Build the configured LLM client, or `None` when answers are disabled.
///
/// A configured provider whose credential is missing is downgraded to `None`
/// with a warning; queries keep working and answer with a placeholder.
pub fn create_client(config: &LlmConfig) -> Option<Arc<dyn LlmClient>> {
    let model = config.model.clone().unwrap_or_default();
    let timeout = Duration::from_secs(config.timeout_secs);

    match config.provider.as_str() {
        "openai" => match std::env::var("OPENAI_API_KEY") {
            Ok(api_key) if !api_key.trim().is_empty() => {
                let url = config
                    .url
                    .clone()
                    .unwrap_or_else(|| OPENAI_DEFAULT_URL.to_string());
                build_or_warn(OpenAiChatClient::new(
                    url,
                    api_key,
                    model,
                    config.max_tokens,
                    timeout,
                ))
            }
            _ => {
                tracing::warn!(
                    "llm.provider is 'openai' but OPENAI_API_KEY is not set; answers will be placeholders"
                );
                None
            }
        },
        "ollama" => {
            let url = config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string());
            build_or_warn(OllamaChatClient::new(url, model, timeout))
        }
        _ => {
            tracing::info!("LLM generation disabled; answers will be placeholders");
            None
        }
    }
}

fn build_or_warn<C: LlmClient + 'static>(client: Result<C, LlmError>) -> Option<Arc<dyn LlmClient>> {
    match client {
        Ok(c) => {
            tracing::info!(model = c.model_name(), "LLM generation enabled");
            Some(Arc::new(c))
        }
        Err(e) => {
            tracing::warn!(error = %e, "LLM client could not be built; answers will be placeholders");
            None
        }
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("lexicon/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| LlmError::Unavailable(format!("failed to build HTTP client: {e}")))
}

fn send_error(provider: &str, url: &str, err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Unavailable(format!("{provider} request to {url} timed out"))
    } else {
        LlmError::Unavailable(format!("failed to reach {provider} at {url}: {err}"))
    }
}

// ============ OpenAI ============

pub struct OpenAiChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiChatClient {
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url,
            api_key,
            model,
            max_tokens,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmClient for OpenAiChatClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, system_prompt: &str, user_message: &str) -> Result<String, LlmError> {
        let payload = json!({
            "model": self.model,
            "temperature": 0.0,
            "max_tokens": self.max_tokens,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_message },
            ],
        });

        let endpoint = self.endpoint();
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| send_error("OpenAI", &endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Failed(format!("OpenAI returned {status}: {body}")));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("failed to decode OpenAI response: {e}")))?;

        body.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                LlmError::InvalidResponse("missing choices[0].message.content".to_string())
            })
    }
}

// ============ Ollama ============

pub struct OllamaChatClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaChatClient {
    pub fn new(base_url: String, model: String, timeout: Duration) -> Result<Self, LlmError> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmClient for OllamaChatClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, system_prompt: &str, user_message: &str) -> Result<String, LlmError> {
        let payload = json!({
            "model": self.model,
            "stream": false,
            "options": { "temperature": 0.0 },
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_message },
            ],
        });

        let endpoint = self.endpoint();
        let response = self
            .http
            .post(&endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| send_error("Ollama", &endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Failed(format!("Ollama returned {status}: {body}")));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("failed to decode Ollama response: {e}")))?;

        body.pointer("/message/content")
            .and_then(|c| c.as_str())
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| LlmError::InvalidResponse("missing message.content".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn openai_client_returns_first_choice() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .body_contains("\"role\":\"system\"");
                then.status(200).json_body(json!({
                    "choices": [ { "message": { "role": "assistant", "content": "  Paris.  " } } ]
                }));
            })
            .await;

        let client = OpenAiChatClient::new(
            server.base_url(),
            "sk-test".to_string(),
            "gpt-4o-mini".to_string(),
            64,
            Duration::from_secs(5),
        )
        .unwrap();
        let answer = client.generate("system", "question").await.unwrap();

        mock.assert_async().await;
        assert_eq!(answer, "Paris.");
    }

    #[tokio::test]
    async fn openai_client_maps_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(429).body("rate limited");
            })
            .await;

        let client = OpenAiChatClient::new(
            server.base_url(),
            "sk-test".to_string(),
            "gpt-4o-mini".to_string(),
            64,
            Duration::from_secs(5),
        )
        .unwrap();
        let err = client.generate("system", "question").await.unwrap_err();
        assert!(matches!(err, LlmError::Failed(ref m) if m.contains("429")));
    }

    #[tokio::test]
    async fn ollama_client_reads_message_content() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat").body_contains("\"stream\":false");
                then.status(200).json_body(json!({
                    "message": { "role": "assistant", "content": "From the context: 42." },
                    "done": true
                }));
            })
            .await;

        let client = OllamaChatClient::new(
            server.base_url(),
            "llama3".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        let answer = client.generate("system", "question").await.unwrap();
        assert_eq!(answer, "From the context: 42.");
    }

    #[tokio::test]
    async fn ollama_client_rejects_empty_content() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(200).json_body(json!({ "message": { "content": "" } }));
            })
            .await;

        let client = OllamaChatClient::new(
            server.base_url(),
            "llama3".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        let err = client.generate("system", "question").await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }

    #[test]
    fn disabled_provider_yields_no_client() {
        assert!(create_client(&LlmConfig::default()).is_none());
    }
}
