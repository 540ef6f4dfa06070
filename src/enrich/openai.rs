//! OpenAI-compatible chat completions backend.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ChatBackend, EnrichError};

/// Async chat client for `/chat/completions`.
#[derive(Clone)]
pub struct OpenAiChat {
    client: Client,
    endpoint: String,
    model: String,
}

impl OpenAiChat {
    /// Builds a client with bearer auth baked into the default headers.
    pub fn new(api_key: &str, base_url: &str, model: String, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing OpenAI API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing OpenAI model name");
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).context("invalid OpenAI API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build OpenAI HTTP client")?;
        let endpoint = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            model,
        })
    }
}

impl ChatBackend for OpenAiChat {
    async fn complete(&self, system: &str, user: &str) -> Result<String, EnrichError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|err| EnrichError::Transport(err.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EnrichError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|err| EnrichError::Malformed(format!("chat envelope: {err}")))?;
        Ok(parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .unwrap_or_else(|| "{}".to_string()))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_key() {
        let err = OpenAiChat::new(
            " ",
            "https://api.openai.com/v1",
            "gpt-4o-mini".into(),
            Duration::from_secs(1),
        )
        .err()
        .expect("blank key must fail");
        assert!(err.to_string().contains("missing OpenAI API key"));
    }

    #[test]
    fn endpoint_joins_base_url() {
        let chat = OpenAiChat::new(
            "sk-test",
            "http://localhost:8080/v1/",
            "gpt-4o-mini".into(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(chat.endpoint, "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn request_serializes_like_the_chat_api() {
        let body = ChatRequest {
            model: "gpt-4o-mini",
            temperature: 0.0,
            messages: vec![ChatMessage {
                role: "user",
                content: "{}",
            }],
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["temperature"], 0.0);
    }
}
