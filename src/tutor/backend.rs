//! Chat-completion backend client.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::{Error, Result};

use super::protocol::ChatMessage;

/// A generative backend that completes a chat into raw reply text.
///
/// The text comes back untouched; schema enforcement happens one layer up
/// in the repair step.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, system: &str, history: &[ChatMessage]) -> Result<String>;
}

/// Backend speaking the OpenAI-compatible `/chat/completions` protocol.
/// Works against OpenAI itself, Ollama, or any compatible server.
pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

impl OpenAiBackend {
    pub fn new(base_url: String, model: String, api_key: Option<String>, temperature: f32) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
            temperature,
        }
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: String,
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, system: &str, history: &[ChatMessage]) -> Result<String> {
        let mut messages = vec![json!({"role": "system", "content": system})];
        for msg in history {
            messages.push(json!({"role": msg.role, "content": msg.content}));
        }

        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
        });

        debug!("Requesting completion from {} ({} messages)", self.base_url, history.len());

        let mut request = self.client.post(format!("{}/chat/completions", self.base_url)).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tutor(format!("backend returned {status}: {body}")));
        }

        let completion: CompletionResponse = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| Error::Tutor("backend returned no choices".to_string()))?;

        debug!("Backend replied with {} chars", content.len());
        Ok(content)
    }
}
