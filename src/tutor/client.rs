//! Client for a remote tutor proxy.

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, Result};
use crate::level::Level;
use crate::message::Message;

use super::protocol::{ChatRequest, ErrorBody, TutorResponse};
use super::Tutor;

/// Tutor that forwards every exchange to a proxy speaking the `/api/chat`
/// contract (for example one started with the `serve` subcommand). The
/// backend credential stays on the proxy side; this client needs none.
pub struct RemoteTutor {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteTutor {
    pub fn new(base_url: String) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.trim_end_matches('/').to_string() }
    }
}

#[async_trait]
impl Tutor for RemoteTutor {
    async fn reply(&self, history: &[Message], level: Level) -> Result<TutorResponse> {
        let request = ChatRequest::from_history(history, level);
        debug!("POST {}/api/chat ({} messages, level {level})", self.base_url, request.messages.len());

        let response =
            self.client.post(format!("{}/api/chat", self.base_url)).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ErrorBody>(&body) {
                Ok(ErrorBody { error, details: Some(details) }) => format!("{error}: {details}"),
                Ok(ErrorBody { error, details: None }) => error,
                Err(_) => body,
            };
            return Err(Error::Tutor(format!("tutor proxy returned {status}: {message}")));
        }

        Ok(response.json().await?)
    }
}
