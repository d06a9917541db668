//! In-process tutor: prompt lookup, backend call, reply repair.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::level::Level;
use crate::message::Message;

use super::backend::CompletionBackend;
use super::prompt::system_prompt;
use super::protocol::{ChatRequest, TutorResponse};
use super::repair::parse_reply;
use super::Tutor;

/// Tutor that calls a completion backend directly.
///
/// Every call either yields a well-formed (possibly degraded) response or
/// fails with a transport error; schema violations never surface as errors.
pub struct TutorService {
    backend: Arc<dyn CompletionBackend>,
}

impl TutorService {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// One full exchange: wire-shaped request in, repaired response out.
    /// Shared by the [`Tutor`] impl and the proxy server handler.
    pub async fn build(&self, request: &ChatRequest) -> Result<TutorResponse> {
        let prompt = system_prompt(request.user_level);
        let raw = self.backend.complete(&prompt, &request.messages).await?;
        let reply = parse_reply(&raw);
        debug!("Tutor reply: {}", reply.russian);
        Ok(reply)
    }
}

#[async_trait]
impl Tutor for TutorService {
    async fn reply(&self, history: &[Message], level: Level) -> Result<TutorResponse> {
        self.build(&ChatRequest::from_history(history, level)).await
    }
}
