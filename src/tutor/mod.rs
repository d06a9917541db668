//! Conversation partner backends.
//!
//! Everything that turns a history plus a level into a [`TutorResponse`]
//! lives here. Two implementations of the [`Tutor`] trait exist: an
//! in-process [`TutorService`] that talks to a chat-completion backend
//! directly, and a [`RemoteTutor`] that forwards to a proxy speaking the
//! `/api/chat` contract. The proxy itself is in [`server`].

mod backend;
mod client;
mod prompt;
mod repair;
mod protocol;
mod service;
pub mod server;

pub use backend::{CompletionBackend, OpenAiBackend};
pub use client::RemoteTutor;
pub use prompt::system_prompt;
pub use repair::parse_reply;
pub use protocol::{ChatMessage, ChatRequest, ErrorBody, TutorResponse};
pub use service::TutorService;

use async_trait::async_trait;

use crate::error::Result;
use crate::level::Level;
use crate::message::Message;

/// A conversation partner that replies in Russian with teaching annotations.
#[async_trait]
pub trait Tutor: Send + Sync {
    /// Produce the next reply for the given history at the given level.
    ///
    /// The history is the full conversation so far, oldest first. An empty
    /// history asks for an opening line.
    async fn reply(&self, history: &[Message], level: Level) -> Result<TutorResponse>;
}
