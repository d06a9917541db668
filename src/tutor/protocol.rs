//! Wire types for the tutor proxy contract.
//!
//! The client POSTs `ChatRequest` to `/api/chat`; the proxy answers with a
//! `TutorResponse` on success or a non-2xx status with an `ErrorBody`.

use serde::{Deserialize, Serialize};

use crate::level::Level;
use crate::message::{Message, Role};

/// One history entry as sent over the wire: role and content only, the
/// assistant annotations (feedback, transliteration) stay client-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl From<&Message> for ChatMessage {
    fn from(msg: &Message) -> Self {
        Self { role: msg.role, content: msg.content.clone() }
    }
}

/// Request body for `POST /api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(rename = "userLevel")]
    pub user_level: Level,
}

impl ChatRequest {
    /// Build a request from the conversation log and the current level.
    pub fn from_history(history: &[Message], level: Level) -> Self {
        Self { messages: history.iter().map(ChatMessage::from).collect(), user_level: level }
    }
}

/// The tutor's structured reply.
///
/// Produced exactly once per backend call and always well-formed: the repair
/// step guarantees `russian` is populated even when the backend violated the
/// schema (the other fields degrade to `None`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TutorResponse {
    pub russian: String,
    pub english_feedback: Option<String>,
    pub transliteration: Option<String>,
    pub topic_alignment: Option<String>,
}

/// Error body returned by the proxy with a non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
