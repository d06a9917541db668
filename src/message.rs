//! Conversation messages.
//!
//! The message log is an append-only sequence owned by the conversation
//! controller; insertion order is conversation order and entries are never
//! mutated or deleted in-session.

use serde::{Deserialize, Serialize};

use crate::tutor::TutorResponse;

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One entry of the conversation log.
///
/// `content` carries the Russian text for both roles. The optional fields
/// only ever appear on assistant messages and come straight from the tutor
/// response; they are kept on the message so the log is self-contained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transliteration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

impl Message {
    /// Build a user message from raw input text.
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), feedback: None, transliteration: None, topic: None }
    }

    /// Build an assistant message from a repaired tutor response.
    pub fn assistant(reply: &TutorResponse) -> Self {
        Self {
            role: Role::Assistant,
            content: reply.russian.clone(),
            feedback: reply.english_feedback.clone(),
            transliteration: reply.transliteration.clone(),
            topic: reply.topic_alignment.clone(),
        }
    }
}
