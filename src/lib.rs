//! Voice-enabled Russian conversation practice.
//!
//! A learner speaks or types Russian, gets a level-adapted reply with
//! corrective feedback from a generative backend, and hears the reply
//! synthesized aloud. The pieces:
//!
//! - [`speech`]: voice discovery and selection, synthesis output with
//!   last-call-wins cancellation, microphone capture with auto-send
//! - [`conversation`]: the message log, level state and send pipeline
//! - [`tutor`]: level prompts, backend calls, reply repair, and the
//!   `/api/chat` proxy (server and client)

pub mod config;
pub mod conversation;
pub mod error;
pub mod level;
pub mod message;
pub mod speech;
pub mod tutor;

pub use error::{Error, Result};
