//! Learner proficiency levels and the speech-rate table.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Learner proficiency tier.
///
/// The level controls two things and nothing else: the grammar/topic
/// constraints sent to the generative backend, and the playback rate used
/// for future synthesis. Changing it never rewrites existing messages or
/// already-spoken audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// First steps: present tense, short fixed topics
    #[default]
    Beginner,
    /// Foundation tier: past tense and the common cases
    Foundation,
    /// Higher tier: full tense range, all six cases
    Higher,
}

impl Level {
    /// Speech rate multiplier used when synthesizing replies at this level.
    ///
    /// Slower playback for lower tiers; strictly increasing across tiers.
    pub fn speech_rate(self) -> f32 {
        match self {
            Level::Beginner => 0.75,
            Level::Foundation => 0.90,
            Level::Higher => 1.10,
        }
    }

    /// Wire name of the level (matches the serde representation).
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Beginner => "beginner",
            Level::Foundation => "foundation",
            Level::Higher => "higher",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
