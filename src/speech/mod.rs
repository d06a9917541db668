//! Speech capabilities: voice discovery, synthesis output, capture input.

mod engine;
mod input;
mod output;
mod playback;
mod recognition;
mod voices;

pub use engine::{
    HttpSynthesis, RecognitionEngine, RecognitionEvent, SynthesisEngine, SynthesisRequest, Voice,
};
pub use input::{InputEvent, SpeechInput};
pub use output::SpeechOutput;
pub use playback::{AudioSink, NullSink, SystemPlayer};
pub use recognition::{ProcessRecognition, Recorder};
pub use voices::{same_family, select_voice, VoiceCatalog};
