//! Speech service clients.
//!
//! Synthesis and recognition are consumed as remote capabilities over an
//! OpenAI-style speech API (`/v1/audio/speech`, `/v1/audio/transcriptions`,
//! plus a `/v1/audio/voices` inventory endpoint). The traits here are the
//! seam the controllers are written against; tests substitute scripted
//! engines behind them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// One synthesis voice offered by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    /// BCP 47 language tag, e.g. `ru-RU`.
    #[serde(alias = "language")]
    pub lang: String,
}

impl Voice {
    pub fn new(name: &str, lang: &str) -> Self {
        Self { name: name.to_string(), lang: lang.to_string() }
    }
}

/// Everything one utterance needs.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: String,
    pub lang: String,
    pub rate: f32,
    pub pitch: f32,
}

/// Events produced by a recognition engine during a capture session.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    /// Capture started (`true`) or ended (`false`), whether ended manually
    /// or by silence detection.
    Listening(bool),
    /// Transcript produced so far. A process-based engine emits exactly one
    /// of these per session, after capture has ended.
    Transcript(String),
    /// Non-fatal failure inside the session.
    Error(String),
}

/// Turns text into audio and reports the available voices.
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    async fn voices(&self) -> Result<Vec<Voice>>;
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>>;
}

/// Controls a capture session. Events arrive on the channel handed out by
/// the engine's constructor, not through this trait.
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    /// Begin a capture session in the given language. No-op if one is
    /// already running.
    async fn start(&self, lang: &str) -> Result<()>;
    /// End the running session, if any. The session still emits its
    /// `Listening(false)` and any transcript it managed to capture.
    async fn stop(&self);
}

/// Synthesis over the HTTP speech service.
pub struct HttpSynthesis {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpSynthesis {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {key}")),
            None => request,
        }
    }
}

#[derive(Deserialize)]
struct VoicesResponse {
    voices: Vec<Voice>,
}

#[async_trait]
impl SynthesisEngine for HttpSynthesis {
    async fn voices(&self) -> Result<Vec<Voice>> {
        let request = self.authorize(self.client.get(format!("{}/v1/audio/voices", self.base_url)));
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!("voice listing returned {status}: {body}")));
        }

        let listing: VoicesResponse = response.json().await?;
        debug!("Speech service offers {} voices", listing.voices.len());
        Ok(listing.voices)
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        struct SpeechRequest<'a> {
            input: &'a str,
            voice: &'a str,
            language: &'a str,
            speed: f32,
            pitch: f32,
        }

        let body = SpeechRequest {
            input: &request.text,
            voice: &request.voice,
            language: &request.lang,
            speed: request.rate,
            pitch: request.pitch,
        };

        let http = self
            .authorize(self.client.post(format!("{}/v1/audio/speech", self.base_url)))
            .json(&body);
        let response = http.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!("synthesis returned {status}: {body}")));
        }

        let audio = response.bytes().await?;
        debug!("Synthesized {} bytes for {} chars", audio.len(), request.text.chars().count());
        Ok(audio.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_accepts_language_alias() {
        let voice: Voice =
            serde_json::from_str(r#"{"name":"Milena","language":"ru-RU"}"#).unwrap();
        assert_eq!(voice.lang, "ru-RU");
    }
}
