//! Speech output controller.
//!
//! Owns the single active utterance. `speak` cancels whatever is in flight
//! before queueing the new text (last call wins, no queueing up of
//! replies), `stop` cancels without a replacement. A dedicated playback
//! task does the synthesis call and drives the sink, so overlap is
//! impossible by construction. Synthesis and playback failures are logged
//! and absorbed; they never stall the conversation.

use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::engine::{SynthesisEngine, SynthesisRequest, Voice};
use super::playback::AudioSink;

struct Utterance {
    text: String,
    rate: f32,
    token: CancellationToken,
}

/// Handle to the playback task.
pub struct SpeechOutput {
    utterance_tx: mpsc::Sender<Utterance>,
    current: Mutex<CancellationToken>,
    speaking: watch::Receiver<bool>,
    voice: watch::Receiver<Option<Voice>>,
}

impl SpeechOutput {
    /// Start the playback task. The voice receiver comes from the
    /// [`VoiceCatalog`]; this controller only ever reads it.
    ///
    /// [`VoiceCatalog`]: super::voices::VoiceCatalog
    pub fn spawn(
        engine: Arc<dyn SynthesisEngine>,
        sink: Arc<dyn AudioSink>,
        voice: watch::Receiver<Option<Voice>>,
        lang: &str,
        pitch: f32,
    ) -> Self {
        let (utterance_tx, utterance_rx) = mpsc::channel(4);
        let (speaking_tx, speaking_rx) = watch::channel(false);

        tokio::spawn(run_playback(
            engine,
            sink,
            utterance_rx,
            voice.clone(),
            speaking_tx,
            lang.to_string(),
            pitch,
        ));

        Self {
            utterance_tx,
            current: Mutex::new(CancellationToken::new()),
            speaking: speaking_rx,
            voice,
        }
    }

    /// Queue one utterance, cancelling any in-flight one first.
    ///
    /// No-op when no voice is selected; the condition is logged rather
    /// than letting a default voice mangle the Russian.
    pub fn speak(&self, text: &str, rate: f32) {
        if text.trim().is_empty() {
            return;
        }
        if self.voice.borrow().is_none() {
            warn!("No voice selected, reply will not be spoken");
            return;
        }

        let token = CancellationToken::new();
        let previous = mem::replace(&mut *self.current.lock(), token.clone());
        previous.cancel();

        let utterance = Utterance { text: text.to_string(), rate, token };
        if self.utterance_tx.try_send(utterance).is_err() {
            warn!("Playback task not accepting utterances");
        }
    }

    /// Cancel the in-flight utterance, if any.
    pub fn stop(&self) {
        self.current.lock().cancel();
    }

    /// Speaking state, `true` while an utterance is being produced.
    pub fn speaking(&self) -> watch::Receiver<bool> {
        self.speaking.clone()
    }
}

async fn run_playback(
    engine: Arc<dyn SynthesisEngine>,
    sink: Arc<dyn AudioSink>,
    mut utterances: mpsc::Receiver<Utterance>,
    voice: watch::Receiver<Option<Voice>>,
    speaking: watch::Sender<bool>,
    lang: String,
    pitch: f32,
) {
    while let Some(utterance) = utterances.recv().await {
        // Superseded while queued.
        if utterance.token.is_cancelled() {
            continue;
        }
        let Some(chosen) = voice.borrow().clone() else {
            debug!("Voice no longer available, dropping utterance");
            continue;
        };

        let request = SynthesisRequest {
            text: utterance.text,
            voice: chosen.name,
            lang: lang.clone(),
            rate: utterance.rate,
            pitch,
        };

        speaking.send_replace(true);
        debug!("🔊 Speaking at rate {:.2}: {}", request.rate, request.text);

        tokio::select! {
            () = utterance.token.cancelled() => {
                debug!("Utterance cancelled during synthesis");
            }
            synthesized = engine.synthesize(&request) => match synthesized {
                Ok(audio) => {
                    if let Err(err) = sink.play(&audio, &utterance.token).await {
                        warn!("Playback failed: {err}");
                    }
                }
                Err(err) => warn!("Synthesis failed: {err}"),
            }
        }

        speaking.send_replace(false);
    }
}
