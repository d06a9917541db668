//! Speech capture through a system recorder process.
//!
//! A capture session records the microphone with `rec`/`sox` (silence
//! endpointing built in) or `arecord` (fixed duration cap), then sends the
//! WAV to the speech service's `/v1/audio/transcriptions` endpoint. Events
//! flow on the channel handed out at construction: `Listening(true)` when
//! the recorder starts, `Listening(false)` when capture ends for any
//! reason, then at most one `Transcript` once transcription returns.
//! Machines with no recorder get speech input disabled for the session.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

use super::engine::{RecognitionEngine, RecognitionEvent};

/// Recorders tried in order when none is configured.
const RECORDER_PREFERENCE: [&str; 3] = ["rec", "sox", "arecord"];

/// Capture sample rate, matches what Whisper-style services expect.
const SAMPLE_RATE: u32 = 16_000;

/// sox silence endpointing: start on 0.15s above 2%, stop after 1.5s below 2%.
const SOX_SILENCE: [&str; 7] = ["silence", "1", "0.15", "2%", "1", "1.5", "2%"];

/// A WAV no longer than its header captured nothing.
const WAV_HEADER_LEN: usize = 44;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecorderKind {
    SoxRec,
    Sox,
    Arecord,
}

/// A microphone recorder found on `PATH`.
pub struct Recorder {
    program: PathBuf,
    kind: RecorderKind,
}

impl Recorder {
    /// Use the configured recorder, or the first from the preference list
    /// found on `PATH`. `None` disables speech input for the session.
    pub fn detect(preferred: Option<&str>) -> Option<Self> {
        let candidates: Vec<&str> = match preferred {
            Some(name) => vec![name],
            None => RECORDER_PREFERENCE.to_vec(),
        };
        for name in candidates {
            let Ok(program) = which::which(name) else { continue };
            let Some(kind) = Self::kind_of(&program) else {
                warn!("Unsupported recorder {name}, expected rec, sox or arecord");
                continue;
            };
            info!("Using audio recorder: {}", program.display());
            return Some(Self { program, kind });
        }
        None
    }

    fn kind_of(program: &Path) -> Option<RecorderKind> {
        match program.file_stem().and_then(|stem| stem.to_str()) {
            Some("rec") => Some(RecorderKind::SoxRec),
            Some("sox") => Some(RecorderKind::Sox),
            Some("arecord") => Some(RecorderKind::Arecord),
            _ => None,
        }
    }

    fn command(&self, capture_path: &Path, max_capture: Duration) -> Command {
        let mut cmd = Command::new(&self.program);
        let rate = SAMPLE_RATE.to_string();
        match self.kind {
            RecorderKind::SoxRec => {
                cmd.args(["-q", "-r", &rate, "-c", "1", "-b", "16"])
                    .arg(capture_path)
                    .args(SOX_SILENCE);
            }
            RecorderKind::Sox => {
                cmd.args(["-d", "-q", "-r", &rate, "-c", "1", "-b", "16"])
                    .arg(capture_path)
                    .args(SOX_SILENCE);
            }
            // arecord has no silence detection, so the duration cap does
            // the endpointing.
            RecorderKind::Arecord => {
                cmd.args(["-q", "-f", "S16_LE", "-r", &rate, "-c", "1"])
                    .args(["-d", &max_capture.as_secs().to_string()])
                    .arg(capture_path);
            }
        }
        cmd
    }
}

struct Inner {
    recorder: Recorder,
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_capture: Duration,
    events_tx: mpsc::Sender<RecognitionEvent>,
    session: Mutex<Option<CancellationToken>>,
    generation: AtomicU64,
}

/// Recognition engine backed by a recorder process and the speech service.
pub struct ProcessRecognition {
    inner: Arc<Inner>,
}

impl ProcessRecognition {
    /// Create the engine and the receiver its events arrive on.
    pub fn new(
        recorder: Recorder,
        base_url: &str,
        api_key: Option<String>,
        model: &str,
        max_capture: Duration,
    ) -> (Self, mpsc::Receiver<RecognitionEvent>) {
        let (events_tx, events_rx) = mpsc::channel(16);
        let inner = Arc::new(Inner {
            recorder,
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            max_capture,
            events_tx,
            session: Mutex::new(None),
            generation: AtomicU64::new(0),
        });
        (Self { inner }, events_rx)
    }
}

#[async_trait]
impl RecognitionEngine for ProcessRecognition {
    async fn start(&self, lang: &str) -> Result<()> {
        let token = CancellationToken::new();
        {
            let mut session = self.inner.session.lock();
            if session.as_ref().is_some_and(|active| !active.is_cancelled()) {
                debug!("Capture already running");
                return Ok(());
            }
            *session = Some(token.clone());
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::spawn(run_capture(self.inner.clone(), lang.to_string(), token, generation));
        Ok(())
    }

    async fn stop(&self) {
        if let Some(token) = self.inner.session.lock().as_ref() {
            token.cancel();
        }
    }
}

async fn run_capture(inner: Arc<Inner>, lang: String, token: CancellationToken, generation: u64) {
    let _ = inner.events_tx.send(RecognitionEvent::Listening(true)).await;
    info!("🎤 Listening...");

    let capture = match capture_audio(&inner, &token).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!("Capture failed: {err}");
            let _ = inner.events_tx.send(RecognitionEvent::Error(err.to_string())).await;
            let _ = inner.events_tx.send(RecognitionEvent::Listening(false)).await;
            token.cancel();
            return;
        }
    };

    // The session is over once capture ends; a new one may start while the
    // transcription request is in flight.
    let _ = inner.events_tx.send(RecognitionEvent::Listening(false)).await;
    token.cancel();

    if capture.len() <= WAV_HEADER_LEN {
        debug!("Nothing captured");
        return;
    }
    debug!("Captured {} bytes", capture.len());

    match transcribe(&inner, capture, &lang).await {
        Ok(text) if !text.is_empty() => {
            if inner.generation.load(Ordering::SeqCst) == generation {
                info!("🗣️ You: {text}");
                let _ = inner.events_tx.send(RecognitionEvent::Transcript(text)).await;
            } else {
                debug!("Discarding transcript from a superseded session");
            }
        }
        Ok(_) => debug!("Empty transcription"),
        Err(err) => {
            warn!("Transcription failed: {err}");
            let _ = inner.events_tx.send(RecognitionEvent::Error(err.to_string())).await;
        }
    }
}

async fn capture_audio(inner: &Inner, token: &CancellationToken) -> Result<Vec<u8>> {
    let file = tempfile::NamedTempFile::new()?;
    let mut child = inner
        .recorder
        .command(file.path(), inner.max_capture)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    tokio::select! {
        () = token.cancelled() => {
            child.kill().await.ok();
            debug!("Capture stopped manually");
        }
        () = sleep(inner.max_capture + Duration::from_secs(1)) => {
            child.kill().await.ok();
            debug!("Capture hit the duration cap");
        }
        status = child.wait() => {
            let status = status?;
            if !status.success() {
                return Err(Error::Recognition(format!("recorder exited with {status}")));
            }
        }
    }

    Ok(tokio::fs::read(file.path()).await?)
}

async fn transcribe(inner: &Inner, audio: Vec<u8>, lang: &str) -> Result<String> {
    #[derive(Deserialize)]
    struct TranscriptionResponse {
        text: String,
    }

    let part = reqwest::multipart::Part::bytes(audio)
        .file_name("capture.wav")
        .mime_str("audio/wav")?;
    let form = reqwest::multipart::Form::new()
        .part("file", part)
        .text("model", inner.model.clone())
        .text("language", language_code(lang));

    let mut request =
        inner.client.post(format!("{}/v1/audio/transcriptions", inner.base_url)).multipart(form);
    if let Some(key) = &inner.api_key {
        request = request.header("Authorization", format!("Bearer {key}"));
    }
    let response = request.send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Recognition(format!("transcription returned {status}: {body}")));
    }

    let transcription: TranscriptionResponse = response.json().await?;
    Ok(transcription.text.trim().to_string())
}

/// ISO 639-1 code the transcription endpoint expects: `ru-RU` becomes `ru`.
fn language_code(tag: &str) -> String {
    tag.split(['-', '_']).next().unwrap_or(tag).to_lowercase()
}
