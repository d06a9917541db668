//! Speech input controller.
//!
//! Sits between the recognition engine and the conversation, tracking the
//! capture session (`listening` plus transcript-so-far) and deciding when
//! a finished dictation should be sent automatically.
//!
//! Auto-send is an explicit two-state automaton rather than flags spread
//! over the event handlers. Whenever the session is idle with a non-empty
//! transcript and nothing sent yet, the timer arms; a new capture before
//! the deadline disarms it (debounce against stuttered mic toggles); the
//! deadline firing takes the transcript and emits exactly one
//! [`InputEvent::AutoSend`]. The arm condition is re-checked after every
//! event because listening changes and transcript updates arrive from
//! independent sources, in either order: a process-based engine delivers
//! its transcript after capture has already ended.

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::engine::{RecognitionEngine, RecognitionEvent};

/// Events the controller emits to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// Capture session started or ended.
    Listening(bool),
    /// Transcript captured so far.
    Transcript(String),
    /// The debounce delay elapsed after a dictation; send this text.
    AutoSend(String),
}

enum Command {
    Start(String),
    Stop,
    Clear,
}

enum AutoSendState {
    Unarmed,
    Armed { deadline: Instant },
}

/// Handle to the input task.
pub struct SpeechInput {
    commands_tx: mpsc::Sender<Command>,
}

impl SpeechInput {
    /// Start the input task over an engine and its event stream.
    ///
    /// Returns the handle and the receiver the [`InputEvent`]s arrive on.
    pub fn spawn(
        engine: Arc<dyn RecognitionEngine>,
        engine_events: mpsc::Receiver<RecognitionEvent>,
        auto_send_delay: Duration,
    ) -> (Self, mpsc::Receiver<InputEvent>) {
        let (commands_tx, commands_rx) = mpsc::channel(8);
        let (events_tx, events_rx) = mpsc::channel(16);

        let task = InputTask {
            engine,
            auto_send_delay,
            events_tx,
            listening: false,
            transcript: String::new(),
            state: AutoSendState::Unarmed,
            fired: false,
        };
        tokio::spawn(task.run(commands_rx, engine_events));

        (Self { commands_tx }, events_rx)
    }

    /// Begin dictation in the given language. No-op while already listening.
    pub async fn start(&self, lang: &str) {
        let _ = self.commands_tx.send(Command::Start(lang.to_string())).await;
    }

    /// End dictation. The captured transcript survives for auto-send.
    pub async fn stop(&self) {
        let _ = self.commands_tx.send(Command::Stop).await;
    }

    /// Drop the pending transcript and any armed auto-send.
    ///
    /// Used when a typed message supersedes the dictation, so the
    /// dictation does not fire a second send afterwards.
    pub async fn clear(&self) {
        let _ = self.commands_tx.send(Command::Clear).await;
    }
}

struct InputTask {
    engine: Arc<dyn RecognitionEngine>,
    auto_send_delay: Duration,
    events_tx: mpsc::Sender<InputEvent>,
    listening: bool,
    transcript: String,
    state: AutoSendState,
    fired: bool,
}

impl InputTask {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut engine_events: mpsc::Receiver<RecognitionEvent>,
    ) {
        loop {
            let deadline = match self.state {
                AutoSendState::Armed { deadline } => Some(deadline),
                AutoSendState::Unarmed => None,
            };

            // Commands win ties so a restart arriving together with the
            // deadline still debounces.
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(Command::Start(lang)) => self.on_start(&lang).await,
                    Some(Command::Stop) => self.engine.stop().await,
                    Some(Command::Clear) => self.on_clear(),
                    None => break,
                },
                event = engine_events.recv() => match event {
                    Some(event) => self.on_engine_event(event).await,
                    None => break,
                },
                () = sleep_until_opt(deadline) => self.fire().await,
            }
        }
        debug!("Input task finished");
    }

    async fn on_start(&mut self, lang: &str) {
        if self.listening {
            debug!("Already listening, ignoring start");
            return;
        }
        if matches!(self.state, AutoSendState::Armed { .. }) {
            debug!("Auto-send cancelled by new capture");
        }
        self.state = AutoSendState::Unarmed;
        self.transcript.clear();
        self.fired = false;
        if let Err(err) = self.engine.start(lang).await {
            warn!("Could not start capture: {err}");
        }
    }

    fn on_clear(&mut self) {
        if matches!(self.state, AutoSendState::Armed { .. }) || !self.transcript.is_empty() {
            debug!("Pending dictation cleared");
        }
        self.state = AutoSendState::Unarmed;
        self.transcript.clear();
    }

    async fn on_engine_event(&mut self, event: RecognitionEvent) {
        match event {
            RecognitionEvent::Listening(active) => {
                if active && !self.listening {
                    self.fired = false;
                }
                self.listening = active;
                let _ = self.events_tx.send(InputEvent::Listening(active)).await;
            }
            RecognitionEvent::Transcript(text) => {
                self.transcript = text.clone();
                let _ = self.events_tx.send(InputEvent::Transcript(text)).await;
            }
            RecognitionEvent::Error(message) => {
                warn!("Recognition error: {message}");
            }
        }
        self.rearm();
    }

    fn rearm(&mut self) {
        if !self.listening
            && !self.transcript.is_empty()
            && !self.fired
            && matches!(self.state, AutoSendState::Unarmed)
        {
            self.state = AutoSendState::Armed { deadline: Instant::now() + self.auto_send_delay };
            debug!("Auto-send armed");
        }
    }

    async fn fire(&mut self) {
        self.state = AutoSendState::Unarmed;
        self.fired = true;
        let text = mem::take(&mut self.transcript);
        info!("⏱️ Auto-send: {text}");
        let _ = self.events_tx.send(InputEvent::AutoSend(text)).await;
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
