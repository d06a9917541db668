//! Conversation state and orchestration.
//!
//! Owns the append-only message log and the current level, runs the
//! send/receive exchange with the tutor, and hands replies to speech
//! output. Sends are single-flight: the guard is taken before anything is
//! appended and released on completion or failure, so at most one backend
//! call is ever outstanding and the log always reflects accepted sends
//! in order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::level::Level;
use crate::message::Message;
use crate::speech::SpeechOutput;
use crate::tutor::Tutor;

/// Events the conversation emits to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEvent {
    /// A reply was appended to the log.
    AssistantMessage(Message),
    /// A send failed; the user may retry.
    Error(String),
}

/// The conversation controller.
pub struct Conversation {
    tutor: Arc<dyn Tutor>,
    output: Arc<SpeechOutput>,
    log: Mutex<Vec<Message>>,
    level: Mutex<Level>,
    in_flight: AtomicBool,
    speak_delay: Duration,
    events_tx: mpsc::Sender<ConversationEvent>,
}

impl Conversation {
    /// Create the controller and the receiver its events arrive on.
    pub fn new(
        tutor: Arc<dyn Tutor>,
        output: Arc<SpeechOutput>,
        level: Level,
        speak_delay: Duration,
    ) -> (Arc<Self>, mpsc::Receiver<ConversationEvent>) {
        let (events_tx, events_rx) = mpsc::channel(16);
        let conversation = Arc::new(Self {
            tutor,
            output,
            log: Mutex::new(Vec::new()),
            level: Mutex::new(level),
            in_flight: AtomicBool::new(false),
            speak_delay,
            events_tx,
        });
        (conversation, events_rx)
    }

    /// Send a user message.
    ///
    /// Returns whether the send was accepted. Empty input and sends while
    /// another is in flight are rejected without touching the log. On
    /// acceptance the user message is appended immediately and the
    /// exchange runs in the background; the outcome arrives as a
    /// [`ConversationEvent`].
    pub fn send(self: &Arc<Self>, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            debug!("Ignoring empty send");
            return false;
        }
        if self.in_flight.swap(true, Ordering::SeqCst) {
            info!("Send already in flight, ignoring");
            return false;
        }

        let history = {
            let mut log = self.log.lock();
            log.push(Message::user(trimmed));
            log.clone()
        };
        let level = *self.level.lock();

        tokio::spawn(self.clone().exchange(history, level));
        true
    }

    /// Ask the tutor for an opening line before any user message exists.
    /// Same single-flight and error semantics as [`send`], nothing is
    /// appended until the reply arrives.
    ///
    /// [`send`]: Conversation::send
    pub fn start_conversation(self: &Arc<Self>) -> bool {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            info!("Send already in flight, ignoring");
            return false;
        }

        let history = self.log.lock().clone();
        let level = *self.level.lock();
        info!("🤖 Requesting an opening line at {level} level");

        tokio::spawn(self.clone().exchange(history, level));
        true
    }

    /// Change the level. Affects future sends and future speech only;
    /// past messages and past audio are untouched.
    pub fn set_level(&self, level: Level) {
        *self.level.lock() = level;
        info!("📚 Level set to {level}");
    }

    pub fn level(&self) -> Level {
        *self.level.lock()
    }

    /// Snapshot of the log, oldest first.
    pub fn history(&self) -> Vec<Message> {
        self.log.lock().clone()
    }

    async fn exchange(self: Arc<Self>, history: Vec<Message>, level: Level) {
        match self.tutor.reply(&history, level).await {
            Ok(reply) => {
                info!("🤖 Tutor: {}", reply.russian);
                if let Some(feedback) = &reply.english_feedback {
                    info!("📝 Feedback: {feedback}");
                }

                let message = Message::assistant(&reply);
                self.log.lock().push(message.clone());
                self.in_flight.store(false, Ordering::SeqCst);
                let _ = self.events_tx.send(ConversationEvent::AssistantMessage(message)).await;

                // Speak after a short delay so the reply is visible before
                // audio starts; rate comes from the level at send time.
                let output = self.output.clone();
                let text = reply.russian;
                let rate = level.speech_rate();
                let delay = self.speak_delay;
                tokio::spawn(async move {
                    sleep(delay).await;
                    output.speak(&text, rate);
                });
            }
            Err(err) => {
                warn!("Send failed: {err}");
                self.in_flight.store(false, Ordering::SeqCst);
                let _ = self.events_tx.send(ConversationEvent::Error(err.to_string())).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::message::Role;
    use crate::speech::{
        AudioSink, InputEvent, RecognitionEngine, RecognitionEvent, SpeechInput, SynthesisEngine,
        SynthesisRequest, Voice,
    };
    use crate::tutor::TutorResponse;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tokio::sync::watch;
    use tokio::time::timeout;
    use tokio_util::sync::CancellationToken;

    enum Scripted {
        Reply(TutorResponse),
        Fail(String),
    }

    struct ScriptedTutor {
        script: Mutex<VecDeque<Scripted>>,
        calls: Mutex<Vec<(Vec<Message>, Level)>>,
        delay: Duration,
    }

    impl ScriptedTutor {
        fn new(script: Vec<Scripted>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
                delay: Duration::from_millis(20),
            })
        }

        fn slow(script: Vec<Scripted>, delay: Duration) -> Arc<Self> {
            Arc::new(Self { script: Mutex::new(script.into()), calls: Mutex::new(Vec::new()), delay })
        }
    }

    #[async_trait]
    impl Tutor for ScriptedTutor {
        async fn reply(&self, history: &[Message], level: Level) -> Result<TutorResponse> {
            self.calls.lock().push((history.to_vec(), level));
            let next = self.script.lock().pop_front();
            sleep(self.delay).await;
            match next {
                Some(Scripted::Reply(reply)) => Ok(reply),
                Some(Scripted::Fail(message)) => Err(Error::Tutor(message)),
                None => Err(Error::Tutor("script exhausted".to_string())),
            }
        }
    }

    fn opening_reply() -> TutorResponse {
        TutorResponse {
            russian: "Привет! Как тебя зовут?".to_string(),
            english_feedback: None,
            transliteration: Some("Privet! Kak tebya zovut?".to_string()),
            topic_alignment: Some("Identity".to_string()),
        }
    }

    struct EchoSynth {
        calls: Mutex<Vec<SynthesisRequest>>,
    }

    #[async_trait]
    impl SynthesisEngine for EchoSynth {
        async fn voices(&self) -> Result<Vec<Voice>> {
            Ok(Vec::new())
        }

        async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>> {
            self.calls.lock().push(request.clone());
            Ok(request.text.clone().into_bytes())
        }
    }

    struct SilentSink;

    #[async_trait]
    impl AudioSink for SilentSink {
        async fn play(&self, _audio: &[u8], _cancel: &CancellationToken) -> Result<()> {
            Ok(())
        }
    }

    struct Pipeline {
        conversation: Arc<Conversation>,
        events: mpsc::Receiver<ConversationEvent>,
        tutor: Arc<ScriptedTutor>,
        synth: Arc<EchoSynth>,
        _voice_tx: watch::Sender<Option<Voice>>,
    }

    fn pipeline(tutor: Arc<ScriptedTutor>, level: Level) -> Pipeline {
        let synth = Arc::new(EchoSynth { calls: Mutex::new(Vec::new()) });
        let (voice_tx, voice_rx) = watch::channel(Some(Voice::new("Milena", "ru-RU")));
        let output =
            Arc::new(SpeechOutput::spawn(synth.clone(), Arc::new(SilentSink), voice_rx, "ru-RU", 1.0));
        let (conversation, events) =
            Conversation::new(tutor.clone(), output, level, Duration::from_millis(10));
        Pipeline { conversation, events, tutor, synth, _voice_tx: voice_tx }
    }

    async fn next(events: &mut mpsc::Receiver<ConversationEvent>) -> ConversationEvent {
        timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("no event within 2s")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn opening_line_is_appended_and_spoken_at_beginner_rate() {
        let tutor = ScriptedTutor::new(vec![Scripted::Reply(opening_reply())]);
        let mut p = pipeline(tutor, Level::Beginner);

        assert!(p.conversation.start_conversation());

        let event = next(&mut p.events).await;
        let ConversationEvent::AssistantMessage(message) = event else {
            panic!("expected assistant message, got {event:?}");
        };
        assert_eq!(message.content, "Привет! Как тебя зовут?");
        assert_eq!(message.transliteration.as_deref(), Some("Privet! Kak tebya zovut?"));
        assert_eq!(message.topic.as_deref(), Some("Identity"));

        let history = p.conversation.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::Assistant);

        // One backend call with zero history.
        assert_eq!(p.tutor.calls.lock().len(), 1);
        assert!(p.tutor.calls.lock()[0].0.is_empty());

        sleep(Duration::from_millis(150)).await;
        let synth_calls = p.synth.calls.lock();
        assert_eq!(synth_calls.len(), 1);
        assert_eq!(synth_calls[0].text, "Привет! Как тебя зовут?");
        assert_eq!(synth_calls[0].rate, 0.75);
    }

    #[tokio::test]
    async fn send_appends_user_immediately_and_reply_after() {
        let tutor = ScriptedTutor::new(vec![Scripted::Reply(opening_reply())]);
        let mut p = pipeline(tutor, Level::Beginner);

        assert!(p.conversation.send("Я люблю футбол"));

        let history = p.conversation.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "Я люблю футбол");

        next(&mut p.events).await;
        assert_eq!(p.conversation.history().len(), 2);

        let calls = p.tutor.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.len(), 1);
        assert_eq!(calls[0].0[0].content, "Я люблю футбол");
    }

    #[tokio::test]
    async fn empty_and_whitespace_sends_are_rejected() {
        let tutor = ScriptedTutor::new(vec![]);
        let p = pipeline(tutor, Level::Beginner);

        assert!(!p.conversation.send(""));
        assert!(!p.conversation.send("   \n\t"));
        assert!(p.conversation.history().is_empty());
        assert!(p.tutor.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn send_is_single_flight() {
        let tutor = ScriptedTutor::slow(
            vec![Scripted::Reply(opening_reply()), Scripted::Reply(opening_reply())],
            Duration::from_millis(150),
        );
        let mut p = pipeline(tutor, Level::Beginner);

        assert!(p.conversation.send("Привет"));
        assert!(!p.conversation.send("Ещё раз"));
        assert_eq!(p.conversation.history().len(), 1);

        next(&mut p.events).await;
        assert_eq!(p.tutor.calls.lock().len(), 1);

        // Guard released, a new send goes through.
        assert!(p.conversation.send("Теперь можно"));
        next(&mut p.events).await;
        assert_eq!(p.tutor.calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn failure_emits_error_keeps_log_and_allows_retry() {
        let tutor = ScriptedTutor::new(vec![
            Scripted::Fail("backend unavailable".to_string()),
            Scripted::Reply(opening_reply()),
        ]);
        let mut p = pipeline(tutor, Level::Foundation);

        assert!(p.conversation.send("Привет"));
        let event = next(&mut p.events).await;
        assert!(matches!(event, ConversationEvent::Error(ref message) if message.contains("backend unavailable")));

        // No assistant message was appended.
        let history = p.conversation.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::User);

        // Retry goes through.
        assert!(p.conversation.send("Привет ещё раз"));
        let event = next(&mut p.events).await;
        assert!(matches!(event, ConversationEvent::AssistantMessage(_)));
    }

    #[tokio::test]
    async fn spoken_dictation_sends_exactly_once() {
        let tutor = ScriptedTutor::new(vec![Scripted::Reply(opening_reply())]);
        let mut p = pipeline(tutor, Level::Beginner);

        struct IdleEngine;

        #[async_trait]
        impl RecognitionEngine for IdleEngine {
            async fn start(&self, _lang: &str) -> Result<()> {
                Ok(())
            }
            async fn stop(&self) {}
        }

        let (engine_tx, engine_rx) = mpsc::channel(16);
        let (_input, mut input_events) =
            SpeechInput::spawn(Arc::new(IdleEngine), engine_rx, Duration::from_millis(40));

        engine_tx.send(RecognitionEvent::Listening(true)).await.unwrap();
        engine_tx.send(RecognitionEvent::Transcript("Я люблю футбол".to_string())).await.unwrap();
        engine_tx.send(RecognitionEvent::Listening(false)).await.unwrap();

        // Forward auto-sends the way the run loop does.
        let conversation = p.conversation.clone();
        tokio::spawn(async move {
            while let Some(event) = input_events.recv().await {
                if let InputEvent::AutoSend(text) = event {
                    conversation.send(&text);
                }
            }
        });

        let event = next(&mut p.events).await;
        assert!(matches!(event, ConversationEvent::AssistantMessage(_)));

        let history = p.conversation.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "Я люблю футбол");

        let calls = p.tutor.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.len(), 1);
        assert_eq!(calls[0].0[0].content, "Я люблю футбол");
    }

    #[tokio::test]
    async fn level_at_send_time_drives_constraints_and_rate() {
        let tutor = ScriptedTutor::new(vec![Scripted::Reply(opening_reply())]);
        let mut p = pipeline(tutor, Level::Beginner);

        p.conversation.set_level(Level::Higher);
        assert!(p.conversation.send("Что ты думаешь об экологии?"));
        next(&mut p.events).await;

        assert_eq!(p.tutor.calls.lock()[0].1, Level::Higher);

        sleep(Duration::from_millis(150)).await;
        assert_eq!(p.synth.calls.lock()[0].rate, 1.10);
    }
}
