//! Russian Tutor - voice-enabled conversation practice.
//!
//! A terminal front end for GCSE-style Russian practice: the learner types
//! or dictates Russian, the tutor answers at the configured level with
//! corrective feedback, and the reply is spoken through an OpenAI-style
//! speech service. The tutor proxy can also run standalone via `serve`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::ValueEnum;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::LocalTime;

use russian_tutor::config::{AppConfig, Mode};
use russian_tutor::conversation::{Conversation, ConversationEvent};
use russian_tutor::level::Level;
use russian_tutor::speech::{
    same_family, select_voice, AudioSink, HttpSynthesis, InputEvent, NullSink, ProcessRecognition,
    Recorder, SpeechInput, SpeechOutput, SynthesisEngine, SystemPlayer, VoiceCatalog,
};
use russian_tutor::tutor::{server, OpenAiBackend, RemoteTutor, Tutor, TutorService};

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn wait_for_shutdown() {
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("🛑 Received Ctrl+C, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM handler");
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("🛑 Received SIGTERM, shutting down...");
        }
    }
}

fn completion_backend(config: &AppConfig) -> Arc<OpenAiBackend> {
    Arc::new(OpenAiBackend::new(
        config.backend_url.clone(),
        config.backend_model.clone(),
        config.backend_api_key.clone(),
        config.temperature,
    ))
}

/// Run the tutor proxy standalone, for browser or remote clients.
async fn run_proxy(bind: SocketAddr, config: &AppConfig) -> Result<()> {
    let service = Arc::new(TutorService::new(completion_backend(config)));
    server::serve(bind, service, wait_for_shutdown()).await?;
    Ok(())
}

/// Print the voices the speech service offers for the target language.
async fn run_list_voices(config: &AppConfig) -> Result<()> {
    let engine = HttpSynthesis::new(config.speech_url.clone(), config.speech_api_key.clone());
    let inventory = engine.voices().await?;
    let candidates: Vec<_> = inventory
        .iter()
        .filter(|voice| same_family(&voice.lang, &config.language))
        .cloned()
        .collect();

    if candidates.is_empty() {
        println!("No voices for {} ({} voices total)", config.language, inventory.len());
        return Ok(());
    }

    let selected = select_voice(&candidates);
    println!("Voices for {}:", config.language);
    for voice in &candidates {
        let marker = if selected.as_ref() == Some(voice) { "*" } else { " " };
        println!("  {marker} {} ({})", voice.name, voice.lang);
    }
    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("  /listen          start a dictation session");
    println!("  /stop            stop listening and speaking");
    println!("  /level <name>    switch level: beginner, foundation, higher");
    println!("  /voices          re-poll the speech service for voices");
    println!("  /history         print the conversation so far");
    println!("  /quit            leave");
    println!("Anything else is sent to the tutor as Russian practice.");
}

/// Handle one line of terminal input. Returns `false` to quit.
async fn handle_line(
    line: &str,
    conversation: &Arc<Conversation>,
    input: Option<&SpeechInput>,
    output: &SpeechOutput,
    catalog: &VoiceCatalog,
    config: &AppConfig,
) -> bool {
    if line.is_empty() {
        return true;
    }
    let Some(command) = line.strip_prefix('/') else {
        if conversation.send(line) {
            // A typed message supersedes any dictation waiting to auto-send.
            if let Some(input) = input {
                input.clear().await;
            }
        }
        return true;
    };

    let (command, argument) = match command.split_once(char::is_whitespace) {
        Some((command, argument)) => (command, argument.trim()),
        None => (command, ""),
    };
    match command {
        "help" => print_help(),
        "listen" => match input {
            Some(input) => input.start(&config.language).await,
            None => warn!("Speech input is disabled, no recorder was found"),
        },
        "stop" => {
            if let Some(input) = input {
                input.stop().await;
            }
            output.stop();
        }
        "level" => match Level::from_str(argument, true) {
            Ok(level) => conversation.set_level(level),
            Err(_) => warn!("Usage: /level beginner|foundation|higher"),
        },
        "voices" => {
            if let Err(err) = catalog.refresh().await {
                warn!("Voice refresh failed: {err}");
            }
        }
        "history" => {
            for message in conversation.history() {
                println!("{}: {}", message.role, message.content);
            }
        }
        "quit" | "exit" => {
            info!("👋 Пока!");
            return false;
        }
        other => warn!("Unknown command /{other}, try /help"),
    }
    true
}

/// Interactive practice: speech input, the tutor and speech output wired
/// around a terminal line loop.
async fn run_practice(config: AppConfig) -> Result<()> {
    config.log_config();

    let tutor: Arc<dyn Tutor> = match &config.tutor_url {
        Some(url) => {
            info!("Using tutor proxy at {url}");
            Arc::new(RemoteTutor::new(url.clone()))
        }
        None => Arc::new(TutorService::new(completion_backend(&config))),
    };

    let engine =
        Arc::new(HttpSynthesis::new(config.speech_url.clone(), config.speech_api_key.clone()));
    let (catalog, voice_rx) = VoiceCatalog::new(engine.clone(), &config.language);

    // With --no-voice the output controller reads a channel that never
    // selects a voice, which makes every speak a no-op.
    let voice_rx = if config.no_voice {
        info!("🔇 Voice output disabled, replies will be text only");
        watch::channel(None).1
    } else {
        if let Err(err) = catalog.wait_for_voice(5, Duration::from_millis(400)).await {
            warn!("Speech service unreachable, replies will be text only: {err}");
        }
        voice_rx
    };

    let sink: Arc<dyn AudioSink> = if config.no_voice {
        Arc::new(NullSink)
    } else {
        match SystemPlayer::detect(config.player.as_deref()) {
            Some(player) => Arc::new(player),
            None => {
                warn!("No audio player found (paplay/aplay/ffplay), replies will not be audible");
                Arc::new(NullSink)
            }
        }
    };
    let output =
        Arc::new(SpeechOutput::spawn(engine, sink, voice_rx, &config.language, config.pitch));

    let (conversation, mut conversation_events) =
        Conversation::new(tutor, output.clone(), config.level, config.speak_delay());

    // Microphone capture is optional; without a recorder the loop still
    // accepts typed input. The keepalive sender holds the stand-in channel
    // open so the select arm stays quiet.
    let (input, mut input_events, _mic_keepalive) =
        match Recorder::detect(config.recorder.as_deref()) {
            Some(recorder) => {
                let (recognition, events) = ProcessRecognition::new(
                    recorder,
                    &config.speech_url,
                    config.speech_api_key.clone(),
                    &config.stt_model,
                    config.max_capture(),
                );
                let (input, input_events) =
                    SpeechInput::spawn(Arc::new(recognition), events, config.auto_send_delay());
                (Some(input), input_events, None)
            }
            None => {
                warn!("No audio recorder found (rec/sox/arecord), /listen is disabled");
                let (keepalive, input_events) = mpsc::channel(1);
                (None, input_events, Some(keepalive))
            }
        };

    conversation.start_conversation();
    print_help();

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !handle_line(line.trim(), &conversation, input.as_ref(), &output, &catalog, &config).await {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("stdin closed");
                    break;
                }
                Err(err) => {
                    error!("Failed to read stdin: {err}");
                    break;
                }
            },
            Some(event) = input_events.recv() => match event {
                InputEvent::Listening(active) => {
                    debug!("Capture {}", if active { "started" } else { "stopped" });
                }
                InputEvent::Transcript(text) => debug!("Transcript so far: {text}"),
                InputEvent::AutoSend(text) => {
                    conversation.send(&text);
                }
            },
            Some(event) = conversation_events.recv() => match event {
                ConversationEvent::AssistantMessage(message) => {
                    if let Some(transliteration) = &message.transliteration {
                        info!("🔤 {transliteration}");
                    }
                    if let Some(topic) = &message.topic {
                        debug!("Topic: {topic}");
                    }
                }
                ConversationEvent::Error(message) => error!("❌ {message}"),
            },
            _ = &mut shutdown => break,
        }
    }

    output.stop();
    if let Some(input) = &input {
        input.stop().await;
    }
    info!("✅ Russian Tutor stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let config = AppConfig::from_args();

    // Initialize logging with time-only format
    // Respect RUST_LOG env var, fallback to verbose flag, default to info
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| if config.verbose { EnvFilter::try_new("debug") } else { EnvFilter::try_new("info") })
        .unwrap();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(LocalTime::new(time::macros::format_description!("[hour]:[minute]:[second]")))
        .init();

    info!("🎓 Russian Tutor v{}", env!("CARGO_PKG_VERSION"));

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("❌ Configuration error: {}", e);
        std::process::exit(1);
    }

    if let Some(Mode::Serve { bind }) = &config.command {
        return run_proxy(*bind, &config).await;
    }
    if config.list_voices {
        return run_list_voices(&config).await;
    }
    run_practice(config).await
}
