//! Application configuration and CLI argument parsing.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::error::{Error, Result};
use crate::level::Level;

/// Russian practice partner configuration.
#[derive(Parser, Debug, Clone)]
#[command(name = "russian-tutor")]
#[command(version, about = "Voice-enabled Russian conversation practice", long_about = None)]
pub struct AppConfig {
    /// List the voices available for the target language and exit
    #[arg(long)]
    pub list_voices: bool,

    /// Learner level, controls grammar constraints and speech rate
    #[arg(long, short = 'l', value_enum, env = "TUTOR_LEVEL", default_value = "beginner")]
    pub level: Level,

    /// Target language tag for synthesis and recognition
    #[arg(long, default_value = "ru-RU")]
    pub language: String,

    /// Speech service URL (voices, synthesis, transcription)
    #[arg(long, env = "SPEECH_URL", default_value = "http://localhost:8880")]
    pub speech_url: String,

    /// Speech service API key
    #[arg(long, env = "SPEECH_API_KEY")]
    pub speech_api_key: Option<String>,

    /// Tutor proxy URL; when set, exchanges are forwarded there and no
    /// backend credential is needed locally
    #[arg(long, env = "TUTOR_URL")]
    pub tutor_url: Option<String>,

    /// OpenAI-compatible chat completion URL, used when no proxy is set
    #[arg(long, env = "TUTOR_BACKEND_URL", default_value = "http://localhost:11434/v1")]
    pub backend_url: String,

    /// Chat completion model
    #[arg(long, short = 'm', env = "TUTOR_BACKEND_MODEL", default_value = "gemma3:1b")]
    pub backend_model: String,

    /// Chat completion API key, supplied out of band
    #[arg(long, env = "TUTOR_BACKEND_KEY")]
    pub backend_api_key: Option<String>,

    /// LLM temperature (0.0-2.0)
    #[arg(long, default_value = "0.7", value_parser = parse_temperature)]
    pub temperature: f32,

    /// Transcription model name sent to the speech service
    #[arg(long, default_value = "whisper-1")]
    pub stt_model: String,

    /// Debounce delay before a finished dictation auto-sends, in milliseconds
    #[arg(long, default_value = "500")]
    pub auto_send_delay_ms: u64,

    /// Delay before a reply is spoken, in milliseconds
    #[arg(long, default_value = "150")]
    pub speak_delay_ms: u64,

    /// Longest single microphone capture, in seconds
    #[arg(long, default_value = "15")]
    pub max_capture_secs: u64,

    /// Synthesis pitch multiplier (0.5-2.0)
    #[arg(long, default_value = "1.0")]
    pub pitch: f32,

    /// Disable spoken replies, text only
    #[arg(long)]
    pub no_voice: bool,

    /// Audio player command (paplay, aplay or ffplay; auto-detected)
    #[arg(long)]
    pub player: Option<String>,

    /// Audio recorder command (rec, sox or arecord; auto-detected)
    #[arg(long)]
    pub recorder: Option<String>,

    /// Enable verbose logging
    #[arg(long, short = 'v')]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Mode>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Mode {
    /// Run the tutor proxy serving the /api/chat contract
    Serve {
        /// Bind address
        #[arg(long, default_value = "127.0.0.1:3000")]
        bind: SocketAddr,
    },
}

impl AppConfig {
    /// Parse configuration from command line arguments.
    pub fn from_args() -> Self {
        Self::parse()
    }

    pub fn auto_send_delay(&self) -> Duration {
        Duration::from_millis(self.auto_send_delay_ms)
    }

    pub fn speak_delay(&self) -> Duration {
        Duration::from_millis(self.speak_delay_ms)
    }

    pub fn max_capture(&self) -> Duration {
        Duration::from_secs(self.max_capture_secs)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !(0.5..=2.0).contains(&self.pitch) {
            return Err(Error::Config(format!(
                "pitch must be between 0.5 and 2.0, got {}",
                self.pitch
            )));
        }
        if self.max_capture_secs == 0 {
            return Err(Error::Config("max capture duration must be at least 1s".to_string()));
        }

        for (flag, url) in [
            ("--speech-url", Some(&self.speech_url)),
            ("--backend-url", Some(&self.backend_url)),
            ("--tutor-url", self.tutor_url.as_ref()),
        ] {
            if let Some(url) = url
                && !url.starts_with("http://")
                && !url.starts_with("https://")
            {
                return Err(Error::Config(format!("{flag} must be an http(s) URL, got {url}")));
            }
        }

        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        info!("Configuration:");
        info!("  Level: {}", self.level);
        info!("  Language: {}", self.language);
        info!("  Speech service: {}", self.speech_url);
        match &self.tutor_url {
            Some(url) => info!("  Tutor proxy: {url}"),
            None => {
                info!("  Backend URL: {}", self.backend_url);
                info!("  Backend model: {}", self.backend_model);
                info!("  Temperature: {}", self.temperature);
            }
        }
        info!("  Auto-send delay: {}ms", self.auto_send_delay_ms);
        info!("  Speak delay: {}ms", self.speak_delay_ms);
        if self.no_voice {
            info!("  Voice output: disabled");
        }
    }
}

/// Parse and validate temperature value (0.0-2.0).
fn parse_temperature(s: &str) -> std::result::Result<f32, String> {
    let value: f32 = s.parse().map_err(|_| format!("'{s}' is not a valid float"))?;
    if (0.0..=2.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("temperature must be between 0.0 and 2.0, got {value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::parse_from(["russian-tutor"]);
        assert_eq!(config.level, Level::Beginner);
        assert_eq!(config.language, "ru-RU");
        assert_eq!(config.auto_send_delay_ms, 500);
        assert_eq!(config.speak_delay_ms, 150);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn level_parses_from_flag() {
        let config = AppConfig::parse_from(["russian-tutor", "--level", "higher"]);
        assert_eq!(config.level, Level::Higher);
    }

    #[test]
    fn temperature_out_of_range_is_rejected() {
        assert!(AppConfig::try_parse_from(["russian-tutor", "--temperature", "2.5"]).is_err());
        assert!(AppConfig::try_parse_from(["russian-tutor", "--temperature", "0.3"]).is_ok());
    }

    #[test]
    fn pitch_out_of_range_fails_validation() {
        let config = AppConfig::parse_from(["russian-tutor", "--pitch", "3.0"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_http_urls_fail_validation() {
        let config = AppConfig::parse_from(["russian-tutor", "--speech-url", "localhost:8880"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn serve_subcommand_takes_a_bind_address() {
        let config = AppConfig::parse_from(["russian-tutor", "serve", "--bind", "0.0.0.0:8080"]);
        match config.command {
            Some(Mode::Serve { bind }) => assert_eq!(bind.port(), 8080),
            None => panic!("expected serve subcommand"),
        }
    }
}
