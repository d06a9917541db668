//! Audio playback through a system CLI player.
//!
//! Synthesized audio lands in a temp file and is handed to `paplay`,
//! `aplay` or `ffplay`, whichever is installed. Cancellation kills the
//! player process. Machines with no player degrade to a logging sink so
//! the rest of the pipeline keeps working.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Players tried in order when none is configured.
const PLAYER_PREFERENCE: [&str; 3] = ["paplay", "aplay", "ffplay"];

/// Plays one utterance worth of audio.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play to completion, or stop early when the token fires. Early stop
    /// is not an error.
    async fn play(&self, audio: &[u8], cancel: &CancellationToken) -> Result<()>;
}

/// Sink backed by a CLI audio player.
pub struct SystemPlayer {
    player: PathBuf,
}

impl SystemPlayer {
    /// Use the configured player, or the first from the preference list
    /// found on `PATH`. `None` means no player is available.
    pub fn detect(preferred: Option<&str>) -> Option<Self> {
        let candidates: Vec<&str> = match preferred {
            Some(name) => vec![name],
            None => PLAYER_PREFERENCE.to_vec(),
        };
        for name in candidates {
            if let Ok(path) = which::which(name) {
                info!("Using audio player: {}", path.display());
                return Some(Self { player: path });
            }
        }
        None
    }

    fn command(&self, audio_path: &Path) -> Command {
        let mut cmd = Command::new(&self.player);
        match self.player.file_stem().and_then(|stem| stem.to_str()) {
            Some("ffplay") => {
                cmd.args(["-nodisp", "-autoexit", "-loglevel", "quiet"]).arg(audio_path);
            }
            Some("aplay") => {
                cmd.arg("-q").arg(audio_path);
            }
            _ => {
                cmd.arg(audio_path);
            }
        }
        cmd
    }
}

#[async_trait]
impl AudioSink for SystemPlayer {
    async fn play(&self, audio: &[u8], cancel: &CancellationToken) -> Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        tokio::fs::write(file.path(), audio).await?;

        let mut child = self
            .command(file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        tokio::select! {
            () = cancel.cancelled() => {
                child.kill().await.ok();
                debug!("Playback cancelled");
                Ok(())
            }
            status = child.wait() => {
                let status = status?;
                if !status.success() {
                    return Err(Error::Synthesis(format!("audio player exited with {status}")));
                }
                Ok(())
            }
        }
    }
}

/// Sink for machines with no audio player: logs and completes immediately.
pub struct NullSink;

#[async_trait]
impl AudioSink for NullSink {
    async fn play(&self, audio: &[u8], _cancel: &CancellationToken) -> Result<()> {
        debug!("No audio player, dropping {} bytes of audio", audio.len());
        Ok(())
    }
}
