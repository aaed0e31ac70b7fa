//! **ConsoleVoice**: a headless speech synthesizer.
//!
//! Prints each utterance and holds the channel for roughly as long as a person would
//! take to say it, so priority and preemption behave as they do with real audio.
//! `stop()` cuts the current utterance short.

use async_trait::async_trait;
use navia_core::{NaviaResult, SpeechSynthesizer};
use std::io::Write;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::info;

/// Typical conversational pace.
pub const DEFAULT_WORDS_PER_MINUTE: u32 = 160;

pub struct ConsoleVoice {
    words_per_minute: u32,
    echo: bool,
    stopped: Notify,
}

impl Default for ConsoleVoice {
    fn default() -> Self {
        Self::new(DEFAULT_WORDS_PER_MINUTE)
    }
}

impl ConsoleVoice {
    pub fn new(words_per_minute: u32) -> Self {
        Self {
            words_per_minute: words_per_minute.max(1),
            echo: true,
            stopped: Notify::new(),
        }
    }

    /// Log only; nothing is written to stdout.
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    /// Simulated speaking time for `text`.
    pub fn duration_for(&self, text: &str) -> Duration {
        let words = text.split_whitespace().count() as u64;
        Duration::from_millis(words * 60_000 / u64::from(self.words_per_minute))
    }
}

#[async_trait]
impl SpeechSynthesizer for ConsoleVoice {
    async fn speak(&self, text: &str) -> NaviaResult<()> {
        // register before printing so a stop issued right away is not missed
        let stopped = self.stopped.notified();
        tokio::pin!(stopped);
        stopped.as_mut().enable();

        info!(target: "navia::voice", text, "speaking");
        if self.echo {
            let mut out = std::io::stdout().lock();
            writeln!(out, "🔊 {}", text)?;
            out.flush()?;
        }

        tokio::select! {
            _ = tokio::time::sleep(self.duration_for(text)) => {}
            _ = &mut stopped => {
                info!(target: "navia::voice", "utterance cut short");
            }
        }
        Ok(())
    }

    fn stop(&self) {
        self.stopped.notify_waiters();
    }
}
