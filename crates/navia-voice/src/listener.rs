//! **VoiceListener**: one cancellable listen at a time over a [`SpeechRecognizer`].
//!
//! ```text
//!   Idle ──listen_once──▶ Listening ──result──▶ Processing ──listen_once──▶ Listening
//!    ▲                        │
//!    └──── silence / error ───┘          stop() from any state ──▶ Stopped
//! ```
//!
//! A recognizer that is still initializing is retried with linear backoff. The stop
//! token is checked at every transition, so a stopped listener never starts another
//! session.

use crate::error::{VoiceError, VoiceResult};
use navia_core::{RecognitionError, RecognitionEvent, SpeechRecognizer, VoiceConfig};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenState {
    Idle,
    Listening,
    Processing,
    Stopped,
}

/// How one `listen_once` ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenOutcome {
    Heard(String),
    /// The session ended without a usable result.
    Silence,
    Stopped,
}

pub struct VoiceListener {
    recognizer: Arc<dyn SpeechRecognizer>,
    config: VoiceConfig,
    state: Mutex<ListenState>,
    token: CancellationToken,
}

impl VoiceListener {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>, config: VoiceConfig) -> Self {
        Self {
            recognizer,
            config,
            state: Mutex::new(ListenState::Idle),
            token: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> ListenState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_state(&self, next: ListenState) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if *state == ListenState::Stopped {
            return;
        }
        debug!(target: "navia::voice", from = ?*state, to = ?next, "listen state");
        *state = next;
    }

    /// Stop for good. Any pending listen returns `Stopped`.
    pub async fn stop(&self) {
        self.token.cancel();
        self.set_state(ListenState::Stopped);
        if let Err(e) = self.recognizer.stop_listening().await {
            warn!(target: "navia::voice", error = %e, "recognizer stop failed");
        }
        info!(target: "navia::voice", "listener stopped");
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.config.initializing_backoff_ms * u64::from(attempt))
    }

    /// Listen for a single utterance.
    pub async fn listen_once(&self) -> VoiceResult<ListenOutcome> {
        let retries = self.config.initializing_retries;
        let mut attempt = 0;
        loop {
            if self.token.is_cancelled() {
                return Ok(ListenOutcome::Stopped);
            }
            self.set_state(ListenState::Listening);

            match self.session().await? {
                SessionEnd::Outcome(outcome) => return Ok(outcome),
                SessionEnd::Initializing if attempt < retries => {
                    attempt += 1;
                    let wait = self.backoff(attempt);
                    warn!(
                        target: "navia::voice",
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        "recognizer initializing, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = self.token.cancelled() => return Ok(ListenOutcome::Stopped),
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                SessionEnd::Initializing => {
                    self.set_state(ListenState::Idle);
                    return Err(VoiceError::RetriesExhausted(retries));
                }
            }
        }
    }

    async fn session(&self) -> VoiceResult<SessionEnd> {
        let mut events = tokio::select! {
            biased;
            _ = self.token.cancelled() => return Ok(SessionEnd::Outcome(ListenOutcome::Stopped)),
            r = self.recognizer.start_listening() => r.inspect_err(|_| self.set_state(ListenState::Idle))?,
        };

        loop {
            let event = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Ok(SessionEnd::Outcome(ListenOutcome::Stopped)),
                event = events.recv() => event,
            };
            match event {
                Some(RecognitionEvent::Started) => {
                    debug!(target: "navia::voice", "recognizer started");
                }
                Some(RecognitionEvent::Result(text)) => {
                    let text = text.trim();
                    if text.is_empty() {
                        continue;
                    }
                    self.set_state(ListenState::Processing);
                    info!(target: "navia::voice", utterance = text, "heard");
                    return Ok(SessionEnd::Outcome(ListenOutcome::Heard(text.to_string())));
                }
                Some(RecognitionEvent::Error(RecognitionError::Initializing)) => {
                    return Ok(SessionEnd::Initializing);
                }
                Some(RecognitionEvent::Error(RecognitionError::NoSpeech)) => {
                    debug!(target: "navia::voice", "no speech detected");
                    self.set_state(ListenState::Idle);
                    return Ok(SessionEnd::Outcome(ListenOutcome::Silence));
                }
                Some(RecognitionEvent::Error(other)) => {
                    self.set_state(ListenState::Idle);
                    return Err(VoiceError::Recognition(other));
                }
                Some(RecognitionEvent::Ended) | None => {
                    self.set_state(ListenState::Idle);
                    return Ok(SessionEnd::Outcome(ListenOutcome::Silence));
                }
            }
        }
    }

    /// Listen again after every utterance until stopped. `on_utterance` runs while the
    /// listener is `Processing`; recognizer errors are logged and the loop goes on,
    /// except when initializing retries run out.
    pub async fn run<F, Fut>(&self, mut on_utterance: F) -> VoiceResult<()>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = ()>,
    {
        loop {
            match self.listen_once().await {
                Ok(ListenOutcome::Heard(text)) => {
                    on_utterance(text).await;
                    if self.token.is_cancelled() {
                        return Ok(());
                    }
                    self.set_state(ListenState::Idle);
                }
                Ok(ListenOutcome::Silence) => {}
                Ok(ListenOutcome::Stopped) => return Ok(()),
                Err(e @ VoiceError::RetriesExhausted(_)) => return Err(e),
                Err(e) => {
                    warn!(target: "navia::voice", error = %e, "listen failed");
                    let pause = self.backoff(1);
                    tokio::select! {
                        biased;
                        _ = self.token.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(pause) => {}
                    }
                }
            }
        }
    }
}

enum SessionEnd {
    Outcome(ListenOutcome),
    Initializing,
}
