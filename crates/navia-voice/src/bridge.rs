//! **Recognition bridge**: the message protocol spoken by an external recognizer host.
//!
//! The host (an embedded browser engine on a phone, stdin in the daemon) receives
//! `START` / `STOP` commands and answers with JSON messages:
//!
//! ```text
//! {"type": "READY"}
//! {"type": "STATUS", "data": "STARTING"}
//! {"type": "RESULT", "data": "take me to the library"}
//! {"type": "ERROR",  "data": "no-speech"}
//! {"type": "END"}
//! ```
//!
//! [`BridgeRecognizer`] turns those into [`RecognitionEvent`]s for one listening session
//! at a time. Until a host registers, every start request reports `Initializing`.

use crate::error::VoiceResult;
use async_trait::async_trait;
use navia_core::{NaviaError, NaviaResult, RecognitionError, RecognitionEvent, SpeechRecognizer};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Status payload the host sends once recognition has actually begun.
pub const STATUS_STARTING: &str = "STARTING";

const EVENT_BUFFER: usize = 16;

/// Host → recognizer message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeMessage {
    Ready,
    Status(String),
    Result(String),
    Error(String),
    End,
}

impl BridgeMessage {
    pub fn parse(raw: &str) -> VoiceResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// The recognition event this message stands for. `READY` and unknown statuses
    /// carry none.
    pub fn into_event(self) -> Option<RecognitionEvent> {
        match self {
            BridgeMessage::Ready => None,
            BridgeMessage::Status(s) if s == STATUS_STARTING => Some(RecognitionEvent::Started),
            BridgeMessage::Status(_) => None,
            BridgeMessage::Result(text) => Some(RecognitionEvent::Result(text)),
            BridgeMessage::Error(code) => Some(RecognitionEvent::Error(error_from_code(&code))),
            BridgeMessage::End => Some(RecognitionEvent::Ended),
        }
    }
}

/// Map a host error code onto the core's recognition errors.
pub fn error_from_code(code: &str) -> RecognitionError {
    let normalized = code.trim().to_ascii_lowercase().replace('_', "-");
    match normalized.as_str() {
        "initializing" | "not-ready" => RecognitionError::Initializing,
        "no-speech" => RecognitionError::NoSpeech,
        _ => RecognitionError::Other(code.trim().to_string()),
    }
}

/// Recognizer → host command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeCommand {
    Start,
    Stop,
}

#[derive(Default)]
struct BridgeState {
    host: Option<mpsc::Sender<BridgeCommand>>,
    session: Option<mpsc::Sender<RecognitionEvent>>,
    listening: bool,
    ready: bool,
}

/// [`SpeechRecognizer`] backed by an external host speaking the bridge protocol.
#[derive(Default)]
pub struct BridgeRecognizer {
    state: Mutex<BridgeState>,
}

impl BridgeRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BridgeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Attach the host; commands are sent on `commands`.
    pub fn register_bridge(&self, commands: mpsc::Sender<BridgeCommand>) {
        let mut state = self.state();
        state.host = Some(commands);
        state.ready = false;
        info!(target: "navia::voice", "recognition bridge registered");
    }

    /// Detach the host and end any open session.
    pub fn unregister_bridge(&self) {
        let mut state = self.state();
        state.host = None;
        state.session = None;
        state.listening = false;
        state.ready = false;
        info!(target: "navia::voice", "recognition bridge unregistered");
    }

    pub fn is_registered(&self) -> bool {
        self.state().host.is_some()
    }

    /// True once the host has sent `READY`.
    pub fn is_ready(&self) -> bool {
        self.state().ready
    }

    pub fn is_listening(&self) -> bool {
        self.state().listening
    }

    /// Parse and dispatch one raw host message.
    pub fn handle_message(&self, raw: &str) -> VoiceResult<()> {
        let message = BridgeMessage::parse(raw).inspect_err(|e| {
            warn!(target: "navia::voice", error = %e, "unreadable bridge message");
        })?;
        self.deliver(message);
        Ok(())
    }

    /// Dispatch one host message to the open session, if any.
    pub fn deliver(&self, message: BridgeMessage) {
        debug!(target: "navia::voice", ?message, "bridge message");
        let mut state = self.state();
        if message == BridgeMessage::Ready {
            state.ready = true;
        }
        let Some(event) = message.into_event() else {
            return;
        };
        match &event {
            RecognitionEvent::Started => state.listening = true,
            _ => state.listening = false,
        }
        let ended = event == RecognitionEvent::Ended;
        if let Some(session) = state.session.as_ref() {
            if session.try_send(event).is_err() {
                warn!(target: "navia::voice", "listener gone or lagging, event dropped");
            }
        }
        if ended {
            state.session = None;
        }
    }
}

#[async_trait]
impl SpeechRecognizer for BridgeRecognizer {
    async fn start_listening(&self) -> NaviaResult<mpsc::Receiver<RecognitionEvent>> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let host = {
            let mut state = self.state();
            let Some(host) = state.host.clone() else {
                warn!(target: "navia::voice", "recognition bridge not ready");
                // capacity is fresh, cannot fail
                let _ = tx.try_send(RecognitionEvent::Error(RecognitionError::Initializing));
                return Ok(rx);
            };
            if state.listening {
                return Err(NaviaError::Speech("recognizer already listening".into()));
            }
            state.session = Some(tx);
            host
        };

        if host.send(BridgeCommand::Start).await.is_err() {
            self.unregister_bridge();
            return Err(NaviaError::Speech("recognition bridge closed".into()));
        }
        Ok(rx)
    }

    async fn stop_listening(&self) -> NaviaResult<()> {
        let host = {
            let mut state = self.state();
            state.listening = false;
            state.session = None;
            state.host.clone()
        };
        if let Some(host) = host {
            if host.send(BridgeCommand::Stop).await.is_err() {
                debug!(target: "navia::voice", "bridge closed before stop");
            }
        }
        Ok(())
    }
}
