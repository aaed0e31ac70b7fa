//! Error types for the Navia voice layer

use navia_core::{NaviaError, RecognitionError};
use thiserror::Error;

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors that can occur while listening or talking to the recognition bridge
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Bridge error: {0}")]
    Bridge(String),

    #[error("Bridge protocol error: {0}")]
    Protocol(String),

    #[error("Recognition error: {0}")]
    Recognition(RecognitionError),

    #[error("Recognizer still initializing after {0} retries")]
    RetriesExhausted(u32),

    #[error("Core error: {0}")]
    Core(#[from] NaviaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for VoiceError {
    fn from(err: serde_json::Error) -> Self {
        VoiceError::Protocol(err.to_string())
    }
}
