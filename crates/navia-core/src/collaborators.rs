//! Platform seams the core talks through.
//!
//! Each trait is a contract only; concrete backends live in the service clients
//! (`services`), the voice crate, or the daemon. Tests substitute scripted fakes.

use crate::error::NaviaResult;
use crate::route::{Coordinate, Fix, Place, Route};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub use crate::speech::SpeechSynthesizer;

/// Positioning service.
#[async_trait]
pub trait LocationSource: Send + Sync {
    async fn request_permission(&self) -> NaviaResult<bool>;

    /// One-shot fix.
    async fn current_fix(&self) -> NaviaResult<Fix>;

    /// Continuous fixes in wall-clock order. Dropping the receiver unsubscribes.
    async fn subscribe(&self) -> NaviaResult<mpsc::Receiver<Fix>>;
}

/// Heading stream in degrees [0, 360), independent of fix headings.
#[async_trait]
pub trait CompassSource: Send + Sync {
    async fn subscribe(&self) -> NaviaResult<mpsc::Receiver<f64>>;
}

/// Camera frame grabber. Callers bound it with their own timeout.
#[async_trait]
pub trait CameraCapture: Send + Sync {
    async fn capture(&self) -> NaviaResult<Vec<u8>>;
}

/// Remote scene description. `NaviaError::QuotaExceeded` means "no alert this cycle".
#[async_trait]
pub trait VisionInferenceClient: Send + Sync {
    async fn describe_scene(&self, image: &[u8]) -> NaviaResult<String>;
}

/// Role of one chat turn, OpenAI-style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Raw chat completion. History management and intent parsing live in `services::chat`.
#[async_trait]
pub trait ChatInferenceClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> NaviaResult<String>;
}

/// Free-text address lookup. `Ok(None)` means not found.
#[async_trait]
pub trait GeocodingClient: Send + Sync {
    async fn resolve(&self, query: &str) -> NaviaResult<Option<Place>>;
}

/// Walking route between two points. `Ok(None)` means no route.
#[async_trait]
pub trait RoutingClient: Send + Sync {
    async fn route(&self, origin: Coordinate, destination: Coordinate)
        -> NaviaResult<Option<Route>>;
}

/// Recognizer error codes. `Initializing` is retried with backoff by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", content = "message", rename_all = "snake_case")]
pub enum RecognitionError {
    Initializing,
    NoSpeech,
    Other(String),
}

impl std::fmt::Display for RecognitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecognitionError::Initializing => write!(f, "recognizer initializing"),
            RecognitionError::NoSpeech => write!(f, "no speech detected"),
            RecognitionError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Events of one listening session, in order: `Started`, then results/errors, then `Ended`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Started,
    Result(String),
    Error(RecognitionError),
    Ended,
}

#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn start_listening(&self) -> NaviaResult<mpsc::Receiver<RecognitionEvent>>;

    async fn stop_listening(&self) -> NaviaResult<()>;
}

/// Short vibration on accepted alerts.
pub trait Haptics: Send + Sync {
    fn pulse(&self);
}

/// No-op haptics for headless hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHaptics;

impl Haptics for NoHaptics {
    fn pulse(&self) {}
}
