//! # Navia Core - Walking Guidance for Visually Impaired Pedestrians
//!
//! Turns location fixes, compass readings and camera frames into spoken guidance.
//! Three producers share one voice: turn-by-turn navigation, hazard alerts from a
//! remote vision model, and a conversational assistant.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          Navigator                            │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐       │
//! │  │  Location /  │ → │    Route     │ → │              │       │
//! │  │   Compass    │   │   Tracker    │   │              │       │
//! │  └──────────────┘   └──────────────┘   │    Speech    │       │
//! │  ┌──────────────┐   ┌──────────────┐   │   Channel    │ → TTS │
//! │  │ Live Monitor │ → │    Alert     │ → │ NAV > ALERT  │       │
//! │  │ (cam+vision) │   │   Arbiter    │   │  NAV > CHAT  │       │
//! │  └──────────────┘   └──────────────┘   │              │       │
//! │  ┌──────────────┐                      │              │       │
//! │  │ Chat Session │ ───── NAVIGATE_TO ─→ │              │       │
//! │  └──────────────┘                      └──────────────┘       │
//! └───────────────────────────────────────────────────────────────┘
//! ```

pub mod alert;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod geo;
pub mod navigation;
pub mod orchestrator;
pub mod route;
pub mod services;
pub mod speech;

pub use alert::{AlertArbiter, AlertDecision, AlertPipeline, AlertState, SuppressReason};
pub use collaborators::{
    CameraCapture, ChatInferenceClient, ChatMessage, ChatRole, CompassSource, GeocodingClient,
    Haptics, LocationSource, NoHaptics, RecognitionError, RecognitionEvent, RoutingClient,
    SpeechRecognizer, VisionInferenceClient,
};
pub use config::{
    AlertConfig, LiveConfig, NaviaConfig, NavigationConfig, ServicesConfig, SpeechConfig,
    VoiceConfig,
};
pub use error::{NaviaError, NaviaResult};
pub use navigation::{format_instruction, HeadingGuide, RouteProgressTracker, TurnDirection};
pub use orchestrator::{
    CycleOutcome, LiveMonitor, NavigationStart, Navigator, NavigatorServices, NavigatorStatus,
    VisionCycle,
};
pub use route::{Coordinate, Fix, ManeuverType, Place, Route, Step};
pub use services::{ChatReply, ChatSession, GroqClient, NominatimGeocoder, OsrmRouter};
pub use speech::{
    clean_for_speech, SpeechChannel, SpeechGuard, SpeechOutcome, SpeechPriority,
    SpeechSynthesizer,
};
