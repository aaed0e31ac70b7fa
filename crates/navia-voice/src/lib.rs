//! # Navia Voice - Listening and Talking Without a Screen
//!
//! Voice input arrives through a recognition bridge: an external host that runs the
//! actual recognizer and relays JSON messages. Voice output goes through any
//! [`navia_core::SpeechSynthesizer`]; [`ConsoleVoice`] is the headless one.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      Voice Listener                      │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐    │
//! │  │ Bridge Host  │→ │    Bridge    │→ │ Listen State │    │
//! │  │ (JSON msgs)  │  │  Recognizer  │  │   Machine    │    │
//! │  └──────────────┘  └──────────────┘  └──────────────┘    │
//! │         ↑ START/STOP                        ↓ utterance  │
//! │         └──────────────────────────  Navigator.converse  │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod bridge;
pub mod error;
pub mod listener;
pub mod voice_output;

pub use bridge::{error_from_code, BridgeCommand, BridgeMessage, BridgeRecognizer, STATUS_STARTING};
pub use error::{VoiceError, VoiceResult};
pub use listener::{ListenOutcome, ListenState, VoiceListener};
pub use voice_output::{ConsoleVoice, DEFAULT_WORDS_PER_MINUTE};
