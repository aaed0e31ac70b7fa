//! Conversational assistant session.
//!
//! Keeps a bounded history behind a fixed system prompt and recognises the embedded
//! navigation command `NAVIGATE_TO: <place> | <confirmation>` in replies.

use crate::collaborators::{ChatInferenceClient, ChatMessage};
use crate::error::NaviaError;
use crate::route::Coordinate;
use std::sync::Arc;
use tracing::{info, warn};

const SYSTEM_PROMPT: &str = "You are Navia, a warm and patient voice assistant for people who \
are blind or visually impaired. Answer in under 30 words. When the user asks to go somewhere, \
begin your reply with 'NAVIGATE_TO: <place name> | ' followed by a short confirmation, for \
example 'NAVIGATE_TO: Central Library | Okay, finding a walking route to Central Library.'";

const NAVIGATE_MARKER: &str = "NAVIGATE_TO:";

/// Messages kept including the system prompt.
pub const MAX_HISTORY: usize = 10;

pub const CONNECTION_TROUBLE: &str = "I'm having trouble connecting right now.";
pub const NOT_CONFIGURED: &str = "Assistant is not configured. Please check API key.";

/// What to say back, plus a destination when the reply carried a navigation command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub text: String,
    pub navigation_target: Option<String>,
}

impl ChatReply {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            navigation_target: None,
        }
    }
}

/// Split a raw model reply into spoken text and an optional navigation target.
pub fn parse_reply(raw: &str) -> ChatReply {
    let Some(start) = raw.find(NAVIGATE_MARKER) else {
        return ChatReply::plain(raw.trim());
    };
    let command = &raw[start + NAVIGATE_MARKER.len()..];
    let (place, confirmation) = match command.split_once('|') {
        Some((place, rest)) => (place.trim(), rest.trim()),
        None => (command.trim(), ""),
    };
    if place.is_empty() {
        return ChatReply::plain(confirmation);
    }
    let text = if confirmation.is_empty() {
        format!("Navigating to {}", place)
    } else {
        confirmation.to_string()
    };
    ChatReply {
        text,
        navigation_target: Some(place.to_string()),
    }
}

pub struct ChatSession {
    client: Arc<dyn ChatInferenceClient>,
    history: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(client: Arc<dyn ChatInferenceClient>) -> Self {
        Self {
            client,
            history: vec![ChatMessage::system(SYSTEM_PROMPT)],
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Drop everything but the system prompt.
    pub fn reset(&mut self) {
        self.history.truncate(1);
    }

    /// Send one utterance. Never fails: errors become a spoken apology.
    pub async fn converse(&mut self, utterance: &str, location: Option<Coordinate>) -> ChatReply {
        let content = match location {
            Some(c) => format!("(User is at {:.5}, {:.5}) {}", c.lat, c.lon, utterance.trim()),
            None => utterance.trim().to_string(),
        };
        self.history.push(ChatMessage::user(content));
        while self.history.len() > MAX_HISTORY {
            // oldest user/assistant pair after the system prompt
            self.history.drain(1..3);
        }

        match self.client.complete(&self.history).await {
            Ok(raw) => {
                self.history.push(ChatMessage::assistant(raw.clone()));
                let reply = parse_reply(&raw);
                info!(
                    target: "navia::chat",
                    navigation_target = reply.navigation_target.as_deref(),
                    "assistant replied"
                );
                reply
            }
            Err(e) => {
                // keep history paired; the unanswered turn is dropped
                self.history.pop();
                warn!(target: "navia::chat", error = %e, "chat completion failed");
                match e {
                    NaviaError::NotConfigured(_) => ChatReply::plain(NOT_CONFIGURED),
                    _ => ChatReply::plain(CONNECTION_TROUBLE),
                }
            }
        }
    }
}
