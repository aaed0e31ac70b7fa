//! **AlertArbiter**: decides which hazard descriptions from the vision model get spoken.
//!
//! The vision loop runs every few hundred milliseconds and the model output is noisy:
//! blanks, meta-commentary, the same hazard phrased ten ways. The arbiter filters in a
//! fixed order: blank, denylist, (status update), navigation speaking, similar to the
//! last spoken alert, cooldown. Anything surviving is spoken at ALERT priority.

use crate::collaborators::Haptics;
use crate::config::AlertConfig;
use crate::speech::{SpeechChannel, SpeechOutcome, SpeechPriority};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Why an alert was not spoken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    Empty,
    Denylisted,
    NavigationSpeaking,
    Similar,
    Cooldown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertDecision {
    /// Speak this text (original case, untrimmed content).
    Speak(String),
    Suppressed(SuppressReason),
}

impl AlertDecision {
    pub fn is_speak(&self) -> bool {
        matches!(self, AlertDecision::Speak(_))
    }
}

/// Memory of what was last spoken. Cleared whenever live monitoring toggles.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AlertState {
    pub last_spoken_text: Option<String>,
    pub last_spoken_at_ms: Option<i64>,
    /// Newest first.
    pub history: VecDeque<String>,
}

#[derive(Debug)]
pub struct AlertArbiter {
    config: AlertConfig,
    denylist: Vec<String>,
    state: AlertState,
    status: Option<String>,
}

impl AlertArbiter {
    pub fn new(config: AlertConfig) -> Self {
        let denylist = config
            .denylist
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self {
            config,
            denylist,
            state: AlertState::default(),
            status: None,
        }
    }

    /// Latest detection text, spoken or not.
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn state(&self) -> &AlertState {
        &self.state
    }

    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.state.history.iter().map(String::as_str)
    }

    /// Forget spoken-alert memory; called on every live-monitoring toggle.
    pub fn reset(&mut self) {
        self.state = AlertState::default();
        debug!(target: "navia::alert", "alert memory cleared");
    }

    /// Run the decision pipeline. On acceptance the spoken-alert memory is updated here,
    /// so callers only have to voice the returned text.
    pub fn evaluate(&mut self, guidance: &str, now_ms: i64, nav_occupied: bool) -> AlertDecision {
        let trimmed = guidance.trim();
        if trimmed.is_empty() {
            return AlertDecision::Suppressed(SuppressReason::Empty);
        }

        let lowered = trimmed.to_lowercase();
        if self.denylist.iter().any(|phrase| lowered.contains(phrase.as_str())) {
            debug!(target: "navia::alert", guidance = trimmed, "denylisted model output");
            return AlertDecision::Suppressed(SuppressReason::Denylisted);
        }

        self.status = Some(trimmed.to_string());

        if nav_occupied {
            return self.suppress(SuppressReason::NavigationSpeaking, trimmed);
        }
        if self.is_similar(&lowered) {
            return self.suppress(SuppressReason::Similar, trimmed);
        }
        if let Some(last) = self.state.last_spoken_at_ms {
            if now_ms - last <= self.config.cooldown_ms {
                return self.suppress(SuppressReason::Cooldown, trimmed);
            }
        }

        self.remember(guidance, now_ms);
        info!(target: "navia::alert", guidance = trimmed, "alert accepted");
        AlertDecision::Speak(guidance.to_string())
    }

    fn suppress(&self, reason: SuppressReason, guidance: &str) -> AlertDecision {
        debug!(target: "navia::alert", ?reason, guidance, "alert suppressed");
        AlertDecision::Suppressed(reason)
    }

    fn is_similar(&self, lowered: &str) -> bool {
        let Some(previous) = self.state.last_spoken_text.as_deref() else {
            return false;
        };
        let previous = previous.trim().to_lowercase();
        if lowered == previous {
            return true;
        }
        let n = self.config.similarity_prefix_chars;
        if lowered.chars().count() < n || previous.chars().count() < n {
            return false;
        }
        let prefix: String = lowered.chars().take(n).collect();
        previous.contains(&prefix)
    }

    fn remember(&mut self, guidance: &str, now_ms: i64) {
        let trimmed = guidance.trim();
        let duplicate_head = self
            .state
            .history
            .front()
            .is_some_and(|head| head.to_lowercase() == trimmed.to_lowercase());
        if !duplicate_head {
            self.state.history.push_front(trimmed.to_string());
            self.state.history.truncate(self.config.history_len);
        }
        self.state.last_spoken_text = Some(guidance.to_string());
        self.state.last_spoken_at_ms = Some(now_ms);
    }
}

/// The arbiter wired to its outputs: an accepted alert pulses haptics and is spoken
/// at ALERT priority. Shared by one-shot checks and the live loop.
pub struct AlertPipeline {
    arbiter: Mutex<AlertArbiter>,
    channel: SpeechChannel,
    haptics: Arc<dyn Haptics>,
}

impl AlertPipeline {
    pub fn new(arbiter: AlertArbiter, channel: SpeechChannel, haptics: Arc<dyn Haptics>) -> Self {
        Self {
            arbiter: Mutex::new(arbiter),
            channel,
            haptics,
        }
    }

    fn arbiter(&self) -> MutexGuard<'_, AlertArbiter> {
        self.arbiter.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Decide, then voice. Memory is updated on acceptance even if the channel
    /// turns the utterance away.
    pub async fn handle(&self, guidance: &str, now_ms: i64) -> AlertDecision {
        self.handle_voiced(guidance, now_ms).await.0
    }

    /// Like [`handle`](Self::handle), also reporting how the utterance ended. An accepted
    /// alert always pulses haptics; the outcome is `None` only for suppressed alerts.
    pub async fn handle_voiced(
        &self,
        guidance: &str,
        now_ms: i64,
    ) -> (AlertDecision, Option<SpeechOutcome>) {
        let nav_occupied = self.channel.nav_occupied();
        let decision = self.arbiter().evaluate(guidance, now_ms, nav_occupied);
        let AlertDecision::Speak(text) = &decision else {
            return (decision, None);
        };
        self.haptics.pulse();
        let outcome = self.channel.speak(SpeechPriority::Alert, text).await;
        if outcome != SpeechOutcome::Completed {
            debug!(target: "navia::alert", ?outcome, "alert not fully voiced");
        }
        (decision, Some(outcome))
    }

    pub fn reset(&self) {
        self.arbiter().reset();
    }

    pub fn status(&self) -> Option<String> {
        self.arbiter().status().map(str::to_string)
    }

    pub fn history(&self) -> Vec<String> {
        self.arbiter().history().map(str::to_string).collect()
    }
}
