//! **SpeechChannel**: the single voice shared by navigation, hazard alerts and chat.
//!
//! At most one utterance holds the channel. NAV preempts CHAT and ALERT by stopping the
//! current utterance; CHAT and ALERT never preempt each other; anything else arriving while
//! the channel is busy is dropped, except that a superseding request replaces a holder
//! of the same priority. Every utterance is bounded by a safety timeout, so a
//! stalled synthesizer cannot wedge the channel. After a NAV utterance ends the channel
//! keeps reporting "navigation-occupied" for a short grace period.

use crate::config::SpeechConfig;
use crate::error::NaviaResult;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Who is speaking. NAV outranks the other two; CHAT and ALERT share a rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpeechPriority {
    Nav,
    Chat,
    Alert,
}

impl SpeechPriority {
    fn rank(self) -> u8 {
        match self {
            SpeechPriority::Nav => 1,
            SpeechPriority::Chat | SpeechPriority::Alert => 0,
        }
    }

    /// Strictly higher rank only.
    pub fn preempts(self, other: SpeechPriority) -> bool {
        self.rank() > other.rank()
    }
}

/// Text-to-speech primitive. Implement for platform TTS or a headless console voice.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Speak `text`. Resolves when finished, on error, or on the backend's own timeout.
    async fn speak(&self, text: &str) -> NaviaResult<()>;

    /// Silence immediately and make any pending `speak` resolve.
    fn stop(&self);
}

/// How a `speak` request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechOutcome {
    Completed,
    /// A higher-priority request stopped this utterance.
    Preempted,
    /// The channel was busy at equal or higher priority.
    Denied,
    /// The channel was taken over after acquisition but before any sound was made.
    Superseded,
    /// The synthesizer reported an error; the channel was still released.
    Failed,
    /// The safety timeout elapsed first.
    TimedOut,
    /// Nothing left to say after cleaning.
    Empty,
}

impl SpeechOutcome {
    /// True when the utterance actually reached the synthesizer.
    pub fn was_voiced(self) -> bool {
        matches!(
            self,
            SpeechOutcome::Completed | SpeechOutcome::Preempted | SpeechOutcome::TimedOut
        )
    }
}

/// Strip characters TTS engines tend to pronounce literally.
pub fn clean_for_speech(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '[' | ']' | ';' | ':' | ','))
        .collect::<String>()
        .trim()
        .to_string()
}

#[derive(Debug, Clone, Copy)]
struct Occupant {
    priority: SpeechPriority,
    ticket: u64,
}

#[derive(Debug, Default)]
struct ChannelState {
    occupant: Option<Occupant>,
    next_ticket: u64,
    nav_grace_until: Option<Instant>,
}

struct ChannelInner {
    synth: Arc<dyn SpeechSynthesizer>,
    config: SpeechConfig,
    state: Mutex<ChannelState>,
}

impl ChannelInner {
    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release(&self, ticket: u64) {
        let mut state = self.lock();
        let Some(occupant) = state.occupant else {
            return;
        };
        // A preempted holder releasing late must not evict its successor.
        if occupant.ticket != ticket {
            return;
        }
        state.occupant = None;
        if occupant.priority == SpeechPriority::Nav {
            state.nav_grace_until = Some(Instant::now() + self.config.nav_grace());
        }
        debug!(target: "navia::speech", priority = ?occupant.priority, "channel released");
    }

    fn holds(&self, ticket: u64) -> bool {
        self.lock().occupant.is_some_and(|o| o.ticket == ticket)
    }
}

/// Proof of channel ownership. Dropping it releases the channel.
pub struct SpeechGuard {
    inner: Arc<ChannelInner>,
    ticket: u64,
    priority: SpeechPriority,
}

impl SpeechGuard {
    pub fn priority(&self) -> SpeechPriority {
        self.priority
    }

    /// False once a higher-priority request has taken the channel.
    pub fn is_current(&self) -> bool {
        self.inner.holds(self.ticket)
    }

    /// Explicit release; same as dropping the guard.
    pub fn release(self) {}

    /// Voice `text` while holding the channel, then release it. A guard that has
    /// already lost the channel says nothing.
    pub async fn say(self, text: &str) -> SpeechOutcome {
        let cleaned = clean_for_speech(text);
        if cleaned.is_empty() {
            return SpeechOutcome::Empty;
        }
        if !self.is_current() {
            debug!(target: "navia::speech", priority = ?self.priority, "channel taken before speaking");
            return SpeechOutcome::Superseded;
        }

        debug!(target: "navia::speech", priority = ?self.priority, text = %cleaned, "speaking");
        let synth = Arc::clone(&self.inner.synth);
        let timeout = self.inner.config.safety_timeout();
        let outcome = match tokio::time::timeout(timeout, synth.speak(&cleaned)).await {
            Ok(Ok(())) if self.is_current() => SpeechOutcome::Completed,
            Ok(Ok(())) => SpeechOutcome::Preempted,
            Ok(Err(e)) => {
                warn!(target: "navia::speech", error = %e, "speech primitive failed");
                SpeechOutcome::Failed
            }
            Err(_) => {
                warn!(
                    target: "navia::speech",
                    timeout_ms = timeout.as_millis() as u64,
                    "speech timed out, forcing release"
                );
                if self.is_current() {
                    synth.stop();
                }
                SpeechOutcome::TimedOut
            }
        };
        self.release();
        outcome
    }
}

impl Drop for SpeechGuard {
    fn drop(&mut self) {
        self.inner.release(self.ticket);
    }
}

/// Cloneable handle to the shared speech channel.
#[derive(Clone)]
pub struct SpeechChannel {
    inner: Arc<ChannelInner>,
}

impl SpeechChannel {
    pub fn new(synth: Arc<dyn SpeechSynthesizer>, config: SpeechConfig) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                synth,
                config,
                state: Mutex::new(ChannelState::default()),
            }),
        }
    }

    /// Try to take the channel. A strictly higher priority stops the current utterance first.
    pub fn acquire(&self, priority: SpeechPriority) -> Option<SpeechGuard> {
        self.take(priority, false)
    }

    /// Like [`acquire`](Self::acquire), but an equal-priority holder is stopped as well.
    pub fn acquire_superseding(&self, priority: SpeechPriority) -> Option<SpeechGuard> {
        self.take(priority, true)
    }

    fn take(&self, priority: SpeechPriority, supersede: bool) -> Option<SpeechGuard> {
        let preempted = {
            let mut state = self.inner.lock();
            let preempted = match state.occupant {
                None => None,
                Some(current) if priority.preempts(current.priority) => Some(current.priority),
                Some(current) if supersede && !current.priority.preempts(priority) => {
                    Some(current.priority)
                }
                Some(current) => {
                    debug!(
                        target: "navia::speech",
                        requested = ?priority,
                        holder = ?current.priority,
                        "channel busy, request dropped"
                    );
                    return None;
                }
            };
            state.next_ticket += 1;
            let ticket = state.next_ticket;
            state.occupant = Some(Occupant { priority, ticket });
            preempted.map(|p| (p, ticket)).ok_or(ticket)
        };

        let ticket = match preempted {
            Ok((previous, ticket)) => {
                info!(target: "navia::speech", from = ?previous, to = ?priority, "preempting utterance");
                self.inner.synth.stop();
                ticket
            }
            Err(ticket) => ticket,
        };

        Some(SpeechGuard {
            inner: Arc::clone(&self.inner),
            ticket,
            priority,
        })
    }

    /// Acquire, speak and release. The channel is released on completion, error or
    /// safety timeout, whichever comes first.
    pub async fn speak(&self, priority: SpeechPriority, text: &str) -> SpeechOutcome {
        self.speak_with(priority, text, false).await
    }

    /// Speak over an equal-priority holder. Route instructions go through here: a newer
    /// instruction replaces whatever NAV utterance is still playing.
    pub async fn supersede(&self, priority: SpeechPriority, text: &str) -> SpeechOutcome {
        self.speak_with(priority, text, true).await
    }

    async fn speak_with(&self, priority: SpeechPriority, text: &str, supersede: bool) -> SpeechOutcome {
        if clean_for_speech(text).is_empty() {
            return SpeechOutcome::Empty;
        }
        match self.take(priority, supersede) {
            Some(guard) => guard.say(text).await,
            None => SpeechOutcome::Denied,
        }
    }

    /// Stop whatever is playing. The holder's `speak` then completes and releases normally.
    pub fn interrupt(&self) {
        self.inner.synth.stop();
    }

    /// Priority of the current holder, if any.
    pub fn current_priority(&self) -> Option<SpeechPriority> {
        self.inner.lock().occupant.map(|o| o.priority)
    }

    pub fn is_busy(&self) -> bool {
        self.inner.lock().occupant.is_some()
    }

    /// NAV holds the channel, or a NAV utterance ended less than the grace period ago.
    pub fn nav_occupied(&self) -> bool {
        let state = self.inner.lock();
        if state.occupant.is_some_and(|o| o.priority == SpeechPriority::Nav) {
            return true;
        }
        state.nav_grace_until.is_some_and(|until| Instant::now() < until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NaviaError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    struct ScriptedSynth {
        spoken: Mutex<Vec<String>>,
        stops: AtomicUsize,
        hold: Duration,
        fail: bool,
        stopped: Notify,
    }

    impl ScriptedSynth {
        fn new(hold: Duration) -> Arc<Self> {
            Arc::new(Self {
                spoken: Mutex::new(Vec::new()),
                stops: AtomicUsize::new(0),
                hold,
                fail: false,
                stopped: Notify::new(),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                spoken: Mutex::new(Vec::new()),
                stops: AtomicUsize::new(0),
                hold: Duration::ZERO,
                fail: true,
                stopped: Notify::new(),
            })
        }

        fn spoken(&self) -> Vec<String> {
            self.spoken.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for ScriptedSynth {
        async fn speak(&self, text: &str) -> NaviaResult<()> {
            self.spoken.lock().unwrap().push(text.to_string());
            if self.fail {
                return Err(NaviaError::Speech("engine unavailable".into()));
            }
            tokio::select! {
                _ = tokio::time::sleep(self.hold) => {}
                _ = self.stopped.notified() => {}
            }
            Ok(())
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.stopped.notify_waiters();
        }
    }

    fn channel(synth: Arc<ScriptedSynth>) -> SpeechChannel {
        SpeechChannel::new(synth, SpeechConfig::default())
    }

    #[test]
    fn priority_ranks() {
        assert!(SpeechPriority::Nav.preempts(SpeechPriority::Alert));
        assert!(SpeechPriority::Nav.preempts(SpeechPriority::Chat));
        assert!(!SpeechPriority::Chat.preempts(SpeechPriority::Alert));
        assert!(!SpeechPriority::Alert.preempts(SpeechPriority::Chat));
        assert!(!SpeechPriority::Nav.preempts(SpeechPriority::Nav));
    }

    #[test]
    fn cleaning_strips_pronounced_punctuation() {
        assert_eq!(clean_for_speech(" [Car]: on your left; slow, "), "Car on your left slow");
        assert_eq!(clean_for_speech("[;]"), "");
    }

    #[test]
    fn idle_channel_grants_and_guard_releases() {
        let ch = channel(ScriptedSynth::new(Duration::ZERO));
        let guard = ch.acquire(SpeechPriority::Alert).expect("idle channel grants");
        assert_eq!(ch.current_priority(), Some(SpeechPriority::Alert));
        assert!(ch.acquire(SpeechPriority::Chat).is_none());
        assert!(ch.acquire(SpeechPriority::Alert).is_none());
        drop(guard);
        assert!(!ch.is_busy());
    }

    #[test]
    fn nav_acquire_preempts_alert_and_blocks_later_alerts() {
        let synth = ScriptedSynth::new(Duration::ZERO);
        let ch = channel(Arc::clone(&synth));
        let alert = ch.acquire(SpeechPriority::Alert).unwrap();
        let nav = ch.acquire(SpeechPriority::Nav).expect("nav preempts alert");
        assert_eq!(synth.stops.load(Ordering::SeqCst), 1);
        assert!(!alert.is_current());
        assert!(ch.acquire(SpeechPriority::Alert).is_none());

        // late release from the preempted holder leaves NAV in place
        drop(alert);
        assert_eq!(ch.current_priority(), Some(SpeechPriority::Nav));
        drop(nav);
        assert!(!ch.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn nav_speech_stops_running_alert() {
        let synth = ScriptedSynth::new(Duration::from_millis(2000));
        let ch = channel(Arc::clone(&synth));

        let alert_ch = ch.clone();
        let alert = tokio::spawn(async move {
            alert_ch.speak(SpeechPriority::Alert, "Person ahead").await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(ch.current_priority(), Some(SpeechPriority::Alert));

        let nav_ch = ch.clone();
        let nav = tokio::spawn(async move {
            nav_ch.speak(SpeechPriority::Nav, "Turn left in 30 meters.").await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(alert.await.unwrap(), SpeechOutcome::Preempted);
        assert_eq!(ch.current_priority(), Some(SpeechPriority::Nav));
        assert_eq!(
            ch.speak(SpeechPriority::Alert, "Car on your right").await,
            SpeechOutcome::Denied
        );
        assert_eq!(nav.await.unwrap(), SpeechOutcome::Completed);
        assert_eq!(synth.spoken(), vec!["Person ahead", "Turn left in 30 meters."]);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_synth_is_released_by_safety_timeout() {
        let synth = ScriptedSynth::new(Duration::from_secs(60));
        let ch = channel(Arc::clone(&synth));
        let started = Instant::now();
        let outcome = ch.speak(SpeechPriority::Chat, "Hello there").await;
        assert_eq!(outcome, SpeechOutcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(3000));
        assert!(started.elapsed() < Duration::from_millis(3100));
        assert!(!ch.is_busy());
        assert_eq!(synth.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_synth_still_frees_channel() {
        let ch = channel(ScriptedSynth::failing());
        assert_eq!(ch.speak(SpeechPriority::Alert, "Stairs ahead").await, SpeechOutcome::Failed);
        assert!(!ch.is_busy());
        assert_eq!(ch.speak(SpeechPriority::Alert, "Stairs ahead").await, SpeechOutcome::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn nav_grace_period_outlives_utterance() {
        let ch = channel(ScriptedSynth::new(Duration::from_millis(100)));
        assert_eq!(ch.speak(SpeechPriority::Nav, "Turn right.").await, SpeechOutcome::Completed);
        assert!(!ch.is_busy());
        assert!(ch.nav_occupied());

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert!(ch.nav_occupied());
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(!ch.nav_occupied());
    }

    #[tokio::test]
    async fn empty_text_never_takes_channel() {
        let synth = ScriptedSynth::new(Duration::ZERO);
        let ch = channel(Arc::clone(&synth));
        assert_eq!(ch.speak(SpeechPriority::Chat, " ,;: ").await, SpeechOutcome::Empty);
        assert!(synth.spoken().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn superseding_nav_replaces_nav_holder() {
        let synth = ScriptedSynth::new(Duration::from_millis(2000));
        let ch = channel(Arc::clone(&synth));

        let hint = tokio::spawn({
            let ch = ch.clone();
            async move { ch.speak(SpeechPriority::Nav, "Keep going straight").await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        // a plain NAV request cannot interrupt NAV
        assert_eq!(ch.speak(SpeechPriority::Nav, "Turn left now").await, SpeechOutcome::Denied);
        // a superseding one can, and lower priorities cannot supersede NAV
        assert_eq!(
            ch.supersede(SpeechPriority::Chat, "Hello").await,
            SpeechOutcome::Denied
        );
        assert_eq!(
            ch.supersede(SpeechPriority::Nav, "Turn right in 20 meters.").await,
            SpeechOutcome::Completed
        );
        assert_eq!(hint.await.unwrap(), SpeechOutcome::Preempted);
        assert_eq!(
            synth.spoken(),
            vec!["Keep going straight", "Turn right in 20 meters."]
        );
    }

    #[tokio::test]
    async fn guard_taken_over_before_speaking_stays_silent() {
        let synth = ScriptedSynth::new(Duration::ZERO);
        let ch = channel(Arc::clone(&synth));
        let alert = ch.acquire(SpeechPriority::Alert).unwrap();
        let nav = ch.acquire(SpeechPriority::Nav).unwrap();

        assert_eq!(alert.say("Person ahead").await, SpeechOutcome::Superseded);
        assert!(!SpeechOutcome::Superseded.was_voiced());
        assert_eq!(ch.current_priority(), Some(SpeechPriority::Nav));

        assert_eq!(nav.say("Turn left.").await, SpeechOutcome::Completed);
        assert_eq!(synth.spoken(), vec!["Turn left."]);
        assert!(!ch.is_busy());
    }
}
