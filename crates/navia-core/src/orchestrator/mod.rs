//! **Navigator**: the orchestrator that owns one walking session.
//!
//! It routes location fixes into the progress tracker, compass readings into turn
//! guidance, camera frames into the alert pipeline and chat replies into route search.
//! Everything it says goes through the one [`SpeechChannel`], so navigation always
//! wins over alerts and chat.

pub mod live;

pub use live::{CycleOutcome, LiveMonitor, VisionCycle};

use crate::alert::{AlertArbiter, AlertDecision, AlertPipeline, SuppressReason};
use crate::collaborators::{
    CameraCapture, ChatInferenceClient, CompassSource, GeocodingClient, Haptics, LocationSource,
    RoutingClient, SpeechSynthesizer, VisionInferenceClient,
};
use crate::config::NaviaConfig;
use crate::error::NaviaResult;
use crate::navigation::{HeadingGuide, RouteProgressTracker, TurnDirection};
use crate::route::{Coordinate, Fix, Place};
use crate::services::chat::{ChatReply, ChatSession, NOT_CONFIGURED};
use crate::speech::{SpeechChannel, SpeechOutcome, SpeechPriority};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const MSG_DESTINATION_NOT_FOUND: &str = "Destination not found.";
pub const MSG_NO_ROUTE: &str = "Could not find a walking route to that location.";
pub const MSG_SERVICE_UNAVAILABLE: &str = "I couldn't reach the map service. Please try again.";
pub const MSG_LOCATION_UNAVAILABLE: &str = "Location not available yet.";
pub const MSG_LOCATION_DENIED: &str = "Location permission is needed for navigation.";
pub const MSG_LIVE_ON: &str = "Navia safety monitoring active.";
pub const MSG_LIVE_OFF: &str = "Navia deactivated.";
pub const MSG_LIVE_UNAVAILABLE: &str = "Camera monitoring is not available.";

/// External collaborators. Camera, vision, chat and compass are optional; without them
/// the matching features stay inert.
#[derive(Clone)]
pub struct NavigatorServices {
    pub location: Arc<dyn LocationSource>,
    pub geocoder: Arc<dyn GeocodingClient>,
    pub router: Arc<dyn RoutingClient>,
    pub haptics: Arc<dyn Haptics>,
    pub compass: Option<Arc<dyn CompassSource>>,
    pub camera: Option<Arc<dyn CameraCapture>>,
    pub vision: Option<Arc<dyn VisionInferenceClient>>,
    pub chat: Option<Arc<dyn ChatInferenceClient>>,
}

/// Result of a route search.
#[derive(Debug, Clone, PartialEq)]
pub enum NavigationStart {
    Started { place: Place, steps: usize },
    EmptyDestination,
    LocationUnavailable,
    DestinationNotFound,
    NoRoute,
    ServiceUnavailable,
    /// Navigation was stopped, or another search began, before this one finished.
    Cancelled,
}

impl NavigationStart {
    pub fn is_started(&self) -> bool {
        matches!(self, NavigationStart::Started { .. })
    }
}

/// Snapshot for status displays and logs.
#[derive(Debug, Clone, Serialize)]
pub struct NavigatorStatus {
    pub status: String,
    pub navigating: bool,
    pub current_step: Option<usize>,
    pub total_steps: Option<usize>,
    pub live_monitoring: bool,
    pub alert_history: Vec<String>,
}

#[derive(Debug, Default)]
struct HeadingState {
    guide: HeadingGuide,
    compass_degrees: Option<f64>,
}

pub struct Navigator {
    config: NaviaConfig,
    channel: SpeechChannel,
    services: NavigatorServices,
    alerts: Arc<AlertPipeline>,
    tracker: Mutex<RouteProgressTracker>,
    /// Bumped by every stop and every new search; a search acts only while it matches.
    nav_generation: AtomicU64,
    heading: Mutex<HeadingState>,
    last_fix: Mutex<Option<Fix>>,
    status: Mutex<String>,
    location_allowed: AtomicBool,
    live_on: AtomicBool,
    chat: tokio::sync::Mutex<Option<ChatSession>>,
    live: tokio::sync::Mutex<Option<LiveMonitor>>,
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Navigator {
    pub fn new(
        config: NaviaConfig,
        synth: Arc<dyn SpeechSynthesizer>,
        services: NavigatorServices,
    ) -> Self {
        let channel = SpeechChannel::new(synth, config.speech.clone());
        let alerts = Arc::new(AlertPipeline::new(
            AlertArbiter::new(config.alerts.clone()),
            channel.clone(),
            Arc::clone(&services.haptics),
        ));
        let chat = services.chat.clone().map(ChatSession::new);
        Self {
            tracker: Mutex::new(RouteProgressTracker::new(config.navigation.clone())),
            nav_generation: AtomicU64::new(0),
            heading: Mutex::new(HeadingState::default()),
            last_fix: Mutex::new(None),
            status: Mutex::new("Ready".to_string()),
            location_allowed: AtomicBool::new(true),
            live_on: AtomicBool::new(false),
            chat: tokio::sync::Mutex::new(chat),
            live: tokio::sync::Mutex::new(None),
            config,
            channel,
            services,
            alerts,
        }
    }

    pub fn channel(&self) -> &SpeechChannel {
        &self.channel
    }

    fn set_status(&self, text: impl Into<String>) {
        *locked(&self.status) = text.into();
    }

    async fn say(&self, priority: SpeechPriority, text: &str) -> SpeechOutcome {
        self.channel.speak(priority, text).await
    }

    /// Ask for location access. On denial one notice is spoken and route search stays off.
    pub async fn request_location_permission(&self) -> bool {
        let granted = match self.services.location.request_permission().await {
            Ok(granted) => granted,
            Err(e) => {
                warn!(target: "navia::nav", error = %e, "location permission request failed");
                false
            }
        };
        self.location_allowed.store(granted, Ordering::SeqCst);
        if granted {
            info!(target: "navia::nav", "location permission granted");
        } else {
            warn!(target: "navia::nav", "location permission denied");
            self.say(SpeechPriority::Nav, MSG_LOCATION_DENIED).await;
        }
        granted
    }

    /// Last fix seen, else a one-shot fix from the location source.
    pub async fn current_location(&self) -> Option<Coordinate> {
        if !self.location_allowed.load(Ordering::SeqCst) {
            return None;
        }
        let cached = *locked(&self.last_fix);
        if let Some(fix) = cached {
            return Some(fix.coordinate());
        }
        match self.services.location.current_fix().await {
            Ok(fix) => {
                *locked(&self.last_fix) = Some(fix);
                Some(fix.coordinate())
            }
            Err(e) => {
                warn!(target: "navia::nav", error = %e, "no current fix");
                None
            }
        }
    }

    /// Geocode, route and start guidance. Any failure leaves no session behind, and a
    /// search overtaken by `stop_navigation` or a newer search ends silently.
    pub async fn start_navigation(&self, destination: &str, origin: Coordinate) -> NavigationStart {
        let destination = destination.trim();
        if destination.is_empty() {
            return NavigationStart::EmptyDestination;
        }
        let generation = self.stop_navigation();
        self.set_status(format!("Searching for {}", destination));
        info!(target: "navia::nav", destination, "route search started");

        let announce = format!("Searching for {}", destination);
        let (_, outcome) = tokio::join!(
            self.say(SpeechPriority::Nav, &announce),
            self.search(destination, origin)
        );

        let message = match &outcome {
            Ok(Some((place, route))) => {
                let first = {
                    let mut tracker = locked(&self.tracker);
                    if !self.is_current_search(generation) {
                        return self.search_cancelled(destination);
                    }
                    tracker.start_route(route.clone());
                    tracker.instruction_for_step(0).unwrap_or_default()
                };
                locked(&self.heading).guide.reset();
                self.set_status(format!("NAV: {}", first));
                info!(
                    target: "navia::nav",
                    place = %place.display_name,
                    steps = route.len(),
                    summary = %route.summary(),
                    "navigation started"
                );
                format!("Route found. {}", first)
            }
            _ if !self.is_current_search(generation) => return self.search_cancelled(destination),
            Ok(None) => MSG_DESTINATION_NOT_FOUND.to_string(),
            Err(SearchFailure::NoRoute) => MSG_NO_ROUTE.to_string(),
            Err(SearchFailure::Unreachable) => MSG_SERVICE_UNAVAILABLE.to_string(),
        };
        if !self.is_current_search(generation) {
            return self.search_cancelled(destination);
        }
        self.channel.supersede(SpeechPriority::Nav, &message).await;

        match outcome {
            Ok(Some((place, route))) => NavigationStart::Started {
                place,
                steps: route.len(),
            },
            Ok(None) => {
                self.set_status(MSG_DESTINATION_NOT_FOUND);
                NavigationStart::DestinationNotFound
            }
            Err(SearchFailure::NoRoute) => {
                self.set_status(MSG_NO_ROUTE);
                NavigationStart::NoRoute
            }
            Err(SearchFailure::Unreachable) => {
                self.set_status(MSG_SERVICE_UNAVAILABLE);
                NavigationStart::ServiceUnavailable
            }
        }
    }

    fn is_current_search(&self, generation: u64) -> bool {
        self.nav_generation.load(Ordering::SeqCst) == generation
    }

    fn search_cancelled(&self, destination: &str) -> NavigationStart {
        info!(target: "navia::nav", destination, "route search overtaken, result dropped");
        NavigationStart::Cancelled
    }

    /// Route search from the current location.
    pub async fn navigate_to(&self, destination: &str) -> NavigationStart {
        match self.current_location().await {
            Some(origin) => self.start_navigation(destination, origin).await,
            None => {
                self.say(SpeechPriority::Nav, MSG_LOCATION_UNAVAILABLE).await;
                NavigationStart::LocationUnavailable
            }
        }
    }

    async fn search(
        &self,
        destination: &str,
        origin: Coordinate,
    ) -> Result<Option<(Place, crate::route::Route)>, SearchFailure> {
        let place = match self.services.geocoder.resolve(destination).await {
            Ok(Some(place)) => place,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!(target: "navia::nav", error = %e, destination, "geocoding failed");
                return Err(SearchFailure::Unreachable);
            }
        };
        match self.services.router.route(origin, place.coordinate).await {
            Ok(Some(route)) if !route.is_empty() => Ok(Some((place, route))),
            Ok(_) => Err(SearchFailure::NoRoute),
            Err(e) => {
                warn!(target: "navia::nav", error = %e, "routing failed");
                Err(SearchFailure::Unreachable)
            }
        }
    }

    /// End the session and invalidate any search still in flight. Returns the new
    /// navigation generation.
    pub fn stop_navigation(&self) -> u64 {
        let generation = self.nav_generation.fetch_add(1, Ordering::SeqCst) + 1;
        locked(&self.tracker).stop_route();
        locked(&self.heading).guide.reset();
        generation
    }

    pub fn is_navigating(&self) -> bool {
        locked(&self.tracker).is_active()
    }

    /// Feed one location fix. Returns what was voiced, if anything.
    ///
    /// Step instructions supersede any NAV utterance still playing, since the tracker
    /// has already moved on. Turn hints only speak into a free channel.
    pub async fn on_fix(&self, fix: Fix) -> Option<String> {
        *locked(&self.last_fix) = Some(fix);

        let (instruction, step_changed) = {
            let mut tracker = locked(&self.tracker);
            let before = tracker.current_step_index();
            let instruction = tracker.update_progress(&fix);
            (instruction, tracker.current_step_index() != before)
        };
        if step_changed {
            locked(&self.heading).guide.reset();
        }

        if let Some(text) = instruction {
            self.set_status(format!("NAV: {}", text));
            let outcome = self.channel.supersede(SpeechPriority::Nav, &text).await;
            return outcome.was_voiced().then_some(text);
        }

        let heading = fix
            .heading_degrees
            .or_else(|| locked(&self.heading).compass_degrees);
        let direction = self.turn_guidance(fix.coordinate(), heading).await?;
        Some(direction.phrase().to_string())
    }

    /// Feed one compass reading and re-check guidance against the last fix.
    pub async fn on_heading(&self, degrees: f64) -> Option<TurnDirection> {
        locked(&self.heading).compass_degrees = Some(degrees);
        let position = locked(&self.last_fix).map(|f| f.coordinate())?;
        self.turn_guidance(position, Some(degrees)).await
    }

    /// Speak a changed turn hint. The label counts as announced only once the phrase
    /// was heard in full; a denied or cut-off hint is offered again on the next reading.
    async fn turn_guidance(&self, position: Coordinate, heading: Option<f64>) -> Option<TurnDirection> {
        let heading = heading?;
        let waypoint = locked(&self.tracker).current_waypoint()?;
        let bearing = position.bearing_to(&waypoint);
        let direction = locked(&self.heading).guide.propose(bearing, heading)?;
        self.set_status(format!("NAV: {}", direction.label()));

        let outcome = self.say(SpeechPriority::Nav, direction.phrase()).await;
        if outcome == SpeechOutcome::Completed {
            locked(&self.heading).guide.commit(direction);
        }
        outcome.was_voiced().then_some(direction)
    }

    /// Run one hazard description through the arbiter at the current wall-clock time.
    pub async fn handle_guidance(&self, guidance: &str) -> AlertDecision {
        self.handle_guidance_at(guidance, chrono::Utc::now().timestamp_millis())
            .await
    }

    pub async fn handle_guidance_at(&self, guidance: &str, now_ms: i64) -> AlertDecision {
        self.handle_guidance_voiced_at(guidance, now_ms).await.0
    }

    /// Arbitrate and report whether the channel actually voiced an accepted alert.
    pub async fn handle_guidance_voiced_at(
        &self,
        guidance: &str,
        now_ms: i64,
    ) -> (AlertDecision, Option<SpeechOutcome>) {
        let (decision, outcome) = self.alerts.handle_voiced(guidance, now_ms).await;
        self.sync_alert_status(&decision);
        (decision, outcome)
    }

    fn sync_alert_status(&self, decision: &AlertDecision) {
        let visible = !matches!(
            decision,
            AlertDecision::Suppressed(SuppressReason::Empty | SuppressReason::Denylisted)
        );
        if visible {
            if let Some(status) = self.alerts.status() {
                self.set_status(status);
            }
        }
    }

    fn vision_cycle(&self) -> Option<VisionCycle> {
        Some(VisionCycle {
            camera: self.services.camera.clone()?,
            vision: self.services.vision.clone()?,
            alerts: Arc::clone(&self.alerts),
            config: self.config.live.clone(),
        })
    }

    /// One-shot capture, describe and arbitrate. Skipped while live monitoring runs.
    pub async fn check_surroundings(&self) -> CycleOutcome {
        if self.is_live_monitoring().await {
            debug!(target: "navia::live", "one-shot check skipped during live monitoring");
            return CycleOutcome::Unavailable;
        }
        let Some(cycle) = self.vision_cycle() else {
            warn!(target: "navia::live", "camera or vision client not configured");
            return CycleOutcome::Unavailable;
        };
        let outcome = cycle.run(&CancellationToken::new()).await;
        if let CycleOutcome::Decided(decision) = &outcome {
            self.sync_alert_status(decision);
        }
        outcome
    }

    pub async fn is_live_monitoring(&self) -> bool {
        self.live.lock().await.as_ref().is_some_and(LiveMonitor::is_running)
    }

    /// Start or stop the live loop. Every actual toggle clears alert memory.
    /// Returns whether monitoring is running afterwards.
    pub async fn set_live_monitoring(&self, on: bool) -> bool {
        let mut live = self.live.lock().await;
        if on == live.is_some() {
            return on;
        }

        if on {
            let Some(cycle) = self.vision_cycle() else {
                drop(live);
                warn!(target: "navia::live", "camera or vision client not configured");
                self.say(SpeechPriority::Chat, MSG_LIVE_UNAVAILABLE).await;
                return false;
            };
            self.alerts.reset();
            *live = Some(LiveMonitor::spawn(cycle));
            self.live_on.store(true, Ordering::SeqCst);
            drop(live);
            self.set_status("LIVE");
            self.say(SpeechPriority::Chat, MSG_LIVE_ON).await;
            true
        } else {
            if let Some(monitor) = live.take() {
                monitor.stop().await;
            }
            self.alerts.reset();
            self.live_on.store(false, Ordering::SeqCst);
            drop(live);
            self.set_status("Ready");
            self.say(SpeechPriority::Chat, MSG_LIVE_OFF).await;
            false
        }
    }

    /// Ask the assistant. A reply carrying a destination starts a route search instead
    /// of being spoken.
    pub async fn converse(&self, utterance: &str, location: Option<Coordinate>) -> ChatReply {
        let reply = {
            let mut chat = self.chat.lock().await;
            match chat.as_mut() {
                Some(session) => session.converse(utterance, location).await,
                None => ChatReply {
                    text: NOT_CONFIGURED.to_string(),
                    navigation_target: None,
                },
            }
        };

        if let Some(target) = reply.navigation_target.as_deref() {
            let origin = match location {
                Some(origin) => Some(origin),
                None => self.current_location().await,
            };
            match origin {
                Some(origin) => {
                    self.start_navigation(target, origin).await;
                }
                None => {
                    self.say(SpeechPriority::Nav, MSG_LOCATION_UNAVAILABLE).await;
                }
            }
        } else {
            self.set_status(format!("Navia: {}", reply.text));
            self.say(SpeechPriority::Chat, &reply.text).await;
        }
        reply
    }

    /// Forget the conversation.
    pub async fn reset_conversation(&self) {
        if let Some(session) = self.chat.lock().await.as_mut() {
            session.reset();
        }
    }

    pub fn status(&self) -> NavigatorStatus {
        let (navigating, current_step, total_steps) = {
            let tracker = locked(&self.tracker);
            (
                tracker.is_active(),
                tracker.current_step_index(),
                tracker.session().map(|s| s.route.len()),
            )
        };
        NavigatorStatus {
            status: locked(&self.status).clone(),
            navigating,
            current_step,
            total_steps,
            live_monitoring: self.live_on.load(Ordering::SeqCst),
            alert_history: self.alerts.history(),
        }
    }

    /// Drain the location subscription in order until cancelled or the source closes.
    pub async fn run_location_pump(&self, token: CancellationToken) -> NaviaResult<()> {
        let mut fixes = self.services.location.subscribe().await?;
        info!(target: "navia::nav", "location updates subscribed");
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                fix = fixes.recv() => match fix {
                    Some(fix) => {
                        self.on_fix(fix).await;
                    }
                    None => {
                        info!(target: "navia::nav", "location source closed");
                        break;
                    }
                },
            }
        }
        Ok(())
    }

    /// Drain compass readings until cancelled. No-op without a compass.
    pub async fn run_compass_pump(&self, token: CancellationToken) -> NaviaResult<()> {
        let Some(compass) = self.services.compass.clone() else {
            return Ok(());
        };
        let mut readings = compass.subscribe().await?;
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                reading = readings.recv() => match reading {
                    Some(degrees) => {
                        self.on_heading(degrees).await;
                    }
                    None => break,
                },
            }
        }
        Ok(())
    }

    /// Stop live monitoring and navigation.
    pub async fn shutdown(&self) {
        let monitor = self.live.lock().await.take();
        if let Some(monitor) = monitor {
            monitor.stop().await;
        }
        self.live_on.store(false, Ordering::SeqCst);
        self.stop_navigation();
        self.channel.interrupt();
    }
}

enum SearchFailure {
    NoRoute,
    Unreachable,
}
