//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use navia_core::{
    CameraCapture, ChatInferenceClient, ChatMessage, Coordinate, Fix, GeocodingClient, Haptics,
    LocationSource, ManeuverType, NaviaConfig, NaviaError, NaviaResult, Navigator,
    NavigatorServices, Place, Route, RoutingClient, SpeechSynthesizer, Step,
    VisionInferenceClient,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

/// Records every utterance; each lasts `hold` unless stopped.
pub struct RecordingSynth {
    spoken: Mutex<Vec<String>>,
    stops: AtomicUsize,
    hold: Duration,
    stopped: Notify,
}

impl RecordingSynth {
    pub fn new(hold: Duration) -> Arc<Self> {
        Arc::new(Self {
            spoken: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
            hold,
            stopped: Notify::new(),
        })
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for RecordingSynth {
    async fn speak(&self, text: &str) -> NaviaResult<()> {
        self.spoken.lock().unwrap().push(text.to_string());
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

#[derive(Default)]
pub struct CountingHaptics {
    pulses: AtomicUsize,
}

impl CountingHaptics {
    pub fn pulses(&self) -> usize {
        self.pulses.load(Ordering::SeqCst)
    }
}

impl Haptics for CountingHaptics {
    fn pulse(&self) {
        self.pulses.fetch_add(1, Ordering::SeqCst);
    }
}

/// Fixed current fix; `subscribe` hands out a receiver fed by `sender()`.
pub struct ScriptedLocation {
    fix: Fix,
    granted: bool,
    tx: Mutex<Option<mpsc::Sender<Fix>>>,
    rx: Mutex<Option<mpsc::Receiver<Fix>>>,
}

impl ScriptedLocation {
    pub fn at(fix: Fix) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(32);
        Arc::new(Self {
            fix,
            granted: true,
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
        })
    }

    pub fn denied(fix: Fix) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(32);
        Arc::new(Self {
            fix,
            granted: false,
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
        })
    }

    pub fn sender(&self) -> mpsc::Sender<Fix> {
        self.tx.lock().unwrap().clone().expect("sender taken")
    }

    /// Drop the test-side sender so the subscription closes once drained.
    pub fn close(&self) {
        self.tx.lock().unwrap().take();
    }
}

#[async_trait]
impl LocationSource for ScriptedLocation {
    async fn request_permission(&self) -> NaviaResult<bool> {
        Ok(self.granted)
    }

    async fn current_fix(&self) -> NaviaResult<Fix> {
        Ok(self.fix)
    }

    async fn subscribe(&self) -> NaviaResult<mpsc::Receiver<Fix>> {
        self.rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| NaviaError::NotConfigured("location already subscribed".into()))
    }
}

pub enum Scripted<T> {
    Found(T),
    Missing,
    Down,
}

pub struct ScriptedGeocoder(pub Scripted<Place>);

#[async_trait]
impl GeocodingClient for ScriptedGeocoder {
    async fn resolve(&self, _query: &str) -> NaviaResult<Option<Place>> {
        match &self.0 {
            Scripted::Found(p) => Ok(Some(p.clone())),
            Scripted::Missing => Ok(None),
            Scripted::Down => Err(NaviaError::Http("connection refused".into())),
        }
    }
}

pub struct ScriptedRouter {
    pub answer: Scripted<Route>,
    pub calls: Mutex<Vec<(Coordinate, Coordinate)>>,
}

impl ScriptedRouter {
    pub fn new(answer: Scripted<Route>) -> Arc<Self> {
        Arc::new(Self {
            answer,
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl RoutingClient for ScriptedRouter {
    async fn route(&self, origin: Coordinate, destination: Coordinate) -> NaviaResult<Option<Route>> {
        self.calls.lock().unwrap().push((origin, destination));
        match &self.answer {
            Scripted::Found(r) => Ok(Some(r.clone())),
            Scripted::Missing => Ok(None),
            Scripted::Down => Err(NaviaError::Api {
                status: 503,
                body: "overloaded".into(),
            }),
        }
    }
}

/// Camera that always returns a tiny frame after `delay`.
pub struct ScriptedCamera {
    pub delay: Duration,
    pub captures: AtomicUsize,
}

impl ScriptedCamera {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            captures: AtomicUsize::new(0),
        })
    }

    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CameraCapture for ScriptedCamera {
    async fn capture(&self) -> NaviaResult<Vec<u8>> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(vec![0xff, 0xd8, 0xff, 0xd9])
    }
}

/// Replays scripted answers, then repeats the fallback.
pub struct ScriptedVision {
    answers: Mutex<VecDeque<NaviaResult<String>>>,
    fallback: String,
    pub delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedVision {
    pub fn new(answers: Vec<NaviaResult<String>>, fallback: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into()),
            fallback: fallback.to_string(),
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionInferenceClient for ScriptedVision {
    async fn describe_scene(&self, _image: &[u8]) -> NaviaResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let next = self.answers.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

pub struct ScriptedChat(pub String);

#[async_trait]
impl ChatInferenceClient for ScriptedChat {
    async fn complete(&self, _messages: &[ChatMessage]) -> NaviaResult<String> {
        Ok(self.0.clone())
    }
}

// ~1.11 m per 0.00001 degree of latitude
pub fn south_of(c: Coordinate, meters: f64) -> Fix {
    Fix::new(c.lat - meters / 111_195.0, c.lon)
}

pub const P0: Coordinate = Coordinate {
    lat: 48.8566,
    lon: 2.3522,
};
pub const P1: Coordinate = Coordinate {
    lat: 48.8584,
    lon: 2.3522,
};

pub fn two_step_route() -> Route {
    Route::from_steps(vec![
        Step::new("Turn left", ManeuverType::TurnLeft, P0, 30.0),
        Step::new("Continue straight", ManeuverType::Straight, P1, 200.0),
    ])
}

pub fn library() -> Place {
    Place {
        coordinate: P1,
        display_name: "Central Library".into(),
    }
}

pub struct Harness {
    pub navigator: Arc<Navigator>,
    pub synth: Arc<RecordingSynth>,
    pub haptics: Arc<CountingHaptics>,
    pub location: Arc<ScriptedLocation>,
    pub router: Arc<ScriptedRouter>,
}

pub struct HarnessBuilder {
    pub geocoder: Scripted<Place>,
    pub route: Scripted<Route>,
    pub location: Option<Arc<ScriptedLocation>>,
    pub camera: Option<Arc<ScriptedCamera>>,
    pub vision: Option<Arc<ScriptedVision>>,
    pub chat: Option<String>,
    pub hold: Duration,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            geocoder: Scripted::Found(library()),
            route: Scripted::Found(two_step_route()),
            location: None,
            camera: None,
            vision: None,
            chat: None,
            hold: Duration::from_millis(10),
        }
    }
}

impl HarnessBuilder {
    pub fn build(self) -> Harness {
        let synth = RecordingSynth::new(self.hold);
        let haptics = Arc::new(CountingHaptics::default());
        let location = self
            .location
            .unwrap_or_else(|| ScriptedLocation::at(south_of(P0, 100.0)));
        let router = ScriptedRouter::new(self.route);
        let services = NavigatorServices {
            location: location.clone(),
            geocoder: Arc::new(ScriptedGeocoder(self.geocoder)),
            router: router.clone(),
            haptics: haptics.clone(),
            compass: None,
            camera: self.camera.map(|c| c as Arc<dyn CameraCapture>),
            vision: self.vision.map(|v| v as Arc<dyn VisionInferenceClient>),
            chat: self
                .chat
                .map(|reply| Arc::new(ScriptedChat(reply)) as Arc<dyn ChatInferenceClient>),
        };
        let navigator = Arc::new(Navigator::new(NaviaConfig::default(), synth.clone(), services));
        Harness {
            navigator,
            synth,
            haptics,
            location,
            router,
        }
    }
}
