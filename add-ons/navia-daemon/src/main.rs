//! Navia Daemon (headless walking guide)
//!
//! Runs the Navigator without a phone: location fixes are replayed from a file,
//! camera frames come from a directory, utterances are read from stdin through the
//! recognition bridge, and speech is printed.
//!
//! Environment:
//! * `NAVIA_FIX_REPLAY` - JSON-lines file of fixes (or `NAVIA_START_FIX=lat,lon` for a fixed spot)
//! * `NAVIA_FIX_INTERVAL_MS` - pace of the replay (default 1000)
//! * `NAVIA_FRAMES_DIR` - directory of `.jpg` frames for hazard checks
//! * `NAVIA_DESTINATION` - start navigating right away
//! * `NAVIA_LIVE` - `1`/`true` to start live monitoring at launch

mod commands;
mod replay;

use commands::{dispatch, run_line_host, Flow};
use navia_core::{
    CameraCapture, ChatInferenceClient, Fix, GroqClient, NaviaConfig, Navigator, NavigatorServices,
    NominatimGeocoder, OsrmRouter, VisionInferenceClient,
};
use navia_voice::{BridgeRecognizer, ConsoleVoice, VoiceListener};
use replay::{DirectoryCamera, LogHaptics, ReplayLocationSource};
use std::{path::Path, sync::Arc, time::Duration};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FIX_INTERVAL_MS: u64 = 1000;

type DaemonResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[tokio::main]
async fn main() -> DaemonResult<()> {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[navia-daemon] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = NaviaConfig::load()?;
    let location = Arc::new(location_source().await?);
    let camera = match std::env::var("NAVIA_FRAMES_DIR") {
        Ok(dir) => Some(Arc::new(DirectoryCamera::open(Path::new(&dir)).await?) as Arc<dyn CameraCapture>),
        Err(_) => None,
    };
    let groq = match GroqClient::from_config(&config.services) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!(error = %e, "vision and chat disabled");
            None
        }
    };

    let services = NavigatorServices {
        location: location.clone(),
        geocoder: Arc::new(NominatimGeocoder::new(&config.services)),
        router: Arc::new(OsrmRouter::new(&config.services)),
        haptics: Arc::new(LogHaptics),
        compass: None,
        camera,
        vision: groq.clone().map(|c| c as Arc<dyn VisionInferenceClient>),
        chat: groq.map(|c| c as Arc<dyn ChatInferenceClient>),
    };
    let navigator = Arc::new(Navigator::new(
        config.clone(),
        Arc::new(ConsoleVoice::default()),
        services,
    ));
    let token = CancellationToken::new();

    tracing::info!(
        nominatim = %config.services.nominatim_url,
        osrm = %config.services.osrm_url,
        "Navia daemon started"
    );

    let location_granted = navigator.request_location_permission().await;
    let pump = location_granted.then(|| {
        let navigator = Arc::clone(&navigator);
        let token = token.child_token();
        tokio::spawn(async move {
            if let Err(e) = navigator.run_location_pump(token).await {
                tracing::warn!(error = %e, "location pump stopped");
            }
        })
    });

    if let Ok(destination) = std::env::var("NAVIA_DESTINATION") {
        navigator.navigate_to(&destination).await;
    }
    if std::env::var("NAVIA_LIVE").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true")) {
        navigator.set_live_monitoring(true).await;
    }

    // stdin stands in for the recognizer host
    let bridge = Arc::new(BridgeRecognizer::new());
    let (bridge_tx, bridge_rx) = mpsc::channel(4);
    bridge.register_bridge(bridge_tx);
    let host = tokio::spawn(run_line_host(
        Arc::clone(&bridge),
        bridge_rx,
        BufReader::new(tokio::io::stdin()),
        token.clone(),
    ));

    let listener = Arc::new(VoiceListener::new(bridge, config.voice.clone()));
    let voice_loop = {
        let listener = Arc::clone(&listener);
        let navigator = Arc::clone(&navigator);
        let token = token.clone();
        tokio::spawn(async move {
            let result = listener
                .run(|utterance| {
                    let navigator = Arc::clone(&navigator);
                    let token = token.clone();
                    async move {
                        if dispatch(&navigator, &utterance).await == Flow::Quit {
                            token.cancel();
                        }
                    }
                })
                .await;
            if let Err(e) = result {
                tracing::warn!(error = %e, "voice input stopped");
            }
        })
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("CTRL-C received; shutting down daemon");
        }
        _ = token.cancelled() => {
            tracing::info!("input finished; shutting down daemon");
        }
    }

    token.cancel();
    listener.stop().await;
    navigator.shutdown().await;
    for task in [Some(host), Some(voice_loop), pump].into_iter().flatten() {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "task ended abnormally");
        }
    }
    tracing::info!(status = ?navigator.status(), "Navia daemon stopped");
    Ok(())
}

async fn location_source() -> DaemonResult<ReplayLocationSource> {
    let pace = std::env::var("NAVIA_FIX_INTERVAL_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_FIX_INTERVAL_MS);

    if let Ok(path) = std::env::var("NAVIA_FIX_REPLAY") {
        return Ok(ReplayLocationSource::from_file(Path::new(&path), Duration::from_millis(pace)).await?);
    }
    if let Ok(spot) = std::env::var("NAVIA_START_FIX") {
        let fix = parse_lat_lon(&spot).ok_or_else(|| format!("NAVIA_START_FIX must be \"lat,lon\", got {:?}", spot))?;
        return Ok(ReplayLocationSource::stationary(fix));
    }
    Ok(ReplayLocationSource::unavailable())
}

fn parse_lat_lon(s: &str) -> Option<Fix> {
    let (lat, lon) = s.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lon: f64 = lon.trim().parse().ok()?;
    ((-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)).then(|| Fix::new(lat, lon))
}
