//! Navia configuration loaded from `config/navia.toml` and the environment.
//!
//! Precedence: built-in defaults < TOML file (`NAVIA_CONFIG` path, default `config/navia`)
//! < `NAVIA__SECTION__KEY` environment variables. Every field has a serde default so a
//! missing file or a partial file is fine.

use crate::error::NaviaResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Known-unhelpful phrases the vision model emits instead of a hazard description.
pub const DEFAULT_ALERT_DENYLIST: &[&str] = &[
    "here is an example",
    "as an ai",
    "i cannot",
    "i can't",
    "i'm sorry",
    "error analyzing surroundings",
    "quota_exceeded",
    "not configured",
    "json format",
];

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NaviaConfig {
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub services: ServicesConfig,
}

/// Step advancement thresholds for the route tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationConfig {
    /// Within this distance of the current waypoint the tracker advances (default 15 m).
    #[serde(default = "default_advance_radius")]
    pub advance_radius_m: f64,
    /// Within this distance the current step is pre-announced once (default 50 m).
    #[serde(default = "default_announce_radius")]
    pub announce_radius_m: f64,
    /// Steps longer than this get an "in N meters" qualifier (default 20 m).
    #[serde(default = "default_qualifier_min")]
    pub distance_qualifier_min_m: f64,
    #[serde(default = "default_arrival_message")]
    pub arrival_message: String,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            advance_radius_m: default_advance_radius(),
            announce_radius_m: default_announce_radius(),
            distance_qualifier_min_m: default_qualifier_min(),
            arrival_message: default_arrival_message(),
        }
    }
}

/// Hazard-alert suppression rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Minimum gap between two spoken alerts (default 5000 ms, inclusive).
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: i64,
    /// Prefix length used by the similarity check (default 10 characters).
    #[serde(default = "default_similarity_prefix")]
    pub similarity_prefix_chars: usize,
    /// Number of distinct recent alerts kept for display (default 3).
    #[serde(default = "default_history_len")]
    pub history_len: usize,
    /// Case-insensitive substrings that are never spoken.
    #[serde(default = "default_denylist")]
    pub denylist: Vec<String>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: default_cooldown_ms(),
            similarity_prefix_chars: default_similarity_prefix(),
            history_len: default_history_len(),
            denylist: default_denylist(),
        }
    }
}

/// Speech channel timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Upper bound on one utterance before the channel force-releases (default 3000 ms).
    #[serde(default = "default_safety_timeout_ms")]
    pub safety_timeout_ms: u64,
    /// How long the channel still reports NAV after a turn instruction ends (default 1000 ms).
    #[serde(default = "default_nav_grace_ms")]
    pub nav_grace_ms: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            safety_timeout_ms: default_safety_timeout_ms(),
            nav_grace_ms: default_nav_grace_ms(),
        }
    }
}

impl SpeechConfig {
    pub fn safety_timeout(&self) -> Duration {
        Duration::from_millis(self.safety_timeout_ms)
    }

    pub fn nav_grace(&self) -> Duration {
        Duration::from_millis(self.nav_grace_ms)
    }
}

/// Live-monitoring loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    /// Delay after each completed cycle (default 200 ms).
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,
    #[serde(default = "default_inference_timeout_ms")]
    pub inference_timeout_ms: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            capture_timeout_ms: default_capture_timeout_ms(),
            inference_timeout_ms: default_inference_timeout_ms(),
        }
    }
}

impl LiveConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }
}

/// Speech-recognition retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// How many times an "initializing" recognizer is retried (default 3).
    #[serde(default = "default_initializing_retries")]
    pub initializing_retries: u32,
    /// Base backoff; attempt N waits N times this (default 1500 ms).
    #[serde(default = "default_initializing_backoff_ms")]
    pub initializing_backoff_ms: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            initializing_retries: default_initializing_retries(),
            initializing_backoff_ms: default_initializing_backoff_ms(),
        }
    }
}

/// Remote endpoints and credentials.
///
/// | Env | Default |
/// |-----|---------|
/// | NAVIA__SERVICES__GROQ_API_KEY or GROQ_API_KEY | unset (vision/chat disabled) |
/// | NAVIA__SERVICES__GROQ_BASE_URL | https://api.groq.com/openai/v1 |
/// | NAVIA__SERVICES__NOMINATIM_URL | https://nominatim.openstreetmap.org |
/// | NAVIA__SERVICES__OSRM_URL | https://router.project-osrm.org |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default)]
    pub groq_api_key: Option<String>,
    #[serde(default = "default_groq_base_url")]
    pub groq_base_url: String,
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_nominatim_url")]
    pub nominatim_url: String,
    #[serde(default = "default_osrm_url")]
    pub osrm_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            groq_api_key: None,
            groq_base_url: default_groq_base_url(),
            vision_model: default_vision_model(),
            chat_model: default_chat_model(),
            nominatim_url: default_nominatim_url(),
            osrm_url: default_osrm_url(),
            user_agent: default_user_agent(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl ServicesConfig {
    /// API key from config, falling back to `GROQ_API_KEY`. Blank keys count as unset.
    pub fn api_key(&self) -> Option<String> {
        self.groq_api_key
            .clone()
            .or_else(|| std::env::var("GROQ_API_KEY").ok())
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl NaviaConfig {
    /// Load config from file and environment. Precedence: env `NAVIA_CONFIG` path > `config/navia.toml` > defaults.
    pub fn load() -> NaviaResult<Self> {
        let config_path =
            std::env::var("NAVIA_CONFIG").unwrap_or_else(|_| "config/navia.toml".to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Load from an explicit file path (skipped when absent), then overlay `NAVIA__*` env vars.
    pub fn load_from(path: &Path) -> NaviaResult<Self> {
        let builder = config::Config::builder();
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };
        let settings = builder
            .add_source(
                config::Environment::with_prefix("NAVIA")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("alerts.denylist")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

fn default_advance_radius() -> f64 {
    15.0
}

fn default_announce_radius() -> f64 {
    50.0
}

fn default_qualifier_min() -> f64 {
    20.0
}

fn default_arrival_message() -> String {
    "You have reached your destination.".to_string()
}

fn default_cooldown_ms() -> i64 {
    5000
}

fn default_similarity_prefix() -> usize {
    10
}

fn default_history_len() -> usize {
    3
}

fn default_denylist() -> Vec<String> {
    DEFAULT_ALERT_DENYLIST.iter().map(|s| s.to_string()).collect()
}

fn default_safety_timeout_ms() -> u64 {
    3000
}

fn default_nav_grace_ms() -> u64 {
    1000
}

fn default_interval_ms() -> u64 {
    200
}

fn default_capture_timeout_ms() -> u64 {
    2000
}

fn default_inference_timeout_ms() -> u64 {
    8000
}

fn default_initializing_retries() -> u32 {
    3
}

fn default_initializing_backoff_ms() -> u64 {
    1500
}

fn default_groq_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_vision_model() -> String {
    "meta-llama/llama-4-scout-17b-16e-instruct".to_string()
}

fn default_chat_model() -> String {
    "llama-3.1-8b-instant".to_string()
}

fn default_nominatim_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_osrm_url() -> String {
    "https://router.project-osrm.org".to_string()
}

fn default_user_agent() -> String {
    "NaviaApp/1.0".to_string()
}

fn default_http_timeout_secs() -> u64 {
    15
}
