//! Remote service clients: geocoding, walking routes, scene description and chat.
//!
//! Each client implements one of the collaborator traits so the orchestrator never
//! sees HTTP. Base URLs and credentials come from [`ServicesConfig`].

pub mod chat;
pub mod groq;
pub mod nominatim;
pub mod osrm;

pub use chat::{ChatReply, ChatSession};
pub use groq::GroqClient;
pub use nominatim::NominatimGeocoder;
pub use osrm::OsrmRouter;

use crate::config::ServicesConfig;
use crate::error::{NaviaError, NaviaResult};

/// Shared HTTP client with the configured timeout and user agent.
pub(crate) fn http_client(config: &ServicesConfig) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(config.http_timeout())
        .user_agent(config.user_agent.clone())
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Turn a non-success response into `NaviaError::Api` (or `QuotaExceeded` on 429).
pub(crate) async fn check_status(res: reqwest::Response) -> NaviaResult<reqwest::Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(NaviaError::QuotaExceeded);
    }
    let body = res.text().await.unwrap_or_default();
    Err(NaviaError::Api {
        status: status.as_u16(),
        body,
    })
}

/// Strip one trailing slash so `format!("{}/path", base)` never doubles it.
pub(crate) fn trim_base(url: &str) -> &str {
    url.trim_end_matches('/')
}
