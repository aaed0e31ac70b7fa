//! OpenStreetMap Nominatim geocoder.

use super::{check_status, http_client, trim_base};
use crate::collaborators::GeocodingClient;
use crate::config::ServicesConfig;
use crate::error::{NaviaError, NaviaResult};
use crate::route::{Coordinate, Place};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

/// One hit from `/search?format=json`. Nominatim sends coordinates as strings.
#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
}

pub struct NominatimGeocoder {
    base_url: String,
    client: reqwest::Client,
}

impl NominatimGeocoder {
    pub fn new(config: &ServicesConfig) -> Self {
        Self {
            base_url: trim_base(&config.nominatim_url).to_string(),
            client: http_client(config),
        }
    }
}

/// First hit of a search response, or `None` for an empty result list.
fn parse_search(body: &str) -> NaviaResult<Option<Place>> {
    let hits: Vec<SearchHit> = serde_json::from_str(body)?;
    let Some(hit) = hits.into_iter().next() else {
        return Ok(None);
    };
    let lat = hit
        .lat
        .parse::<f64>()
        .map_err(|e| NaviaError::Parse(format!("lat {:?}: {}", hit.lat, e)))?;
    let lon = hit
        .lon
        .parse::<f64>()
        .map_err(|e| NaviaError::Parse(format!("lon {:?}: {}", hit.lon, e)))?;
    Ok(Some(Place {
        coordinate: Coordinate::new(lat, lon),
        display_name: hit.display_name,
    }))
}

#[async_trait]
impl GeocodingClient for NominatimGeocoder {
    async fn resolve(&self, query: &str) -> NaviaResult<Option<Place>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }
        debug!(target: "navia::services", query, "geocoding");
        let res = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()
            .await?;
        let body = check_status(res).await?.text().await?;
        let place = parse_search(&body)?;
        match &place {
            Some(p) => info!(
                target: "navia::services",
                query,
                lat = p.coordinate.lat,
                lon = p.coordinate.lon,
                "geocoded"
            ),
            None => info!(target: "navia::services", query, "no geocoding match"),
        }
        Ok(place)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_hit() {
        let body = r#"[
            {"place_id": 1, "lat": "48.8583701", "lon": "2.2944813", "display_name": "Tour Eiffel, Paris"},
            {"place_id": 2, "lat": "0", "lon": "0", "display_name": "elsewhere"}
        ]"#;
        let place = parse_search(body).unwrap().unwrap();
        assert!((place.coordinate.lat - 48.8583701).abs() < 1e-9);
        assert!((place.coordinate.lon - 2.2944813).abs() < 1e-9);
        assert_eq!(place.display_name, "Tour Eiffel, Paris");
    }

    #[test]
    fn empty_list_is_not_found() {
        assert!(parse_search("[]").unwrap().is_none());
    }

    #[test]
    fn bad_coordinates_are_parse_errors() {
        let body = r#"[{"lat": "north", "lon": "2.0", "display_name": "x"}]"#;
        assert!(matches!(parse_search(body), Err(NaviaError::Parse(_))));
        assert!(matches!(parse_search("{"), Err(NaviaError::Parse(_))));
    }
}
