//! OSRM walking router.
//!
//! Requests `route/v1/walking/{lon},{lat};{lon},{lat}?overview=full&geometries=geojson&steps=true`
//! and converts the first route's first leg into a [`Route`]. OSRM puts longitude first
//! everywhere; the conversion swaps to `Coordinate { lat, lon }`.

use super::{check_status, http_client, trim_base};
use crate::collaborators::RoutingClient;
use crate::config::ServicesConfig;
use crate::error::NaviaResult;
use crate::route::{Coordinate, ManeuverType, Route, Step};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    #[serde(default)]
    geometry: Option<OsrmGeometry>,
    #[serde(default)]
    legs: Vec<OsrmLeg>,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
struct OsrmLeg {
    #[serde(default)]
    steps: Vec<OsrmStep>,
}

#[derive(Debug, Deserialize)]
struct OsrmStep {
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    name: String,
    maneuver: OsrmManeuver,
}

#[derive(Debug, Deserialize)]
struct OsrmManeuver {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    modifier: Option<String>,
    #[serde(default)]
    location: Option<[f64; 2]>,
    #[serde(default)]
    instruction: Option<String>,
}

impl OsrmManeuver {
    fn maneuver_type(&self) -> ManeuverType {
        if self.kind == "arrive" {
            return ManeuverType::Arrive;
        }
        match self.modifier.as_deref() {
            Some(m) if m.contains("left") => ManeuverType::TurnLeft,
            Some(m) if m.contains("right") => ManeuverType::TurnRight,
            Some("straight") => ManeuverType::Straight,
            None if matches!(self.kind.as_str(), "depart" | "continue" | "new name") => {
                ManeuverType::Straight
            }
            _ => ManeuverType::Unknown,
        }
    }

    /// Service text if present, else composed from type, modifier and street name.
    fn instruction(&self, street: &str) -> String {
        if let Some(text) = self.instruction.as_deref().map(str::trim) {
            if !text.is_empty() {
                return text.to_string();
            }
        }
        let onto = if street.trim().is_empty() {
            String::new()
        } else {
            format!(" onto {}", street.trim())
        };
        match (self.kind.as_str(), self.modifier.as_deref()) {
            ("arrive", _) => "Arrive at your destination".to_string(),
            ("depart", _) if !street.trim().is_empty() => {
                format!("Start walking on {}", street.trim())
            }
            ("depart", _) => "Start walking".to_string(),
            (_, Some("uturn")) => format!("Make a U-turn{}", onto),
            (_, Some("straight")) => format!("Continue straight{}", onto),
            (_, Some("slight left")) => format!("Bear left{}", onto),
            (_, Some("slight right")) => format!("Bear right{}", onto),
            (_, Some(m)) if !m.is_empty() => format!("Turn {}{}", m, onto),
            _ => "Continue straight".to_string(),
        }
    }
}

/// Convert an OSRM response body into the route model. `Ok(None)` when OSRM found no route.
fn parse_route(body: &str) -> NaviaResult<Option<Route>> {
    let response: OsrmResponse = serde_json::from_str(body)?;
    if response.code != "Ok" {
        debug!(target: "navia::services", code = %response.code, "routing returned no route");
        return Ok(None);
    }
    let Some(route) = response.routes.into_iter().next() else {
        return Ok(None);
    };

    let steps: Vec<Step> = route
        .legs
        .into_iter()
        .next()
        .map(|leg| leg.steps)
        .unwrap_or_default()
        .into_iter()
        .map(|s| Step {
            instruction_text: s.maneuver.instruction(&s.name),
            maneuver_type: s.maneuver.maneuver_type(),
            waypoint: s.maneuver.location.map(|[lon, lat]| Coordinate::new(lat, lon)),
            distance_meters: s.distance,
        })
        .collect();
    if steps.is_empty() {
        return Ok(None);
    }

    let polyline = route
        .geometry
        .map(|g| {
            g.coordinates
                .into_iter()
                .map(|[lon, lat]| Coordinate::new(lat, lon))
                .collect()
        })
        .unwrap_or_default();

    Ok(Some(Route {
        steps,
        total_distance_meters: route.distance,
        total_duration_seconds: route.duration,
        polyline,
    }))
}

pub struct OsrmRouter {
    base_url: String,
    client: reqwest::Client,
}

impl OsrmRouter {
    pub fn new(config: &ServicesConfig) -> Self {
        Self {
            base_url: trim_base(&config.osrm_url).to_string(),
            client: http_client(config),
        }
    }

    fn route_url(&self, origin: Coordinate, destination: Coordinate) -> String {
        format!(
            "{}/route/v1/walking/{},{};{},{}",
            self.base_url, origin.lon, origin.lat, destination.lon, destination.lat
        )
    }
}

#[async_trait]
impl RoutingClient for OsrmRouter {
    async fn route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> NaviaResult<Option<Route>> {
        let res = self
            .client
            .get(self.route_url(origin, destination))
            .query(&[("overview", "full"), ("geometries", "geojson"), ("steps", "true")])
            .send()
            .await?;
        let body = check_status(res).await?.text().await?;
        let route = parse_route(&body)?;
        if let Some(r) = &route {
            info!(
                target: "navia::services",
                steps = r.len(),
                distance_m = r.total_distance_meters,
                duration_s = r.total_duration_seconds,
                "walking route computed"
            );
        }
        Ok(route)
    }
}
