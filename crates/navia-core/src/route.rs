//! Route data model shared by the tracker, the routing client and the orchestrator.

use crate::geo;
use serde::{Deserialize, Serialize};

/// A WGS84 point in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        geo::distance_meters(self.lat, self.lon, other.lat, other.lon)
    }

    pub fn bearing_to(&self, other: &Coordinate) -> f64 {
        geo::bearing_degrees(self.lat, self.lon, other.lat, other.lon)
    }
}

/// One location fix from the positioning service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub lat: f64,
    pub lon: f64,
    /// Fused course/heading if the platform reports one.
    #[serde(default, alias = "heading")]
    pub heading_degrees: Option<f64>,
}

impl Fix {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            heading_degrees: None,
        }
    }

    pub fn with_heading(mut self, degrees: f64) -> Self {
        self.heading_degrees = Some(degrees);
        self
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lon)
    }
}

/// Categorical action at a step's waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManeuverType {
    TurnLeft,
    TurnRight,
    Straight,
    Arrive,
    Unknown,
}

/// One ordered route step. Index is positional only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub instruction_text: String,
    pub maneuver_type: ManeuverType,
    /// Maneuver point; `None` when the routing service did not resolve one.
    pub waypoint: Option<Coordinate>,
    pub distance_meters: f64,
}

impl Step {
    pub fn new(
        instruction_text: impl Into<String>,
        maneuver_type: ManeuverType,
        waypoint: Coordinate,
        distance_meters: f64,
    ) -> Self {
        Self {
            instruction_text: instruction_text.into(),
            maneuver_type,
            waypoint: Some(waypoint),
            distance_meters,
        }
    }
}

/// A computed walking route. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub steps: Vec<Step>,
    pub total_distance_meters: f64,
    pub total_duration_seconds: f64,
    #[serde(default)]
    pub polyline: Vec<Coordinate>,
}

impl Route {
    /// Build a route from steps alone; totals are summed from the steps.
    pub fn from_steps(steps: Vec<Step>) -> Self {
        let total_distance_meters = steps.iter().map(|s| s.distance_meters).sum();
        let polyline = steps.iter().filter_map(|s| s.waypoint).collect();
        Self {
            steps,
            total_distance_meters,
            total_duration_seconds: 0.0,
            polyline,
        }
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// "1.2 km, 15 min" for spoken route summaries.
    pub fn summary(&self) -> String {
        format!(
            "{}, {}",
            geo::format_distance(self.total_distance_meters),
            geo::format_duration(self.total_duration_seconds)
        )
    }
}

/// A geocoded place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub coordinate: Coordinate,
    pub display_name: String,
}
