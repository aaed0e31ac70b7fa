//! Compass-relative turn guidance.
//!
//! The rotation between where the walker faces and where the next waypoint lies is
//! bucketed into fixed bands. Guidance is only re-announced when the band label
//! changes, so heading jitter inside a band stays quiet.

use crate::geo;
use serde::Serialize;
use tracing::debug;

/// Band edges in degrees of |rotation|, in order.
const STRAIGHT_MAX: f64 = 20.0;
const SLIGHT_MAX: f64 = 45.0;
const TURN_MAX: f64 = 90.0;
const SHARP_MAX: f64 = 135.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnDirection {
    GoStraight,
    SlightLeft,
    SlightRight,
    TurnLeft,
    TurnRight,
    SharpLeft,
    SharpRight,
    TurnAround,
}

impl TurnDirection {
    /// Classify a signed rotation in (-180, 180]; negative is left.
    pub fn classify(rotation: f64) -> Self {
        let magnitude = rotation.abs();
        let left = rotation < 0.0;
        if magnitude < STRAIGHT_MAX {
            TurnDirection::GoStraight
        } else if magnitude < SLIGHT_MAX {
            if left {
                TurnDirection::SlightLeft
            } else {
                TurnDirection::SlightRight
            }
        } else if magnitude < TURN_MAX {
            if left {
                TurnDirection::TurnLeft
            } else {
                TurnDirection::TurnRight
            }
        } else if magnitude < SHARP_MAX {
            if left {
                TurnDirection::SharpLeft
            } else {
                TurnDirection::SharpRight
            }
        } else {
            TurnDirection::TurnAround
        }
    }

    /// Classify from the bearing to the target and the current device heading.
    pub fn from_bearings(target_bearing: f64, device_heading: f64) -> Self {
        Self::classify(geo::signed_rotation(target_bearing, device_heading))
    }

    /// On-screen label.
    pub fn label(self) -> &'static str {
        match self {
            TurnDirection::GoStraight => "GO STRAIGHT",
            TurnDirection::SlightLeft => "SLIGHT LEFT",
            TurnDirection::SlightRight => "SLIGHT RIGHT",
            TurnDirection::TurnLeft => "TURN LEFT",
            TurnDirection::TurnRight => "TURN RIGHT",
            TurnDirection::SharpLeft => "SHARP LEFT",
            TurnDirection::SharpRight => "SHARP RIGHT",
            TurnDirection::TurnAround => "TURN AROUND",
        }
    }

    /// Voice phrase.
    pub fn phrase(self) -> &'static str {
        match self {
            TurnDirection::GoStraight => "Keep going straight",
            TurnDirection::SlightLeft => "Bear slightly left",
            TurnDirection::SlightRight => "Bear slightly right",
            TurnDirection::TurnLeft => "Turn left now",
            TurnDirection::TurnRight => "Turn right now",
            TurnDirection::SharpLeft => "Make a sharp left turn",
            TurnDirection::SharpRight => "Make a sharp right turn",
            TurnDirection::TurnAround => "Turn around, you are going the wrong way",
        }
    }
}

/// Label-hysteresis filter over successive heading readings.
#[derive(Debug, Default)]
pub struct HeadingGuide {
    last_announced: Option<TurnDirection>,
}

impl HeadingGuide {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the direction only when its label differs from the last one announced.
    pub fn update(&mut self, target_bearing: f64, device_heading: f64) -> Option<TurnDirection> {
        let direction = self.propose(target_bearing, device_heading)?;
        self.commit(direction);
        Some(direction)
    }

    /// The direction to announce, if its label changed. Nothing is recorded until
    /// [`commit`](Self::commit), so a phrase that never got voiced is offered again.
    pub fn propose(&self, target_bearing: f64, device_heading: f64) -> Option<TurnDirection> {
        let direction = TurnDirection::from_bearings(target_bearing, device_heading);
        if self.last_announced == Some(direction) {
            return None;
        }
        debug!(
            target: "navia::nav",
            label = direction.label(),
            target_bearing,
            device_heading,
            "turn guidance changed"
        );
        Some(direction)
    }

    pub fn commit(&mut self, direction: TurnDirection) {
        self.last_announced = Some(direction);
    }

    pub fn last_announced(&self) -> Option<TurnDirection> {
        self.last_announced
    }

    /// Forget the last label (new step or new route).
    pub fn reset(&mut self) {
        self.last_announced = None;
    }
}
