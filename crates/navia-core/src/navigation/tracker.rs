//! Route progress: turns location fixes into step advances and spoken instructions.
//!
//! Idle → Active on `start_route`, Active → Idle on `stop_route` or a new `start_route`.
//! The step index only moves forward; a walker doubling back simply stops triggering
//! advances.

use crate::config::NavigationConfig;
use crate::route::{Coordinate, Fix, Route, Step};
use tracing::{debug, info};

/// Live navigation state for one route.
#[derive(Debug, Clone)]
pub struct NavigationSession {
    pub route: Route,
    pub current_step_index: usize,
    /// `None` until the first announcement. Never ahead of `current_step_index`.
    pub last_announced_step_index: Option<usize>,
}

impl NavigationSession {
    fn new(route: Route) -> Self {
        Self {
            route,
            current_step_index: 0,
            last_announced_step_index: None,
        }
    }

    /// True once the index has moved past the final step.
    pub fn has_arrived(&self) -> bool {
        self.current_step_index >= self.route.len()
    }
}

/// Owns the active route and produces instructions from location fixes.
#[derive(Debug)]
pub struct RouteProgressTracker {
    config: NavigationConfig,
    session: Option<NavigationSession>,
}

impl RouteProgressTracker {
    pub fn new(config: NavigationConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    /// Begin a route, replacing any active one.
    pub fn start_route(&mut self, route: Route) {
        info!(
            target: "navia::nav",
            steps = route.len(),
            distance_m = route.total_distance_meters,
            "route started"
        );
        self.session = Some(NavigationSession::new(route));
    }

    pub fn stop_route(&mut self) {
        if self.session.take().is_some() {
            info!(target: "navia::nav", "route stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&NavigationSession> {
        self.session.as_ref()
    }

    pub fn current_step_index(&self) -> Option<usize> {
        self.session.as_ref().map(|s| s.current_step_index)
    }

    pub fn last_announced_step_index(&self) -> Option<usize> {
        self.session.as_ref().and_then(|s| s.last_announced_step_index)
    }

    pub fn has_arrived(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.has_arrived())
    }

    /// Waypoint of the step currently being walked toward.
    pub fn current_waypoint(&self) -> Option<Coordinate> {
        let session = self.session.as_ref()?;
        session
            .route
            .step(session.current_step_index)
            .and_then(|s| s.waypoint)
    }

    /// Process one fix. Returns the instruction to speak, if any.
    ///
    /// * within `advance_radius_m` with a further step: advance one step and return its instruction
    /// * within `advance_radius_m` of the final waypoint: move past the end and return the arrival message
    /// * within `announce_radius_m` of a step not yet announced: pre-announce it
    /// * otherwise, or with no resolvable waypoint: nothing
    pub fn update_progress(&mut self, fix: &Fix) -> Option<String> {
        let session = self.session.as_mut()?;
        let step = session.route.step(session.current_step_index)?;
        let waypoint = step.waypoint?;
        let d = fix.coordinate().distance_to(&waypoint);
        let step_count = session.route.len();

        if d < self.config.advance_radius_m {
            session.current_step_index += 1;
            session.last_announced_step_index = Some(session.current_step_index);
            if session.current_step_index < step_count {
                info!(
                    target: "navia::nav",
                    step = session.current_step_index,
                    distance_m = d,
                    "advanced to next step"
                );
            } else {
                info!(target: "navia::nav", distance_m = d, "final waypoint reached");
            }
            let index = session.current_step_index;
            return self.instruction_for_step(index);
        }

        if d < self.config.announce_radius_m
            && session.last_announced_step_index != Some(session.current_step_index)
        {
            session.last_announced_step_index = Some(session.current_step_index);
            debug!(
                target: "navia::nav",
                step = session.current_step_index,
                distance_m = d,
                "pre-announcing step"
            );
            let index = session.current_step_index;
            return self.instruction_for_step(index);
        }

        None
    }

    /// Spoken text for a step; the arrival message for any index past the end.
    /// `None` while idle.
    pub fn instruction_for_step(&self, index: usize) -> Option<String> {
        let session = self.session.as_ref()?;
        Some(format_instruction(session.route.step(index), &self.config))
    }
}

/// "Turn left in 30 meters." for long steps, "Turn left." for short ones,
/// the arrival message when there is no step.
pub fn format_instruction(step: Option<&Step>, config: &NavigationConfig) -> String {
    let Some(step) = step else {
        return config.arrival_message.clone();
    };
    let text = step.instruction_text.trim().trim_end_matches(['.', '!']);
    let text = if text.is_empty() { "Continue straight" } else { text };

    if step.distance_meters > config.distance_qualifier_min_m {
        format!("{} in {} meters.", text, step.distance_meters.round() as i64)
    } else {
        format!("{}.", text)
    }
}
