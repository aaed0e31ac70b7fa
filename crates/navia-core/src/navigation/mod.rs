//! Walking navigation: step progress along a route plus compass-relative turn hints.

pub mod heading;
pub mod tracker;

pub use heading::{HeadingGuide, TurnDirection};
pub use tracker::{format_instruction, NavigationSession, RouteProgressTracker};
