//! Radius check against a session's anchor position.

use crate::geo::Coordinates;
use serde::Serialize;

/// Outcome of a proximity check. Never a rejection on its own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProximityResult {
    pub within_radius: bool,
    pub distance_meters: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct ProximityChecker {
    radius_meters: f64,
}

impl ProximityChecker {
    pub fn new(radius_meters: f64) -> Self {
        Self { radius_meters }
    }

    pub fn radius_meters(&self) -> f64 {
        self.radius_meters
    }

    /// Distance from `subject` to `anchor`; within radius when `distance <= radius`.
    pub fn check(&self, subject: &Coordinates, anchor: &Coordinates) -> ProximityResult {
        let distance_meters = subject.distance_to(anchor);
        ProximityResult {
            within_radius: distance_meters <= self.radius_meters,
            distance_meters,
        }
    }
}
