//! Great-circle distance and coordinate validation.

use crate::error::CoordinateError;
use serde::Serialize;

/// Mean Earth radius used by the haversine formula, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Haversine distance between two points given in degrees, in meters.
///
/// Identical points yield exactly `0.0`.
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    // Rounding can push `a` marginally above 1 for antipodal points.
    let c = 2.0 * a.sqrt().min(1.0).asin();

    c * EARTH_RADIUS_METERS
}

/// A validated WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    latitude: f64,
    longitude: f64,
}

impl Coordinates {
    /// Validate a reported position.
    ///
    /// Latitude must lie in `[-90, 90]`, longitude in `[-180, 180]`, and the
    /// pair must not be `(0, 0)`, which devices report when no fix is available.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(CoordinateError::NotFinite);
        }
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::OutOfRange {
                latitude,
                longitude,
            });
        }
        if latitude == 0.0 && longitude == 0.0 {
            return Err(CoordinateError::Sentinel);
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn distance_to(&self, other: &Coordinates) -> f64 {
        distance_meters(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}
