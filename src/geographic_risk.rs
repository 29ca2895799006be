//! Geographic distance and travel-velocity math
//!
//! Great-circle distances use the Haversine formula on a spherical Earth.

use crate::Location;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in kilometres between two coordinates given in degrees
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lon / 2.0).sin().powi(2);
    // Rounding can push `a` slightly outside [0, 1] near antipodes
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Travel between two observed locations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoVelocity {
    pub distance_km: f64,
    pub elapsed_hours: f64,
    pub speed_kmh: f64,
}

impl GeoVelocity {
    /// Measure travel from `from` at `from_at` to `to` at `to_at`.
    ///
    /// Returns `None` when no time elapsed or the second observation precedes the first.
    pub fn between(
        from: &Location,
        from_at: DateTime<Utc>,
        to: &Location,
        to_at: DateTime<Utc>,
    ) -> Option<Self> {
        let elapsed_hours = (to_at - from_at).num_milliseconds() as f64 / 3_600_000.0;
        if elapsed_hours <= 0.0 {
            return None;
        }

        let distance_km = distance_km(from.latitude, from.longitude, to.latitude, to.longitude);

        Some(Self {
            distance_km,
            elapsed_hours,
            speed_kmh: distance_km / elapsed_hours,
        })
    }

    /// Whether a traveller could plausibly cover this distance in this time
    pub fn is_possible(&self, max_speed_kmh: f64, min_distance_km: f64) -> bool {
        !(self.speed_kmh > max_speed_kmh && self.distance_km > min_distance_km)
    }
}
