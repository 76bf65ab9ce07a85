//! Great-circle distance between coordinates.
//!
//! Distances are computed with the haversine formula on a spherical earth.
//! NaN inputs propagate to a NaN result; callers are expected to guard.

use serde::{Deserialize, Serialize};

/// Mean earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Distance to `other` in kilometers.
    pub fn distance_km(&self, other: &Coordinates) -> f64 {
        distance_km(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    /// Distance to `other` in meters.
    pub fn distance_m(&self, other: &Coordinates) -> f64 {
        self.distance_km(other) * 1000.0
    }
}

/// Haversine distance in kilometers.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    // Clamp guards against a > 1.0 from rounding on antipodal points.
    let c = 2.0 * a.sqrt().min(1.0).asin();
    EARTH_RADIUS_KM * c
}

/// Human-readable distance: whole meters below 1 km, otherwise km with one decimal.
pub fn format_distance(km: f64) -> String {
    if km < 1.0 {
        format!("{}m", (km * 1000.0).round() as i64)
    } else {
        format!("{:.1}km", km)
    }
}
