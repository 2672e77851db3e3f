//! Validated WGS84 Coordinate

use crate::error::GeoError;
use serde::{Deserialize, Serialize};

/// Valid latitude range (degrees)
pub const LATITUDE_RANGE: (f64, f64) = (-90.0, 90.0);
/// Valid longitude range (degrees)
pub const LONGITUDE_RANGE: (f64, f64) = (-180.0, 180.0);

/// A latitude/longitude pair that has passed range validation.
///
/// The fields are private so every `Coordinate` in the system is known to be
/// in range; deserialization goes through the same check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
struct RawCoordinate {
    lat: f64,
    lon: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = GeoError;

    fn try_from(raw: RawCoordinate) -> Result<Self, Self::Error> {
        Coordinate::new(raw.lat, raw.lon)
    }
}

impl Coordinate {
    /// Validate and build a coordinate. Out-of-range values are rejected, never clamped.
    pub fn new(lat: f64, lon: f64) -> Result<Self, GeoError> {
        if in_range(lat, LATITUDE_RANGE) && in_range(lon, LONGITUDE_RANGE) {
            Ok(Self { lat, lon })
        } else {
            Err(GeoError::InvalidCoordinate { lat, lon })
        }
    }

    /// Latitude in degrees
    pub fn lat(&self) -> f64 {
        self.lat
    }

    /// Longitude in degrees
    pub fn lon(&self) -> f64 {
        self.lon
    }
}

fn in_range(value: f64, range: (f64, f64)) -> bool {
    value.is_finite() && value >= range.0 && value <= range.1
}

/// Arithmetic mean of a set of coordinates, each weighted equally.
///
/// Returns `None` for an empty slice.
pub fn centroid(points: &[Coordinate]) -> Option<Coordinate> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let lat = points.iter().map(|p| p.lat).sum::<f64>() / n;
    let lon = points.iter().map(|p| p.lon).sum::<f64>() / n;
    Some(Coordinate { lat, lon })
}

/// Weighted average of two coordinates (weights are typically detection counts).
///
/// With both weights zero the first coordinate is returned unchanged.
pub fn weighted_midpoint(
    a: Coordinate,
    weight_a: f64,
    b: Coordinate,
    weight_b: f64,
) -> Coordinate {
    let total = weight_a + weight_b;
    if total <= 0.0 {
        return a;
    }
    Coordinate {
        lat: (a.lat * weight_a + b.lat * weight_b) / total,
        lon: (a.lon * weight_a + b.lon * weight_b) / total,
    }
}
