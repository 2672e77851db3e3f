//! Great-circle Distance

use crate::coordinate::Coordinate;
use crate::error::GeoError;

/// Mean Earth radius used for the spherical approximation (meters)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two validated coordinates, in meters
pub fn distance(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat().to_radians();
    let lat2 = b.lat().to_radians();
    let d_lat = (b.lat() - a.lat()).to_radians();
    let d_lon = (b.lon() - a.lon()).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1 for antipodal points
    let c = 2.0 * h.min(1.0).sqrt().asin();

    EARTH_RADIUS_M * c
}

/// Haversine distance from raw degrees, validating both points first
pub fn distance_checked(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> Result<f64, GeoError> {
    let a = Coordinate::new(lat1, lon1)?;
    let b = Coordinate::new(lat2, lon2)?;
    Ok(distance(a, b))
}

/// Convert a ground distance in meters to the central angle in radians
pub fn meters_to_radians(meters: f64) -> f64 {
    meters / EARTH_RADIUS_M
}
