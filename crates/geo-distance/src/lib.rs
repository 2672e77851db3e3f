//! Geo-Distance Utility
//!
//! Coordinate validation and haversine distance on a spherical Earth.
//! Every other crate in the workspace measures space through this one.

mod coordinate;
mod error;
mod haversine;

pub use coordinate::{centroid, weighted_midpoint, Coordinate, LATITUDE_RANGE, LONGITUDE_RANGE};
pub use error::GeoError;
pub use haversine::{distance, distance_checked, meters_to_radians, EARTH_RADIUS_M};
