//! Geo Error Types

use thiserror::Error;

/// Errors raised when accepting raw coordinates
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    /// Latitude or longitude outside the valid range, or not a finite number
    #[error("invalid coordinate ({lat}, {lon}): latitude must be in [-90, 90], longitude in [-180, 180]")]
    InvalidCoordinate { lat: f64, lon: f64 },
}
