//! Alerting System
//!
//! Turns a driver's position and speed into a short, ranked list of upcoming
//! hazard warnings, plus a caller-side cooldown for repeat suppression.

mod config;
mod cooldown;
mod engine;
pub mod ranking;

pub use config::{AlertEngineConfig, CooldownConfig};
pub use cooldown::{AlertCooldown, CooldownState};
pub use engine::{alert_message, format_distance, severity_label, Alert, AlertEngine};

use storage::StorageError;
use thiserror::Error;

/// Alert query errors
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Invalid coordinate: lat={lat}, lon={lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },
    #[error("Invalid speed: {0} m/s")]
    InvalidSpeed(f64),
    #[error("Invalid alert configuration: {0}")]
    InvalidConfig(String),
    #[error("Store error: {0}")]
    Store(#[from] StorageError),
}
