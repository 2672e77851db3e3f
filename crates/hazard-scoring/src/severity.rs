//! Severity Mapping and Hazard Classification

use serde::{Deserialize, Serialize};

/// Upper end of the severity scale
pub const MAX_SEVERITY: f64 = 10.0;

/// Share of the mean magnitude in the weighted magnitude; the max gets the rest
const MEAN_SHARE: f64 = 0.7;

/// Running summary of absolute triggering magnitudes (g).
///
/// Mergeable without the raw samples, so a hazard's severity can be recomputed
/// exactly when a new cluster strengthens it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MagnitudeSummary {
    /// Number of samples
    pub count: u64,
    /// Mean of |magnitude|
    pub mean: f64,
    /// Sum of squared deviations from the mean
    pub m2: f64,
    /// Largest |magnitude|
    pub max: f64,
}

impl MagnitudeSummary {
    /// Summarize a slice of signed magnitudes
    pub fn from_magnitudes(magnitudes: &[f64]) -> Self {
        let mut summary = Self::default();
        for &m in magnitudes {
            summary.push(m);
        }
        summary
    }

    /// Add one signed magnitude
    pub fn push(&mut self, magnitude: f64) {
        let value = magnitude.abs();
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.max = self.max.max(value);
    }

    /// Combine two summaries (parallel variance update)
    pub fn merge(&self, other: &Self) -> Self {
        if self.count == 0 {
            return *other;
        }
        if other.count == 0 {
            return *self;
        }
        let count = self.count + other.count;
        let n_a = self.count as f64;
        let n_b = other.count as f64;
        let delta = other.mean - self.mean;
        let mean = self.mean + delta * n_b / count as f64;
        let m2 = self.m2 + other.m2 + delta * delta * n_a * n_b / count as f64;
        Self {
            count,
            mean,
            m2,
            max: self.max.max(other.max),
        }
    }

    /// Population standard deviation
    pub fn std_dev(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.m2 / self.count as f64).max(0.0).sqrt()
        }
    }

    /// 70% mean + 30% max
    pub fn weighted_magnitude(&self) -> f64 {
        MEAN_SHARE * self.mean + (1.0 - MEAN_SHARE) * self.max
    }

    /// Severity on the 0-10 scale; `max_magnitude_g` maps to 10
    pub fn severity(&self, max_magnitude_g: f64) -> f64 {
        if self.count == 0 || max_magnitude_g <= 0.0 {
            return 0.0;
        }
        (self.weighted_magnitude() / max_magnitude_g * MAX_SEVERITY).clamp(0.0, MAX_SEVERITY)
    }
}

/// Hazard classification derived from the magnitude pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardType {
    Pothole,
    SpeedBump,
    RoughRoad,
    Unknown,
}

impl HazardType {
    /// Classify from a magnitude summary.
    ///
    /// Speed bumps hit hard and consistently, potholes spike, rough road is a
    /// moderate steady rattle.
    pub fn classify(summary: &MagnitudeSummary) -> Self {
        if summary.count == 0 {
            return HazardType::Unknown;
        }
        let std_dev = summary.std_dev();
        if summary.mean > 2.5 && std_dev < 0.5 {
            HazardType::SpeedBump
        } else if summary.max > 3.5 {
            HazardType::Pothole
        } else if summary.mean > 1.5 && std_dev < 1.0 {
            HazardType::RoughRoad
        } else {
            HazardType::Unknown
        }
    }

    /// Words used in alert messages
    pub fn description(&self) -> &'static str {
        match self {
            HazardType::Pothole => "pothole",
            HazardType::SpeedBump => "speed bump",
            HazardType::RoughRoad => "rough road",
            HazardType::Unknown => "road hazard",
        }
    }
}
