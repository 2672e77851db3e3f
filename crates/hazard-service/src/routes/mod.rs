//! Route handlers

pub mod admin;
pub mod alerts;
pub mod detections;
pub mod hazards;
