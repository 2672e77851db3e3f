//! Detection ingest

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use geo_distance::Coordinate;
use serde::Deserialize;
use std::sync::Arc;
use storage::{Detection, DetectionSource, NewDetection, UserId};
use tracing::debug;
use uuid::Uuid;

use crate::{ApiResult, AppState};

/// Body of a detection report
#[derive(Debug, Deserialize)]
pub struct DetectionRequest {
    pub latitude: f64,
    pub longitude: f64,
    /// GPS horizontal accuracy in meters
    pub accuracy_m: f64,
    /// Signed vertical acceleration peak in g
    pub magnitude_g: f64,
    /// Defaults to the time the report is received
    pub captured_at: Option<DateTime<Utc>>,
    pub user_id: Uuid,
}

/// Store one detection for the next aggregation run
pub async fn submit_detection(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DetectionRequest>,
) -> ApiResult<(StatusCode, Json<Detection>)> {
    let detection = NewDetection {
        coordinate: Coordinate::new(request.latitude, request.longitude)?,
        accuracy_m: request.accuracy_m,
        magnitude_g: request.magnitude_g,
        captured_at: request.captured_at.unwrap_or_else(Utc::now),
        user_id: UserId(request.user_id),
    };

    let stored = state.repository.insert_detection(detection).await?;
    debug!("Accepted detection {} from {}", stored.id, stored.user_id);
    Ok((StatusCode::CREATED, Json(stored)))
}
