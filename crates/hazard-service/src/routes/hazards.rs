//! Hazard lookup and verification

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use geo_distance::Coordinate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::{Hazard, HazardId, HazardStore, UserId};
use uuid::Uuid;

use crate::{ApiError, ApiResult, AppState};

/// Largest radius a nearby listing may cover (meters)
const MAX_NEARBY_RADIUS_M: f64 = 5000.0;

/// A driver confirming or disputing a hazard
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub user_id: Uuid,
    pub agrees: bool,
}

/// Query parameters for the nearby listing
#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lon: f64,
    /// Search radius in meters (default: 1000)
    pub radius_m: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct NearbyResponse {
    pub hazards: Vec<Hazard>,
    pub count: usize,
}

/// Fetch one hazard by id, active or not
pub async fn get_hazard(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<Json<Hazard>> {
    let hazard = state
        .repository
        .get(HazardId(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Hazard {} not found", id)))?;
    Ok(Json(hazard))
}

/// Active hazards around a point, nearest first
pub async fn list_nearby(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NearbyQuery>,
) -> ApiResult<Json<NearbyResponse>> {
    let center = Coordinate::new(params.lat, params.lon)?;
    let radius_m = params.radius_m.unwrap_or(1000.0);
    if !radius_m.is_finite() || radius_m <= 0.0 || radius_m > MAX_NEARBY_RADIUS_M {
        return Err(ApiError::BadRequest(format!(
            "radius_m must be in (0, {}], got {}",
            MAX_NEARBY_RADIUS_M, radius_m
        )));
    }

    let hazards = state.repository.find_active_near(center, radius_m).await?;
    Ok(Json(NearbyResponse {
        count: hazards.len(),
        hazards,
    }))
}

/// Record a verification and return the rescored hazard
pub async fn verify_hazard(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(request): Json<VerifyRequest>,
) -> ApiResult<Json<Hazard>> {
    let hazard = state
        .job
        .record_verification(HazardId(id), UserId(request.user_id), request.agrees, Utc::now())
        .await?;
    Ok(Json(hazard))
}
