//! Admin Routes

use aggregation::AggregationSummary;
use axum::{extract::State, Json};
use std::sync::Arc;
use storage::StoreStats;

use crate::{ApiResult, AppState};

/// Run one aggregation pass now
pub async fn process_detections(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<AggregationSummary>> {
    Ok(Json(state.job.run().await?))
}

/// Store-wide counts
pub async fn stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<StoreStats>> {
    Ok(Json(state.repository.stats()?))
}
