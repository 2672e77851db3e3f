//! HTTP error mapping

use aggregation::AggregationError;
use alerting::AlertError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use geo_distance::GeoError;
use serde_json::json;
use storage::StorageError;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

/// Errors surfaced to HTTP clients
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Unavailable(msg) => {
                tracing::error!("Store unavailable: {}", msg);
                "Hazard store unavailable".to_string()
            }
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unavailable(msg) => ApiError::Unavailable(msg),
            StorageError::NotFound => ApiError::NotFound("Hazard not found".to_string()),
            StorageError::VersionConflict { .. } => ApiError::Conflict(err.to_string()),
            StorageError::InvalidRecord(msg) => ApiError::BadRequest(msg),
        }
    }
}

impl From<GeoError> for ApiError {
    fn from(err: GeoError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<AlertError> for ApiError {
    fn from(err: AlertError) -> Self {
        match err {
            AlertError::Store(e) => e.into(),
            AlertError::InvalidConfig(msg) => ApiError::Internal(msg),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<AggregationError> for ApiError {
    fn from(err: AggregationError) -> Self {
        match err {
            AggregationError::Store(e) => e.into(),
            AggregationError::LockContention { .. } | AggregationError::MergeConflict { .. } => {
                ApiError::Conflict(err.to_string())
            }
            AggregationError::Clustering(e) => ApiError::Internal(e.to_string()),
        }
    }
}
