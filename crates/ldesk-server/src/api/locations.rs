use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use ldesk_core::{normalize_location_id, LocationRecord};
use ldesk_db::{DbError, LocationStore};
use serde::Serialize;

use crate::middleware::RequestId;

use super::{map_core_error, map_db_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub(super) struct LocationItem {
    pub normalized_id: String,
    pub external_id: String,
    pub name: String,
    pub completeness_score: u32,
    pub verified: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<&LocationRecord> for LocationItem {
    fn from(record: &LocationRecord) -> Self {
        Self {
            normalized_id: record.normalized_id.to_string(),
            external_id: record.external_id.clone(),
            name: record.display_name().to_owned(),
            completeness_score: record.completeness_score,
            verified: record.metadata.verified,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct DeletedLocation {
    pub normalized_id: String,
    pub reviews_removed: u64,
}

pub(super) async fn list_locations(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<LocationItem>>>, ApiError> {
    let records = state
        .store
        .list_locations()
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = records.iter().map(LocationItem::from).collect();
    Ok(Json(ApiResponse::new(req_id.0, data)))
}

pub(super) async fn get_location(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(raw_id): Path<String>,
) -> Result<Json<ApiResponse<LocationRecord>>, ApiError> {
    let id = normalize_location_id(&raw_id).map_err(|e| map_core_error(req_id.0.clone(), &e))?;
    let record = state
        .store
        .get_location(&id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .ok_or_else(|| map_db_error(req_id.0.clone(), &DbError::NotFound))?;

    Ok(Json(ApiResponse::new(req_id.0, record)))
}

/// Removes a location and its reviews, cancelling any sync still running
/// for it.
pub(super) async fn delete_location(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(raw_id): Path<String>,
) -> Result<Json<ApiResponse<DeletedLocation>>, ApiError> {
    let id = normalize_location_id(&raw_id).map_err(|e| map_core_error(req_id.0.clone(), &e))?;

    state.sync.forget_location(&id);

    let reviews_removed = state
        .store
        .delete_location(&id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    tracing::info!(location = %id, reviews_removed, "location deleted");

    Ok(Json(ApiResponse::new(
        req_id.0,
        DeletedLocation {
            normalized_id: id.to_string(),
            reviews_removed,
        },
    )))
}
