use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use ldesk_sync::{EntityRef, SyncJob, SyncTarget};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_core_error, map_sync_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct SyncRequest {
    pub target: SyncTarget,
    /// Any accepted location identifier shape.
    pub id: String,
}

#[derive(Debug, Serialize)]
pub(super) struct SyncAccepted {
    /// The request attached to a job that was already running.
    pub coalesced: bool,
    pub job: SyncJob,
}

#[derive(Debug, Serialize)]
pub(super) struct SyncCancelled {
    pub cancelled: bool,
    pub job: SyncJob,
}

fn parse_entity(req_id: &RequestId, target: &str, id: &str) -> Result<EntityRef, ApiError> {
    target
        .parse::<SyncTarget>()
        .and_then(|target| EntityRef::parse(target, id))
        .map_err(|e| map_core_error(req_id.0.clone(), &e))
}

/// Starts (or joins) a sync job and returns immediately with its snapshot.
pub(super) async fn request_sync(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<SyncRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SyncAccepted>>), ApiError> {
    let handle = state
        .sync
        .request_sync(body.target, &body.id)
        .map_err(|e| map_sync_error(req_id.0.clone(), &e))?;

    let data = SyncAccepted {
        coalesced: handle.coalesced,
        job: handle.snapshot(),
    };
    Ok((StatusCode::ACCEPTED, Json(ApiResponse::new(req_id.0, data))))
}

pub(super) async fn sync_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((target, id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<SyncJob>>, ApiError> {
    let entity = parse_entity(&req_id, &target, &id)?;
    let job = state.sync.sync_status(&entity);
    Ok(Json(ApiResponse::new(req_id.0, job)))
}

pub(super) async fn cancel_sync(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((target, id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<SyncCancelled>>, ApiError> {
    let entity = parse_entity(&req_id, &target, &id)?;
    let cancelled = state.sync.cancel_sync(&entity);
    let data = SyncCancelled {
        cancelled,
        job: state.sync.sync_status(&entity),
    };
    Ok(Json(ApiResponse::new(req_id.0, data)))
}
