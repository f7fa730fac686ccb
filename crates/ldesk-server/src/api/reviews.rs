//! Review read path, reply lifecycle and bulk actions.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use ldesk_core::{
    normalize_location_id, CoreError, Cursor, FilterQuery, ReplyState, ReviewId, ReviewRecord,
    Sentiment,
};
use ldesk_reviews::{BulkReport, ReviewPage, SelectionBatch};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::middleware::RequestId;

use super::{map_core_error, map_review_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Default, Deserialize)]
pub(super) struct ReviewListQuery {
    pub location_id: Option<String>,
    pub rating: Option<i64>,
    pub status: Option<String>,
    pub sentiment: Option<String>,
    /// Reviewer name / text search.
    pub q: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ReplyRequest {
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ApproveRequest {
    #[serde(default)]
    pub text: Option<String>,
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Turns query-string parameters into a validated [`FilterQuery`].
pub(super) fn build_filter(params: &ReviewListQuery) -> Result<FilterQuery, CoreError> {
    let mut query = FilterQuery::new();
    if let Some(raw) = present(params.location_id.as_ref()) {
        query = query.with_location(normalize_location_id(raw)?);
    }
    if let Some(rating) = params.rating {
        query = query.with_rating(rating)?;
    }
    if let Some(raw) = present(params.status.as_ref()) {
        query = query.with_status(raw.parse::<ReplyState>()?);
    }
    if let Some(raw) = present(params.sentiment.as_ref()) {
        query = query.with_sentiment(raw.parse::<Sentiment>()?);
    }
    if let Some(term) = params.q.as_deref() {
        query = query.with_search(term);
    }
    let cursor = present(params.cursor.as_ref())
        .map(str::parse::<Cursor>)
        .transpose()?;
    Ok(query.with_cursor(cursor))
}

pub(super) async fn list_reviews(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(params): Query<ReviewListQuery>,
) -> Result<Json<ApiResponse<ReviewPage>>, ApiError> {
    let query = build_filter(&params).map_err(|e| map_core_error(req_id.0.clone(), &e))?;
    let page = state
        .pages
        .query(query, params.limit)
        .await
        .map_err(|e| map_review_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(req_id.0, page)))
}

pub(super) async fn get_review(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ReviewRecord>>, ApiError> {
    let review = state
        .lifecycle
        .get(ReviewId(id))
        .await
        .map_err(|e| map_review_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(req_id.0, review)))
}

pub(super) async fn reply_to_review(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<ReplyRequest>,
) -> Result<Json<ApiResponse<ReviewRecord>>, ApiError> {
    let review = state
        .lifecycle
        .reply_to_review(ReviewId(id), &body.text)
        .await
        .map_err(|e| map_review_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(req_id.0, review)))
}

pub(super) async fn update_reply(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<ReplyRequest>,
) -> Result<Json<ApiResponse<ReviewRecord>>, ApiError> {
    let review = state
        .lifecycle
        .update_reply(ReviewId(id), &body.text)
        .await
        .map_err(|e| map_review_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(req_id.0, review)))
}

pub(super) async fn reopen_reply(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ReviewRecord>>, ApiError> {
    let review = state
        .lifecycle
        .reopen_reply(ReviewId(id))
        .await
        .map_err(|e| map_review_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(req_id.0, review)))
}

pub(super) async fn approve_and_post(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<ApproveRequest>,
) -> Result<Json<ApiResponse<ReviewRecord>>, ApiError> {
    let review = state
        .lifecycle
        .approve_and_post(ReviewId(id), body.text.as_deref())
        .await
        .map_err(|e| map_review_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(req_id.0, review)))
}

/// Runs a bulk action to completion. The batch runs on its own task so a
/// dropped connection cancels the unstarted items while in-flight ones
/// finish.
pub(super) async fn submit_bulk_action(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(batch): Json<SelectionBatch>,
) -> Result<Json<ApiResponse<BulkReport>>, ApiError> {
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let bulk = Arc::clone(&state.bulk);

    let report = tokio::spawn(async move { bulk.run(batch, &cancel).await })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "bulk action task failed");
            ApiError::new(req_id.0.clone(), "internal_error", "bulk action failed")
        })?;
    guard.disarm();

    Ok(Json(ApiResponse::new(req_id.0, report)))
}
