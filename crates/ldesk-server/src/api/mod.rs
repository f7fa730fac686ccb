mod locations;
mod reviews;
mod sync;

use std::{sync::Arc, time::Duration};

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use ldesk_core::{CoreError, ErrorKind};
use ldesk_db::{DbError, Store};
use ldesk_reviews::{BulkCoordinator, LifecycleEngine, PaginationEngine, ReviewError};
use ldesk_sync::{SyncError, SyncOrchestrator};
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, AuthState, RateLimitState, RequestId,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub lifecycle: Arc<LifecycleEngine>,
    pub pages: PaginationEngine,
    pub bulk: Arc<BulkCoordinator>,
    pub sync: SyncOrchestrator,
    /// Absent when the server runs over the in-memory store.
    pub pool: Option<PgPool>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    /// Tells the client to prompt for reconnecting the provider account.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub reauthorize: bool,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn new(request_id: String, data: T) -> Self {
        Self {
            data,
            meta: ResponseMeta::new(request_id),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
                reauthorize: false,
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }

    #[must_use]
    fn reauthorize(mut self) -> Self {
        self.error.reauthorize = true;
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "validation_error" => StatusCode::BAD_REQUEST,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "reauthorize_required" => StatusCode::FORBIDDEN,
            "not_found" => StatusCode::NOT_FOUND,
            "illegal_transition" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "upstream_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

/// Maps an error class onto the API's error codes. Internal failures are
/// logged and reported without detail.
fn from_kind(request_id: String, kind: ErrorKind, error: &dyn std::error::Error) -> ApiError {
    match kind {
        ErrorKind::Validation => ApiError::new(request_id, "validation_error", error.to_string()),
        ErrorKind::NotFound => ApiError::new(request_id, "not_found", error.to_string()),
        ErrorKind::Permission => {
            tracing::warn!(error = %error, "provider authorization insufficient");
            ApiError::new(request_id, "reauthorize_required", error.to_string()).reauthorize()
        }
        ErrorKind::Transient | ErrorKind::Cancelled => {
            tracing::warn!(error = %error, "upstream unavailable");
            ApiError::new(request_id, "upstream_unavailable", error.to_string())
        }
        ErrorKind::Internal => {
            tracing::error!(error = %error, "request failed");
            ApiError::new(request_id, "internal_error", "internal error")
        }
    }
}

pub(super) fn map_core_error(request_id: String, error: &CoreError) -> ApiError {
    from_kind(request_id, error.kind(), error)
}

pub(super) fn map_db_error(request_id: String, error: &DbError) -> ApiError {
    from_kind(request_id, error.kind(), error)
}

pub(super) fn map_review_error(request_id: String, error: &ReviewError) -> ApiError {
    if matches!(error, ReviewError::IllegalTransition { .. }) {
        return ApiError::new(request_id, "illegal_transition", error.to_string());
    }
    from_kind(request_id, error.kind(), error)
}

pub(super) fn map_sync_error(request_id: String, error: &SyncError) -> ApiError {
    match error {
        SyncError::Review(e) => map_review_error(request_id, e),
        other => from_kind(request_id, other.kind(), other),
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/reviews", get(reviews::list_reviews))
        .route("/api/v1/reviews/bulk", post(reviews::submit_bulk_action))
        .route("/api/v1/reviews/{id}", get(reviews::get_review))
        .route(
            "/api/v1/reviews/{id}/reply",
            post(reviews::reply_to_review).put(reviews::update_reply),
        )
        .route(
            "/api/v1/reviews/{id}/reply/reopen",
            post(reviews::reopen_reply),
        )
        .route(
            "/api/v1/reviews/{id}/reply/approve",
            post(reviews::approve_and_post),
        )
        .route("/api/v1/locations", get(locations::list_locations))
        .route(
            "/api/v1/locations/{id}",
            get(locations::get_location).delete(locations::delete_location),
        )
        .route("/api/v1/sync", post(sync::request_sync))
        .route(
            "/api/v1/sync/{target}/{id}",
            get(sync::sync_status).delete(sync::cancel_sync),
        )
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                )),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    let Some(pool) = state.pool.as_ref() else {
        return (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "memory",
                },
                meta,
            }),
        );
    };

    match ldesk_db::health_check(pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(120, Duration::from_secs(60))
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
