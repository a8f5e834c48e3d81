//! HTTP surface: the sync endpoint and a health check.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

use crate::errors::SyncError;
use crate::model::{Caller, SyncRequest, SyncResponse};
use crate::sync::SyncService;

pub const INTERNAL_TOKEN_HEADER: &str = "x-internal-token";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SyncService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/claims/sync", post(sync_claims))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn sync_claims(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<SyncRequest>, JsonRejection>,
) -> Result<Json<SyncResponse>, SyncError> {
    let Json(request) = body.map_err(|rejection| {
        SyncError::Validation(format!("invalid request body: {}", rejection.body_text()))
    })?;
    let caller = caller_from_headers(&headers);
    state.service.sync(&caller, request).await.map(Json)
}

/// The internal token header wins over a session bearer token.
pub fn caller_from_headers(headers: &HeaderMap) -> Caller {
    if let Some(token) = header_value(headers, INTERNAL_TOKEN_HEADER) {
        return Caller::Internal(token.to_string());
    }
    match header_value(headers, header::AUTHORIZATION.as_str())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
    {
        Some(token) if !token.is_empty() => Caller::Session(token.to_string()),
        _ => Caller::Anonymous,
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'static str>,
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let (status, hint) = match &self {
            SyncError::Validation(_) => (StatusCode::BAD_REQUEST, None),
            SyncError::Auth(_) => (StatusCode::UNAUTHORIZED, None),
            SyncError::Timeout(_) => (
                StatusCode::GATEWAY_TIMEOUT,
                Some("narrow the date range or sync fewer accounts per request"),
            ),
            SyncError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };
        if status.is_server_error() {
            error!(code = self.code(), err = %self, "sync request failed");
        } else {
            warn!(code = self.code(), err = %self, "sync request rejected");
        }

        let body = ErrorBody {
            success: false,
            error: self.to_string(),
            code: self.code(),
            hint,
        };
        (status, Json(body)).into_response()
    }
}
