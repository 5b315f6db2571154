//! Upgrade request routes

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use eglise_billing::{ReviewDecision, UpgradeRequest};
use eglise_shared::UpgradeRequestStatus;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FileUpgradeRequest {
    pub package_id: Uuid,
    pub capacity: Option<i32>,
    pub reason: Option<String>,
}

pub async fn file_request(
    State(state): State<AppState>,
    Path(church_id): Path<Uuid>,
    Json(req): Json<FileUpgradeRequest>,
) -> ApiResult<(StatusCode, Json<UpgradeRequest>)> {
    let request = state
        .billing
        .upgrade_requests
        .file(church_id, req.package_id, req.capacity, req.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

#[derive(Debug, Deserialize)]
pub struct RequestListQuery {
    pub status: Option<String>,
}

pub async fn list_requests(
    State(state): State<AppState>,
    Query(query): Query<RequestListQuery>,
) -> ApiResult<Json<Vec<UpgradeRequest>>> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(UpgradeRequestStatus::parse(raw).ok_or_else(|| {
            ApiError::BadRequest(format!("unknown upgrade request status '{}'", raw))
        })?),
        None => None,
    };

    let requests = state.billing.upgrade_requests.list(status).await?;
    Ok(Json(requests))
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequestBody {
    pub action: String,
}

/// Approve or reject a pending request. Informational only: no bill is
/// created here; the church proceeds through the upgrade flow itself.
pub async fn review_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Json(body): Json<ReviewRequestBody>,
) -> ApiResult<Json<UpgradeRequest>> {
    let decision = match body.action.as_str() {
        "approve" => ReviewDecision::Approve,
        "reject" => ReviewDecision::Reject,
        other => {
            return Err(ApiError::BadRequest(format!(
                "action must be 'approve' or 'reject', got '{}'",
                other
            )))
        }
    };

    let request = state
        .billing
        .upgrade_requests
        .review(request_id, decision)
        .await?;
    Ok(Json(request))
}
