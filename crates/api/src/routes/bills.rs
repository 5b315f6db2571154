//! Bill routes

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use eglise_billing::{Bill, BillingError};
use eglise_shared::BillStatus;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn list_church_bills(
    State(state): State<AppState>,
    Path(church_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Bill>>> {
    let bills = state.billing.bills.list_for_church(church_id).await?;
    Ok(Json(bills))
}

pub async fn church_bill_detail(
    State(state): State<AppState>,
    Path((church_id, bill_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Bill>> {
    let bill = state.billing.bills.get(bill_id).await?;
    // A church can only read its own bills.
    if bill.church_id != church_id {
        return Err(ApiError::Billing(BillingError::NotFound("bill".into())));
    }
    Ok(Json(bill))
}

#[derive(Debug, Deserialize)]
pub struct BillListQuery {
    pub status: Option<String>,
}

pub async fn list_all_bills(
    State(state): State<AppState>,
    Query(query): Query<BillListQuery>,
) -> ApiResult<Json<Vec<Bill>>> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(
            BillStatus::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown bill status '{}'", raw)))?,
        ),
        None => None,
    };

    let bills = state.billing.bills.list_all(status).await?;
    Ok(Json(bills))
}

pub async fn bill_detail(
    State(state): State<AppState>,
    Path(bill_id): Path<Uuid>,
) -> ApiResult<Json<Bill>> {
    let bill = state.billing.bills.get(bill_id).await?;
    Ok(Json(bill))
}

/// Confirm payment. Applies the bill's frozen `apply` payload to the
/// subscription and activates the church; a second call is a no-op.
pub async fn mark_bill_paid(
    State(state): State<AppState>,
    Path(bill_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.billing.bills.mark_paid(bill_id).await?;
    Ok(Json(json!({ "detail": "Bill marked as paid" })))
}
