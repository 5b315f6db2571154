//! Admin church lifecycle routes

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use eglise_billing::{
    classify_church_state, Bill, Church, ChurchState, ExpiringSubscription, NewChurch,
    SubscribeOutcome,
};
use eglise_shared::BillingCycle;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateChurchRequest {
    #[serde(flatten)]
    pub church: NewChurch,
    /// Optional initial package assignment, following the subscribe rules:
    /// trial activates immediately, paid packages issue a NEW bill.
    pub package_id: Option<Uuid>,
    pub billing_cycle: Option<BillingCycle>,
    pub capacity: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct CreateChurchResponse {
    pub church: Church,
    pub detail: String,
    pub bill_id: Option<Uuid>,
    pub amount: Option<rust_decimal::Decimal>,
}

pub async fn create_church(
    State(state): State<AppState>,
    Json(req): Json<CreateChurchRequest>,
) -> ApiResult<(StatusCode, Json<CreateChurchResponse>)> {
    let billing = &state.billing;
    let church = billing.churches.create(req.church).await?;

    let (detail, bill_id, amount) = match req.package_id {
        None => (
            "Church created. Purchase a package to activate the account.".to_string(),
            None,
            None,
        ),
        Some(package_id) => {
            let cycle = req.billing_cycle.unwrap_or(BillingCycle::Trial);
            let outcome = billing
                .subscriptions
                .subscribe(church.id, package_id, cycle, req.capacity)
                .await?;
            match outcome {
                SubscribeOutcome::TrialActivated(_) => {
                    ("Church created on a trial plan.".to_string(), None, None)
                }
                SubscribeOutcome::BillIssued(bill) => (
                    "Church created. The account activates after payment confirmation."
                        .to_string(),
                    Some(bill.id),
                    Some(bill.amount),
                ),
            }
        }
    };

    let church = billing.churches.get(church.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateChurchResponse {
            church,
            detail,
            bill_id,
            amount,
        }),
    ))
}

pub async fn list_churches(State(state): State<AppState>) -> ApiResult<Json<Vec<Church>>> {
    let churches = state.billing.churches.list().await?;
    Ok(Json(churches))
}

#[derive(Debug, Serialize)]
pub struct ChurchDetailResponse {
    pub church: Church,
    pub state: ChurchState,
    pub subscription: Option<eglise_billing::ChurchSubscription>,
    pub package: Option<eglise_billing::Package>,
    pub bills: Vec<Bill>,
}

pub async fn church_detail(
    State(state): State<AppState>,
    Path(church_id): Path<Uuid>,
) -> ApiResult<Json<ChurchDetailResponse>> {
    let billing = &state.billing;

    let church = billing.churches.get(church_id).await?;
    let subscription = billing.subscriptions.get_for_church(church_id).await?;
    let package = match &subscription {
        Some(sub) => Some(billing.packages.get(sub.package_id).await?),
        None => None,
    };
    let bills = billing.bills.list_for_church(church_id).await?;

    let derived_state = classify_church_state(&church, subscription.as_ref(), package.as_ref());

    Ok(Json(ChurchDetailResponse {
        church,
        state: derived_state,
        subscription,
        package,
        bills,
    }))
}

pub async fn suspend_church(
    State(state): State<AppState>,
    Path(church_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.billing.churches.suspend(church_id).await?;
    Ok(Json(json!({ "detail": "Church suspended" })))
}

pub async fn activate_church(
    State(state): State<AppState>,
    Path(church_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.billing.churches.activate(church_id).await?;
    Ok(Json(json!({ "detail": "Church activated successfully" })))
}

pub async fn soft_delete_church(
    State(state): State<AppState>,
    Path(church_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.billing.churches.soft_delete(church_id).await?;
    Ok(Json(json!({ "detail": "Church deleted" })))
}

pub async fn restore_church(
    State(state): State<AppState>,
    Path(church_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.billing.churches.restore(church_id).await?;
    Ok(Json(json!({ "detail": "Church restored" })))
}

pub async fn hard_delete_church(
    State(state): State<AppState>,
    Path(church_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.billing.churches.hard_delete(church_id).await?;
    Ok(Json(json!({ "detail": "Church permanently deleted" })))
}

#[derive(Debug, Deserialize)]
pub struct ExpiringQuery {
    pub days: Option<i64>,
}

pub async fn expiring_churches(
    State(state): State<AppState>,
    Query(query): Query<ExpiringQuery>,
) -> ApiResult<Json<Vec<ExpiringSubscription>>> {
    let days = query.days.unwrap_or(7).clamp(1, 90);
    let expiring = state.billing.subscriptions.expiring_within(days).await?;
    Ok(Json(expiring))
}
