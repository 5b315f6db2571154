//! Subscribe / upgrade / dashboard routes

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use eglise_billing::{
    calculate_package_pricing, classify_church_state, ChurchState, NextAction, PricingPreview,
    SubscribeOutcome,
};
use eglise_shared::BillingCycle;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub package_id: Uuid,
    pub billing_cycle: Option<BillingCycle>,
    pub capacity: Option<i32>,
}

pub async fn subscribe(
    State(state): State<AppState>,
    Path(church_id): Path<Uuid>,
    Json(req): Json<SubscribeRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    // Trial packages ignore the cycle; paid packages must supply one.
    let cycle = req.billing_cycle.unwrap_or(BillingCycle::Trial);

    let outcome = state
        .billing
        .subscriptions
        .subscribe(church_id, req.package_id, cycle, req.capacity)
        .await?;

    let body = match outcome {
        SubscribeOutcome::TrialActivated(_) => json!({ "detail": "Trial activated" }),
        SubscribeOutcome::BillIssued(bill) => json!({
            "detail": "Subscription created. Awaiting payment.",
            "bill_id": bill.id,
            "bill_number": bill.bill_number,
            "amount": bill.amount,
        }),
    };

    Ok((StatusCode::CREATED, Json(body)))
}

#[derive(Debug, Deserialize)]
pub struct UpgradeRequestBody {
    pub package_id: Uuid,
    pub billing_cycle: BillingCycle,
    pub capacity: Option<i32>,
}

pub async fn upgrade(
    State(state): State<AppState>,
    Path(church_id): Path<Uuid>,
    Json(req): Json<UpgradeRequestBody>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let bill = state
        .billing
        .subscriptions
        .upgrade(church_id, req.package_id, req.billing_cycle, req.capacity)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "detail": "Upgrade bill generated",
            "bill_id": bill.id,
            "bill_number": bill.bill_number,
            "amount": bill.amount,
            "payment_status": bill.status,
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct AdminEditRequest {
    pub package_id: Option<Uuid>,
    pub billing_cycle: Option<BillingCycle>,
    pub capacity: Option<i32>,
}

pub async fn admin_edit(
    State(state): State<AppState>,
    Path(church_id): Path<Uuid>,
    Json(req): Json<AdminEditRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let bill = state
        .billing
        .subscriptions
        .admin_edit_subscription(church_id, req.package_id, req.billing_cycle, req.capacity)
        .await?;

    let body = match bill {
        Some(bill) => json!({
            "detail": "Subscription updated. Awaiting payment.",
            "bill_id": bill.id,
            "bill_number": bill.bill_number,
            "amount": bill.amount,
        }),
        None => json!({ "detail": "Subscription updated" }),
    };
    Ok(Json(body))
}

pub async fn mark_unpaid(
    State(state): State<AppState>,
    Path(church_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.billing.subscriptions.mark_unpaid(church_id).await?;
    Ok(Json(json!({ "detail": "Subscription marked unpaid" })))
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub church: ChurchSummary,
    pub state: ChurchState,
    pub subscription: Option<SubscriptionSummary>,
    pub pricing: Option<PricingPreview>,
    pub members: MemberSummary,
    pub upgrade_required: bool,
    pub next_action: Option<NextAction>,
}

#[derive(Debug, Serialize)]
pub struct ChurchSummary {
    pub id: Uuid,
    pub name: String,
    pub city: String,
    pub diocese: String,
    pub email: String,
    pub phone: String,
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionSummary {
    pub package: String,
    pub member_limit: Option<i32>,
    pub billing_cycle: String,
    pub payment_status: String,
    pub is_custom: bool,
    pub custom_capacity: Option<i32>,
    pub start_date: Option<time::Date>,
    pub end_date: Option<time::Date>,
    pub credit_balance: rust_decimal::Decimal,
}

#[derive(Debug, Serialize)]
pub struct MemberSummary {
    pub current_count: i64,
    pub allowed_limit: Option<i32>,
    pub remaining: Option<i64>,
}

pub async fn dashboard(
    State(state): State<AppState>,
    Path(church_id): Path<Uuid>,
) -> ApiResult<Json<DashboardResponse>> {
    let billing = &state.billing;

    let church = billing.churches.get(church_id).await?;
    let subscription = billing.subscriptions.get_for_church(church_id).await?;

    let package = match &subscription {
        Some(sub) => Some(billing.packages.get(sub.package_id).await?),
        None => None,
    };

    let derived_state = classify_church_state(&church, subscription.as_ref(), package.as_ref());

    let pricing = match (&subscription, &package) {
        (Some(sub), Some(pkg)) => match sub.cycle() {
            Ok(cycle) => calculate_package_pricing(pkg, cycle)?,
            Err(_) => None,
        },
        _ => None,
    };

    let current_count = billing.subscriptions.member_count(church_id).await?;
    let allowed_limit = package.as_ref().and_then(|pkg| {
        if pkg.is_trial {
            pkg.trial_member_limit
        } else if pkg.is_custom {
            subscription.as_ref().and_then(|sub| sub.custom_capacity)
        } else {
            pkg.member_limit
        }
    });
    let remaining = allowed_limit.map(|limit| i64::from(limit) - current_count);
    let upgrade_required = allowed_limit
        .map(|limit| current_count > i64::from(limit))
        .unwrap_or(false);

    let next_action = billing
        .subscriptions
        .next_subscription_action(church_id)
        .await?;

    let subscription_summary = match (&subscription, &package) {
        (Some(sub), Some(pkg)) => Some(SubscriptionSummary {
            package: pkg.name.clone(),
            member_limit: pkg.member_limit,
            billing_cycle: sub.billing_cycle.clone(),
            payment_status: sub.payment_status.clone(),
            is_custom: pkg.is_custom,
            custom_capacity: sub.custom_capacity,
            start_date: sub.start_date,
            end_date: sub.end_date,
            credit_balance: sub.credit_balance,
        }),
        _ => None,
    };

    Ok(Json(DashboardResponse {
        church: ChurchSummary {
            id: church.id,
            name: church.name,
            city: church.city,
            diocese: church.diocese_name,
            email: church.email,
            phone: church.phone_number,
            is_active: church.is_active,
        },
        state: derived_state,
        subscription: subscription_summary,
        pricing,
        members: MemberSummary {
            current_count,
            allowed_limit,
            remaining,
        },
        upgrade_required,
        next_action,
    }))
}
