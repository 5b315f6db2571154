//! Billing audit events
//!
//! Append-only trail of billing-affecting changes, one JSON payload per
//! event. Recording is best-effort: a failed insert is logged and swallowed
//! so audit plumbing can never fail a payment.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillingEventType {
    ChurchCreated,
    SubscriptionCreated,
    TrialActivated,
    BillCreated,
    BillPaid,
    SubscriptionMarkedUnpaid,
    ChurchSuspended,
    ChurchActivated,
    ChurchSoftDeleted,
    ChurchRestored,
    ChurchHardDeleted,
    UpgradeRequestFiled,
    UpgradeRequestReviewed,
}

impl BillingEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingEventType::ChurchCreated => "CHURCH_CREATED",
            BillingEventType::SubscriptionCreated => "SUBSCRIPTION_CREATED",
            BillingEventType::TrialActivated => "TRIAL_ACTIVATED",
            BillingEventType::BillCreated => "BILL_CREATED",
            BillingEventType::BillPaid => "BILL_PAID",
            BillingEventType::SubscriptionMarkedUnpaid => "SUBSCRIPTION_MARKED_UNPAID",
            BillingEventType::ChurchSuspended => "CHURCH_SUSPENDED",
            BillingEventType::ChurchActivated => "CHURCH_ACTIVATED",
            BillingEventType::ChurchSoftDeleted => "CHURCH_SOFT_DELETED",
            BillingEventType::ChurchRestored => "CHURCH_RESTORED",
            BillingEventType::ChurchHardDeleted => "CHURCH_HARD_DELETED",
            BillingEventType::UpgradeRequestFiled => "UPGRADE_REQUEST_FILED",
            BillingEventType::UpgradeRequestReviewed => "UPGRADE_REQUEST_REVIEWED",
        }
    }
}

impl std::fmt::Display for BillingEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored audit event.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BillingEvent {
    pub id: Uuid,
    /// Nullable so the trail survives a hard-deleted tenant.
    pub church_id: Option<Uuid>,
    pub event_type: String,
    pub event_data: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Audit event writer.
#[derive(Clone)]
pub struct BillingEventLogger {
    pool: PgPool,
}

impl BillingEventLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record an event. Never fails the caller.
    pub async fn record(
        &self,
        church_id: Option<Uuid>,
        event_type: BillingEventType,
        event_data: serde_json::Value,
    ) {
        let result = sqlx::query(
            "INSERT INTO billing_events (church_id, event_type, event_data) VALUES ($1, $2, $3)",
        )
        .bind(church_id)
        .bind(event_type.as_str())
        .bind(&event_data)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(
                event_type = %event_type,
                church_id = ?church_id,
                error = %e,
                "Failed to record billing event"
            );
        }
    }

    /// Recent events for one church, newest first.
    pub async fn for_church(
        &self,
        church_id: Uuid,
        limit: i64,
    ) -> Result<Vec<BillingEvent>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, church_id, event_type, event_data, created_at \
             FROM billing_events WHERE church_id = $1 \
             ORDER BY created_at DESC LIMIT $2",
        )
        .bind(church_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}
