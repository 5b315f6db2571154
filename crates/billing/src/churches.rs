//! Church (tenant) lifecycle
//!
//! The activation flags on church and subscription are a function of
//! payment status, trial status, suspension and soft-deletion:
//!
//! - creation → inactive, no subscription;
//! - trial assignment → active immediately, no billing;
//! - paid package assignment → inactive until the bill is paid;
//! - suspend → both flags forced off regardless of payment status,
//!   reversible only via an explicit activate;
//! - soft delete → blocked while the subscription is PAID;
//! - restore → never auto-reactivates;
//! - hard delete → only from the deleted state, removes tenant users.

use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use eglise_shared::PaymentStatus;

use crate::email::BillingEmailService;
use crate::error::{BillingError, BillingResult};
use crate::events::{BillingEventLogger, BillingEventType};
use crate::packages::Package;
use crate::subscriptions::{fetch_subscription_for_update, ChurchSubscription};

const CHURCH_COLUMNS: &str = "id, name, address, city, vicar, asst_vicar1, asst_vicar2, \
     asst_vicar3, diocese_name, email, phone_number, is_active, is_deleted, \
     deleted_at, created_at";

/// A tenant organization.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Church {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub city: String,
    pub vicar: String,
    pub asst_vicar1: Option<String>,
    pub asst_vicar2: Option<String>,
    pub asst_vicar3: Option<String>,
    pub diocese_name: String,
    pub email: String,
    pub phone_number: String,
    pub is_active: bool,
    pub is_deleted: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Derived lifecycle state, for dashboards and the admin panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChurchState {
    Deleted,
    NoSubscription,
    AwaitingPayment,
    Active,
    Suspended,
    Trial,
}

/// Classify a church from its record, subscription and package.
pub fn classify_church_state(
    church: &Church,
    subscription: Option<&ChurchSubscription>,
    package: Option<&Package>,
) -> ChurchState {
    if church.is_deleted {
        return ChurchState::Deleted;
    }

    let Some(subscription) = subscription else {
        return ChurchState::NoSubscription;
    };

    if package.map(|p| p.is_trial).unwrap_or(false) && subscription.is_active {
        return ChurchState::Trial;
    }

    let paid = PaymentStatus::parse(&subscription.payment_status) == Some(PaymentStatus::Paid);
    if paid {
        if church.is_active && subscription.is_active {
            ChurchState::Active
        } else {
            ChurchState::Suspended
        }
    } else {
        ChurchState::AwaitingPayment
    }
}

/// Fields accepted when registering a church.
#[derive(Debug, Clone, Deserialize)]
pub struct NewChurch {
    pub name: String,
    pub address: String,
    pub city: String,
    pub vicar: String,
    pub asst_vicar1: Option<String>,
    pub asst_vicar2: Option<String>,
    pub asst_vicar3: Option<String>,
    pub diocese_name: String,
    pub email: String,
    pub phone_number: String,
}

pub(crate) async fn fetch_church(conn: &mut PgConnection, id: Uuid) -> BillingResult<Church> {
    let church: Option<Church> = sqlx::query_as(&format!(
        "SELECT {CHURCH_COLUMNS} FROM churches WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;
    church.ok_or_else(|| BillingError::NotFound("church".into()))
}

pub(crate) async fn fetch_church_for_update(
    conn: &mut PgConnection,
    id: Uuid,
) -> BillingResult<Church> {
    let church: Option<Church> = sqlx::query_as(&format!(
        "SELECT {CHURCH_COLUMNS} FROM churches WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;
    church.ok_or_else(|| BillingError::NotFound("church".into()))
}

/// Tenant lifecycle service.
pub struct ChurchService {
    pool: PgPool,
    email: BillingEmailService,
    event_logger: BillingEventLogger,
}

impl ChurchService {
    pub fn new(pool: PgPool, email: BillingEmailService) -> Self {
        let event_logger = BillingEventLogger::new(pool.clone());
        Self {
            pool,
            email,
            event_logger,
        }
    }

    /// Register a church. Starts inactive; activation follows from trial
    /// assignment or payment confirmation.
    pub async fn create(&self, new: NewChurch) -> BillingResult<Church> {
        if new.name.trim().is_empty() || new.email.trim().is_empty() {
            return Err(BillingError::Validation(
                "church name and email are required".into(),
            ));
        }

        let church: Church = sqlx::query_as(&format!(
            r#"
            INSERT INTO churches (
                name, address, city, vicar, asst_vicar1, asst_vicar2,
                asst_vicar3, diocese_name, email, phone_number, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, FALSE)
            RETURNING {CHURCH_COLUMNS}
            "#
        ))
        .bind(&new.name)
        .bind(&new.address)
        .bind(&new.city)
        .bind(&new.vicar)
        .bind(&new.asst_vicar1)
        .bind(&new.asst_vicar2)
        .bind(&new.asst_vicar3)
        .bind(&new.diocese_name)
        .bind(&new.email)
        .bind(&new.phone_number)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(church_id = %church.id, name = %church.name, "Church created");
        self.event_logger
            .record(
                Some(church.id),
                BillingEventType::ChurchCreated,
                serde_json::json!({ "name": church.name }),
            )
            .await;
        self.email
            .send_account_created(&church.email, &church.name)
            .await;

        Ok(church)
    }

    pub async fn get(&self, id: Uuid) -> BillingResult<Church> {
        let mut conn = self.pool.acquire().await?;
        fetch_church(&mut conn, id).await
    }

    pub async fn list(&self) -> BillingResult<Vec<Church>> {
        let churches: Vec<Church> = sqlx::query_as(&format!(
            "SELECT {CHURCH_COLUMNS} FROM churches ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(churches)
    }

    /// Force both activation flags off, independent of payment status.
    /// Reversible only via an explicit `activate`.
    pub async fn suspend(&self, id: Uuid) -> BillingResult<()> {
        let mut tx = self.pool.begin().await?;

        let church = fetch_church_for_update(&mut tx, id).await?;

        sqlx::query("UPDATE churches SET is_active = FALSE WHERE id = $1")
            .bind(church.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE church_subscriptions SET is_active = FALSE, updated_at = NOW() \
             WHERE church_id = $1",
        )
        .bind(church.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(church_id = %id, "Church suspended");
        self.event_logger
            .record(Some(id), BillingEventType::ChurchSuspended, serde_json::json!({}))
            .await;
        Ok(())
    }

    /// Reactivate a suspended church. Requires a PAID subscription.
    pub async fn activate(&self, id: Uuid) -> BillingResult<()> {
        let mut tx = self.pool.begin().await?;

        let church = fetch_church_for_update(&mut tx, id).await?;
        if church.is_deleted {
            return Err(BillingError::NotFound("church".into()));
        }

        let subscription = fetch_subscription_for_update(&mut tx, id).await?;
        let paid = subscription
            .as_ref()
            .map(|sub| sub.payment_status == PaymentStatus::Paid.as_str())
            .unwrap_or(false);
        if !paid {
            return Err(BillingError::StateConflict(
                "Church cannot be activated until payment is completed".into(),
            ));
        }

        sqlx::query("UPDATE churches SET is_active = TRUE WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE church_subscriptions SET is_active = TRUE, updated_at = NOW() \
             WHERE church_id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(church_id = %id, "Church activated");
        self.event_logger
            .record(Some(id), BillingEventType::ChurchActivated, serde_json::json!({}))
            .await;
        Ok(())
    }

    /// Soft delete. Blocked while the subscription is PAID: the operator
    /// must mark it unpaid or suspend first, so a paying tenant is never
    /// deleted by accident.
    pub async fn soft_delete(&self, id: Uuid) -> BillingResult<()> {
        let mut tx = self.pool.begin().await?;

        let church = fetch_church_for_update(&mut tx, id).await?;
        if church.is_deleted {
            return Err(BillingError::NotFound("church".into()));
        }

        let subscription = fetch_subscription_for_update(&mut tx, id).await?;
        let paid = subscription
            .as_ref()
            .map(|sub| sub.payment_status == PaymentStatus::Paid.as_str())
            .unwrap_or(false);
        if paid {
            return Err(BillingError::StateConflict(
                "This church has a PAID subscription. Mark payment UNPAID or suspend before deleting."
                    .into(),
            ));
        }

        sqlx::query(
            "UPDATE churches SET is_active = FALSE, is_deleted = TRUE, deleted_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(church_id = %id, "Church soft-deleted");
        self.event_logger
            .record(Some(id), BillingEventType::ChurchSoftDeleted, serde_json::json!({}))
            .await;
        Ok(())
    }

    /// Undo a soft delete. The church stays inactive until the operator
    /// decides otherwise.
    pub async fn restore(&self, id: Uuid) -> BillingResult<()> {
        let mut tx = self.pool.begin().await?;

        let church = fetch_church_for_update(&mut tx, id).await?;
        if !church.is_deleted {
            return Err(BillingError::NotFound("church".into()));
        }

        sqlx::query(
            "UPDATE churches SET is_deleted = FALSE, deleted_at = NULL, is_active = FALSE \
             WHERE id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(church_id = %id, "Church restored");
        self.event_logger
            .record(Some(id), BillingEventType::ChurchRestored, serde_json::json!({}))
            .await;
        Ok(())
    }

    /// Permanently remove a soft-deleted church together with its tenant
    /// users. Subscriptions and bills cascade with the church row.
    pub async fn hard_delete(&self, id: Uuid) -> BillingResult<()> {
        let mut tx = self.pool.begin().await?;

        let church = fetch_church_for_update(&mut tx, id).await?;
        if !church.is_deleted {
            return Err(BillingError::StateConflict(
                "church must be soft-deleted before permanent removal".into(),
            ));
        }

        sqlx::query("DELETE FROM church_users WHERE church_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM churches WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(church_id = %id, "Church permanently deleted");
        self.event_logger
            .record(None, BillingEventType::ChurchHardDeleted, serde_json::json!({ "church_id": id }))
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packages::test_fixtures;
    use crate::subscriptions::test_fixtures::yearly_subscription;
    use rust_decimal_macros::dec;
    use time::macros::date;

    fn church(is_active: bool, is_deleted: bool) -> Church {
        Church {
            id: Uuid::new_v4(),
            name: "St Mary".to_string(),
            address: "1 Church Road".to_string(),
            city: "Kochi".to_string(),
            vicar: "Fr Thomas".to_string(),
            asst_vicar1: None,
            asst_vicar2: None,
            asst_vicar3: None,
            diocese_name: "Kochi Diocese".to_string(),
            email: "st.mary@example.org".to_string(),
            phone_number: "9999999999".to_string(),
            is_active,
            is_deleted,
            deleted_at: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_classify_deleted_wins() {
        let package = test_fixtures::standard(100, dec!(10.00), dec!(5.00));
        let sub = yearly_subscription(&package, date!(2025 - 01 - 01));
        assert_eq!(
            classify_church_state(&church(true, true), Some(&sub), Some(&package)),
            ChurchState::Deleted
        );
    }

    #[test]
    fn test_classify_no_subscription() {
        assert_eq!(
            classify_church_state(&church(false, false), None, None),
            ChurchState::NoSubscription
        );
    }

    #[test]
    fn test_classify_active_paid() {
        let package = test_fixtures::standard(100, dec!(10.00), dec!(5.00));
        let sub = yearly_subscription(&package, date!(2025 - 01 - 01));
        assert_eq!(
            classify_church_state(&church(true, false), Some(&sub), Some(&package)),
            ChurchState::Active
        );
    }

    #[test]
    fn test_classify_suspended_when_paid_but_forced_inactive() {
        let package = test_fixtures::standard(100, dec!(10.00), dec!(5.00));
        let mut sub = yearly_subscription(&package, date!(2025 - 01 - 01));
        sub.is_active = false;
        assert_eq!(
            classify_church_state(&church(false, false), Some(&sub), Some(&package)),
            ChurchState::Suspended
        );
    }

    #[test]
    fn test_classify_awaiting_payment() {
        let package = test_fixtures::standard(100, dec!(10.00), dec!(5.00));
        let mut sub = yearly_subscription(&package, date!(2025 - 01 - 01));
        sub.payment_status = "UNPAID".to_string();
        sub.is_active = false;
        assert_eq!(
            classify_church_state(&church(false, false), Some(&sub), Some(&package)),
            ChurchState::AwaitingPayment
        );
    }

    #[test]
    fn test_classify_trial() {
        let package = test_fixtures::trial(5);
        let mut sub = yearly_subscription(&package, date!(2025 - 01 - 01));
        sub.billing_cycle = "TRIAL".to_string();
        assert_eq!(
            classify_church_state(&church(true, false), Some(&sub), Some(&package)),
            ChurchState::Trial
        );
    }
}
