//! Subscription management
//!
//! One subscription per church. All billing-affecting operations here run
//! as a single transaction with the subscription row locked, so two
//! concurrent changes to the same church serialize instead of both
//! succeeding. Two guards hold before any bill-creating edit: at most one
//! outstanding UNPAID bill, and at most one billing-affecting change per
//! calendar day.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use eglise_shared::{BillType, BillingCycle, PaymentStatus, PricingOrigin};

use crate::bills::{
    insert_bill, subscription_billed_on, subscription_has_unpaid_bill, Bill, NewBill,
};
use crate::breakdown::{ApplyPayload, Breakdown, LineItem};
use crate::churches::fetch_church_for_update;
use crate::dates::add_months;
use crate::email::BillingEmailService;
use crate::error::{BillingError, BillingResult};
use crate::events::{BillingEventLogger, BillingEventType};
use crate::packages::{fetch_package, Package, PackageKind};
use crate::pricing::{calculate_new_bill, require_rate, resolve_package_capacity, RateKind};
use crate::proration::calculate_upgrade;

const SUBSCRIPTION_COLUMNS: &str = "id, church_id, package_id, billing_cycle, payment_status, \
     duration_months, start_date, end_date, custom_capacity, is_active, \
     credit_balance, pricing_origin, created_at, updated_at";

/// A church's subscription as stored.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ChurchSubscription {
    pub id: Uuid,
    pub church_id: Uuid,
    pub package_id: Uuid,
    pub billing_cycle: String,
    pub payment_status: String,
    pub duration_months: i32,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    pub custom_capacity: Option<i32>,
    pub is_active: bool,
    pub credit_balance: Decimal,
    pub pricing_origin: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ChurchSubscription {
    pub fn cycle(&self) -> BillingResult<BillingCycle> {
        BillingCycle::parse(&self.billing_cycle).ok_or_else(|| {
            BillingError::Internal(format!("unknown billing cycle '{}'", self.billing_cycle))
        })
    }

    pub fn payment_state(&self) -> BillingResult<PaymentStatus> {
        PaymentStatus::parse(&self.payment_status).ok_or_else(|| {
            BillingError::Internal(format!("unknown payment status '{}'", self.payment_status))
        })
    }

    pub fn origin(&self) -> BillingResult<PricingOrigin> {
        PricingOrigin::parse(&self.pricing_origin).ok_or_else(|| {
            BillingError::Internal(format!("unknown pricing origin '{}'", self.pricing_origin))
        })
    }

    /// Billable member capacity of this subscription: the stored custom
    /// capacity for a custom package, the member limit otherwise.
    pub fn resolved_capacity(&self, package: &Package) -> BillingResult<i32> {
        match package.kind() {
            PackageKind::Trial => package.trial_member_limit.ok_or_else(|| {
                BillingError::Configuration(format!(
                    "trial package '{}' has no trial_member_limit",
                    package.name
                ))
            }),
            PackageKind::Custom => match self.custom_capacity {
                Some(capacity) if capacity > 0 => Ok(capacity),
                _ => Err(BillingError::Validation(
                    "custom_capacity required for custom package".into(),
                )),
            },
            PackageKind::Standard => package.member_limit.ok_or_else(|| {
                BillingError::Configuration(format!(
                    "standard package '{}' has no member_limit",
                    package.name
                ))
            }),
        }
    }

    pub fn is_expired(&self, today: Date) -> bool {
        match self.end_date {
            Some(end) => end < today,
            None => false,
        }
    }

    pub fn expires_in_days(&self, today: Date) -> Option<i64> {
        self.end_date.map(|end| (end - today).whole_days())
    }
}

/// Outcome of `subscribe`: trials activate immediately, paid packages
/// produce an UNPAID bill awaiting payment confirmation.
#[derive(Debug)]
pub enum SubscribeOutcome {
    TrialActivated(ChurchSubscription),
    BillIssued(Bill),
}

/// Capacity gate result for the member directory collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct MemberAdmission {
    pub allowed: bool,
    pub reason: Option<String>,
}

/// Suggested follow-up shown on church dashboards.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NextAction {
    TrialExpired {
        message: String,
    },
    UpgradeRequired {
        current_package: String,
        current_members: i64,
        suggested_package: String,
        suggested_package_id: Uuid,
    },
}

/// Paid subscription nearing its end date, for reminder jobs.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ExpiringSubscription {
    pub church_id: Uuid,
    pub church_name: String,
    pub church_email: String,
    pub package_name: String,
    pub end_date: Date,
}

pub(crate) async fn fetch_subscription_for_update(
    conn: &mut PgConnection,
    church_id: Uuid,
) -> BillingResult<Option<ChurchSubscription>> {
    let subscription: Option<ChurchSubscription> = sqlx::query_as(&format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM church_subscriptions WHERE church_id = $1 FOR UPDATE"
    ))
    .bind(church_id)
    .fetch_optional(conn)
    .await?;
    Ok(subscription)
}

async fn active_member_count(conn: &mut PgConnection, church_id: Uuid) -> BillingResult<i64> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM members WHERE church_id = $1 AND is_active AND NOT expired",
    )
    .bind(church_id)
    .fetch_one(conn)
    .await?;
    Ok(count)
}

/// Subscription service: subscribe, upgrade, admin edits and the
/// payment-status side of the church state machine.
pub struct SubscriptionService {
    pool: PgPool,
    email: BillingEmailService,
    event_logger: BillingEventLogger,
}

impl SubscriptionService {
    pub fn new(pool: PgPool, email: BillingEmailService) -> Self {
        let event_logger = BillingEventLogger::new(pool.clone());
        Self {
            pool,
            email,
            event_logger,
        }
    }

    pub async fn get_for_church(
        &self,
        church_id: Uuid,
    ) -> BillingResult<Option<ChurchSubscription>> {
        let subscription: Option<ChurchSubscription> = sqlx::query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM church_subscriptions WHERE church_id = $1"
        ))
        .bind(church_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(subscription)
    }

    /// First-time package purchase for a church.
    pub async fn subscribe(
        &self,
        church_id: Uuid,
        package_id: Uuid,
        billing_cycle: BillingCycle,
        capacity: Option<i32>,
    ) -> BillingResult<SubscribeOutcome> {
        let mut tx = self.pool.begin().await?;

        let church = fetch_church_for_update(&mut tx, church_id).await?;
        if church.is_deleted {
            return Err(BillingError::StateConflict(
                "church has been deleted".into(),
            ));
        }

        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM church_subscriptions WHERE church_id = $1)",
        )
        .bind(church_id)
        .fetch_one(&mut *tx)
        .await?;
        if exists {
            return Err(BillingError::Validation(
                "Subscription already exists".into(),
            ));
        }

        let package = fetch_package(&mut tx, package_id).await?;

        if !package.is_custom && capacity.is_some() {
            return Err(BillingError::Validation(
                "capacity is allowed only for custom packages".into(),
            ));
        }

        let today = OffsetDateTime::now_utc().date();

        if package.is_trial {
            let subscription = insert_subscription(
                &mut tx,
                InsertSubscription {
                    church_id,
                    package_id,
                    billing_cycle: BillingCycle::Trial,
                    payment_status: PaymentStatus::Paid,
                    duration_months: 0,
                    start_date: today,
                    custom_capacity: None,
                    is_active: true,
                },
            )
            .await?;

            sqlx::query("UPDATE churches SET is_active = TRUE WHERE id = $1")
                .bind(church_id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;

            tracing::info!(church_id = %church_id, package = %package.name, "Trial activated");
            self.event_logger
                .record(
                    Some(church_id),
                    BillingEventType::TrialActivated,
                    serde_json::json!({ "package_id": package_id }),
                )
                .await;

            return Ok(SubscribeOutcome::TrialActivated(subscription));
        }

        if billing_cycle == BillingCycle::Trial {
            return Err(BillingError::Validation(
                "billing_cycle must be MONTHLY or YEARLY for a paid package".into(),
            ));
        }

        let duration_months = billing_cycle.months();
        let resolved_capacity = resolve_package_capacity(&package, capacity)?;
        let rate = require_rate(&package, billing_cycle, RateKind::Base)?;
        let amount = calculate_new_bill(&package, billing_cycle, resolved_capacity)?;

        let subscription = insert_subscription(
            &mut tx,
            InsertSubscription {
                church_id,
                package_id,
                billing_cycle,
                payment_status: PaymentStatus::Unpaid,
                duration_months,
                start_date: today,
                custom_capacity: if package.is_custom { capacity } else { None },
                is_active: false,
            },
        )
        .await?;

        let breakdown = new_bill_breakdown(
            &package,
            billing_cycle,
            duration_months,
            resolved_capacity,
            rate,
            amount,
            if package.is_custom { capacity } else { None },
        );

        let bill = insert_bill(
            &mut tx,
            NewBill {
                church_id,
                subscription_id: subscription.id,
                bill_type: BillType::New,
                billing_cycle,
                duration_months,
                amount,
                breakdown: &breakdown,
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            church_id = %church_id,
            bill_id = %bill.id,
            amount = %amount,
            "Subscription created, awaiting payment"
        );
        self.event_logger
            .record(
                Some(church_id),
                BillingEventType::SubscriptionCreated,
                serde_json::json!({
                    "package_id": package_id,
                    "bill_id": bill.id,
                    "amount": amount,
                }),
            )
            .await;
        self.email
            .send_bill_issued(
                &church.email,
                &church.name,
                bill.bill_number.as_deref().unwrap_or("-"),
                amount,
            )
            .await;

        Ok(SubscribeOutcome::BillIssued(bill))
    }

    /// Prorated mid-cycle upgrade to a larger package.
    pub async fn upgrade(
        &self,
        church_id: Uuid,
        package_id: Uuid,
        billing_cycle: BillingCycle,
        capacity: Option<i32>,
    ) -> BillingResult<Bill> {
        let mut tx = self.pool.begin().await?;

        let church = fetch_church_for_update(&mut tx, church_id).await?;
        if church.is_deleted {
            return Err(BillingError::StateConflict(
                "church has been deleted".into(),
            ));
        }

        let subscription = fetch_subscription_for_update(&mut tx, church_id).await?;
        let subscription = match subscription {
            Some(sub) if sub.is_active => sub,
            _ => return Err(BillingError::Validation("No active subscription".into())),
        };

        if subscription_has_unpaid_bill(&mut tx, subscription.id).await? {
            return Err(BillingError::Validation(
                "Please clear the pending bill first".into(),
            ));
        }
        let today = OffsetDateTime::now_utc().date();
        if subscription_billed_on(&mut tx, subscription.id, today).await? {
            return Err(BillingError::Validation(
                "Subscription was already modified today. Please try again tomorrow.".into(),
            ));
        }

        let target = fetch_package(&mut tx, package_id).await?;
        if !target.is_custom && capacity.is_some() {
            return Err(BillingError::Validation(
                "capacity is allowed only for custom packages".into(),
            ));
        }

        let current_package = fetch_package(&mut tx, subscription.package_id).await?;

        let quote = calculate_upgrade(
            &subscription,
            &current_package,
            &target,
            billing_cycle,
            capacity,
            today,
        )?;

        if quote.amount <= Decimal::ZERO {
            return Err(BillingError::Validation("No payable upgrade amount".into()));
        }

        let line = quote
            .breakdown
            .clone()
            .ok_or_else(|| BillingError::Internal("payable quote without breakdown".into()))?;
        let remaining_months = match &line {
            LineItem::Upgrade {
                remaining_months, ..
            } => *remaining_months,
            LineItem::New { .. } => 0,
        };

        if quote.credit > Decimal::ZERO {
            sqlx::query(
                "UPDATE church_subscriptions \
                 SET credit_balance = credit_balance + $2, updated_at = NOW() \
                 WHERE id = $1",
            )
            .bind(subscription.id)
            .bind(quote.credit)
            .execute(&mut *tx)
            .await?;
        }

        let breakdown = Breakdown {
            line_items: vec![line],
            grand_total: quote.amount,
            credit_generated: quote.credit,
            apply: Some(ApplyPayload {
                package_id: target.id,
                billing_cycle,
                duration_months: remaining_months,
                custom_capacity: if target.is_custom { capacity } else { None },
            }),
        };

        let bill = insert_bill(
            &mut tx,
            NewBill {
                church_id,
                subscription_id: subscription.id,
                bill_type: BillType::Upgrade,
                billing_cycle,
                duration_months: remaining_months,
                amount: quote.amount,
                breakdown: &breakdown,
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            church_id = %church_id,
            bill_id = %bill.id,
            amount = %quote.amount,
            credit = %quote.credit,
            "Upgrade bill generated"
        );
        self.event_logger
            .record(
                Some(church_id),
                BillingEventType::BillCreated,
                serde_json::json!({
                    "bill_id": bill.id,
                    "bill_type": "UPGRADE",
                    "amount": quote.amount,
                    "credit_generated": quote.credit,
                }),
            )
            .await;
        self.email
            .send_bill_issued(
                &church.email,
                &church.name,
                bill.bill_number.as_deref().unwrap_or("-"),
                quote.amount,
            )
            .await;

        Ok(bill)
    }

    /// Operator-side subscription edit. Returns the bill when the edit is
    /// billable (new subscription or prorated upgrade); `None` for package
    /// removal, trial assignment and in-place cycle/capacity tweaks.
    pub async fn admin_edit_subscription(
        &self,
        church_id: Uuid,
        package_id: Option<Uuid>,
        billing_cycle: Option<BillingCycle>,
        capacity: Option<i32>,
    ) -> BillingResult<Option<Bill>> {
        let mut tx = self.pool.begin().await?;

        let church = fetch_church_for_update(&mut tx, church_id).await?;
        if church.is_deleted {
            return Err(BillingError::StateConflict(
                "cannot edit a deleted church".into(),
            ));
        }

        let subscription = fetch_subscription_for_update(&mut tx, church_id).await?;

        let Some(package_id) = package_id else {
            // Remove the subscription entirely.
            if let Some(sub) = &subscription {
                sqlx::query("DELETE FROM church_subscriptions WHERE id = $1")
                    .bind(sub.id)
                    .execute(&mut *tx)
                    .await?;
            }
            sqlx::query("UPDATE churches SET is_active = FALSE WHERE id = $1")
                .bind(church_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            tracing::info!(church_id = %church_id, "Subscription removed");
            return Ok(None);
        };

        let target = fetch_package(&mut tx, package_id).await?;
        let today = OffsetDateTime::now_utc().date();

        if target.is_trial {
            match &subscription {
                Some(sub) => {
                    sqlx::query(
                        r#"
                        UPDATE church_subscriptions
                        SET package_id = $2,
                            billing_cycle = $3,
                            duration_months = 0,
                            start_date = $4,
                            end_date = $4,
                            custom_capacity = NULL,
                            payment_status = $5,
                            is_active = TRUE,
                            pricing_origin = $6,
                            updated_at = NOW()
                        WHERE id = $1
                        "#,
                    )
                    .bind(sub.id)
                    .bind(target.id)
                    .bind(BillingCycle::Trial.as_str())
                    .bind(today)
                    .bind(PaymentStatus::Paid.as_str())
                    .bind(PricingOrigin::Base.as_str())
                    .execute(&mut *tx)
                    .await?;
                }
                None => {
                    insert_subscription(
                        &mut tx,
                        InsertSubscription {
                            church_id,
                            package_id: target.id,
                            billing_cycle: BillingCycle::Trial,
                            payment_status: PaymentStatus::Paid,
                            duration_months: 0,
                            start_date: today,
                            custom_capacity: None,
                            is_active: true,
                        },
                    )
                    .await?;
                }
            }

            sqlx::query("UPDATE churches SET is_active = TRUE WHERE id = $1")
                .bind(church_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            tracing::info!(church_id = %church_id, package = %target.name, "Trial assigned");
            self.event_logger
                .record(
                    Some(church_id),
                    BillingEventType::TrialActivated,
                    serde_json::json!({ "package_id": target.id }),
                )
                .await;
            return Ok(None);
        }

        let billing_cycle = billing_cycle.ok_or_else(|| {
            BillingError::Validation("billing_cycle is required for a paid package".into())
        })?;
        if billing_cycle == BillingCycle::Trial {
            return Err(BillingError::Validation(
                "billing_cycle must be MONTHLY or YEARLY for a paid package".into(),
            ));
        }
        if !target.is_custom && capacity.is_some() {
            return Err(BillingError::Validation(
                "capacity is allowed only for custom packages".into(),
            ));
        }

        // Concurrency guards apply to any billable change of an existing
        // subscription.
        if let Some(sub) = &subscription {
            if subscription_has_unpaid_bill(&mut tx, sub.id).await? {
                return Err(BillingError::Validation(
                    "Please clear the pending bill first".into(),
                ));
            }
            if subscription_billed_on(&mut tx, sub.id, today).await? {
                return Err(BillingError::Validation(
                    "Subscription was already modified today. Please try again tomorrow.".into(),
                ));
            }
        }

        let current_is_trial = match &subscription {
            Some(sub) => fetch_package(&mut tx, sub.package_id).await?.is_trial,
            None => false,
        };

        if subscription.is_none() || current_is_trial {
            // Fresh purchase (possibly replacing a trial).
            let duration_months = billing_cycle.months();
            let resolved_capacity = resolve_package_capacity(&target, capacity)?;
            let rate = require_rate(&target, billing_cycle, RateKind::Base)?;
            let amount = calculate_new_bill(&target, billing_cycle, resolved_capacity)?;
            let custom_capacity = if target.is_custom { capacity } else { None };

            let subscription_id = match &subscription {
                Some(sub) => {
                    sqlx::query(
                        r#"
                        UPDATE church_subscriptions
                        SET package_id = $2,
                            billing_cycle = $3,
                            duration_months = $4,
                            start_date = $5,
                            end_date = $6,
                            custom_capacity = $7,
                            payment_status = $8,
                            is_active = FALSE,
                            credit_balance = 0,
                            pricing_origin = $9,
                            updated_at = NOW()
                        WHERE id = $1
                        "#,
                    )
                    .bind(sub.id)
                    .bind(target.id)
                    .bind(billing_cycle.as_str())
                    .bind(duration_months)
                    .bind(today)
                    .bind(add_months(today, duration_months))
                    .bind(custom_capacity)
                    .bind(PaymentStatus::Unpaid.as_str())
                    .bind(PricingOrigin::Base.as_str())
                    .execute(&mut *tx)
                    .await?;
                    sub.id
                }
                None => {
                    insert_subscription(
                        &mut tx,
                        InsertSubscription {
                            church_id,
                            package_id: target.id,
                            billing_cycle,
                            payment_status: PaymentStatus::Unpaid,
                            duration_months,
                            start_date: today,
                            custom_capacity,
                            is_active: false,
                        },
                    )
                    .await?
                    .id
                }
            };

            let breakdown = new_bill_breakdown(
                &target,
                billing_cycle,
                duration_months,
                resolved_capacity,
                rate,
                amount,
                custom_capacity,
            );

            let bill = insert_bill(
                &mut tx,
                NewBill {
                    church_id,
                    subscription_id,
                    bill_type: BillType::New,
                    billing_cycle,
                    duration_months,
                    amount,
                    breakdown: &breakdown,
                },
            )
            .await?;

            sqlx::query("UPDATE churches SET is_active = FALSE WHERE id = $1")
                .bind(church_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            tracing::info!(
                church_id = %church_id,
                bill_id = %bill.id,
                amount = %amount,
                "Subscription assigned by admin, awaiting payment"
            );
            self.event_logger
                .record(
                    Some(church_id),
                    BillingEventType::SubscriptionCreated,
                    serde_json::json!({
                        "package_id": target.id,
                        "bill_id": bill.id,
                        "amount": amount,
                    }),
                )
                .await;
            self.email
                .send_bill_issued(
                    &church.email,
                    &church.name,
                    bill.bill_number.as_deref().unwrap_or("-"),
                    amount,
                )
                .await;

            return Ok(Some(bill));
        }

        let subscription = subscription.ok_or_else(|| {
            BillingError::Internal("subscription vanished during admin edit".into())
        })?;
        let current_package = fetch_package(&mut tx, subscription.package_id).await?;

        let target_capacity = resolve_package_capacity(&target, capacity)?;
        let current_capacity = subscription.resolved_capacity(&current_package)?;
        let is_upgrade = target.id != current_package.id && target_capacity > current_capacity;

        if !is_upgrade {
            // Same tier: adjust cycle and custom capacity in place. Takes
            // financial effect on the next bill only.
            sqlx::query(
                "UPDATE church_subscriptions \
                 SET billing_cycle = $2, custom_capacity = $3, updated_at = NOW() \
                 WHERE id = $1",
            )
            .bind(subscription.id)
            .bind(billing_cycle.as_str())
            .bind(if target.is_custom { capacity } else { None })
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            tracing::info!(church_id = %church_id, "Subscription updated in place");
            return Ok(None);
        }

        let quote = calculate_upgrade(
            &subscription,
            &current_package,
            &target,
            billing_cycle,
            capacity,
            today,
        )?;

        if quote.amount <= Decimal::ZERO {
            return Err(BillingError::Validation("No payable upgrade amount".into()));
        }

        let line = quote
            .breakdown
            .clone()
            .ok_or_else(|| BillingError::Internal("payable quote without breakdown".into()))?;
        let remaining_months = match &line {
            LineItem::Upgrade {
                remaining_months, ..
            } => *remaining_months,
            LineItem::New { .. } => 0,
        };

        if quote.credit > Decimal::ZERO {
            sqlx::query(
                "UPDATE church_subscriptions \
                 SET credit_balance = credit_balance + $2, updated_at = NOW() \
                 WHERE id = $1",
            )
            .bind(subscription.id)
            .bind(quote.credit)
            .execute(&mut *tx)
            .await?;
        }

        let breakdown = Breakdown {
            line_items: vec![line],
            grand_total: quote.amount,
            credit_generated: quote.credit,
            apply: Some(ApplyPayload {
                package_id: target.id,
                billing_cycle,
                duration_months: remaining_months,
                custom_capacity: if target.is_custom { capacity } else { None },
            }),
        };

        let bill = insert_bill(
            &mut tx,
            NewBill {
                church_id,
                subscription_id: subscription.id,
                bill_type: BillType::Upgrade,
                billing_cycle,
                duration_months: remaining_months,
                amount: quote.amount,
                breakdown: &breakdown,
            },
        )
        .await?;

        sqlx::query("UPDATE churches SET is_active = FALSE WHERE id = $1")
            .bind(church_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(
            church_id = %church_id,
            bill_id = %bill.id,
            amount = %quote.amount,
            "Admin upgrade bill generated"
        );
        self.event_logger
            .record(
                Some(church_id),
                BillingEventType::BillCreated,
                serde_json::json!({
                    "bill_id": bill.id,
                    "bill_type": "UPGRADE",
                    "amount": quote.amount,
                    "credit_generated": quote.credit,
                }),
            )
            .await;
        self.email
            .send_bill_issued(
                &church.email,
                &church.name,
                bill.bill_number.as_deref().unwrap_or("-"),
                quote.amount,
            )
            .await;

        Ok(Some(bill))
    }

    /// Revoke payment status without touching bill history. Trial
    /// subscriptions are a no-op.
    pub async fn mark_unpaid(&self, church_id: Uuid) -> BillingResult<()> {
        let mut tx = self.pool.begin().await?;

        let subscription = fetch_subscription_for_update(&mut tx, church_id)
            .await?
            .ok_or_else(|| BillingError::NotFound("subscription".into()))?;

        let package = fetch_package(&mut tx, subscription.package_id).await?;
        if package.is_trial {
            return Ok(());
        }

        sqlx::query(
            "UPDATE church_subscriptions \
             SET payment_status = $2, is_active = FALSE, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(subscription.id)
        .bind(PaymentStatus::Unpaid.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE churches SET is_active = FALSE WHERE id = $1")
            .bind(church_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(church_id = %church_id, "Subscription marked unpaid");
        self.event_logger
            .record(
                Some(church_id),
                BillingEventType::SubscriptionMarkedUnpaid,
                serde_json::json!({ "subscription_id": subscription.id }),
            )
            .await;
        Ok(())
    }

    /// Can this church add one more active member under its current plan?
    pub async fn can_add_member(&self, church_id: Uuid) -> BillingResult<MemberAdmission> {
        let mut conn = self.pool.acquire().await?;

        let subscription: Option<ChurchSubscription> = sqlx::query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM church_subscriptions WHERE church_id = $1"
        ))
        .bind(church_id)
        .fetch_optional(&mut *conn)
        .await?;

        let subscription = match subscription {
            Some(sub) if sub.is_active => sub,
            _ => {
                return Ok(MemberAdmission {
                    allowed: false,
                    reason: Some("No active subscription.".into()),
                })
            }
        };

        let package = fetch_package(&mut conn, subscription.package_id).await?;
        let current_count = active_member_count(&mut conn, church_id).await?;

        let denied = |reason: &str| MemberAdmission {
            allowed: false,
            reason: Some(reason.to_string()),
        };
        let allowed = MemberAdmission {
            allowed: true,
            reason: None,
        };

        let admission = match package.kind() {
            PackageKind::Trial => {
                let limit = i64::from(package.trial_member_limit.unwrap_or(0));
                if current_count >= limit {
                    denied("Trial limit reached.")
                } else {
                    allowed
                }
            }
            PackageKind::Custom => match subscription.custom_capacity {
                None => denied("Custom capacity not set."),
                Some(capacity) if current_count >= i64::from(capacity) => {
                    denied("Custom member limit reached.")
                }
                Some(_) => allowed,
            },
            PackageKind::Standard => {
                let limit = i64::from(package.member_limit.unwrap_or(0));
                if current_count >= limit {
                    denied("Member limit exceeded.")
                } else {
                    allowed
                }
            }
        };

        Ok(admission)
    }

    /// Dashboard hint: has the church outgrown its plan, and if so which
    /// standard package would fit next?
    pub async fn next_subscription_action(
        &self,
        church_id: Uuid,
    ) -> BillingResult<Option<NextAction>> {
        let mut conn = self.pool.acquire().await?;

        let subscription: Option<ChurchSubscription> = sqlx::query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM church_subscriptions WHERE church_id = $1"
        ))
        .bind(church_id)
        .fetch_optional(&mut *conn)
        .await?;

        let subscription = match subscription {
            Some(sub) if sub.is_active => sub,
            _ => return Ok(None),
        };

        let package = fetch_package(&mut conn, subscription.package_id).await?;
        let members = active_member_count(&mut conn, church_id).await?;

        match package.kind() {
            PackageKind::Trial => {
                let limit = i64::from(package.trial_member_limit.unwrap_or(0));
                if members >= limit {
                    Ok(Some(NextAction::TrialExpired {
                        message: "Trial limit reached.".into(),
                    }))
                } else {
                    Ok(None)
                }
            }
            PackageKind::Custom => Ok(None),
            PackageKind::Standard => {
                let limit = i64::from(package.member_limit.unwrap_or(0));
                if members <= limit {
                    return Ok(None);
                }

                let next: Option<(Uuid, String)> = sqlx::query_as(
                    r#"
                    SELECT id, name FROM packages
                    WHERE NOT is_trial AND NOT is_custom AND member_limit > $1
                    ORDER BY member_limit
                    LIMIT 1
                    "#,
                )
                .bind(package.member_limit)
                .fetch_optional(&mut *conn)
                .await?;

                Ok(next.map(|(id, name)| NextAction::UpgradeRequired {
                    current_package: package.name.clone(),
                    current_members: members,
                    suggested_package: name,
                    suggested_package_id: id,
                }))
            }
        }
    }

    /// Active member headcount for a church (the figure capacity gates
    /// compare against).
    pub async fn member_count(&self, church_id: Uuid) -> BillingResult<i64> {
        let mut conn = self.pool.acquire().await?;
        active_member_count(&mut conn, church_id).await
    }

    /// Paid subscriptions ending within `days` from today.
    pub async fn expiring_within(&self, days: i64) -> BillingResult<Vec<ExpiringSubscription>> {
        let today = OffsetDateTime::now_utc().date();
        let horizon = today + time::Duration::days(days);

        let rows: Vec<ExpiringSubscription> = sqlx::query_as(
            r#"
            SELECT c.id AS church_id,
                   c.name AS church_name,
                   c.email AS church_email,
                   p.name AS package_name,
                   s.end_date
            FROM church_subscriptions s
            JOIN churches c ON c.id = s.church_id
            JOIN packages p ON p.id = s.package_id
            WHERE s.payment_status = 'PAID'
              AND s.end_date IS NOT NULL
              AND s.end_date >= $1
              AND s.end_date <= $2
              AND NOT c.is_deleted
            ORDER BY s.end_date
            "#,
        )
        .bind(today)
        .bind(horizon)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

struct InsertSubscription {
    church_id: Uuid,
    package_id: Uuid,
    billing_cycle: BillingCycle,
    payment_status: PaymentStatus,
    duration_months: i32,
    start_date: Date,
    custom_capacity: Option<i32>,
    is_active: bool,
}

async fn insert_subscription(
    conn: &mut PgConnection,
    insert: InsertSubscription,
) -> BillingResult<ChurchSubscription> {
    let end_date = add_months(insert.start_date, insert.duration_months);

    let subscription: ChurchSubscription = sqlx::query_as(&format!(
        r#"
        INSERT INTO church_subscriptions (
            church_id, package_id, billing_cycle, payment_status,
            duration_months, start_date, end_date, custom_capacity,
            is_active, credit_balance, pricing_origin
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 0, $10)
        RETURNING {SUBSCRIPTION_COLUMNS}
        "#
    ))
    .bind(insert.church_id)
    .bind(insert.package_id)
    .bind(insert.billing_cycle.as_str())
    .bind(insert.payment_status.as_str())
    .bind(insert.duration_months)
    .bind(insert.start_date)
    .bind(end_date)
    .bind(insert.custom_capacity)
    .bind(insert.is_active)
    .bind(PricingOrigin::Base.as_str())
    .fetch_one(conn)
    .await?;

    Ok(subscription)
}

/// Frozen snapshot for a NEW bill: line item with bill-time rate/capacity
/// plus the deferred apply payload.
fn new_bill_breakdown(
    package: &Package,
    billing_cycle: BillingCycle,
    duration_months: i32,
    capacity: i32,
    rate: Decimal,
    amount: Decimal,
    custom_capacity: Option<i32>,
) -> Breakdown {
    Breakdown {
        line_items: vec![LineItem::New {
            members: capacity,
            rate,
            months: duration_months,
            calculation: format!("{} × {} × {}", rate, capacity, duration_months),
            total: amount,
        }],
        grand_total: amount,
        credit_generated: Decimal::ZERO.round_dp(2),
        apply: Some(ApplyPayload {
            package_id: package.id,
            billing_cycle,
            duration_months,
            custom_capacity,
        }),
    }
}


#[cfg(test)]
mod tests {
    use super::test_fixtures::yearly_subscription;
    use super::*;
    use crate::packages::test_fixtures;
    use rust_decimal_macros::dec;
    use time::macros::date;

    #[test]
    fn test_resolved_capacity_standard_and_custom() {
        let standard = test_fixtures::standard(100, dec!(10.00), dec!(5.00));
        let sub = yearly_subscription(&standard, date!(2025 - 01 - 01));
        assert_eq!(sub.resolved_capacity(&standard).unwrap(), 100);

        let custom = test_fixtures::custom(dec!(10.00), dec!(5.00));
        let mut sub = yearly_subscription(&custom, date!(2025 - 01 - 01));
        assert!(matches!(
            sub.resolved_capacity(&custom),
            Err(BillingError::Validation(_))
        ));
        sub.custom_capacity = Some(40);
        assert_eq!(sub.resolved_capacity(&custom).unwrap(), 40);
    }

    #[test]
    fn test_expiry_helpers() {
        let package = test_fixtures::standard(100, dec!(10.00), dec!(5.00));
        let sub = yearly_subscription(&package, date!(2025 - 01 - 01));
        // Ends 2026-01-01.
        assert!(!sub.is_expired(date!(2025 - 12 - 31)));
        assert!(!sub.is_expired(date!(2026 - 01 - 01)));
        assert!(sub.is_expired(date!(2026 - 01 - 02)));
        assert_eq!(sub.expires_in_days(date!(2025 - 12 - 30)), Some(2));
    }

    #[test]
    fn test_new_bill_breakdown_shape() {
        let package = test_fixtures::standard(50, dec!(10.00), dec!(5.00));
        let breakdown = new_bill_breakdown(
            &package,
            BillingCycle::Monthly,
            1,
            50,
            dec!(10.00),
            dec!(500.00),
            None,
        );

        assert_eq!(breakdown.grand_total, dec!(500.00));
        assert_eq!(breakdown.credit_generated, dec!(0.00));
        let apply = breakdown.apply.as_ref().unwrap();
        assert_eq!(apply.package_id, package.id);
        assert_eq!(apply.duration_months, 1);
        match &breakdown.line_items[0] {
            LineItem::New {
                members,
                rate,
                months,
                calculation,
                total,
            } => {
                assert_eq!(*members, 50);
                assert_eq!(*rate, dec!(10.00));
                assert_eq!(*months, 1);
                assert_eq!(calculation, "10.00 × 50 × 1");
                assert_eq!(*total, dec!(500.00));
            }
            other => panic!("expected NEW line item, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_accessor_rejects_garbage() {
        let package = test_fixtures::standard(50, dec!(10.00), dec!(5.00));
        let mut sub = yearly_subscription(&package, date!(2025 - 01 - 01));
        sub.billing_cycle = "FORTNIGHTLY".to_string();
        assert!(matches!(sub.cycle(), Err(BillingError::Internal(_))));
    }
}
