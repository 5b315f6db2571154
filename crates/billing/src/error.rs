//! Billing error taxonomy
//!
//! Four caller-visible classes plus infrastructure failures:
//!
//! - [`BillingError::Configuration`]: a package is missing a rate the
//!   computation requires. Operator data-entry mistake; must be surfaced to
//!   the platform admin, never to a tenant.
//! - [`BillingError::Validation`]: bad input or a guard rejected the
//!   request (missing capacity, duplicate subscription, pending bill,
//!   same-day edit lockout). No state is mutated.
//! - [`BillingError::StateConflict`]: the operation is not legal in the
//!   record's current state (PAID subscription being deleted, deleted
//!   church being edited).
//! - [`BillingError::NotFound`]: unknown package / bill / subscription /
//!   church id.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BillingError {
    /// A package is missing a rate required by the computation.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Input rejected before any state change.
    #[error("{0}")]
    Validation(String),

    /// Operation not permitted in the record's current state.
    #[error("{0}")]
    StateConflict(String),

    /// Unknown record id.
    #[error("{0} not found")]
    NotFound(String),

    /// Database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Invariant breach inside the engine (e.g. a stored breakdown snapshot
    /// that no longer deserializes).
    #[error("internal error: {0}")]
    Internal(String),
}

pub type BillingResult<T> = Result<T, BillingError>;
