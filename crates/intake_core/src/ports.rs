//! crates/intake_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases, file
//! storage, or the payment provider's HTTP API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Charge, ChargeRequest, ConfirmedApplication, Course, Fee, Institution, PaymentStatus,
    PendingApplication,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A uniqueness constraint rejected an insert. Reconciliation relies on
    /// this to collapse concurrent confirmations of the same reference id.
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Payment gateway error: {0}")]
    Gateway(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Read-only lookups over the catalog of countries, institutions, courses
/// and registration fees.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Fetches an active institution by id. `NotFound` covers both unknown
    /// and deactivated institutions.
    async fn institution(&self, id: i64) -> PortResult<Institution>;

    /// Fetches an active course by id.
    async fn course(&self, id: i64) -> PortResult<Course>;

    async fn list_institutions(&self) -> PortResult<Vec<Institution>>;

    async fn courses_for_institution(&self, institution_id: i64) -> PortResult<Vec<Course>>;

    /// Resolves the registration fee for an application, most specific scope
    /// first: course, then institution, then country. `None` means no fee
    /// record is configured for any of the three.
    async fn resolve_fee(
        &self,
        course_id: i64,
        institution_id: i64,
        country_id: i64,
    ) -> PortResult<Option<Fee>>;
}

/// The explicit keyed store holding applications between form submission and
/// payment reconciliation.
#[async_trait]
pub trait PendingStore: Send + Sync {
    async fn create(&self, application: &PendingApplication) -> PortResult<()>;

    async fn get(&self, reference_id: &str) -> PortResult<PendingApplication>;

    /// Deletes a pending application. Deleting an absent reference id is a
    /// no-op, not an error.
    async fn delete(&self, reference_id: &str) -> PortResult<()>;

    /// Removes every pending application whose expiry has elapsed and
    /// returns them, so callers can clean up the associated temp files.
    async fn delete_expired(&self, now: DateTime<Utc>) -> PortResult<Vec<PendingApplication>>;
}

/// The permanent store of confirmed applications.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Persists a confirmed application. Must fail with `PortError::Conflict`
    /// when a record with the same code already exists.
    async fn insert(&self, application: &ConfirmedApplication) -> PortResult<()>;

    async fn find_by_code(&self, code: &str) -> PortResult<Option<ConfirmedApplication>>;
}

/// Storage for uploaded certificate files, with a temporary area for
/// not-yet-paid applications and a permanent area for confirmed ones.
#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// Writes the uploaded bytes to the temporary area and returns the
    /// storage key.
    async fn store_temp(
        &self,
        reference_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> PortResult<String>;

    /// Moves a temporary certificate to the permanent area, returning the
    /// final storage key. Idempotent: when the temp file is already gone but
    /// its promoted counterpart for `code` exists, the existing final key is
    /// returned, so a redelivered notification can finish a confirmation
    /// that failed after the move.
    async fn promote(&self, temp_ref: &str, code: &str) -> PortResult<String>;

    /// Removes a temporary certificate. Removing an absent file is a no-op.
    async fn remove_temp(&self, temp_ref: &str) -> PortResult<()>;
}

/// The external payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a charge with the provider and returns the hosted payment URL.
    /// Fails with `PortError::Gateway` on non-2xx responses, network
    /// failures and timeouts.
    async fn create_charge(&self, request: &ChargeRequest) -> PortResult<Charge>;

    /// Queries the provider for the current state of a charge. Used to
    /// verify success notifications instead of trusting the redirect alone.
    async fn check_status(&self, reference_id: &str) -> PortResult<PaymentStatus>;
}

/// Outbound applicant notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_confirmation(&self, application: &ConfirmedApplication) -> PortResult<()>;
}
