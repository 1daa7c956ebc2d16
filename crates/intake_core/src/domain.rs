//! crates/intake_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A country that hosts partner institutions.
#[derive(Debug, Clone)]
pub struct Country {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub active: bool,
}

/// A partner institution (university or technical school).
#[derive(Debug, Clone)]
pub struct Institution {
    pub id: i64,
    pub name: String,
    pub country_id: i64,
    pub active: bool,
}

/// A course offered by an institution.
#[derive(Debug, Clone)]
pub struct Course {
    pub id: i64,
    pub name: String,
    pub institution_id: i64,
    pub active: bool,
}

//=========================================================================================
// Registration Fees
//=========================================================================================

/// The single catalog entity a registration fee is attached to.
///
/// A fee applies to exactly one of a course, an institution, or a country.
/// Resolution picks the most specific scope that matches an application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeeScope {
    Course(i64),
    Institution(i64),
    Country(i64),
}

/// A registration fee record.
#[derive(Debug, Clone)]
pub struct Fee {
    pub id: i64,
    pub amount: BigDecimal,
    pub currency: String,
    pub scope: FeeScope,
}

impl Fee {
    /// Builds a fee from raw optional scope references, enforcing that
    /// exactly one of them is set.
    pub fn from_scope_refs(
        id: i64,
        amount: BigDecimal,
        currency: String,
        course_id: Option<i64>,
        institution_id: Option<i64>,
        country_id: Option<i64>,
    ) -> Result<Self, DomainError> {
        let scope = match (course_id, institution_id, country_id) {
            (Some(id), None, None) => FeeScope::Course(id),
            (None, Some(id), None) => FeeScope::Institution(id),
            (None, None, Some(id)) => FeeScope::Country(id),
            _ => {
                let refs_set = course_id.is_some() as u8
                    + institution_id.is_some() as u8
                    + country_id.is_some() as u8;
                return Err(DomainError::InvalidFeeScope { refs_set });
            }
        };
        Ok(Self {
            id,
            amount,
            currency,
            scope,
        })
    }
}

/// Validation failures on domain construction.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("a fee must reference exactly one of course, institution or country ({refs_set} set)")]
    InvalidFeeScope { refs_set: u8 },
}

//=========================================================================================
// Applications
//=========================================================================================

/// The personal details captured on the application form.
#[derive(Debug, Clone)]
pub struct Applicant {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub national_id: Option<String>,
    pub age: Option<u32>,
}

/// An application that has been submitted but not yet paid for.
///
/// Held in an explicit keyed store addressed by `reference_id` (never a web
/// session, so server-to-server webhooks can resolve it). Consumed exactly
/// once by reconciliation: promoted on confirmed payment, deleted on
/// cancellation or expiry.
#[derive(Debug, Clone)]
pub struct PendingApplication {
    pub reference_id: String,
    pub applicant: Applicant,
    pub institution_id: i64,
    pub course_id: i64,
    pub fee_id: i64,
    /// Storage key of the certificate in the temporary area.
    pub certificate_ref: String,
    pub accepted_terms: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// The lifecycle of a persisted application. Only `Submitted` is assigned by
/// this service; the rest belong to the back-office review flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationState {
    Submitted,
    UnderReview,
    Approved,
    Rejected,
    Enrolled,
}

impl ApplicationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::UnderReview => "under_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Enrolled => "enrolled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "submitted" => Some(Self::Submitted),
            "under_review" => Some(Self::UnderReview),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "enrolled" => Some(Self::Enrolled),
            _ => None,
        }
    }
}

/// A permanently persisted application, created only by successful payment
/// reconciliation. `code` equals the reference id of the pending application
/// it was promoted from and never changes.
#[derive(Debug, Clone)]
pub struct ConfirmedApplication {
    pub code: String,
    pub applicant: Applicant,
    pub institution_id: i64,
    pub course_id: i64,
    pub fee_id: i64,
    /// Storage key of the certificate in the permanent area.
    pub certificate_ref: String,
    pub state: ApplicationState,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Generates an opaque application reference id: the first eight hex
/// characters of a v4 UUID, uppercased.
pub fn generate_reference_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_uppercase()
}

//=========================================================================================
// Payment Gateway Values
//=========================================================================================

/// The request sent to the payment provider to open a charge.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub amount: BigDecimal,
    pub currency: String,
    pub reference_id: String,
    pub return_url: String,
    pub cancel_url: String,
    pub expires_at: DateTime<Utc>,
}

/// The provider's answer to a create-charge request.
#[derive(Debug, Clone)]
pub struct Charge {
    pub payment_url: String,
    pub provider_reference: String,
    pub entity_id: String,
}

/// The provider-side state of a charge, as reported by a status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}
