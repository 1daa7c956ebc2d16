//! crates/intake_core/src/reconciliation.rs
//!
//! The payment reconciliation state machine. Matches success/cancel
//! notifications from the payment provider (browser redirects or
//! server-to-server webhooks) against the pending store, and promotes a
//! pending application into a permanent record once the provider confirms
//! the charge as paid.
//!
//! The lifecycle of a reference id:
//!
//! ```text
//! PENDING_SUBMIT -> AWAITING_PAYMENT -> { CONFIRMED, CANCELLED, EXPIRED }
//! ```
//!
//! Both `confirm` and `cancel` are idempotent: replayed notifications for a
//! reference id that already reached a terminal state return the existing
//! outcome instead of erroring or duplicating work.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::domain::{ApplicationState, ConfirmedApplication, PaymentStatus};
use crate::ports::{
    ApplicationStore, CertificateStore, Notifier, PaymentGateway, PendingStore, PortError,
};

//=========================================================================================
// Outcomes and Errors
//=========================================================================================

/// The terminal result of processing a payment notification.
#[derive(Debug)]
pub enum Outcome {
    /// The pending application was promoted and persisted by this call.
    Confirmed(ConfirmedApplication),
    /// A permanent record for this reference id already existed; nothing was
    /// created or re-sent.
    AlreadyConfirmed(ConfirmedApplication),
    /// The pending application and its temporary certificate were discarded.
    Cancelled,
    /// No pending application existed; the cancellation was a no-op.
    AlreadyCancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// A success notification arrived for a reference id with no pending
    /// application and no confirmed record: the submission expired or was
    /// lost. Recoverable; the caller shows a support message, nothing is
    /// persisted.
    #[error("no application found for reference id {0}")]
    UnknownReference(String),
    /// The provider does not report the charge as paid, so the success
    /// notification cannot be trusted.
    #[error("charge {reference_id} is not paid (provider reports {status:?})")]
    Unverified {
        reference_id: String,
        status: PaymentStatus,
    },
    /// Store or file-system failure mid-promotion. The payment has already
    /// happened, so callers must surface this in a way that lets the
    /// notification be redelivered.
    #[error(transparent)]
    Port(#[from] PortError),
}

//=========================================================================================
// The Reconciliation Service
//=========================================================================================

pub struct ReconciliationService {
    pending: Arc<dyn PendingStore>,
    applications: Arc<dyn ApplicationStore>,
    certificates: Arc<dyn CertificateStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
}

impl ReconciliationService {
    pub fn new(
        pending: Arc<dyn PendingStore>,
        applications: Arc<dyn ApplicationStore>,
        certificates: Arc<dyn CertificateStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            pending,
            applications,
            certificates,
            gateway,
            notifier,
        }
    }

    /// Handles a success notification for `reference_id`.
    ///
    /// The CONFIRMED transition is only taken after the provider itself
    /// reports the charge as paid; the notification alone (a redirect or an
    /// unauthenticated webhook body) is never trusted.
    pub async fn confirm(&self, reference_id: &str) -> Result<Outcome, ReconcileError> {
        // Idempotent short-circuit: a replayed webhook or a refreshed return
        // URL must not create a second record or a second email.
        if let Some(existing) = self.applications.find_by_code(reference_id).await? {
            info!(reference_id, "confirmation replayed, returning existing record");
            return Ok(Outcome::AlreadyConfirmed(existing));
        }

        let pending = match self.pending.get(reference_id).await {
            Ok(pending) => pending,
            Err(PortError::NotFound(_)) => {
                return Err(ReconcileError::UnknownReference(reference_id.to_string()))
            }
            Err(other) => return Err(other.into()),
        };

        let status = self.gateway.check_status(reference_id).await?;
        if status != PaymentStatus::Paid {
            warn!(reference_id, ?status, "rejecting unverified success notification");
            return Err(ReconcileError::Unverified {
                reference_id: reference_id.to_string(),
                status,
            });
        }

        let certificate_ref = self
            .certificates
            .promote(&pending.certificate_ref, reference_id)
            .await?;

        let now = Utc::now();
        let application = ConfirmedApplication {
            code: pending.reference_id.clone(),
            applicant: pending.applicant.clone(),
            institution_id: pending.institution_id,
            course_id: pending.course_id,
            fee_id: pending.fee_id,
            certificate_ref,
            state: ApplicationState::Submitted,
            submitted_at: now,
            updated_at: now,
        };

        match self.applications.insert(&application).await {
            Ok(()) => {}
            Err(PortError::Conflict(_)) => {
                // A concurrent confirmation won the insert race. Treat this
                // call as a replay: clean up and hand back the winner's
                // record without another notification.
                info!(reference_id, "lost confirmation race, deferring to existing record");
                self.pending.delete(reference_id).await?;
                let existing = self
                    .applications
                    .find_by_code(reference_id)
                    .await?
                    .ok_or_else(|| {
                        PortError::Unexpected(format!(
                            "application {reference_id} conflicted on insert but cannot be found"
                        ))
                    })?;
                return Ok(Outcome::AlreadyConfirmed(existing));
            }
            Err(other) => return Err(other.into()),
        }

        // The record exists from here on. A failed email is logged rather
        // than propagated: erroring now would make the provider redeliver
        // the webhook, which the short-circuit above would swallow without
        // ever retrying the email anyway.
        if let Err(err) = self.notifier.send_confirmation(&application).await {
            warn!(reference_id, error = %err, "confirmation email failed to send");
        }

        self.pending.delete(reference_id).await?;
        info!(reference_id, "application confirmed");
        Ok(Outcome::Confirmed(application))
    }

    /// Handles a cancel notification for `reference_id`, discarding the
    /// pending application and its temporary certificate.
    pub async fn cancel(&self, reference_id: &str) -> Result<Outcome, ReconcileError> {
        // A cancel for an already-confirmed code is a stale notification;
        // the terminal outcome stands.
        if let Some(existing) = self.applications.find_by_code(reference_id).await? {
            warn!(reference_id, "ignoring cancel for an already confirmed application");
            return Ok(Outcome::AlreadyConfirmed(existing));
        }

        let pending = match self.pending.get(reference_id).await {
            Ok(pending) => pending,
            Err(PortError::NotFound(_)) => {
                // Repeated cancel, or expiry got there first.
                return Ok(Outcome::AlreadyCancelled);
            }
            Err(other) => return Err(other.into()),
        };

        self.certificates.remove_temp(&pending.certificate_ref).await?;
        self.pending.delete(reference_id).await?;
        info!(reference_id, "application cancelled");
        Ok(Outcome::Cancelled)
    }

    /// Garbage-collects pending applications whose charge expired without a
    /// notification, removing their temporary certificates. Returns the
    /// number of applications reaped.
    pub async fn reap_expired(&self, now: DateTime<Utc>) -> Result<usize, ReconcileError> {
        let expired = self.pending.delete_expired(now).await?;
        for application in &expired {
            if let Err(err) = self
                .certificates
                .remove_temp(&application.certificate_ref)
                .await
            {
                warn!(
                    reference_id = %application.reference_id,
                    error = %err,
                    "failed to remove temp certificate for expired application"
                );
            }
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "reaped expired pending applications");
        }
        Ok(expired.len())
    }
}
