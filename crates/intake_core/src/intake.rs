//! crates/intake_core/src/intake.rs
//!
//! The application intake service: validates a submitted form against the
//! catalog, parks the application and its certificate in temporary storage,
//! and opens a charge with the payment gateway.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::domain::{
    generate_reference_id, Applicant, ChargeRequest, PendingApplication,
};
use crate::ports::{CatalogStore, CertificateStore, PaymentGateway, PendingStore, PortError};

//=========================================================================================
// Inputs and Outputs
//=========================================================================================

/// The raw application form, as decoded by the transport layer.
#[derive(Debug, Clone)]
pub struct NewApplication {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub national_id: Option<String>,
    pub age: Option<u32>,
    pub institution_id: i64,
    pub course_id: i64,
    pub accepted_terms: bool,
    pub certificate_file_name: String,
    pub certificate_bytes: Vec<u8>,
}

/// What the applicant gets back: the reference id correlating the
/// application with its charge, and the hosted payment URL to redirect to.
#[derive(Debug, Clone)]
pub struct SubmissionReceipt {
    pub reference_id: String,
    pub payment_url: String,
}

/// Failures surfaced by the intake flow, mirroring the HTTP error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    /// The provider was unreachable or rejected the charge. No pending
    /// application survives this error.
    #[error("Payment gateway unavailable: {0}")]
    Gateway(String),
    #[error(transparent)]
    Port(PortError),
}

impl From<PortError> for IntakeError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(msg) => Self::NotFound(msg),
            PortError::Gateway(msg) => Self::Gateway(msg),
            other => Self::Port(other),
        }
    }
}

//=========================================================================================
// The Intake Service
//=========================================================================================

/// Callback URLs and charge lifetime, derived from service configuration.
#[derive(Debug, Clone)]
pub struct IntakeSettings {
    /// Public base URL of this service, used to build the gateway's
    /// return/cancel URLs.
    pub public_base_url: String,
    /// How long a charge (and the pending application) stays valid.
    pub charge_ttl_hours: i64,
}

pub struct IntakeService {
    catalog: Arc<dyn CatalogStore>,
    pending: Arc<dyn PendingStore>,
    certificates: Arc<dyn CertificateStore>,
    gateway: Arc<dyn PaymentGateway>,
    settings: IntakeSettings,
}

impl IntakeService {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        pending: Arc<dyn PendingStore>,
        certificates: Arc<dyn CertificateStore>,
        gateway: Arc<dyn PaymentGateway>,
        settings: IntakeSettings,
    ) -> Self {
        Self {
            catalog,
            pending,
            certificates,
            gateway,
            settings,
        }
    }

    /// Processes a submitted application form.
    ///
    /// On success the application sits in the pending store awaiting payment
    /// and the receipt carries the payment URL. On gateway failure the
    /// pending row and the temporary certificate are removed again, so a
    /// failed charge leaves no trace.
    pub async fn submit(&self, form: NewApplication) -> Result<SubmissionReceipt, IntakeError> {
        validate_form(&form)?;

        let institution = self.catalog.institution(form.institution_id).await?;
        let course = self.catalog.course(form.course_id).await?;
        if course.institution_id != institution.id {
            return Err(IntakeError::NotFound(format!(
                "course {} does not belong to institution {}",
                course.id, institution.id
            )));
        }

        let fee = self
            .catalog
            .resolve_fee(course.id, institution.id, institution.country_id)
            .await?
            .ok_or_else(|| {
                // Policy: no fee record means the course is not open for
                // registration; we reject rather than invent a default fee.
                IntakeError::Validation(format!(
                    "no registration fee is configured for course {}",
                    course.id
                ))
            })?;

        let reference_id = generate_reference_id();
        let certificate_ref = self
            .certificates
            .store_temp(&reference_id, &form.certificate_file_name, &form.certificate_bytes)
            .await?;

        let now = Utc::now();
        let expires_at = now + Duration::hours(self.settings.charge_ttl_hours);
        let application = PendingApplication {
            reference_id: reference_id.clone(),
            applicant: Applicant {
                full_name: form.full_name,
                email: form.email,
                phone: form.phone,
                national_id: form.national_id,
                age: form.age,
            },
            institution_id: institution.id,
            course_id: course.id,
            fee_id: fee.id,
            certificate_ref: certificate_ref.clone(),
            accepted_terms: form.accepted_terms,
            created_at: now,
            expires_at,
        };
        self.pending.create(&application).await?;

        let base = self.settings.public_base_url.trim_end_matches('/');
        let charge_request = ChargeRequest {
            amount: fee.amount.clone(),
            currency: fee.currency.clone(),
            reference_id: reference_id.clone(),
            return_url: format!(
                "{base}/payments/callback/success?reference_id={reference_id}"
            ),
            cancel_url: format!(
                "{base}/payments/callback/cancel?reference_id={reference_id}"
            ),
            expires_at,
        };

        let charge = match self.gateway.create_charge(&charge_request).await {
            Ok(charge) => charge,
            Err(err) => {
                warn!(%reference_id, error = %err, "charge creation failed, discarding pending application");
                // Unwind so the failed attempt leaves nothing behind.
                if let Err(cleanup) = self.pending.delete(&reference_id).await {
                    warn!(%reference_id, error = %cleanup, "failed to delete pending application after gateway error");
                }
                if let Err(cleanup) = self.certificates.remove_temp(&certificate_ref).await {
                    warn!(%reference_id, error = %cleanup, "failed to remove temp certificate after gateway error");
                }
                return Err(err.into());
            }
        };

        info!(
            %reference_id,
            provider_reference = %charge.provider_reference,
            "application accepted, awaiting payment"
        );
        Ok(SubmissionReceipt {
            reference_id,
            payment_url: charge.payment_url,
        })
    }
}

/// Field-level checks on the raw form, independent of the catalog.
fn validate_form(form: &NewApplication) -> Result<(), IntakeError> {
    let missing = |field: &str| {
        IntakeError::Validation(format!("the {field} field is required"))
    };
    if form.full_name.trim().is_empty() {
        return Err(missing("name"));
    }
    if form.email.trim().is_empty() || !form.email.contains('@') {
        return Err(IntakeError::Validation(
            "a valid email address is required".to_string(),
        ));
    }
    if form.phone.trim().is_empty() {
        return Err(missing("phone"));
    }
    if !form.accepted_terms {
        return Err(IntakeError::Validation(
            "the terms and conditions must be accepted".to_string(),
        ));
    }
    if !form
        .certificate_file_name
        .to_lowercase()
        .ends_with(".pdf")
    {
        return Err(IntakeError::Validation(
            "the certificate must be a PDF file".to_string(),
        ));
    }
    if form.certificate_bytes.is_empty() {
        return Err(IntakeError::Validation(
            "the certificate file is empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_form() -> NewApplication {
        NewApplication {
            full_name: "Ana Domingos".to_string(),
            email: "ana@example.com".to_string(),
            phone: "+244 900 000 000".to_string(),
            national_id: Some("004512345LA041".to_string()),
            age: Some(19),
            institution_id: 1,
            course_id: 2,
            accepted_terms: true,
            certificate_file_name: "cert.pdf".to_string(),
            certificate_bytes: vec![0x25, 0x50, 0x44, 0x46],
        }
    }

    #[test]
    fn accepts_a_complete_form() {
        assert!(validate_form(&valid_form()).is_ok());
    }

    #[test]
    fn rejects_missing_required_fields() {
        let mut form = valid_form();
        form.full_name = "  ".to_string();
        assert!(matches!(
            validate_form(&form),
            Err(IntakeError::Validation(_))
        ));

        let mut form = valid_form();
        form.email = "not-an-email".to_string();
        assert!(matches!(
            validate_form(&form),
            Err(IntakeError::Validation(_))
        ));
    }

    #[test]
    fn rejects_unaccepted_terms() {
        let mut form = valid_form();
        form.accepted_terms = false;
        assert!(matches!(
            validate_form(&form),
            Err(IntakeError::Validation(_))
        ));
    }

    #[test]
    fn rejects_non_pdf_certificates() {
        let mut form = valid_form();
        form.certificate_file_name = "cert.docx".to_string();
        assert!(matches!(
            validate_form(&form),
            Err(IntakeError::Validation(_))
        ));
    }
}
