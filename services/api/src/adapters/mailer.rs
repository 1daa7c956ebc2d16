//! services/api/src/adapters/mailer.rs
//!
//! Implementations of the `Notifier` port: a transactional-mail HTTP API
//! client, and a logging no-op used when mail is not configured.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use intake_core::domain::ConfirmedApplication;
use intake_core::ports::{Notifier, PortError, PortResult};

//=========================================================================================
// HTTP Mail Adapter
//=========================================================================================

/// Sends the confirmation email by posting JSON to a transactional-mail API.
#[derive(Clone)]
pub struct HttpMailerAdapter {
    client: reqwest::Client,
    api_url: String,
    token: String,
    from: String,
}

impl HttpMailerAdapter {
    pub fn new(
        api_url: String,
        token: String,
        from: String,
        timeout: Duration,
    ) -> Result<Self, PortError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(Self {
            client,
            api_url,
            token,
            from,
        })
    }
}

fn confirmation_body(application: &ConfirmedApplication) -> String {
    format!(
        "Hello {name},\n\n\
         Your application {code} has been confirmed.\n\n\
         You will be notified about the next steps shortly.\n\n\
         Thank you!\n\
         The Scholarship Team",
        name = application.applicant.full_name,
        code = application.code,
    )
}

#[async_trait]
impl Notifier for HttpMailerAdapter {
    async fn send_confirmation(&self, application: &ConfirmedApplication) -> PortResult<()> {
        let payload = json!({
            "from": self.from,
            "to": application.applicant.email,
            "subject": "Your scholarship application is confirmed",
            "text": confirmation_body(application),
        });

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PortError::Unexpected(format!(
                "mail API returned {status}: {body}"
            )));
        }
        Ok(())
    }
}

//=========================================================================================
// Logging No-op Adapter
//=========================================================================================

/// Used when no mail API is configured; records the send in the log only.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_confirmation(&self, application: &ConfirmedApplication) -> PortResult<()> {
        info!(
            code = %application.code,
            email = %application.applicant.email,
            "mail not configured, confirmation logged only"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use intake_core::domain::{Applicant, ApplicationState};

    #[test]
    fn confirmation_body_names_the_applicant_and_code() {
        let application = ConfirmedApplication {
            code: "AB12CD34".to_string(),
            applicant: Applicant {
                full_name: "Ana Domingos".to_string(),
                email: "ana@example.com".to_string(),
                phone: "+244 900 000 000".to_string(),
                national_id: None,
                age: Some(19),
            },
            institution_id: 1,
            course_id: 2,
            fee_id: 7,
            certificate_ref: "certificados/AB12CD34_cert.pdf".to_string(),
            state: ApplicationState::Submitted,
            submitted_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let body = confirmation_body(&application);
        assert!(body.contains("Ana Domingos"));
        assert!(body.contains("AB12CD34"));
    }
}
