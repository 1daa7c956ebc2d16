//! services/api/src/adapters/gateway.rs
//!
//! This module contains the adapter for the Prontu payment gateway HTTP API.
//! It implements the `PaymentGateway` port from the `intake_core` crate.
//!
//! Charges are opened with `POST /v1/hosts/transactions-receive` and verified
//! with `GET /v1/hosts/transactions/{reference_id}`. Both calls are
//! bearer-token authenticated and carry the client-level timeout configured
//! at construction; a timed-out call is a gateway failure.

use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::ToPrimitive;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use intake_core::domain::{Charge, ChargeRequest, PaymentStatus};
use intake_core::ports::{PaymentGateway, PortError, PortResult};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `PaymentGateway` port against the Prontu API.
#[derive(Clone)]
pub struct ProntuGatewayAdapter {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl ProntuGatewayAdapter {
    /// Creates a new adapter. Fails only if the HTTP client cannot be built.
    pub fn new(base_url: String, token: String, timeout: Duration) -> Result<Self, PortError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }
}

//=========================================================================================
// Wire Format
//=========================================================================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ChargeData {
    url: String,
    reference_id: Option<String>,
    entity_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    status: String,
}

fn charge_from_data(data: ChargeData, requested_reference: &str) -> Charge {
    Charge {
        payment_url: data.url,
        // The provider echoes our reference id back; fall back to it when
        // the field is absent.
        provider_reference: data
            .reference_id
            .unwrap_or_else(|| requested_reference.to_string()),
        entity_id: data.entity_id.unwrap_or_default(),
    }
}

fn status_from_str(raw: &str) -> PortResult<PaymentStatus> {
    match raw.to_lowercase().as_str() {
        "pending" | "initiated" | "processing" => Ok(PaymentStatus::Pending),
        "paid" | "confirmed" | "completed" => Ok(PaymentStatus::Paid),
        "failed" | "cancelled" | "expired" | "rejected" => Ok(PaymentStatus::Failed),
        other => Err(PortError::Gateway(format!(
            "provider reported unknown charge status '{other}'"
        ))),
    }
}

//=========================================================================================
// `PaymentGateway` Trait Implementation
//=========================================================================================

#[async_trait]
impl PaymentGateway for ProntuGatewayAdapter {
    async fn create_charge(&self, request: &ChargeRequest) -> PortResult<Charge> {
        let amount = request.amount.to_f64().ok_or_else(|| {
            PortError::Unexpected(format!("fee amount {} is not representable", request.amount))
        })?;
        let payload = json!({
            "currency": request.currency,
            "amount": amount,
            "reference_id": request.reference_id,
            "source": 0,
            "cancel_url": request.cancel_url,
            "return_url": request.return_url,
            "expiration_date": request.expires_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        });
        debug!(reference_id = %request.reference_id, "opening charge with the payment provider");

        let response = self
            .client
            .post(format!("{}/v1/hosts/transactions-receive", self.base_url))
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PortError::Gateway(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PortError::Gateway(format!(
                "create charge returned {status}: {body}"
            )));
        }

        let envelope: Envelope<ChargeData> = response
            .json()
            .await
            .map_err(|e| PortError::Gateway(format!("malformed charge response: {e}")))?;
        Ok(charge_from_data(envelope.data, &request.reference_id))
    }

    async fn check_status(&self, reference_id: &str) -> PortResult<PaymentStatus> {
        let response = self
            .client
            .get(format!(
                "{}/v1/hosts/transactions/{reference_id}",
                self.base_url
            ))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| PortError::Gateway(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PortError::Gateway(format!(
                "status check returned {status}: {body}"
            )));
        }

        let envelope: Envelope<StatusData> = response
            .json()
            .await
            .map_err(|e| PortError::Gateway(format!("malformed status response: {e}")))?;
        status_from_str(&envelope.data.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_charge_response() {
        let envelope: Envelope<ChargeData> = serde_json::from_str(
            r#"{"data":{"url":"https://pay.prontu.example/c/123","reference_id":"AB12CD34","entity_id":"00123"}}"#,
        )
        .unwrap();
        let charge = charge_from_data(envelope.data, "AB12CD34");
        assert_eq!(charge.payment_url, "https://pay.prontu.example/c/123");
        assert_eq!(charge.provider_reference, "AB12CD34");
        assert_eq!(charge.entity_id, "00123");
    }

    #[test]
    fn falls_back_to_our_reference_when_the_provider_omits_it() {
        let envelope: Envelope<ChargeData> =
            serde_json::from_str(r#"{"data":{"url":"https://pay.prontu.example/c/9"}}"#).unwrap();
        let charge = charge_from_data(envelope.data, "ZZ99YY88");
        assert_eq!(charge.provider_reference, "ZZ99YY88");
        assert_eq!(charge.entity_id, "");
    }

    #[test]
    fn maps_provider_status_strings() {
        assert_eq!(status_from_str("paid").unwrap(), PaymentStatus::Paid);
        assert_eq!(status_from_str("Confirmed").unwrap(), PaymentStatus::Paid);
        assert_eq!(status_from_str("pending").unwrap(), PaymentStatus::Pending);
        assert_eq!(status_from_str("expired").unwrap(), PaymentStatus::Failed);
        assert!(status_from_str("weird").is_err());
    }
}
