//! services/api/src/web/callbacks.rs
//!
//! The payment-notification entry points. The provider reaches these two
//! routes both as browser redirects (GET, after the applicant finishes or
//! abandons checkout) and as server-to-server webhooks (POST). Both paths
//! feed the same reconciliation service; the difference is only in how the
//! result is reported:
//!
//! * GET is user-facing: failures become a "contact support" style message,
//!   never a raw error.
//! * POST is the webhook: reconciliation failures after a real payment
//!   return 5xx so the provider redelivers the notification.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Json},
    Form,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use utoipa::ToSchema;

use intake_core::reconciliation::{Outcome, ReconcileError};

use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

/// The notification parameters. `Form` reads these from the query string on
/// GET redirects and from the urlencoded body on POST webhooks. The provider
/// sends the reference either as `reference_id` or (in some webhook
/// variants) as `id`.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CallbackParams {
    pub reference_id: Option<String>,
    pub id: Option<String>,
}

impl CallbackParams {
    fn reference(&self) -> Option<&str> {
        self.reference_id
            .as_deref()
            .or(self.id.as_deref())
            .filter(|s| !s.is_empty())
    }
}

/// The reply body for both callback routes.
#[derive(Serialize, ToSchema)]
pub struct CallbackReply {
    status: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

const SUPPORT_MESSAGE: &str =
    "We could not confirm your payment. If you have been charged, please contact support \
     quoting your reference id.";

//=========================================================================================
// Handlers
//=========================================================================================

/// Payment success notification (browser redirect or provider webhook).
#[utoipa::path(
    get,
    path = "/payments/callback/success",
    params(("reference_id" = Option<String>, Query, description = "The application reference id")),
    responses(
        (status = 200, description = "Notification processed", body = CallbackReply),
        (status = 400, description = "Missing reference id"),
        (status = 500, description = "Reconciliation failed; the webhook should be redelivered")
    )
)]
pub async fn success_callback_handler(
    State(app_state): State<Arc<AppState>>,
    method: Method,
    Form(params): Form<CallbackParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let Some(reference_id) = params.reference() else {
        return Err((
            StatusCode::BAD_REQUEST,
            "reference_id is required".to_string(),
        ));
    };

    let is_webhook = method == Method::POST;
    match app_state.reconciliation.confirm(reference_id).await {
        Ok(Outcome::Confirmed(app)) | Ok(Outcome::AlreadyConfirmed(app)) => Ok((
            StatusCode::OK,
            Json(CallbackReply {
                status: "confirmed",
                message: format!(
                    "Congratulations! Your application {} has been confirmed.",
                    app.code
                ),
                code: Some(app.code),
            }),
        )),
        Ok(other) => {
            // confirm() never produces the cancel outcomes.
            error!(reference_id, ?other, "unexpected outcome from confirm");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Unexpected reconciliation outcome".to_string(),
            ))
        }
        Err(ReconcileError::UnknownReference(_)) => {
            error!(reference_id, "success notification without a pending application");
            // Redelivery cannot help here; acknowledge the webhook, tell the
            // applicant to contact support.
            Ok((
                StatusCode::OK,
                Json(CallbackReply {
                    status: "error",
                    message: SUPPORT_MESSAGE.to_string(),
                    code: None,
                }),
            ))
        }
        Err(ReconcileError::Unverified { status, .. }) => {
            warn!(reference_id, ?status, "success notification for an unpaid charge");
            Ok((
                StatusCode::OK,
                Json(CallbackReply {
                    status: "error",
                    message: SUPPORT_MESSAGE.to_string(),
                    code: None,
                }),
            ))
        }
        Err(ReconcileError::Port(err)) => {
            error!(reference_id, error = %err, "reconciliation failed after payment");
            if is_webhook {
                // Money has changed hands; a 5xx makes the provider retry.
                Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Reconciliation failed; please redeliver".to_string(),
                ))
            } else {
                Ok((
                    StatusCode::OK,
                    Json(CallbackReply {
                        status: "error",
                        message: SUPPORT_MESSAGE.to_string(),
                        code: None,
                    }),
                ))
            }
        }
    }
}

/// Payment cancel notification (browser redirect or provider webhook).
#[utoipa::path(
    get,
    path = "/payments/callback/cancel",
    params(("reference_id" = Option<String>, Query, description = "The application reference id")),
    responses(
        (status = 200, description = "Notification processed", body = CallbackReply),
        (status = 400, description = "Missing reference id"),
        (status = 500, description = "Cleanup failed; the webhook should be redelivered")
    )
)]
pub async fn cancel_callback_handler(
    State(app_state): State<Arc<AppState>>,
    method: Method,
    Form(params): Form<CallbackParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let Some(reference_id) = params.reference() else {
        return Err((
            StatusCode::BAD_REQUEST,
            "reference_id is required".to_string(),
        ));
    };

    let is_webhook = method == Method::POST;
    match app_state.reconciliation.cancel(reference_id).await {
        Ok(Outcome::Cancelled) | Ok(Outcome::AlreadyCancelled) => Ok((
            StatusCode::OK,
            Json(CallbackReply {
                status: "cancelled",
                message: format!(
                    "Payment cancelled for application {reference_id}. \
                     You can submit the form again if you wish to retry."
                ),
                code: None,
            }),
        )),
        Ok(Outcome::Confirmed(app)) | Ok(Outcome::AlreadyConfirmed(app)) => {
            // Stale cancel after a successful payment: the confirmation stands.
            Ok((
                StatusCode::OK,
                Json(CallbackReply {
                    status: "confirmed",
                    message: format!("Application {} is already confirmed.", app.code),
                    code: Some(app.code),
                }),
            ))
        }
        Err(err) => {
            error!(reference_id, error = %err, "cancel cleanup failed");
            if is_webhook {
                Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Cleanup failed; please redeliver".to_string(),
                ))
            } else {
                Ok((
                    StatusCode::OK,
                    Json(CallbackReply {
                        status: "error",
                        message: SUPPORT_MESSAGE.to_string(),
                        code: None,
                    }),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_id_takes_precedence_over_id() {
        let params = CallbackParams {
            reference_id: Some("AB12CD34".to_string()),
            id: Some("OTHER".to_string()),
        };
        assert_eq!(params.reference(), Some("AB12CD34"));
    }

    #[test]
    fn falls_back_to_the_id_alias() {
        let params = CallbackParams {
            reference_id: None,
            id: Some("AB12CD34".to_string()),
        };
        assert_eq!(params.reference(), Some("AB12CD34"));
    }

    #[test]
    fn empty_values_count_as_missing() {
        let params = CallbackParams {
            reference_id: Some(String::new()),
            id: None,
        };
        assert_eq!(params.reference(), None);
        assert_eq!(CallbackParams::default().reference(), None);
    }
}
