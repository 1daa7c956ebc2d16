//! Router-level tests for the intake API, driving the real axum router with
//! in-memory port fakes via `tower::ServiceExt::oneshot`. Covers the
//! multipart decoding of `/apply` and the dual GET/POST behavior of the
//! payment callback routes.

mod common {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::Router;
    use bigdecimal::{BigDecimal, FromPrimitive};
    use chrono::{DateTime, Duration, Utc};

    use api_lib::web::state::AppState;
    use intake_core::domain::{
        Applicant, Charge, ChargeRequest, ConfirmedApplication, Course, Fee, FeeScope,
        Institution, PaymentStatus, PendingApplication,
    };
    use intake_core::ports::{
        ApplicationStore, CatalogStore, CertificateStore, Notifier, PaymentGateway,
        PendingStore, PortError, PortResult,
    };
    use intake_core::{IntakeService, IntakeSettings, ReconciliationService};

    pub struct FakeCatalog;

    #[async_trait]
    impl CatalogStore for FakeCatalog {
        async fn institution(&self, id: i64) -> PortResult<Institution> {
            (id == 1)
                .then(|| Institution {
                    id: 1,
                    name: "UGS".to_string(),
                    country_id: 10,
                    active: true,
                })
                .ok_or_else(|| PortError::NotFound(format!("institution {id}")))
        }

        async fn course(&self, id: i64) -> PortResult<Course> {
            (id == 2)
                .then(|| Course {
                    id: 2,
                    name: "Direito".to_string(),
                    institution_id: 1,
                    active: true,
                })
                .ok_or_else(|| PortError::NotFound(format!("course {id}")))
        }

        async fn list_institutions(&self) -> PortResult<Vec<Institution>> {
            Ok(vec![self.institution(1).await?])
        }

        async fn courses_for_institution(&self, _institution_id: i64) -> PortResult<Vec<Course>> {
            Ok(vec![self.course(2).await?])
        }

        async fn resolve_fee(
            &self,
            _course_id: i64,
            _institution_id: i64,
            _country_id: i64,
        ) -> PortResult<Option<Fee>> {
            Ok(Some(Fee {
                id: 7,
                amount: BigDecimal::from_f64(7500.0).expect("valid amount"),
                currency: "AOA".to_string(),
                scope: FeeScope::Country(10),
            }))
        }
    }

    /// Pending store with a switchable outage, so tests can drive the
    /// retryable reconciliation failure path.
    #[derive(Default)]
    pub struct FakePending {
        rows: Mutex<HashMap<String, PendingApplication>>,
        pub outage: AtomicBool,
    }

    #[async_trait]
    impl PendingStore for FakePending {
        async fn create(&self, application: &PendingApplication) -> PortResult<()> {
            self.rows
                .lock()
                .unwrap()
                .insert(application.reference_id.clone(), application.clone());
            Ok(())
        }

        async fn get(&self, reference_id: &str) -> PortResult<PendingApplication> {
            if self.outage.load(Ordering::SeqCst) {
                return Err(PortError::Unexpected("store unavailable".to_string()));
            }
            self.rows
                .lock()
                .unwrap()
                .get(reference_id)
                .cloned()
                .ok_or_else(|| PortError::NotFound(format!("pending {reference_id}")))
        }

        async fn delete(&self, reference_id: &str) -> PortResult<()> {
            self.rows.lock().unwrap().remove(reference_id);
            Ok(())
        }

        async fn delete_expired(
            &self,
            _now: DateTime<Utc>,
        ) -> PortResult<Vec<PendingApplication>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    pub struct FakeApplications {
        rows: Mutex<HashMap<String, ConfirmedApplication>>,
    }

    #[async_trait]
    impl ApplicationStore for FakeApplications {
        async fn insert(&self, application: &ConfirmedApplication) -> PortResult<()> {
            let mut rows = self.rows.lock().unwrap();
            if rows.contains_key(&application.code) {
                return Err(PortError::Conflict(format!(
                    "application {} already exists",
                    application.code
                )));
            }
            rows.insert(application.code.clone(), application.clone());
            Ok(())
        }

        async fn find_by_code(&self, code: &str) -> PortResult<Option<ConfirmedApplication>> {
            Ok(self.rows.lock().unwrap().get(code).cloned())
        }
    }

    #[derive(Default)]
    pub struct FakeCertificates {
        temp: Mutex<HashMap<String, Vec<u8>>>,
        permanent: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl CertificateStore for FakeCertificates {
        async fn store_temp(
            &self,
            reference_id: &str,
            file_name: &str,
            bytes: &[u8],
        ) -> PortResult<String> {
            let key = format!("temp/{reference_id}_{file_name}");
            self.temp.lock().unwrap().insert(key.clone(), bytes.to_vec());
            Ok(key)
        }

        async fn promote(&self, temp_ref: &str, code: &str) -> PortResult<String> {
            let name = temp_ref.rsplit('/').next().unwrap_or(temp_ref);
            let name = name.strip_prefix(&format!("{code}_")).unwrap_or(name);
            let key = format!("certificates/{code}_{name}");
            match self.temp.lock().unwrap().remove(temp_ref) {
                Some(bytes) => {
                    self.permanent.lock().unwrap().insert(key.clone(), bytes);
                    Ok(key)
                }
                None if self.permanent.lock().unwrap().contains_key(&key) => Ok(key),
                None => Err(PortError::NotFound(format!("temp certificate {temp_ref}"))),
            }
        }

        async fn remove_temp(&self, temp_ref: &str) -> PortResult<()> {
            self.temp.lock().unwrap().remove(temp_ref);
            Ok(())
        }
    }

    pub struct FakeGateway;

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn create_charge(&self, request: &ChargeRequest) -> PortResult<Charge> {
            Ok(Charge {
                payment_url: format!("https://pay.example/{}", request.reference_id),
                provider_reference: request.reference_id.clone(),
                entity_id: "ENTITY-1".to_string(),
            })
        }

        async fn check_status(&self, _reference_id: &str) -> PortResult<PaymentStatus> {
            Ok(PaymentStatus::Paid)
        }
    }

    pub struct NullNotifier;

    #[async_trait]
    impl Notifier for NullNotifier {
        async fn send_confirmation(&self, _application: &ConfirmedApplication) -> PortResult<()> {
            Ok(())
        }
    }

    pub struct TestApp {
        pub router: Router,
        pub pending: Arc<FakePending>,
        pub certificates: Arc<FakeCertificates>,
    }

    impl TestApp {
        /// Parks an application awaiting payment, as `/apply` would have.
        pub async fn seed_pending(&self, reference_id: &str) {
            let certificate_ref = self
                .certificates
                .store_temp(reference_id, "cert.pdf", b"%PDF-1.4")
                .await
                .expect("temp write succeeds");
            let now = Utc::now();
            self.pending
                .create(&PendingApplication {
                    reference_id: reference_id.to_string(),
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
                    certificate_ref,
                    accepted_terms: true,
                    created_at: now,
                    expires_at: now + Duration::hours(24),
                })
                .await
                .expect("pending create succeeds");
        }
    }

    pub fn test_app() -> TestApp {
        let catalog = Arc::new(FakeCatalog);
        let pending = Arc::new(FakePending::default());
        let applications = Arc::new(FakeApplications::default());
        let certificates = Arc::new(FakeCertificates::default());
        let gateway = Arc::new(FakeGateway);

        let intake = IntakeService::new(
            catalog.clone(),
            pending.clone(),
            certificates.clone(),
            gateway.clone(),
            IntakeSettings {
                public_base_url: "https://apply.example".to_string(),
                charge_ttl_hours: 24,
            },
        );
        let reconciliation = ReconciliationService::new(
            pending.clone(),
            applications.clone(),
            certificates.clone(),
            gateway.clone(),
            Arc::new(NullNotifier),
        );
        let state = Arc::new(AppState {
            intake,
            reconciliation,
            catalog,
        });

        TestApp {
            router: api_lib::web::router(state),
            pending,
            certificates,
        }
    }
}

use std::sync::atomic::Ordering;

use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use tower::ServiceExt;

use common::test_app;

const BOUNDARY: &str = "intake-test-boundary";

fn text_part(name: &str, value: &str) -> String {
    format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
}

fn application_form(include_certificate: bool) -> String {
    let mut body = String::new();
    body.push_str(&text_part("name", "Ana Domingos"));
    body.push_str(&text_part("email", "ana@example.com"));
    body.push_str(&text_part("tel", "+244 900 000 000"));
    body.push_str(&text_part("institution_id", "1"));
    body.push_str(&text_part("course_id", "2"));
    body.push_str(&text_part("termos", "on"));
    if include_certificate {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"certificado\"; \
             filename=\"cert.pdf\"\r\nContent-Type: application/pdf\r\n\r\n%PDF-1.4\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    body
}

fn apply_request(body: String) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/apply")
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).expect("JSON response body")
}

#[tokio::test]
async fn apply_accepts_a_multipart_submission() {
    let app = test_app();

    let response = app
        .router
        .clone()
        .oneshot(apply_request(application_form(true)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = json_body(response).await;
    let reference_id = body["reference_id"].as_str().expect("reference id");
    assert_eq!(reference_id.len(), 8);
    assert!(body["payment_url"]
        .as_str()
        .expect("payment url")
        .contains(reference_id));
}

#[tokio::test]
async fn apply_without_the_certificate_is_rejected() {
    let app = test_app();

    let response = app
        .router
        .clone()
        .oneshot(apply_request(application_form(false)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_success_callback_reads_the_reference_from_the_query() {
    let app = test_app();
    app.seed_pending("AB12CD34").await;

    let request = Request::builder()
        .method(Method::GET)
        .uri("/payments/callback/success?reference_id=AB12CD34")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "confirmed");
    assert_eq!(body["code"], "AB12CD34");
}

#[tokio::test]
async fn post_success_callback_reads_the_reference_from_the_form_body() {
    let app = test_app();
    app.seed_pending("XY98ZW76").await;

    // Webhook variant: the reference arrives urlencoded under the `id` alias.
    let request = Request::builder()
        .method(Method::POST)
        .uri("/payments/callback/success")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("id=XY98ZW76"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "confirmed");
    assert_eq!(body["code"], "XY98ZW76");
}

#[tokio::test]
async fn callback_without_a_reference_is_a_bad_request() {
    let app = test_app();

    let request = Request::builder()
        .method(Method::GET)
        .uri("/payments/callback/success")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cancel_callback_discards_the_pending_application() {
    let app = test_app();
    app.seed_pending("QQ11WW22").await;

    let request = Request::builder()
        .method(Method::GET)
        .uri("/payments/callback/cancel?reference_id=QQ11WW22")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "cancelled");
}

#[tokio::test]
async fn webhook_store_failure_asks_for_redelivery_but_the_redirect_does_not() {
    let app = test_app();
    app.seed_pending("AB12CD34").await;
    app.pending.outage.store(true, Ordering::SeqCst);

    // The server-to-server notification gets a 5xx so the provider retries.
    let webhook = Request::builder()
        .method(Method::POST)
        .uri("/payments/callback/success")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("reference_id=AB12CD34"))
        .unwrap();
    let response = app.router.clone().oneshot(webhook).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // The applicant's browser gets a friendly message instead of the error.
    let redirect = Request::builder()
        .method(Method::GET)
        .uri("/payments/callback/success?reference_id=AB12CD34")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(redirect).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "error");
}
