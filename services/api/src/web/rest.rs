//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the application-intake REST endpoints and
//! the master definition for the OpenAPI specification.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::error;
use utoipa::{OpenApi, ToSchema};

use intake_core::domain::{Course, Institution};
use intake_core::{IntakeError, NewApplication};

use crate::web::state::AppState;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        apply_handler,
        list_institutions_handler,
        list_courses_handler,
        crate::web::callbacks::success_callback_handler,
        crate::web::callbacks::cancel_callback_handler,
    ),
    components(
        schemas(ApplyResponse, InstitutionView, CourseView, crate::web::callbacks::CallbackReply)
    ),
    tags(
        (name = "Scholarship Intake API", description = "API endpoints for submitting and paying for scholarship applications.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The response payload sent after a successfully submitted application.
#[derive(Serialize, ToSchema)]
pub struct ApplyResponse {
    reference_id: String,
    payment_url: String,
}

#[derive(Serialize, ToSchema)]
pub struct InstitutionView {
    id: i64,
    name: String,
    country_id: i64,
}

impl From<Institution> for InstitutionView {
    fn from(i: Institution) -> Self {
        Self {
            id: i.id,
            name: i.name,
            country_id: i.country_id,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct CourseView {
    id: i64,
    name: String,
}

impl From<Course> for CourseView {
    fn from(c: Course) -> Self {
        Self {
            id: c.id,
            name: c.name,
        }
    }
}

fn intake_error_response(err: IntakeError) -> (StatusCode, String) {
    match err {
        IntakeError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
        IntakeError::NotFound(msg) => (StatusCode::BAD_REQUEST, msg),
        IntakeError::Gateway(msg) => {
            error!("charge creation failed: {msg}");
            (
                StatusCode::BAD_GATEWAY,
                "Could not reach the payment provider. Please try again.".to_string(),
            )
        }
        IntakeError::Port(err) => {
            error!("intake failed: {err:?}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to process the application".to_string(),
            )
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Submit a scholarship application.
///
/// Accepts a multipart/form-data request carrying the applicant fields and
/// the certificate file. Returns the application reference id and the hosted
/// payment URL to redirect the applicant to.
#[utoipa::path(
    post,
    path = "/apply",
    request_body(content_type = "multipart/form-data", description = "Applicant fields (name, email, tel, age, bi, institution_id, course_id, termos) and the certificado PDF file."),
    responses(
        (status = 201, description = "Application accepted, awaiting payment", body = ApplyResponse),
        (status = 400, description = "Validation failure (missing field, unknown institution/course, non-PDF certificate)"),
        (status = 502, description = "Payment provider unreachable; no application was stored"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn apply_handler(
    State(app_state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut full_name = None;
    let mut email = None;
    let mut phone = None;
    let mut national_id = None;
    let mut age = None;
    let mut institution_id = None;
    let mut course_id = None;
    let mut accepted_terms = false;
    let mut certificate: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Failed to read multipart data: {}", e),
        )
    })? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "certificado" => {
                let file_name = field.file_name().unwrap_or("certificado.pdf").to_string();
                let data = field.bytes().await.map_err(|e| {
                    (
                        StatusCode::BAD_REQUEST,
                        format!("Failed to read the certificate file: {}", e),
                    )
                })?;
                certificate = Some((file_name, data.to_vec()));
            }
            _ => {
                let value = field.text().await.map_err(|e| {
                    (
                        StatusCode::BAD_REQUEST,
                        format!("Failed to read field '{}': {}", name, e),
                    )
                })?;
                match name.as_str() {
                    "name" => full_name = Some(value),
                    "email" => email = Some(value),
                    "tel" => phone = Some(value),
                    "bi" => national_id = Some(value).filter(|v| !v.trim().is_empty()),
                    "age" => {
                        age = match value.trim() {
                            "" => None,
                            raw => Some(raw.parse::<u32>().map_err(|_| {
                                (
                                    StatusCode::BAD_REQUEST,
                                    "the age field must be a number".to_string(),
                                )
                            })?),
                        }
                    }
                    "institution_id" => {
                        institution_id = Some(value.parse::<i64>().map_err(|_| {
                            (
                                StatusCode::BAD_REQUEST,
                                "the institution_id field must be a number".to_string(),
                            )
                        })?)
                    }
                    "course_id" => {
                        course_id = Some(value.parse::<i64>().map_err(|_| {
                            (
                                StatusCode::BAD_REQUEST,
                                "the course_id field must be a number".to_string(),
                            )
                        })?)
                    }
                    "termos" => {
                        accepted_terms = matches!(value.as_str(), "on" | "true" | "1");
                    }
                    // Unknown fields are ignored rather than rejected.
                    _ => {}
                }
            }
        }
    }

    let required = |field: Option<String>, name: &str| {
        field.ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                format!("the {name} field is required"),
            )
        })
    };
    let (certificate_file_name, certificate_bytes) = certificate.ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            "the certificado file is required".to_string(),
        )
    })?;

    let form = NewApplication {
        full_name: required(full_name, "name")?,
        email: required(email, "email")?,
        phone: required(phone, "tel")?,
        national_id,
        age,
        institution_id: institution_id.ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                "the institution_id field is required".to_string(),
            )
        })?,
        course_id: course_id.ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                "the course_id field is required".to_string(),
            )
        })?,
        accepted_terms,
        certificate_file_name,
        certificate_bytes,
    };

    let receipt = app_state
        .intake
        .submit(form)
        .await
        .map_err(intake_error_response)?;

    Ok((
        StatusCode::CREATED,
        Json(ApplyResponse {
            reference_id: receipt.reference_id,
            payment_url: receipt.payment_url,
        }),
    ))
}

/// List the active institutions accepting applications.
#[utoipa::path(
    get,
    path = "/institutions",
    responses(
        (status = 200, description = "Active institutions", body = [InstitutionView]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_institutions_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let institutions = app_state.catalog.list_institutions().await.map_err(|e| {
        error!("failed to list institutions: {e:?}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to load institutions".to_string(),
        )
    })?;
    let views: Vec<InstitutionView> = institutions.into_iter().map(Into::into).collect();
    Ok(Json(views))
}

/// List the active courses of one institution.
#[utoipa::path(
    get,
    path = "/institutions/{id}/courses",
    params(("id" = i64, Path, description = "The institution id")),
    responses(
        (status = 200, description = "Active courses of the institution", body = [CourseView]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_courses_handler(
    State(app_state): State<Arc<AppState>>,
    Path(institution_id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let courses = app_state
        .catalog
        .courses_for_institution(institution_id)
        .await
        .map_err(|e| {
            error!("failed to list courses: {e:?}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load courses".to_string(),
            )
        })?;
    let views: Vec<CourseView> = courses.into_iter().map(Into::into).collect();
    Ok(Json(views))
}
