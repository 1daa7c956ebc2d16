//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `CatalogStore`, `PendingStore` and `ApplicationStore` ports from the
//! `intake_core` crate. It handles all interactions with the PostgreSQL database
//! using `sqlx`.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use intake_core::domain::{
    Applicant, ApplicationState, ConfirmedApplication, Course, Fee, Institution,
    PendingApplication,
};
use intake_core::ports::{
    ApplicationStore, CatalogStore, PendingStore, PortError, PortResult,
};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the persistence ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct InstitutionRecord {
    id: i64,
    name: String,
    country_id: i64,
    active: bool,
}
impl InstitutionRecord {
    fn to_domain(self) -> Institution {
        Institution {
            id: self.id,
            name: self.name,
            country_id: self.country_id,
            active: self.active,
        }
    }
}

#[derive(FromRow)]
struct CourseRecord {
    id: i64,
    name: String,
    institution_id: i64,
    active: bool,
}
impl CourseRecord {
    fn to_domain(self) -> Course {
        Course {
            id: self.id,
            name: self.name,
            institution_id: self.institution_id,
            active: self.active,
        }
    }
}

#[derive(FromRow)]
struct FeeRecord {
    id: i64,
    amount: BigDecimal,
    currency: String,
    course_id: Option<i64>,
    institution_id: Option<i64>,
    country_id: Option<i64>,
}
impl FeeRecord {
    fn to_domain(self) -> PortResult<Fee> {
        // The table carries the same exactly-one-scope CHECK constraint, so
        // this only fails on schema drift.
        Fee::from_scope_refs(
            self.id,
            self.amount,
            self.currency,
            self.course_id,
            self.institution_id,
            self.country_id,
        )
        .map_err(|e| PortError::Unexpected(e.to_string()))
    }
}

#[derive(FromRow)]
struct PendingRecord {
    reference_id: String,
    full_name: String,
    email: String,
    phone: String,
    national_id: Option<String>,
    age: Option<i32>,
    institution_id: i64,
    course_id: i64,
    fee_id: i64,
    certificate_ref: String,
    accepted_terms: bool,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}
impl PendingRecord {
    fn to_domain(self) -> PendingApplication {
        PendingApplication {
            reference_id: self.reference_id,
            applicant: Applicant {
                full_name: self.full_name,
                email: self.email,
                phone: self.phone,
                national_id: self.national_id,
                age: self.age.map(|a| a as u32),
            },
            institution_id: self.institution_id,
            course_id: self.course_id,
            fee_id: self.fee_id,
            certificate_ref: self.certificate_ref,
            accepted_terms: self.accepted_terms,
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

#[derive(FromRow)]
struct ApplicationRecord {
    code: String,
    full_name: String,
    email: String,
    phone: String,
    national_id: Option<String>,
    age: Option<i32>,
    institution_id: i64,
    course_id: i64,
    fee_id: i64,
    certificate_ref: String,
    state: String,
    submitted_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ApplicationRecord {
    fn to_domain(self) -> PortResult<ConfirmedApplication> {
        let state = ApplicationState::parse(&self.state).ok_or_else(|| {
            PortError::Unexpected(format!(
                "application {} has unknown state '{}'",
                self.code, self.state
            ))
        })?;
        Ok(ConfirmedApplication {
            code: self.code,
            applicant: Applicant {
                full_name: self.full_name,
                email: self.email,
                phone: self.phone,
                national_id: self.national_id,
                age: self.age.map(|a| a as u32),
            },
            institution_id: self.institution_id,
            course_id: self.course_id,
            fee_id: self.fee_id,
            certificate_ref: self.certificate_ref,
            state,
            submitted_at: self.submitted_at,
            updated_at: self.updated_at,
        })
    }
}

//=========================================================================================
// `CatalogStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl CatalogStore for DbAdapter {
    async fn institution(&self, id: i64) -> PortResult<Institution> {
        let record = sqlx::query_as::<_, InstitutionRecord>(
            "SELECT id, name, country_id, active FROM institutions WHERE id = $1 AND active",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Institution {} not found", id)),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn course(&self, id: i64) -> PortResult<Course> {
        let record = sqlx::query_as::<_, CourseRecord>(
            "SELECT id, name, institution_id, active FROM courses WHERE id = $1 AND active",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Course {} not found", id)),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn list_institutions(&self) -> PortResult<Vec<Institution>> {
        let records = sqlx::query_as::<_, InstitutionRecord>(
            "SELECT id, name, country_id, active FROM institutions WHERE active ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn courses_for_institution(&self, institution_id: i64) -> PortResult<Vec<Course>> {
        let records = sqlx::query_as::<_, CourseRecord>(
            "SELECT id, name, institution_id, active FROM courses \
             WHERE institution_id = $1 AND active ORDER BY name",
        )
        .bind(institution_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn resolve_fee(
        &self,
        course_id: i64,
        institution_id: i64,
        country_id: i64,
    ) -> PortResult<Option<Fee>> {
        // Most specific scope wins: course, then institution, then country.
        let record = sqlx::query_as::<_, FeeRecord>(
            "SELECT id, amount, currency, course_id, institution_id, country_id FROM fees \
             WHERE active AND (course_id = $1 OR institution_id = $2 OR country_id = $3) \
             ORDER BY (course_id IS NOT NULL) DESC, (institution_id IS NOT NULL) DESC \
             LIMIT 1",
        )
        .bind(course_id)
        .bind(institution_id)
        .bind(country_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        record.map(|r| r.to_domain()).transpose()
    }
}

//=========================================================================================
// `PendingStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl PendingStore for DbAdapter {
    async fn create(&self, application: &PendingApplication) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO pending_applications \
             (reference_id, full_name, email, phone, national_id, age, institution_id, \
              course_id, fee_id, certificate_ref, accepted_terms, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(&application.reference_id)
        .bind(&application.applicant.full_name)
        .bind(&application.applicant.email)
        .bind(&application.applicant.phone)
        .bind(&application.applicant.national_id)
        .bind(application.applicant.age.map(|a| a as i32))
        .bind(application.institution_id)
        .bind(application.course_id)
        .bind(application.fee_id)
        .bind(&application.certificate_ref)
        .bind(application.accepted_terms)
        .bind(application.created_at)
        .bind(application.expires_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn get(&self, reference_id: &str) -> PortResult<PendingApplication> {
        let record = sqlx::query_as::<_, PendingRecord>(
            "SELECT reference_id, full_name, email, phone, national_id, age, institution_id, \
                    course_id, fee_id, certificate_ref, accepted_terms, created_at, expires_at \
             FROM pending_applications WHERE reference_id = $1",
        )
        .bind(reference_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Pending application {} not found", reference_id))
            }
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn delete(&self, reference_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM pending_applications WHERE reference_id = $1")
            .bind(reference_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> PortResult<Vec<PendingApplication>> {
        let records = sqlx::query_as::<_, PendingRecord>(
            "DELETE FROM pending_applications WHERE expires_at <= $1 \
             RETURNING reference_id, full_name, email, phone, national_id, age, institution_id, \
                       course_id, fee_id, certificate_ref, accepted_terms, created_at, expires_at",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}

//=========================================================================================
// `ApplicationStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ApplicationStore for DbAdapter {
    async fn insert(&self, application: &ConfirmedApplication) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO applications \
             (code, full_name, email, phone, national_id, age, institution_id, course_id, \
              fee_id, certificate_ref, state, submitted_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(&application.code)
        .bind(&application.applicant.full_name)
        .bind(&application.applicant.email)
        .bind(&application.applicant.phone)
        .bind(&application.applicant.national_id)
        .bind(application.applicant.age.map(|a| a as i32))
        .bind(application.institution_id)
        .bind(application.course_id)
        .bind(application.fee_id)
        .bind(&application.certificate_ref)
        .bind(application.state.as_str())
        .bind(application.submitted_at)
        .bind(application.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            // The unique constraint on `code` is what collapses concurrent
            // confirmations of the same reference id into one record.
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                PortError::Conflict(format!("application {} already exists", application.code))
            }
            _ => unexpected(e),
        })?;
        Ok(())
    }

    async fn find_by_code(&self, code: &str) -> PortResult<Option<ConfirmedApplication>> {
        let record = sqlx::query_as::<_, ApplicationRecord>(
            "SELECT code, full_name, email, phone, national_id, age, institution_id, course_id, \
                    fee_id, certificate_ref, state, submitted_at, updated_at \
             FROM applications WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        record.map(|r| r.to_domain()).transpose()
    }
}
