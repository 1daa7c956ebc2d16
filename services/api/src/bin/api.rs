//! services/api/src/bin/api.rs

use std::sync::Arc;
use std::time::Duration;

use api_lib::{
    adapters::{DbAdapter, HttpMailerAdapter, LogNotifier, MediaCertificateStore, ProntuGatewayAdapter},
    config::Config,
    error::ApiError,
    web::{rest::ApiDoc, state::AppState},
};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    Router,
};
use chrono::Utc;
use intake_core::ports::Notifier;
use intake_core::{IntakeService, IntakeSettings, ReconciliationService};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let certificate_store = Arc::new(MediaCertificateStore::new(config.media_root.clone()));
    let gateway = Arc::new(
        ProntuGatewayAdapter::new(
            config.gateway_api_url.clone(),
            config.gateway_token.clone(),
            Duration::from_secs(config.gateway_timeout_secs),
        )
        .map_err(|e| ApiError::Internal(e.to_string()))?,
    );
    let notifier: Arc<dyn Notifier> = match (&config.mail_api_url, &config.mail_api_token) {
        (Some(url), Some(token)) => Arc::new(
            HttpMailerAdapter::new(
                url.clone(),
                token.clone(),
                config.mail_from.clone(),
                Duration::from_secs(config.gateway_timeout_secs),
            )
            .map_err(|e| ApiError::Internal(e.to_string()))?,
        ),
        _ => {
            info!("MAIL_API_URL not set; confirmation emails will only be logged");
            Arc::new(LogNotifier)
        }
    };

    // --- 4. Build the Core Services and Shared AppState ---
    let intake = IntakeService::new(
        db_adapter.clone(),
        db_adapter.clone(),
        certificate_store.clone(),
        gateway.clone(),
        IntakeSettings {
            public_base_url: config.public_base_url.clone(),
            charge_ttl_hours: config.charge_ttl_hours,
        },
    );
    let reconciliation = ReconciliationService::new(
        db_adapter.clone(),
        db_adapter.clone(),
        certificate_store.clone(),
        gateway.clone(),
        notifier,
    );
    let app_state = Arc::new(AppState {
        intake,
        reconciliation,
        catalog: db_adapter.clone(),
    });

    // --- 5. Start the Expiry Reaper ---
    // Garbage-collects pending applications whose charge expired with no
    // success or cancel notification, together with their temp files.
    {
        let state = app_state.clone();
        let interval = Duration::from_secs(config.reaper_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = state.reconciliation.reap_expired(Utc::now()).await {
                    error!("expired-application reaper failed: {e}");
                }
            }
        });
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 6. Create the Web Router ---
    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_lib::web::router(app_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors);

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
