pub mod callbacks;
pub mod rest;
pub mod state;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

pub use callbacks::{cancel_callback_handler, success_callback_handler};
pub use rest::{apply_handler, list_courses_handler, list_institutions_handler};

/// Upper bound on the multipart request size, sized for the certificate PDF.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Builds the API router. Both callback routes accept GET (browser
/// redirects) and POST (server-to-server webhooks).
pub fn router(state: Arc<state::AppState>) -> Router {
    Router::new()
        .route("/apply", post(apply_handler))
        .route("/institutions", get(list_institutions_handler))
        .route("/institutions/{id}/courses", get(list_courses_handler))
        .route(
            "/payments/callback/success",
            get(success_callback_handler).post(success_callback_handler),
        )
        .route(
            "/payments/callback/cancel",
            get(cancel_callback_handler).post(cancel_callback_handler),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}
