//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use std::sync::Arc;

use intake_core::ports::CatalogStore;
use intake_core::{IntakeService, ReconciliationService};

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    /// Validates submitted forms and opens charges.
    pub intake: IntakeService,
    /// Matches payment notifications against held applications.
    pub reconciliation: ReconciliationService,
    /// Direct catalog access for the browse endpoints.
    pub catalog: Arc<dyn CatalogStore>,
}
