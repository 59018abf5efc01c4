//! HTTP API layer with Axum routes.
//!
//! This crate provides:
//! - REST routes for every workflow operation, scoped by tenant
//! - The acting-user extractor
//! - Error responses

pub mod error;
pub mod extractors;
pub mod routes;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use ringi_core::workflow::{ApprovalStateMachine, WorkflowCatalog};

pub use error::ApiError;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Approval state machine.
    pub machine: ApprovalStateMachine,
    /// Administrative CRUD over the same store.
    pub catalog: WorkflowCatalog,
}

impl AppState {
    /// Builds state around `machine`, sharing its store with the catalog.
    #[must_use]
    pub fn new(machine: ApprovalStateMachine) -> Self {
        Self {
            catalog: WorkflowCatalog::new(machine.store()),
            machine,
        }
    }
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
