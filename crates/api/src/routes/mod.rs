//! API route definitions.
//!
//! Every engine route is scoped by `/tenants/{tenant}`.

use axum::Router;

use crate::AppState;

pub mod examples;
pub mod health;
pub mod nodes;
pub mod processes;
pub mod relations;
pub mod workflows;

/// Creates the API router with all routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(workflows::routes())
        .merge(nodes::routes())
        .merge(relations::routes())
        .merge(examples::routes())
        .merge(processes::routes())
}
