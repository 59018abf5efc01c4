//! Instance routes: creation, start, Admit/Dismiss and status.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;

use ringi_core::workflow::{ApprovalAction, InstanceStatus, StartRequest};

use crate::{AppState, error::ApiError, extractors::ActingUser};

/// Creates the instance routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/tenants/{tenant}/workflows/{wf_id}/examples",
            get(list_examples).post(create_example),
        )
        .route(
            "/tenants/{tenant}/examples/{ex_id}",
            get(get_example)
                .patch(update_example)
                .delete(delete_example),
        )
        .route("/tenants/{tenant}/examples/{ex_id}/start", post(start_example))
        .route("/tenants/{tenant}/examples/{ex_id}/admit", post(admit))
        .route("/tenants/{tenant}/examples/{ex_id}/dismiss", post(dismiss))
        .route("/tenants/{tenant}/examples/{ex_id}/status", get(status))
}

/// Request body for starting an instance.
#[derive(Debug, Default, Deserialize)]
pub struct StartExampleRequest {
    /// Directory domain for approver lookups.
    #[serde(default)]
    pub domain: String,
}

/// Request body for Admit and Dismiss.
#[derive(Debug, Default, Deserialize)]
pub struct DecisionRequest {
    /// Comment stored on the step.
    #[serde(default)]
    pub comment: String,
    /// Directory domain for approver lookups.
    #[serde(default)]
    pub domain: String,
}

/// Request body for setting an instance's status.
#[derive(Debug, Deserialize)]
pub struct UpdateExampleRequest {
    /// New status.
    pub status: InstanceStatus,
}

/// GET `/tenants/{tenant}/workflows/{wf_id}/examples` - List instances.
async fn list_examples(
    State(state): State<AppState>,
    Path((tenant, wf_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let examples = state.catalog.find_examples(&tenant, &wf_id).await?;
    Ok(Json(json!({ "data": examples })))
}

/// POST `/tenants/{tenant}/workflows/{wf_id}/examples` - Create a pending
/// instance with the caller as applicant.
async fn create_example(
    State(state): State<AppState>,
    Path((tenant, wf_id)): Path<(String, String)>,
    user: ActingUser,
) -> Result<impl IntoResponse, ApiError> {
    let example = state
        .machine
        .add_example(&tenant, &wf_id, user.id())
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "data": example }))))
}

/// GET `/tenants/{tenant}/examples/{ex_id}` - Get one instance.
async fn get_example(
    State(state): State<AppState>,
    Path((tenant, ex_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let example = state.catalog.find_example(&tenant, &ex_id).await?;
    Ok(Json(json!({ "data": example })))
}

/// PATCH `/tenants/{tenant}/examples/{ex_id}` - Set an instance's status.
async fn update_example(
    State(state): State<AppState>,
    Path((tenant, ex_id)): Path<(String, String)>,
    user: ActingUser,
    Json(payload): Json<UpdateExampleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .catalog
        .modify_example(&tenant, &ex_id, payload.status, user.id())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE `/tenants/{tenant}/examples/{ex_id}` - Delete an instance and its
/// steps.
async fn delete_example(
    State(state): State<AppState>,
    Path((tenant, ex_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    state.catalog.delete_example(&tenant, &ex_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST `/tenants/{tenant}/examples/{ex_id}/start` - Open the start node.
async fn start_example(
    State(state): State<AppState>,
    Path((tenant, ex_id)): Path<(String, String)>,
    user: ActingUser,
    Json(payload): Json<StartExampleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let example = state.catalog.find_example(&tenant, &ex_id).await?;
    let request = StartRequest {
        wf_id: example.wf_id,
        applicant: user.0,
        ex_id,
        domain: payload.domain,
    };
    let status = state
        .machine
        .start_example_instance(&tenant, &request)
        .await?;
    Ok(Json(json!({ "data": { "status": status } })))
}

fn action(ex_id: String, user: ActingUser, payload: DecisionRequest) -> ApprovalAction {
    ApprovalAction {
        ex_id,
        user_id: user.0,
        comment: payload.comment,
        domain: payload.domain,
    }
}

/// POST `/tenants/{tenant}/examples/{ex_id}/admit` - Admit the caller's step.
async fn admit(
    State(state): State<AppState>,
    Path((tenant, ex_id)): Path<(String, String)>,
    user: ActingUser,
    Json(payload): Json<DecisionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state
        .machine
        .admit(&tenant, &action(ex_id, user, payload))
        .await?;
    Ok(Json(json!({ "data": { "status": status } })))
}

/// POST `/tenants/{tenant}/examples/{ex_id}/dismiss` - Dismiss the caller's
/// step, rejecting the instance.
async fn dismiss(
    State(state): State<AppState>,
    Path((tenant, ex_id)): Path<(String, String)>,
    user: ActingUser,
    Json(payload): Json<DecisionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state
        .machine
        .dismiss(&tenant, &action(ex_id, user, payload))
        .await?;
    Ok(Json(json!({ "data": { "status": status } })))
}

/// GET `/tenants/{tenant}/examples/{ex_id}/status` - Status as seen by the
/// caller.
async fn status(
    State(state): State<AppState>,
    Path((tenant, ex_id)): Path<(String, String)>,
    user: ActingUser,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.machine.get_status(&tenant, &ex_id, user.id()).await?;
    Ok(Json(json!({ "data": view })))
}
