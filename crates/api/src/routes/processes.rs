//! Process step routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
};
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use ringi_core::workflow::{ProcessInput, StepStatus, StepUpdate};

use crate::{AppState, error::ApiError, extractors::ActingUser};

/// Creates the process routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/tenants/{tenant}/examples/{ex_id}/processes",
            get(list_processes)
                .post(create_process)
                .delete(delete_processes),
        )
        .route(
            "/tenants/{tenant}/users/{user_id}/processes",
            get(list_user_processes),
        )
        .route("/tenants/{tenant}/processes/{pro_id}", patch(update_process))
}

/// Request body for adding a step.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProcessRequest {
    /// Node the step belongs to.
    #[validate(length(min = 1, message = "current_node is required"))]
    pub current_node: String,
    /// Approver.
    #[validate(length(min = 1, message = "user_id is required"))]
    pub user_id: String,
    /// Due date; defaults to the configured expiry from today.
    pub expire_date: Option<NaiveDate>,
    /// Initial comment.
    #[serde(default)]
    pub comment: String,
}

/// Request body for deciding a step.
#[derive(Debug, Deserialize)]
pub struct UpdateProcessRequest {
    /// New status; pending is rejected for decided steps.
    pub status: StepStatus,
    /// Comment.
    #[serde(default)]
    pub comment: String,
}

/// GET `/tenants/{tenant}/examples/{ex_id}/processes` - List an instance's
/// steps.
async fn list_processes(
    State(state): State<AppState>,
    Path((tenant, ex_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let steps = state.catalog.find_processes(&tenant, &ex_id).await?;
    Ok(Json(json!({ "data": steps })))
}

/// GET `/tenants/{tenant}/users/{user_id}/processes` - A user's pending steps.
async fn list_user_processes(
    State(state): State<AppState>,
    Path((tenant, user_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let steps = state.catalog.find_user_processes(&tenant, &user_id).await?;
    Ok(Json(json!({ "data": steps })))
}

/// POST `/tenants/{tenant}/examples/{ex_id}/processes` - Add a pending step.
async fn create_process(
    State(state): State<AppState>,
    Path((tenant, ex_id)): Path<(String, String)>,
    user: ActingUser,
    Json(payload): Json<CreateProcessRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload.validate()?;
    let expiry = state.machine.engine().step_expiry_days;
    let input = ProcessInput {
        ex_id,
        current_node: payload.current_node,
        user_id: payload.user_id,
        expire_date: payload
            .expire_date
            .unwrap_or_else(|| Utc::now().date_naive() + Duration::days(expiry)),
        comment: payload.comment,
    };
    let step = state
        .catalog
        .add_process(&tenant, input, user.id())
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "data": step }))))
}

/// PATCH `/tenants/{tenant}/processes/{pro_id}` - Decide a step.
async fn update_process(
    State(state): State<AppState>,
    Path((tenant, pro_id)): Path<(String, String)>,
    user: ActingUser,
    Json(payload): Json<UpdateProcessRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let update = StepUpdate {
        pro_id,
        status: payload.status,
        comment: payload.comment,
        writer: user.0,
    };
    state.catalog.modify_process(&tenant, update).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE `/tenants/{tenant}/examples/{ex_id}/processes` - Delete an
/// instance's steps.
async fn delete_processes(
    State(state): State<AppState>,
    Path((tenant, ex_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.catalog.delete_processes(&tenant, &ex_id).await?;
    Ok(Json(json!({ "data": { "deleted": deleted } })))
}
