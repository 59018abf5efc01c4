//! Workflow template routes and template resolution.

use std::collections::BTreeMap;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use ringi_core::workflow::{
    CreateWorkflowInput, Resolution, ResolveQuery, UpdateWorkflowInput, WorkflowFilter,
    WorkflowType,
};

use crate::{AppState, error::ApiError, extractors::ActingUser};

/// Creates the workflow routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/tenants/{tenant}/workflows",
            get(list_workflows).post(create_workflow),
        )
        .route(
            "/tenants/{tenant}/workflows/batch-delete",
            post(delete_workflows),
        )
        .route(
            "/tenants/{tenant}/workflows/{wf_id}",
            get(get_workflow)
                .patch(update_workflow)
                .delete(delete_workflow),
        )
        .route("/tenants/{tenant}/resolve", get(resolve_workflows))
        .route("/tenants/{tenant}/user-workflows", get(user_workflows))
}

// ============================================================================
// Request Types
// ============================================================================

/// Query parameters for listing templates.
#[derive(Debug, Deserialize)]
pub struct ListWorkflowsQuery {
    /// Application id.
    pub app_id: String,
    /// Only valid or only invalid templates.
    pub is_valid: Option<bool>,
    /// Owning group.
    pub group_id: Option<String>,
    /// Object type parameter.
    pub object_id: Option<String>,
    /// Action parameter.
    pub action: Option<String>,
}

const fn default_true() -> bool {
    true
}

/// Request body for creating a template.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateWorkflowRequest {
    /// Application id.
    #[validate(length(min = 1, message = "app_id is required"))]
    pub app_id: String,
    /// Owning group.
    #[validate(length(min = 1, message = "group_id is required"))]
    pub group_id: String,
    /// Gated business action.
    pub workflow_type: WorkflowType,
    /// Whether the template is active.
    #[serde(default = "default_true")]
    pub is_valid: bool,
    /// Auto-admit (true) or auto-dismiss nodes without approvers.
    #[serde(default = "default_true")]
    pub accept_or_dismiss: bool,
    /// Template parameters such as `datastore` and `action`.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// Request body for updating a template.
#[derive(Debug, Deserialize)]
pub struct UpdateWorkflowRequest {
    /// New validity.
    pub is_valid: Option<bool>,
    /// New policy flag.
    pub accept_or_dismiss: Option<bool>,
    /// New `fields` parameter.
    pub fields: Option<String>,
}

/// Request body for deleting several templates.
#[derive(Debug, Deserialize, Validate)]
pub struct DeleteWorkflowsRequest {
    /// Template ids.
    #[validate(length(min = 1, message = "at least one workflow id is required"))]
    pub wf_ids: Vec<String>,
}

/// Business context to resolve a template for.
#[derive(Debug, Deserialize)]
pub struct ResolveParams {
    /// Group the acting user belongs to.
    pub group_id: String,
    /// Application id.
    pub app_id: String,
    /// Object type.
    pub object_id: String,
    /// Action; empty matches any.
    #[serde(default)]
    pub action: String,
}

impl ResolveParams {
    fn into_query(self, tenant: String) -> ResolveQuery {
        ResolveQuery {
            tenant,
            group_id: self.group_id,
            app_id: self.app_id,
            object_id: self.object_id,
            action: self.action,
        }
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

/// GET `/tenants/{tenant}/workflows` - List templates.
async fn list_workflows(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Query(query): Query<ListWorkflowsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = WorkflowFilter {
        app_id: query.app_id,
        is_valid: query.is_valid,
        group_id: query.group_id,
        object_id: query.object_id,
        action: query.action,
    };
    let workflows = state.catalog.find_workflows(&tenant, &filter).await?;
    Ok(Json(json!({ "data": workflows })))
}

/// POST `/tenants/{tenant}/workflows` - Create a template.
async fn create_workflow(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    user: ActingUser,
    Json(payload): Json<CreateWorkflowRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload.validate()?;
    let input = CreateWorkflowInput {
        group_id: payload.group_id,
        app_id: payload.app_id,
        workflow_type: payload.workflow_type,
        is_valid: payload.is_valid,
        accept_or_dismiss: payload.accept_or_dismiss,
        params: payload.params,
        writer: user.0,
    };
    let workflow = state.catalog.add_workflow(&tenant, input).await?;
    Ok((StatusCode::CREATED, Json(json!({ "data": workflow }))))
}

/// GET `/tenants/{tenant}/workflows/{wf_id}` - Get one template.
async fn get_workflow(
    State(state): State<AppState>,
    Path((tenant, wf_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let workflow = state.catalog.find_workflow(&tenant, &wf_id).await?;
    Ok(Json(json!({ "data": workflow })))
}

/// PATCH `/tenants/{tenant}/workflows/{wf_id}` - Update a template.
async fn update_workflow(
    State(state): State<AppState>,
    Path((tenant, wf_id)): Path<(String, String)>,
    user: ActingUser,
    Json(payload): Json<UpdateWorkflowRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = UpdateWorkflowInput {
        is_valid: payload.is_valid,
        accept_or_dismiss: payload.accept_or_dismiss,
        fields: payload.fields,
        writer: user.0,
    };
    let workflow = state.catalog.modify_workflow(&tenant, &wf_id, input).await?;
    Ok(Json(json!({ "data": workflow })))
}

/// DELETE `/tenants/{tenant}/workflows/{wf_id}` - Delete a template with its
/// nodes, relations, instances and steps.
async fn delete_workflow(
    State(state): State<AppState>,
    Path((tenant, wf_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    state.catalog.delete_workflows(&tenant, &[wf_id]).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST `/tenants/{tenant}/workflows/batch-delete` - Delete several templates
/// atomically.
async fn delete_workflows(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Json(payload): Json<DeleteWorkflowsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload.validate()?;
    state.catalog.delete_workflows(&tenant, &payload.wf_ids).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET `/tenants/{tenant}/resolve` - Nearest templates for a business
/// context. `configured` is false when no level up to the root has one.
async fn resolve_workflows(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Query(params): Query<ResolveParams>,
) -> Result<impl IntoResponse, ApiError> {
    let resolution = state.machine.resolve(&params.into_query(tenant)).await?;
    let configured = matches!(resolution, Resolution::Matched(_));
    Ok(Json(json!({
        "configured": configured,
        "data": resolution.into_workflows(),
    })))
}

/// GET `/tenants/{tenant}/user-workflows` - Templates the caller must go
/// through, applying the hierarchy failure policy.
async fn user_workflows(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Query(params): Query<ResolveParams>,
) -> Result<impl IntoResponse, ApiError> {
    let workflows = state
        .machine
        .get_user_workflows(&params.into_query(tenant))
        .await?;
    Ok(Json(json!({ "data": workflows })))
}
