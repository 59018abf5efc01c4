//! Relation binding routes.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use ringi_core::workflow::{RelationBinding, RelationFilter};

use crate::{AppState, error::ApiError};

/// Creates the relation routes.
pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/tenants/{tenant}/relations",
        get(list_relations)
            .post(create_relation)
            .delete(delete_relations),
    )
}

/// Query parameters selecting bindings.
#[derive(Debug, Deserialize)]
pub struct RelationQuery {
    /// Application id.
    pub app_id: String,
    /// Object type.
    pub object_id: Option<String>,
    /// Group.
    pub group_id: Option<String>,
    /// Bound template.
    pub workflow_id: Option<String>,
    /// Action.
    pub action: Option<String>,
}

impl From<RelationQuery> for RelationFilter {
    fn from(q: RelationQuery) -> Self {
        Self {
            app_id: q.app_id,
            object_id: q.object_id,
            group_id: q.group_id,
            workflow_id: q.workflow_id,
            action: q.action,
        }
    }
}

/// Request body for a binding.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateRelationRequest {
    /// Application id.
    #[validate(length(min = 1, message = "app_id is required"))]
    pub app_id: String,
    /// Object type.
    #[validate(length(min = 1, message = "object_id is required"))]
    pub object_id: String,
    /// Group the binding applies to.
    #[validate(length(min = 1, message = "group_id is required"))]
    pub group_id: String,
    /// Bound template.
    #[validate(length(min = 1, message = "workflow_id is required"))]
    pub workflow_id: String,
    /// Action; empty matches any.
    #[serde(default)]
    pub action: String,
}

/// GET `/tenants/{tenant}/relations` - List bindings.
async fn list_relations(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Query(query): Query<RelationQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let relations = state
        .catalog
        .find_relations(&tenant, &query.into())
        .await?;
    Ok(Json(json!({ "data": relations })))
}

/// POST `/tenants/{tenant}/relations` - Bind a template to a context.
async fn create_relation(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Json(payload): Json<CreateRelationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload.validate()?;
    let relation = RelationBinding {
        app_id: payload.app_id,
        object_id: payload.object_id,
        group_id: payload.group_id,
        workflow_id: payload.workflow_id,
        action: payload.action,
    };
    let relation = state.catalog.add_relation(&tenant, relation).await?;
    Ok((StatusCode::CREATED, Json(json!({ "data": relation }))))
}

/// DELETE `/tenants/{tenant}/relations` - Delete matching bindings.
async fn delete_relations(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Query(query): Query<RelationQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .catalog
        .delete_relations(&tenant, &query.into())
        .await?;
    Ok(Json(json!({ "data": { "deleted": deleted } })))
}
