//! Node graph routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

use ringi_core::workflow::{ActType, NodeInput};

use crate::{AppState, error::ApiError, extractors::ActingUser};

/// Creates the node routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/tenants/{tenant}/workflows/{wf_id}/nodes",
            get(list_nodes).post(create_node).delete(delete_nodes),
        )
        .route(
            "/tenants/{tenant}/workflows/{wf_id}/nodes/batch",
            post(create_nodes),
        )
        .route(
            "/tenants/{tenant}/workflows/{wf_id}/nodes/{node_id}",
            get(get_node),
        )
}

/// Request body for one node.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct NodeRequest {
    /// Node id, unique within the workflow.
    #[validate(length(min = 1, message = "node_id is required"))]
    pub node_id: String,
    /// Display name.
    #[serde(default)]
    pub node_name: String,
    /// Predecessor; empty or `"0"` marks the start node.
    pub prev_node: Option<String>,
    /// Successor; empty or `"0"` marks the end node.
    pub next_node: Option<String>,
    /// Assignee specs (`u_<user>` or `r_<role>`).
    #[serde(default)]
    pub assignees: Vec<String>,
    /// Completion rule.
    #[serde(default)]
    pub act_type: ActType,
    /// Group the role search starts from.
    pub node_group_id: Option<String>,
}

impl From<NodeRequest> for NodeInput {
    fn from(req: NodeRequest) -> Self {
        Self {
            node_id: req.node_id,
            node_name: req.node_name,
            prev_node: req.prev_node,
            next_node: req.next_node,
            assignees: req.assignees,
            act_type: req.act_type,
            node_group_id: req.node_group_id,
        }
    }
}

/// Request body for a batch of nodes.
#[derive(Debug, Deserialize, Validate)]
pub struct NodeBatchRequest {
    /// Nodes to add.
    #[validate(length(min = 1, message = "at least one node is required"), nested)]
    pub nodes: Vec<NodeRequest>,
}

/// GET `/tenants/{tenant}/workflows/{wf_id}/nodes` - List nodes.
async fn list_nodes(
    State(state): State<AppState>,
    Path((tenant, wf_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let nodes = state.catalog.find_nodes(&tenant, &wf_id).await?;
    Ok(Json(json!({ "data": nodes })))
}

/// GET `/tenants/{tenant}/workflows/{wf_id}/nodes/{node_id}` - Get one node.
async fn get_node(
    State(state): State<AppState>,
    Path((tenant, wf_id, node_id)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let node = state.catalog.find_node(&tenant, &wf_id, &node_id).await?;
    Ok(Json(json!({ "data": node })))
}

/// POST `/tenants/{tenant}/workflows/{wf_id}/nodes` - Add one node.
async fn create_node(
    State(state): State<AppState>,
    Path((tenant, wf_id)): Path<(String, String)>,
    user: ActingUser,
    Json(payload): Json<NodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload.validate()?;
    let node = state
        .catalog
        .add_node(&tenant, &wf_id, payload.into(), user.id())
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "data": node }))))
}

/// POST `/tenants/{tenant}/workflows/{wf_id}/nodes/batch` - Add nodes that
/// together with the existing ones form a valid graph.
async fn create_nodes(
    State(state): State<AppState>,
    Path((tenant, wf_id)): Path<(String, String)>,
    user: ActingUser,
    Json(payload): Json<NodeBatchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload.validate()?;
    let inputs = payload.nodes.into_iter().map(NodeInput::from).collect();
    let nodes = state
        .catalog
        .add_nodes(&tenant, &wf_id, inputs, user.id())
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "data": nodes }))))
}

/// DELETE `/tenants/{tenant}/workflows/{wf_id}/nodes` - Delete every node.
async fn delete_nodes(
    State(state): State<AppState>,
    Path((tenant, wf_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.catalog.delete_nodes(&tenant, &wf_id).await?;
    Ok(Json(json!({ "data": { "deleted": deleted } })))
}
