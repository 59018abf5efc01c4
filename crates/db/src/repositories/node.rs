//! Node graph repository.

use sea_orm::{
    ActiveValue::{NotSet, Set},
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
};

use ringi_core::workflow::{ActType, Node};

use super::error::RepositoryError;
use crate::entities::wf_nodes;

const TABLE: &str = "wf_nodes";

/// Reads and writes `wf_nodes` rows.
#[derive(Debug, Clone, Copy)]
pub struct NodeRepository<'c, C> {
    conn: &'c C,
}

impl<'c, C: ConnectionTrait> NodeRepository<'c, C> {
    /// Creates a repository bound to `conn`.
    #[must_use]
    pub const fn new(conn: &'c C) -> Self {
        Self { conn }
    }

    /// Lists a workflow's nodes in insertion order.
    pub async fn find_by_workflow(
        &self,
        tenant: &str,
        wf_id: &str,
    ) -> Result<Vec<Node>, RepositoryError> {
        wf_nodes::Entity::find()
            .filter(wf_nodes::Column::Tenant.eq(tenant))
            .filter(wf_nodes::Column::WfId.eq(wf_id))
            .order_by_asc(wf_nodes::Column::Seq)
            .all(self.conn)
            .await?
            .into_iter()
            .map(model_to_node)
            .collect()
    }

    /// Finds one node.
    pub async fn find(
        &self,
        tenant: &str,
        wf_id: &str,
        node_id: &str,
    ) -> Result<Option<Node>, RepositoryError> {
        wf_nodes::Entity::find_by_id((tenant.to_string(), wf_id.to_string(), node_id.to_string()))
            .one(self.conn)
            .await?
            .map(model_to_node)
            .transpose()
    }

    /// Inserts nodes in the given order.
    pub async fn insert_many(&self, tenant: &str, nodes: &[Node]) -> Result<(), RepositoryError> {
        // One statement per node keeps `seq` in authoring order.
        for node in nodes {
            wf_nodes::Entity::insert(node_to_active(tenant, node))
                .exec_without_returning(self.conn)
                .await?;
        }
        Ok(())
    }

    /// Deletes every node of the given workflows. Returns rows affected.
    pub async fn delete_by_workflows(
        &self,
        tenant: &str,
        wf_ids: &[String],
    ) -> Result<u64, RepositoryError> {
        let result = wf_nodes::Entity::delete_many()
            .filter(wf_nodes::Column::Tenant.eq(tenant))
            .filter(wf_nodes::Column::WfId.is_in(wf_ids.iter().map(String::as_str)))
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected)
    }
}

fn node_to_active(tenant: &str, node: &Node) -> wf_nodes::ActiveModel {
    wf_nodes::ActiveModel {
        tenant: Set(tenant.to_string()),
        wf_id: Set(node.wf_id.clone()),
        node_id: Set(node.node_id.clone()),
        node_name: Set(node.node_name.clone()),
        prev_node: Set(node.prev_node.clone()),
        next_node: Set(node.next_node.clone()),
        assignees: Set(serde_json::Value::Array(
            node.assignees
                .iter()
                .cloned()
                .map(serde_json::Value::String)
                .collect(),
        )),
        act_type: Set(node.act_type.as_str().to_string()),
        node_group_id: Set(node.node_group_id.clone()),
        seq: NotSet,
        created_at: Set(node.created_at.into()),
        created_by: Set(node.created_by.clone()),
        updated_at: Set(node.updated_at.into()),
        updated_by: Set(node.updated_by.clone()),
    }
}

fn model_to_node(m: wf_nodes::Model) -> Result<Node, RepositoryError> {
    let assignees: Vec<String> = serde_json::from_value(m.assignees)
        .map_err(|e| RepositoryError::corrupt(TABLE, &m.node_id, format!("assignees: {e}")))?;

    Ok(Node {
        node_id: m.node_id,
        node_name: m.node_name,
        wf_id: m.wf_id,
        prev_node: m.prev_node,
        next_node: m.next_node,
        assignees,
        act_type: ActType::parse(&m.act_type),
        node_group_id: m.node_group_id,
        created_at: m.created_at.to_utc(),
        created_by: m.created_by,
        updated_at: m.updated_at.to_utc(),
        updated_by: m.updated_by,
    })
}
