//! Relation binding repository.

use chrono::Utc;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
};
use uuid::Uuid;

use ringi_core::workflow::{RelationBinding, RelationFilter};

use super::error::RepositoryError;
use crate::entities::wf_relations;

/// Reads and writes `wf_relations` rows.
#[derive(Debug, Clone, Copy)]
pub struct RelationRepository<'c, C> {
    conn: &'c C,
}

impl<'c, C: ConnectionTrait> RelationRepository<'c, C> {
    /// Creates a repository bound to `conn`.
    #[must_use]
    pub const fn new(conn: &'c C) -> Self {
        Self { conn }
    }

    /// Lists bindings matching the filter, oldest first.
    pub async fn find_all(
        &self,
        tenant: &str,
        filter: &RelationFilter,
    ) -> Result<Vec<RelationBinding>, RepositoryError> {
        let rows = apply_filter(wf_relations::Entity::find(), tenant, filter)
            .order_by_asc(wf_relations::Column::CreatedAt)
            .all(self.conn)
            .await?;
        Ok(rows.into_iter().map(model_to_relation).collect())
    }

    /// Inserts a binding under a fresh row id.
    pub async fn insert(&self, tenant: &str, rel: &RelationBinding) -> Result<(), RepositoryError> {
        let active = wf_relations::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant: Set(tenant.to_string()),
            app_id: Set(rel.app_id.clone()),
            object_id: Set(rel.object_id.clone()),
            group_id: Set(rel.group_id.clone()),
            workflow_id: Set(rel.workflow_id.clone()),
            action: Set(rel.action.clone()),
            created_at: Set(Utc::now().into()),
        };
        wf_relations::Entity::insert(active)
            .exec_without_returning(self.conn)
            .await?;
        Ok(())
    }

    /// Deletes bindings matching the filter. Returns rows affected.
    pub async fn delete_matching(
        &self,
        tenant: &str,
        filter: &RelationFilter,
    ) -> Result<u64, RepositoryError> {
        let query = apply_filter(wf_relations::Entity::delete_many(), tenant, filter);
        Ok(query.exec(self.conn).await?.rows_affected)
    }

    /// Deletes every binding that points at one of `wf_ids`.
    pub async fn delete_by_workflows(
        &self,
        tenant: &str,
        wf_ids: &[String],
    ) -> Result<u64, RepositoryError> {
        let result = wf_relations::Entity::delete_many()
            .filter(wf_relations::Column::Tenant.eq(tenant))
            .filter(wf_relations::Column::WorkflowId.is_in(wf_ids.iter().map(String::as_str)))
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected)
    }
}

fn apply_filter<Q: QueryFilter>(mut query: Q, tenant: &str, filter: &RelationFilter) -> Q {
    query = query
        .filter(wf_relations::Column::Tenant.eq(tenant))
        .filter(wf_relations::Column::AppId.eq(filter.app_id.as_str()));
    if let Some(object) = &filter.object_id {
        query = query.filter(wf_relations::Column::ObjectId.eq(object.as_str()));
    }
    if let Some(group) = &filter.group_id {
        query = query.filter(wf_relations::Column::GroupId.eq(group.as_str()));
    }
    if let Some(workflow) = &filter.workflow_id {
        query = query.filter(wf_relations::Column::WorkflowId.eq(workflow.as_str()));
    }
    if let Some(action) = &filter.action {
        query = query.filter(wf_relations::Column::Action.eq(action.as_str()));
    }
    query
}

fn model_to_relation(m: wf_relations::Model) -> RelationBinding {
    RelationBinding {
        app_id: m.app_id,
        object_id: m.object_id,
        group_id: m.group_id,
        workflow_id: m.workflow_id,
        action: m.action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    #[tokio::test]
    async fn test_find_all_maps_rows() {
        let row = wf_relations::Model {
            id: Uuid::new_v4(),
            tenant: "t1".into(),
            app_id: "app".into(),
            object_id: "ds1".into(),
            group_id: "g1".into(),
            workflow_id: "w1".into(),
            action: "update".into(),
            created_at: Utc::now().into(),
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![row]])
            .into_connection();

        let filter = RelationFilter {
            app_id: "app".into(),
            group_id: Some("g1".into()),
            ..RelationFilter::default()
        };
        let found = RelationRepository::new(&db)
            .find_all("t1", &filter)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].workflow_id, "w1");
    }

    #[tokio::test]
    async fn test_delete_matching_returns_count() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 3,
            }])
            .into_connection();

        let filter = RelationFilter {
            app_id: "app".into(),
            ..RelationFilter::default()
        };
        let removed = RelationRepository::new(&db)
            .delete_matching("t1", &filter)
            .await
            .unwrap();
        assert_eq!(removed, 3);
    }
}
