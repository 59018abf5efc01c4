//! Example instance repository.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::{NotSet, Set},
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    sea_query::Expr,
};

use ringi_core::workflow::{ExampleInstance, InstanceStatus};

use super::error::RepositoryError;
use crate::entities::wf_examples;

const TABLE: &str = "wf_examples";

/// Reads and writes `wf_examples` rows.
#[derive(Debug, Clone, Copy)]
pub struct ExampleRepository<'c, C> {
    conn: &'c C,
}

impl<'c, C: ConnectionTrait> ExampleRepository<'c, C> {
    /// Creates a repository bound to `conn`.
    #[must_use]
    pub const fn new(conn: &'c C) -> Self {
        Self { conn }
    }

    /// Lists a workflow's instances, newest first.
    pub async fn find_by_workflow(
        &self,
        tenant: &str,
        wf_id: &str,
    ) -> Result<Vec<ExampleInstance>, RepositoryError> {
        wf_examples::Entity::find()
            .filter(wf_examples::Column::Tenant.eq(tenant))
            .filter(wf_examples::Column::WfId.eq(wf_id))
            .order_by_desc(wf_examples::Column::Seq)
            .all(self.conn)
            .await?
            .into_iter()
            .map(model_to_example)
            .collect()
    }

    /// Finds one instance.
    pub async fn find(
        &self,
        tenant: &str,
        ex_id: &str,
    ) -> Result<Option<ExampleInstance>, RepositoryError> {
        wf_examples::Entity::find_by_id((tenant.to_string(), ex_id.to_string()))
            .one(self.conn)
            .await?
            .map(model_to_example)
            .transpose()
    }

    /// Finds one instance and locks its row until the transaction ends.
    pub async fn find_for_update(
        &self,
        tenant: &str,
        ex_id: &str,
    ) -> Result<Option<ExampleInstance>, RepositoryError> {
        wf_examples::Entity::find_by_id((tenant.to_string(), ex_id.to_string()))
            .lock_exclusive()
            .one(self.conn)
            .await?
            .map(model_to_example)
            .transpose()
    }

    /// Lists the ids of every instance of the given workflows.
    pub async fn ids_by_workflows(
        &self,
        tenant: &str,
        wf_ids: &[String],
    ) -> Result<Vec<String>, RepositoryError> {
        let rows = wf_examples::Entity::find()
            .filter(wf_examples::Column::Tenant.eq(tenant))
            .filter(wf_examples::Column::WfId.is_in(wf_ids.iter().map(String::as_str)))
            .all(self.conn)
            .await?;
        Ok(rows.into_iter().map(|m| m.ex_id).collect())
    }

    /// Inserts an instance.
    pub async fn insert(&self, tenant: &str, ex: &ExampleInstance) -> Result<(), RepositoryError> {
        let active = wf_examples::ActiveModel {
            tenant: Set(tenant.to_string()),
            ex_id: Set(ex.ex_id.clone()),
            wf_id: Set(ex.wf_id.clone()),
            ex_name: Set(ex.ex_name.clone()),
            user_id: Set(ex.user_id.clone()),
            status: Set(ex.status.code()),
            seq: NotSet,
            created_at: Set(ex.created_at.into()),
            created_by: Set(ex.created_by.clone()),
            updated_at: Set(ex.updated_at.into()),
            updated_by: Set(ex.updated_by.clone()),
        };
        wf_examples::Entity::insert(active)
            .exec_without_returning(self.conn)
            .await?;
        Ok(())
    }

    /// Sets an instance's status. Returns rows affected.
    pub async fn update_status(
        &self,
        tenant: &str,
        ex_id: &str,
        status: InstanceStatus,
        writer: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let result = wf_examples::Entity::update_many()
            .col_expr(wf_examples::Column::Status, Expr::value(status.code()))
            .col_expr(
                wf_examples::Column::UpdatedAt,
                Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(at)),
            )
            .col_expr(wf_examples::Column::UpdatedBy, Expr::value(writer))
            .filter(wf_examples::Column::Tenant.eq(tenant))
            .filter(wf_examples::Column::ExId.eq(ex_id))
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected)
    }

    /// Deletes instances by id. Returns rows affected.
    pub async fn delete_many(
        &self,
        tenant: &str,
        ex_ids: &[String],
    ) -> Result<u64, RepositoryError> {
        if ex_ids.is_empty() {
            return Ok(0);
        }
        let result = wf_examples::Entity::delete_many()
            .filter(wf_examples::Column::Tenant.eq(tenant))
            .filter(wf_examples::Column::ExId.is_in(ex_ids.iter().map(String::as_str)))
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected)
    }
}

fn model_to_example(m: wf_examples::Model) -> Result<ExampleInstance, RepositoryError> {
    let status = InstanceStatus::from_code(m.status)
        .ok_or_else(|| RepositoryError::corrupt(TABLE, &m.ex_id, format!("status {}", m.status)))?;

    Ok(ExampleInstance {
        ex_id: m.ex_id,
        wf_id: m.wf_id,
        ex_name: m.ex_name,
        user_id: m.user_id,
        status,
        created_at: m.created_at.to_utc(),
        created_by: m.created_by,
        updated_at: m.updated_at.to_utc(),
        updated_by: m.updated_by,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    pub(crate) fn model(ex_id: &str, status: i16) -> wf_examples::Model {
        let now = Utc::now().into();
        wf_examples::Model {
            tenant: "t1".into(),
            ex_id: ex_id.into(),
            wf_id: "w1".into(),
            ex_name: "app_w1_alice".into(),
            user_id: "alice".into(),
            status,
            seq: 1,
            created_at: now,
            created_by: "alice".into(),
            updated_at: now,
            updated_by: "alice".into(),
        }
    }

    #[test]
    fn test_legacy_zero_status_reads_as_pending() {
        let ex = model_to_example(model("ex1", 0)).unwrap();
        assert_eq!(ex.status, InstanceStatus::Pending);
    }

    #[test]
    fn test_unknown_status_is_corrupt() {
        assert!(matches!(
            model_to_example(model("ex1", 9)),
            Err(RepositoryError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_find_returns_decoded_instance() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![model("ex1", 3)]])
            .into_connection();

        let ex = ExampleRepository::new(&db)
            .find("t1", "ex1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ex.status, InstanceStatus::Rejected);
        assert_eq!(ex.user_id, "alice");
    }
}
