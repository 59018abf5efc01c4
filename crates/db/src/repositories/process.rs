//! Process step repository.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::{NotSet, Set},
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, sea_query::Expr,
};

use ringi_core::workflow::{ProcessStep, StepStatus, StepUpdate};

use super::error::RepositoryError;
use crate::entities::wf_processes;

const TABLE: &str = "wf_processes";

/// Reads and writes `wf_processes` rows.
#[derive(Debug, Clone, Copy)]
pub struct ProcessRepository<'c, C> {
    conn: &'c C,
}

impl<'c, C: ConnectionTrait> ProcessRepository<'c, C> {
    /// Creates a repository bound to `conn`.
    #[must_use]
    pub const fn new(conn: &'c C) -> Self {
        Self { conn }
    }

    /// Lists an instance's steps, newest first.
    pub async fn find_by_example(
        &self,
        tenant: &str,
        ex_id: &str,
    ) -> Result<Vec<ProcessStep>, RepositoryError> {
        wf_processes::Entity::find()
            .filter(wf_processes::Column::Tenant.eq(tenant))
            .filter(wf_processes::Column::ExId.eq(ex_id))
            .order_by_desc(wf_processes::Column::Seq)
            .all(self.conn)
            .await?
            .into_iter()
            .map(model_to_step)
            .collect()
    }

    /// Finds one step.
    pub async fn find(
        &self,
        tenant: &str,
        pro_id: &str,
    ) -> Result<Option<ProcessStep>, RepositoryError> {
        wf_processes::Entity::find_by_id((tenant.to_string(), pro_id.to_string()))
            .one(self.conn)
            .await?
            .map(model_to_step)
            .transpose()
    }

    /// Lists a user's pending steps, newest first.
    pub async fn find_pending_for_user(
        &self,
        tenant: &str,
        user_id: &str,
    ) -> Result<Vec<ProcessStep>, RepositoryError> {
        wf_processes::Entity::find()
            .filter(wf_processes::Column::Tenant.eq(tenant))
            .filter(wf_processes::Column::UserId.eq(user_id))
            .filter(wf_processes::Column::Status.eq(StepStatus::Pending.code()))
            .order_by_desc(wf_processes::Column::Seq)
            .all(self.conn)
            .await?
            .into_iter()
            .map(model_to_step)
            .collect()
    }

    /// Inserts a step.
    pub async fn insert(&self, tenant: &str, step: &ProcessStep) -> Result<(), RepositoryError> {
        let active = wf_processes::ActiveModel {
            tenant: Set(tenant.to_string()),
            pro_id: Set(step.pro_id.clone()),
            ex_id: Set(step.ex_id.clone()),
            current_node: Set(step.current_node.clone()),
            user_id: Set(step.user_id.clone()),
            expire_date: Set(step.expire_date),
            comment: Set(step.comment.clone()),
            status: Set(step.status.code()),
            seq: NotSet,
            created_at: Set(step.created_at.into()),
            created_by: Set(step.created_by.clone()),
            updated_at: Set(step.updated_at.into()),
            updated_by: Set(step.updated_by.clone()),
        };
        wf_processes::Entity::insert(active)
            .exec_without_returning(self.conn)
            .await?;
        Ok(())
    }

    /// Writes a step's status and comment. Returns rows affected.
    pub async fn update(
        &self,
        tenant: &str,
        update: &StepUpdate,
        at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let result = wf_processes::Entity::update_many()
            .col_expr(wf_processes::Column::Status, Expr::value(update.status.code()))
            .col_expr(
                wf_processes::Column::Comment,
                Expr::value(update.comment.as_str()),
            )
            .col_expr(
                wf_processes::Column::UpdatedAt,
                Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(at)),
            )
            .col_expr(
                wf_processes::Column::UpdatedBy,
                Expr::value(update.writer.as_str()),
            )
            .filter(wf_processes::Column::Tenant.eq(tenant))
            .filter(wf_processes::Column::ProId.eq(update.pro_id.as_str()))
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected)
    }

    /// Deletes every step of the given instances. Returns rows affected.
    pub async fn delete_by_examples(
        &self,
        tenant: &str,
        ex_ids: &[String],
    ) -> Result<u64, RepositoryError> {
        if ex_ids.is_empty() {
            return Ok(0);
        }
        let result = wf_processes::Entity::delete_many()
            .filter(wf_processes::Column::Tenant.eq(tenant))
            .filter(wf_processes::Column::ExId.is_in(ex_ids.iter().map(String::as_str)))
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected)
    }
}

fn model_to_step(m: wf_processes::Model) -> Result<ProcessStep, RepositoryError> {
    let status = StepStatus::from_code(m.status)
        .ok_or_else(|| RepositoryError::corrupt(TABLE, &m.pro_id, format!("status {}", m.status)))?;

    Ok(ProcessStep {
        pro_id: m.pro_id,
        ex_id: m.ex_id,
        current_node: m.current_node,
        user_id: m.user_id,
        expire_date: m.expire_date,
        comment: m.comment,
        status,
        created_at: m.created_at.to_utc(),
        created_by: m.created_by,
        updated_at: m.updated_at.to_utc(),
        updated_by: m.updated_by,
    })
}
