//! Workflow template repository.

use std::collections::BTreeMap;

use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    sea_query::Expr,
};

use ringi_core::workflow::{WorkflowDefinition, WorkflowFilter, WorkflowType};

use super::error::RepositoryError;
use crate::entities::wf_workflows;

const TABLE: &str = "wf_workflows";

/// Reads and writes `wf_workflows` rows over any connection or transaction.
#[derive(Debug, Clone, Copy)]
pub struct WorkflowRepository<'c, C> {
    conn: &'c C,
}

impl<'c, C: ConnectionTrait> WorkflowRepository<'c, C> {
    /// Creates a repository bound to `conn`.
    #[must_use]
    pub const fn new(conn: &'c C) -> Self {
        Self { conn }
    }

    /// Lists templates matching the filter, newest first.
    ///
    /// Column filters run in SQL; `params` keys are matched after decoding.
    pub async fn find_all(
        &self,
        tenant: &str,
        filter: &WorkflowFilter,
    ) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
        let mut query = wf_workflows::Entity::find()
            .filter(wf_workflows::Column::Tenant.eq(tenant))
            .filter(wf_workflows::Column::AppId.eq(filter.app_id.as_str()));
        if let Some(valid) = filter.is_valid {
            query = query.filter(wf_workflows::Column::IsValid.eq(valid));
        }
        if let Some(group) = &filter.group_id {
            query = query.filter(wf_workflows::Column::GroupId.eq(group.as_str()));
        }

        let rows = query
            .order_by_desc(wf_workflows::Column::CreatedAt)
            .all(self.conn)
            .await?;

        let mut workflows = Vec::with_capacity(rows.len());
        for row in rows {
            let wf = model_to_workflow(row)?;
            if filter.matches(&wf) {
                workflows.push(wf);
            }
        }
        Ok(workflows)
    }

    /// Finds one template by id.
    pub async fn find(
        &self,
        tenant: &str,
        wf_id: &str,
    ) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        wf_workflows::Entity::find_by_id((tenant.to_string(), wf_id.to_string()))
            .one(self.conn)
            .await?
            .map(model_to_workflow)
            .transpose()
    }

    /// Returns which of `wf_ids` exist.
    pub async fn existing_ids(
        &self,
        tenant: &str,
        wf_ids: &[String],
    ) -> Result<Vec<String>, RepositoryError> {
        let rows = wf_workflows::Entity::find()
            .filter(wf_workflows::Column::Tenant.eq(tenant))
            .filter(wf_workflows::Column::WfId.is_in(wf_ids.iter().map(String::as_str)))
            .all(self.conn)
            .await?;
        Ok(rows.into_iter().map(|m| m.wf_id).collect())
    }

    /// Inserts a template.
    pub async fn insert(
        &self,
        tenant: &str,
        wf: &WorkflowDefinition,
    ) -> Result<(), RepositoryError> {
        wf_workflows::Entity::insert(workflow_to_active(tenant, wf))
            .exec_without_returning(self.conn)
            .await?;
        Ok(())
    }

    /// Overwrites the mutable columns of a template. Returns rows affected.
    pub async fn update(
        &self,
        tenant: &str,
        wf: &WorkflowDefinition,
    ) -> Result<u64, RepositoryError> {
        let result = wf_workflows::Entity::update_many()
            .col_expr(wf_workflows::Column::IsValid, Expr::value(wf.is_valid))
            .col_expr(
                wf_workflows::Column::AcceptOrDismiss,
                Expr::value(wf.accept_or_dismiss),
            )
            .col_expr(wf_workflows::Column::Params, Expr::value(params_to_json(&wf.params)))
            .col_expr(
                wf_workflows::Column::UpdatedAt,
                Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(wf.updated_at)),
            )
            .col_expr(
                wf_workflows::Column::UpdatedBy,
                Expr::value(wf.updated_by.as_str()),
            )
            .filter(wf_workflows::Column::Tenant.eq(tenant))
            .filter(wf_workflows::Column::WfId.eq(wf.wf_id.as_str()))
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected)
    }

    /// Deletes templates by id. Returns rows affected.
    pub async fn delete_many(
        &self,
        tenant: &str,
        wf_ids: &[String],
    ) -> Result<u64, RepositoryError> {
        let result = wf_workflows::Entity::delete_many()
            .filter(wf_workflows::Column::Tenant.eq(tenant))
            .filter(wf_workflows::Column::WfId.is_in(wf_ids.iter().map(String::as_str)))
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected)
    }
}

fn params_to_json(params: &BTreeMap<String, String>) -> serde_json::Value {
    serde_json::Value::Object(
        params
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect(),
    )
}

fn workflow_to_active(tenant: &str, wf: &WorkflowDefinition) -> wf_workflows::ActiveModel {
    wf_workflows::ActiveModel {
        tenant: Set(tenant.to_string()),
        wf_id: Set(wf.wf_id.clone()),
        wf_name: Set(wf.wf_name.clone()),
        menu_name: Set(wf.menu_name.clone()),
        is_valid: Set(wf.is_valid),
        group_id: Set(wf.group_id.clone()),
        app_id: Set(wf.app_id.clone()),
        workflow_type: Set(wf.workflow_type.as_str().to_string()),
        accept_or_dismiss: Set(wf.accept_or_dismiss),
        params: Set(params_to_json(&wf.params)),
        created_at: Set(wf.created_at.into()),
        created_by: Set(wf.created_by.clone()),
        updated_at: Set(wf.updated_at.into()),
        updated_by: Set(wf.updated_by.clone()),
    }
}

pub(crate) fn model_to_workflow(
    m: wf_workflows::Model,
) -> Result<WorkflowDefinition, RepositoryError> {
    let workflow_type = WorkflowType::parse(&m.workflow_type).ok_or_else(|| {
        RepositoryError::corrupt(TABLE, &m.wf_id, format!("workflow_type {}", m.workflow_type))
    })?;
    let params: BTreeMap<String, String> = serde_json::from_value(m.params)
        .map_err(|e| RepositoryError::corrupt(TABLE, &m.wf_id, format!("params: {e}")))?;

    Ok(WorkflowDefinition {
        wf_id: m.wf_id,
        wf_name: m.wf_name,
        menu_name: m.menu_name,
        is_valid: m.is_valid,
        group_id: m.group_id,
        app_id: m.app_id,
        workflow_type,
        accept_or_dismiss: m.accept_or_dismiss,
        params,
        created_at: m.created_at.to_utc(),
        created_by: m.created_by,
        updated_at: m.updated_at.to_utc(),
        updated_by: m.updated_by,
    })
}
