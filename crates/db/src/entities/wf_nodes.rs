//! `SeaORM` Entity for wf_nodes table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "wf_nodes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub tenant: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub wf_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub node_id: String,
    pub node_name: String,
    pub prev_node: Option<String>,
    pub next_node: Option<String>,
    #[sea_orm(column_type = "JsonBinary")]
    pub assignees: Json,
    pub act_type: String,
    pub node_group_id: Option<String>,
    pub seq: i64,
    pub created_at: DateTimeWithTimeZone,
    pub created_by: String,
    pub updated_at: DateTimeWithTimeZone,
    pub updated_by: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::wf_workflows::Entity",
        from = "(Column::Tenant, Column::WfId)",
        to = "(super::wf_workflows::Column::Tenant, super::wf_workflows::Column::WfId)"
    )]
    Workflows,
}

impl Related<super::wf_workflows::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Workflows.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
