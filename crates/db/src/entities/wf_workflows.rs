//! `SeaORM` Entity for wf_workflows table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "wf_workflows")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub tenant: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub wf_id: String,
    pub wf_name: String,
    pub menu_name: String,
    pub is_valid: bool,
    pub group_id: String,
    pub app_id: String,
    pub workflow_type: String,
    pub accept_or_dismiss: bool,
    #[sea_orm(column_type = "JsonBinary")]
    pub params: Json,
    pub created_at: DateTimeWithTimeZone,
    pub created_by: String,
    pub updated_at: DateTimeWithTimeZone,
    pub updated_by: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
