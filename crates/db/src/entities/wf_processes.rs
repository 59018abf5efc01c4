//! `SeaORM` Entity for wf_processes table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "wf_processes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub tenant: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub pro_id: String,
    pub ex_id: String,
    pub current_node: String,
    pub user_id: String,
    pub expire_date: Date,
    pub comment: String,
    pub status: i16,
    pub seq: i64,
    pub created_at: DateTimeWithTimeZone,
    pub created_by: String,
    pub updated_at: DateTimeWithTimeZone,
    pub updated_by: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::wf_examples::Entity",
        from = "(Column::Tenant, Column::ExId)",
        to = "(super::wf_examples::Column::Tenant, super::wf_examples::Column::ExId)"
    )]
    Examples,
}

impl Related<super::wf_examples::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Examples.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
