use serde::{Serialize, Deserialize};
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "task_documents")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub task_id: i32,
    pub uploaded_by: i32,
    pub original_name: String,
    #[serde(skip_serializing)] // Chemin interne, pas exposé
    pub stored_name: String, // UUID v4 + extension
    pub mime_type: String,
    pub size_bytes: i64,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tasks::Entity",
        from = "Column::TaskId",
        to = "super::tasks::Column::Id"
    )]
    Task,

    #[sea_orm(has_one = "super::report_data::Entity")]
    ReportData,
}

impl Related<super::tasks::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Task.def()
    }
}

impl Related<super::report_data::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ReportData.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
