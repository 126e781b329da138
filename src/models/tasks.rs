use serde::{Serialize, Deserialize};
use sea_orm::entity::prelude::*;

// Pas de colonne status : le statut est dérivé à chaque lecture
// (voir services::task_status::derive_status)
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tasks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub coach_id: Option<i32>, // Coach propriétaire, NULL si créée par un admin
    pub start_date: DateTime,
    pub end_date: DateTime,
    pub deadline: DateTime,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::user_tasks::Entity")]
    UserTasks,

    #[sea_orm(has_many = "super::task_documents::Entity")]
    TaskDocuments,
}

impl Related<super::user_tasks::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserTasks.def()
    }
}

impl Related<super::task_documents::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TaskDocuments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
