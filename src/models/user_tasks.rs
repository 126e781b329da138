// ============================================================================
// MODÈLE : USER TASKS (assignations)
// ============================================================================
//
// Description:
//   Table de jointure users <-> tasks avec l'état de complétion par utilisateur.
//
// Points d'attention:
//   - Clé primaire composite (user_id, task_id) : une seule assignation par paire
//   - Les assignations existantes ne sont jamais écrasées par une ré-assignation
//   - Pas de ON DELETE CASCADE : les handlers de suppression nettoient d'abord
//
// ============================================================================

use serde::{Serialize, Deserialize};
use sea_orm::entity::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "UPPERCASE")]
pub enum AssignmentStatus {
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
    #[sea_orm(string_value = "INCOMPLETE")]
    Incomplete,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_tasks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub task_id: i32,
    pub status: AssignmentStatus,
    pub completed_at: Option<DateTime>,
    pub remarks: Option<String>,
    pub done_date: Option<Date>,
    pub assigned_at: DateTime,
}

impl Model {
    pub fn is_completed(&self) -> bool {
        self.status == AssignmentStatus::Completed
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id"
    )]
    User,

    #[sea_orm(
        belongs_to = "super::tasks::Entity",
        from = "Column::TaskId",
        to = "super::tasks::Column::Id"
    )]
    Task,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::tasks::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Task.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
