use serde::{Serialize, Deserialize};
use sea_orm::entity::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    #[sea_orm(string_value = "ADMIN")]
    Admin,
    #[sea_orm(string_value = "COACH")]
    Coach,
    #[sea_orm(string_value = "USER")]
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Coach => "COACH",
            Role::User => "USER",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Some(Role::Admin),
            "COACH" => Some(Role::Coach),
            "USER" => Some(Role::User),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    #[sea_orm(unique)]
    pub email: String, // Toujours normalisé (trim + minuscules)
    #[serde(skip_serializing)] // Ne jamais exposer le hash en JSON
    pub password_hash: String, // Format: pbkdf2:sha256:iterations$salt$hash
    pub role: Role,
    pub coach_id: Option<i32>, // Coach responsable (rôle USER seulement)
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::user_tasks::Entity")]
    UserTasks,
}

impl Related<super::user_tasks::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserTasks.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Normalise un email pour garantir l'unicité insensible à la casse
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
