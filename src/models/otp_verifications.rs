// ============================================================================
// MODÈLE : OTP VERIFICATIONS
// ============================================================================
//
// Description:
//   Codes à usage unique envoyés par email pour la connexion sans mot de passe.
//
// Colonnes de la table otp_verifications:
//   - id (INTEGER, PRIMARY KEY)
//   - email (TEXT, NOT NULL) - normalisé en minuscules
//   - otp_hash (TEXT, NOT NULL) - SHA-256 de "email:code", jamais le code en clair
//   - expires_at (TIMESTAMP, NOT NULL) - created_at + 5 minutes
//   - is_used (BOOLEAN, NOT NULL) - true une fois vérifié OU remplacé
//   - verification_attempts (INTEGER, NOT NULL) - tentatives consommées
//   - created_at (TIMESTAMP, NOT NULL) - sert aussi au cooldown de renvoi
//
// Workflow:
//   1. POST /api/otp/generate : les anciens codes non utilisés passent is_used = true
//   2. Un nouveau code est inséré puis envoyé par email
//   3. POST /api/otp/verify : incrément conditionnel des tentatives
//   4. Code correct : is_used = true (UPDATE conditionnel, un seul gagnant)
//
// Points d'attention:
//   - Un seul enregistrement actif (is_used = false) par email
//   - Au-delà du plafond de tentatives, le code est invalide même s'il est correct
//
// ============================================================================

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "otp_verifications")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(indexed)]
    pub email: String,

    #[serde(skip_serializing)]
    pub otp_hash: String,

    pub expires_at: DateTime,

    pub is_used: bool,

    pub verification_attempts: i32,

    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
