// ============================================================================
// MODELS - MODULE PRINCIPAL
// ============================================================================
//
// Description:
//   Point d'entrée pour tous les modèles de données.
//   Chaque modèle correspond à une table SQLite avec SeaORM.
//
// Liste des modules:
//   - health : Health check API
//   - users : Utilisateurs (ADMIN, COACH, USER)
//   - otp_verifications : Codes OTP de connexion (expire 5 min)
//   - tasks : Tâches (statut dérivé, jamais stocké)
//   - user_tasks : Assignations tâche <-> utilisateur
//   - leads : Prospects assignés aux coachs
//   - task_documents : Fichiers uploadés sur une tâche
//   - report_data : Champs extraits des documents CSV/TXT
//   - dto : Data Transfer Objects pour les réponses API
//
// Points d'attention:
//   - Le schéma est créé depuis les entités au démarrage (db::sync_schema)
//   - Pas de suppression en cascade : les handlers suppriment les dépendances
//
// ============================================================================

pub mod health;
pub mod dto;
pub mod users;
pub mod otp_verifications;
pub mod tasks;
pub mod user_tasks;
pub mod leads;
pub mod task_documents;
pub mod report_data;
