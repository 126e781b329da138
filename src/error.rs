// ============================================================================
// ERREURS API
// ============================================================================
//
// Description:
//   Type d'erreur unique des handlers. Chaque variante correspond à un code
//   HTTP et produit un corps JSON structuré ({"error": ..., ...}).
//
// Taxonomie:
//   - Unauthenticated -> 401 (token absent ou invalide)
//   - Forbidden       -> 403 ({error, requiredRoles, userRole})
//   - NotFound        -> 404
//   - Validation      -> 400
//   - Conflict        -> 409 (email déjà utilisé, violation d'unicité en base)
//   - Otp             -> 429 (cooldown de renvoi, plafond de tentatives)
//                        ou 400 (code expiré, incorrect, déjà utilisé)
//   - Database / Internal -> 500 (détail loggé, jamais exposé)
//
// ============================================================================

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use sea_orm::{DbErr, SqlErr};
use serde_json::json;

use crate::models::users::Role;
use crate::services::otp_service::OtpError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Unauthenticated(String),

    #[error("Insufficient permissions")]
    Forbidden {
        required_roles: Vec<Role>,
        user_role: Role,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Otp(#[from] OtpError),

    #[error("Database error: {0}")]
    Database(DbErr),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(what: &str, id: i32) -> Self {
        AppError::NotFound(format!("{} {} not found", what, id))
    }
}

// Une violation d'unicité (ex: deux inscriptions simultanées) reste un 409
impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => {
                tracing::info!(detail = %detail, "Unique constraint violation");
                AppError::Conflict("Resource already exists".to_string())
            }
            _ => AppError::Database(err),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Otp(OtpError::AttemptsExceeded | OtpError::ResendCooldown { .. }) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AppError::Otp(OtpError::Database(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Otp(_) => StatusCode::BAD_REQUEST,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = match self {
            AppError::Forbidden { required_roles, user_role } => json!({
                "error": self.to_string(),
                "requiredRoles": required_roles,
                "userRole": user_role,
            }),
            AppError::Otp(OtpError::Database(e)) | AppError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                json!({ "error": "Database error" })
            }
            AppError::Otp(otp_error) => {
                let mut body = json!({
                    "success": false,
                    "error": otp_error.to_string(),
                    "code": otp_error.code(),
                });
                match otp_error {
                    OtpError::Mismatch { remaining_attempts } => {
                        body["remaining_attempts"] = json!(remaining_attempts);
                    }
                    OtpError::ResendCooldown { retry_after_seconds } => {
                        body["retry_after_seconds"] = json!(retry_after_seconds);
                    }
                    _ => {}
                }
                body
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                json!({ "error": "Internal server error" })
            }
            other => json!({ "error": other.to_string() }),
        };

        HttpResponse::build(status).json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.error_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[actix_web::test]
    async fn test_forbidden_body_lists_roles() {
        let (status, body) = body_json(AppError::Forbidden {
            required_roles: vec![Role::Admin, Role::Coach],
            user_role: Role::User,
        })
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["requiredRoles"], json!(["ADMIN", "COACH"]));
        assert_eq!(body["userRole"], json!("USER"));
        assert!(body["error"].is_string());
    }

    #[actix_web::test]
    async fn test_database_error_is_opaque() {
        let (status, body) =
            body_json(AppError::Database(DbErr::Custom("secret detail".to_string()))).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Database error");
    }

    #[actix_web::test]
    async fn test_unique_violation_is_conflict() {
        use crate::db::test_support::{insert_user, memory_db};
        use crate::models::users;
        use sea_orm::{ActiveModelTrait, Set};

        let db = memory_db().await;
        let existing = insert_user(&db, "dup@example.com", Role::User, None).await;

        // Même email inséré sans passer par la vérification applicative
        let now = chrono::Utc::now().naive_utc();
        let err = users::ActiveModel {
            name: Set("Second".to_string()),
            email: Set(existing.email.clone()),
            password_hash: Set(existing.password_hash.clone()),
            role: Set(Role::User),
            coach_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap_err();

        let (status, body) = body_json(AppError::from(err)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].is_string());
    }

    #[actix_web::test]
    async fn test_otp_mismatch_reports_remaining() {
        let (status, body) =
            body_json(AppError::Otp(OtpError::Mismatch { remaining_attempts: 2 })).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "otp_mismatch");
        assert_eq!(body["remaining_attempts"], 2);
        assert_eq!(body["success"], false);
    }

    #[actix_web::test]
    async fn test_resend_cooldown_reports_retry_after() {
        let (status, body) =
            body_json(AppError::Otp(OtpError::ResendCooldown { retry_after_seconds: 42 })).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["retry_after_seconds"], 42);
    }

    #[actix_web::test]
    async fn test_attempts_exceeded_is_rate_limited() {
        let (status, body) = body_json(AppError::Otp(OtpError::AttemptsExceeded)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["code"], "otp_attempts_exceeded");
    }
}
