use actix_web::{post, web, HttpResponse};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use validator::Validate;

use crate::config::Config;
use crate::error::AppError;
use crate::routes::auth::{auth_response, find_by_email};
use crate::services::mailer::Mailer;
use crate::services::otp_service::OtpService;

#[derive(Deserialize, Validate)]
pub struct GenerateOtpRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Deserialize, Validate)]
pub struct VerifyOtpRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 16))]
    pub otp: String,
}

/// POST /otp/generate - Envoyer un code de connexion (PUBLIC)
#[post("/generate")]
pub async fn generate_otp(
    body: web::Json<GenerateOtpRequest>,
    db: web::Data<DatabaseConnection>,
    config: web::Data<Config>,
    mailer: web::Data<dyn Mailer>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;

    // 1. Le compte doit exister
    if find_by_email(db.get_ref(), &body.email).await?.is_none() {
        return Err(AppError::NotFound("No account for this email".to_string()));
    }

    // 2. Générer le code (cooldown + invalidation des anciens)
    let policy = config.otp_policy();
    let generated = OtpService::generate(db.get_ref(), &policy, &body.email, Utc::now().naive_utc()).await?;

    // 3. Envoyer l'email : en développement un échec est seulement loggé
    if let Err(e) = mailer
        .send_otp(&generated.email, &generated.code, generated.expires_at)
        .await
    {
        if config.app_env.is_production() {
            return Err(AppError::Internal(e.to_string()));
        }
        tracing::warn!(email = %generated.email, error = %e, "OTP email delivery failed (ignored in development)");
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Verification code sent",
        "expires_at": generated.expires_at.and_utc(),
        "resend_available_at": generated.resend_available_at.and_utc(),
    })))
}

/// POST /otp/verify - Vérifier le code et se connecter (PUBLIC)
#[post("/verify")]
pub async fn verify_otp(
    body: web::Json<VerifyOtpRequest>,
    db: web::Data<DatabaseConnection>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;

    let policy = config.otp_policy();
    OtpService::verify(db.get_ref(), &policy, &body.email, &body.otp, Utc::now().naive_utc()).await?;

    // Le compte peut avoir été supprimé entre generate et verify
    let user = find_by_email(db.get_ref(), &body.email)
        .await?
        .ok_or_else(|| AppError::NotFound("No account for this email".to_string()))?;

    let auth = auth_response(&config, user)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Verification successful",
        "token": auth.token,
        "user": auth.user,
    })))
}

pub fn otp_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/otp")
            .service(generate_otp)
            .service(verify_otp)
    );
}
