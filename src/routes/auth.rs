use actix_web::{post, get, web, HttpResponse};
use chrono::Utc;
use sea_orm::{DatabaseConnection, EntityTrait, QueryFilter, ColumnTrait, Set, ActiveModelTrait};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::config::Config;
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::users::{self, Entity as Users, Column as UserColumn, ActiveModel as UserActiveModel, Role};
use crate::utils::{password, jwt};

// DTO pour l'inscription
#[derive(Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

// DTO pour la connexion
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

// DTO pour changer le mot de passe
#[derive(Deserialize, Validate)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
}

// Réponse après login/register/verify OTP
#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: users::Model,
}

/// Génère le JWT d'un utilisateur (partagé avec la connexion OTP)
pub fn auth_response(config: &Config, user: users::Model) -> Result<AuthResponse, AppError> {
    let token = jwt::generate_token(
        &config.jwt_secret,
        config.jwt_ttl_hours,
        user.id,
        &user.email,
        user.role,
    )
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(AuthResponse { token, user })
}

/// Cherche un utilisateur par email (normalisé)
pub async fn find_by_email(
    db: &DatabaseConnection,
    email: &str,
) -> Result<Option<users::Model>, AppError> {
    Ok(Users::find()
        .filter(UserColumn::Email.eq(users::normalize_email(email)))
        .one(db)
        .await?)
}

/// POST /auth/register - Créer un compte USER (PUBLIC)
#[post("/register")]
pub async fn register(
    body: web::Json<RegisterRequest>,
    db: web::Data<DatabaseConnection>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;

    // 1. Vérifier si l'email existe déjà
    if find_by_email(db.get_ref(), &body.email).await?.is_some() {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    // 2. Hash le mot de passe
    let password_hash = password::hash_password(&body.password)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    // 3. Créer l'utilisateur
    let now = Utc::now().naive_utc();
    let user = UserActiveModel {
        name: Set(body.name.trim().to_string()),
        email: Set(users::normalize_email(&body.email)),
        password_hash: Set(password_hash),
        role: Set(Role::User),
        coach_id: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
        .insert(db.get_ref())
        .await?;

    tracing::info!(user_id = user.id, "User registered");

    // 4. Générer le JWT
    Ok(HttpResponse::Created().json(auth_response(&config, user)?))
}

/// POST /auth/login - Se connecter (PUBLIC)
#[post("/login")]
pub async fn login(
    body: web::Json<LoginRequest>,
    db: web::Data<DatabaseConnection>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    let invalid = || AppError::Unauthenticated("Invalid email or password".to_string());

    // 1. Trouver l'utilisateur
    let user = find_by_email(db.get_ref(), &body.email)
        .await?
        .ok_or_else(invalid)?;

    // 2. Vérifier le mot de passe
    let is_valid = password::verify_password(&body.password, &user.password_hash)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    if !is_valid {
        tracing::info!(user_id = user.id, "Login rejected: wrong password");
        return Err(invalid());
    }

    // 3. Générer le JWT
    Ok(HttpResponse::Ok().json(auth_response(&config, user)?))
}

/// GET /auth/me - Utilisateur courant (PROTÉGÉE)
#[get("/me")]
pub async fn me(
    auth_user: AuthUser,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let user = Users::find_by_id(auth_user.user_id)
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::not_found("User", auth_user.user_id))?;

    Ok(HttpResponse::Ok().json(user))
}

/// POST /auth/change-password - Changer son mot de passe (PROTÉGÉE)
#[post("/change-password")]
pub async fn change_password(
    auth_user: AuthUser,
    body: web::Json<ChangePasswordRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;

    // 1. Récupérer l'utilisateur
    let user = Users::find_by_id(auth_user.user_id)
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::not_found("User", auth_user.user_id))?;

    // 2. Vérifier l'ancien mot de passe
    let is_valid = password::verify_password(&body.current_password, &user.password_hash)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    if !is_valid {
        return Err(AppError::Unauthenticated("Current password is incorrect".to_string()));
    }

    // 3. Hasher le nouveau mot de passe
    let new_password_hash = password::hash_password(&body.new_password)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    // 4. Mettre à jour le mot de passe dans la BD
    let mut active_model: UserActiveModel = user.into();
    active_model.password_hash = Set(new_password_hash);
    active_model.updated_at = Set(Utc::now().naive_utc());
    active_model.update(db.get_ref()).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Password changed successfully"
    })))
}

pub fn auth_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .service(register)
            .service(login)
            .service(me)
            .service(change_password)
    );
}
