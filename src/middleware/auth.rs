use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::AppError;
use crate::models::users::Role;
use crate::utils::jwt;

/// Structure qui contient les infos de l'utilisateur authentifié
/// Utilisée comme extracteur dans les routes protégées
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: i32,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    /// 403 si le rôle de l'utilisateur n'est pas dans la liste
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), AppError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = self.user_id,
                role = self.role.as_str(),
                "Access denied: role not allowed"
            );
            Err(AppError::Forbidden {
                required_roles: allowed.to_vec(),
                user_role: self.role,
            })
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Implémentation de FromRequest pour AuthUser
/// Cela permet à Actix-Web d'extraire automatiquement AuthUser des requêtes
impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

fn authenticate(req: &HttpRequest) -> Result<AuthUser, AppError> {
    let config = req
        .app_data::<web::Data<Config>>()
        .ok_or_else(|| AppError::Internal("Config not registered".to_string()))?;

    // 1. Extraire le header Authorization
    let auth_header = req
        .headers()
        .get("Authorization")
        .ok_or_else(|| AppError::Unauthenticated("Missing Authorization header".to_string()))?;

    // 2. Convertir le header en string
    let auth_str = auth_header
        .to_str()
        .map_err(|_| AppError::Unauthenticated("Invalid Authorization header".to_string()))?;

    // 3. Extraire le token (format: "Bearer <token>")
    let token = auth_str.strip_prefix("Bearer ").ok_or_else(|| {
        AppError::Unauthenticated(
            "Invalid Authorization format (expected: Bearer <token>)".to_string(),
        )
    })?;

    // 4. Vérifier le token JWT
    let claims = jwt::verify_token(&config.jwt_secret, token.trim())
        .map_err(|e| AppError::Unauthenticated(e.to_string()))?;

    Ok(AuthUser {
        user_id: claims.sub,
        email: claims.email,
        role: claims.role,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{get, http::StatusCode, test, App, HttpResponse};

    #[get("/admin-only")]
    async fn admin_only(auth_user: AuthUser) -> Result<HttpResponse, AppError> {
        auth_user.require_role(&[Role::Admin])?;
        Ok(HttpResponse::Ok().finish())
    }

    #[actix_web::test]
    async fn test_missing_token_is_401() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(Config::for_tests()))
                .service(admin_only),
        )
        .await;

        let req = test::TestRequest::get().uri("/admin-only").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_garbage_token_is_401() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(Config::for_tests()))
                .service(admin_only),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/admin-only")
            .insert_header(("Authorization", "Bearer not-a-jwt"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_role_mismatch_is_403_with_roles() {
        let config = Config::for_tests();
        let token = jwt::generate_token(&config.jwt_secret, 1, 7, "u@example.com", Role::User)
            .unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config))
                .service(admin_only),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/admin-only")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["requiredRoles"], serde_json::json!(["ADMIN"]));
        assert_eq!(body["userRole"], "USER");
    }

    #[actix_web::test]
    async fn test_admin_passes() {
        let config = Config::for_tests();
        let token = jwt::generate_token(&config.jwt_secret, 1, 1, "admin@example.com", Role::Admin)
            .unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config))
                .service(admin_only),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/admin-only")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
