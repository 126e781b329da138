use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Deserialize;
use validator::Validate;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::users::{self, Entity as Users, Column as UserColumn, Role};
use crate::models::{leads, otp_verifications, tasks, user_tasks};
use crate::routes::auth::find_by_email;
use crate::utils::password;

#[derive(Deserialize)]
pub struct UserListQuery {
    pub role: Option<String>,
}

#[derive(Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    pub role: Role,
    pub coach_id: Option<i32>,
}

#[derive(Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub role: Option<Role>,
    pub coach_id: Option<i32>,
    #[serde(default)]
    pub remove_coach: bool,
}

/// Vérifie que l'id référence bien un COACH
pub async fn ensure_coach(db: &DatabaseConnection, coach_id: i32) -> Result<users::Model, AppError> {
    let coach = Users::find_by_id(coach_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found("Coach", coach_id))?;

    if coach.role != Role::Coach {
        return Err(AppError::Validation(format!("User {} is not a coach", coach_id)));
    }
    Ok(coach)
}

/// GET /users - ADMIN: tous (filtre ?role=), COACH: ses utilisateurs
#[get("")]
pub async fn list_users(
    auth_user: AuthUser,
    query: web::Query<UserListQuery>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_role(&[Role::Admin, Role::Coach])?;

    let mut select = Users::find().order_by_asc(UserColumn::Name);

    if auth_user.is_admin() {
        if let Some(raw) = query.role.as_deref() {
            let role = Role::parse(raw)
                .ok_or_else(|| AppError::Validation(format!("Unknown role: {}", raw)))?;
            select = select.filter(UserColumn::Role.eq(role));
        }
    } else {
        select = select.filter(UserColumn::CoachId.eq(auth_user.user_id));
    }

    let users = select.all(db.get_ref()).await?;
    Ok(HttpResponse::Ok().json(users))
}

/// POST /users - Créer un compte avec n'importe quel rôle (ADMIN)
#[post("")]
pub async fn create_user(
    auth_user: AuthUser,
    body: web::Json<CreateUserRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_role(&[Role::Admin])?;
    body.validate()?;

    if find_by_email(db.get_ref(), &body.email).await?.is_some() {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    if let Some(coach_id) = body.coach_id {
        if body.role != Role::User {
            return Err(AppError::Validation("Only USER accounts can have a coach".to_string()));
        }
        ensure_coach(db.get_ref(), coach_id).await?;
    }

    let password_hash = password::hash_password(&body.password)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let now = Utc::now().naive_utc();
    let user = users::ActiveModel {
        name: Set(body.name.trim().to_string()),
        email: Set(users::normalize_email(&body.email)),
        password_hash: Set(password_hash),
        role: Set(body.role),
        coach_id: Set(body.coach_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
        .insert(db.get_ref())
        .await?;

    tracing::info!(user_id = user.id, role = user.role.as_str(), created_by = auth_user.user_id, "User created");

    Ok(HttpResponse::Created().json(user))
}

/// GET /users/{id} - ADMIN, ou le coach de cet utilisateur
#[get("/{id}")]
pub async fn get_user(
    auth_user: AuthUser,
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_role(&[Role::Admin, Role::Coach])?;
    let user_id = path.into_inner();

    let user = Users::find_by_id(user_id)
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::not_found("User", user_id))?;

    // Un coach ne voit que ses propres utilisateurs (404 pour ne rien révéler)
    if !auth_user.is_admin() && user.coach_id != Some(auth_user.user_id) {
        return Err(AppError::not_found("User", user_id));
    }

    Ok(HttpResponse::Ok().json(user))
}

/// PUT /users/{id} - Modifier nom/email/rôle/coach (ADMIN)
#[put("/{id}")]
pub async fn update_user(
    auth_user: AuthUser,
    path: web::Path<i32>,
    body: web::Json<UpdateUserRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_role(&[Role::Admin])?;
    body.validate()?;
    let user_id = path.into_inner();

    let user = Users::find_by_id(user_id)
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::not_found("User", user_id))?;

    let role = body.role.unwrap_or(user.role);
    let coach_id = if body.remove_coach {
        None
    } else {
        body.coach_id.or(user.coach_id)
    };

    if let Some(coach_id) = coach_id {
        if role != Role::User {
            return Err(AppError::Validation("Only USER accounts can have a coach".to_string()));
        }
        ensure_coach(db.get_ref(), coach_id).await?;
    }

    let mut active: users::ActiveModel = user.into();

    if let Some(email) = &body.email {
        if let Some(existing) = find_by_email(db.get_ref(), email).await? {
            if existing.id != user_id {
                return Err(AppError::Conflict("Email already registered".to_string()));
            }
        }
        active.email = Set(users::normalize_email(email));
    }
    if let Some(name) = &body.name {
        active.name = Set(name.trim().to_string());
    }
    active.role = Set(role);
    active.coach_id = Set(coach_id);
    active.updated_at = Set(Utc::now().naive_utc());

    let updated = active.update(db.get_ref()).await?;
    Ok(HttpResponse::Ok().json(updated))
}

/// DELETE /users/{id} - Supprimer un compte et ses assignations (ADMIN)
#[delete("/{id}")]
pub async fn delete_user(
    auth_user: AuthUser,
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_role(&[Role::Admin])?;
    let user_id = path.into_inner();

    if user_id == auth_user.user_id {
        return Err(AppError::Validation("You cannot delete your own account".to_string()));
    }

    let user = Users::find_by_id(user_id)
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::not_found("User", user_id))?;

    // Pas de cascade : dépendances d'abord, dans une seule transaction
    let txn = db.begin().await?;

    let assignments = user_tasks::Entity::delete_many()
        .filter(user_tasks::Column::UserId.eq(user_id))
        .exec(&txn)
        .await?;
    Users::update_many()
        .col_expr(UserColumn::CoachId, Expr::value(Option::<i32>::None))
        .filter(UserColumn::CoachId.eq(user_id))
        .exec(&txn)
        .await?;
    leads::Entity::update_many()
        .col_expr(leads::Column::AssignedCoachId, Expr::value(Option::<i32>::None))
        .filter(leads::Column::AssignedCoachId.eq(user_id))
        .exec(&txn)
        .await?;
    tasks::Entity::update_many()
        .col_expr(tasks::Column::CoachId, Expr::value(Option::<i32>::None))
        .filter(tasks::Column::CoachId.eq(user_id))
        .exec(&txn)
        .await?;
    otp_verifications::Entity::delete_many()
        .filter(otp_verifications::Column::Email.eq(&user.email))
        .exec(&txn)
        .await?;
    Users::delete_by_id(user_id).exec(&txn).await?;

    txn.commit().await?;

    tracing::info!(user_id, removed_assignments = assignments.rows_affected, "User deleted");

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "removed_assignments": assignments.rows_affected,
    })))
}

pub fn users_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/users")
            .service(list_users)
            .service(create_user)
            .service(get_user)
            .service(update_user)
            .service(delete_user)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::test_support::{insert_task, insert_user, memory_db};
    use crate::utils::jwt;
    use actix_web::{http::StatusCode, test, App};
    use serde_json::json;

    fn bearer(config: &Config, user: &users::Model) -> (&'static str, String) {
        let token = jwt::generate_token(&config.jwt_secret, 1, user.id, &user.email, user.role).unwrap();
        ("Authorization", format!("Bearer {}", token))
    }

    #[actix_web::test]
    async fn test_coach_sees_only_own_users() {
        let db = memory_db().await;
        let config = Config::for_tests();
        let coach = insert_user(&db, "coach@example.com", Role::Coach, None).await;
        insert_user(&db, "mine@example.com", Role::User, Some(coach.id)).await;
        let other = insert_user(&db, "other@example.com", Role::User, None).await;

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(db))
                .app_data(web::Data::new(config.clone()))
                .configure(users_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/users")
            .insert_header(bearer(&config, &coach))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["email"], "mine@example.com");

        let req = test::TestRequest::get()
            .uri(&format!("/users/{}", other.id))
            .insert_header(bearer(&config, &coach))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_user_cannot_list_users() {
        let db = memory_db().await;
        let config = Config::for_tests();
        let user = insert_user(&db, "u@example.com", Role::User, None).await;

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(db))
                .app_data(web::Data::new(config.clone()))
                .configure(users_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/users")
            .insert_header(bearer(&config, &user))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn test_admin_creates_and_deletes_user() {
        let db = memory_db().await;
        let config = Config::for_tests();
        let admin = insert_user(&db, "admin@example.com", Role::Admin, None).await;
        let coach = insert_user(&db, "coach@example.com", Role::Coach, None).await;
        let task = insert_task(&db, None).await;

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(db.clone()))
                .app_data(web::Data::new(config.clone()))
                .configure(users_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/users")
            .insert_header(bearer(&config, &admin))
            .set_json(json!({
                "name": "Carol",
                "email": "carol@example.com",
                "password": "longenough",
                "role": "USER",
                "coach_id": coach.id
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created: serde_json::Value = test::read_body_json(resp).await;
        let carol_id = created["id"].as_i64().unwrap() as i32;

        user_tasks::ActiveModel {
            user_id: Set(carol_id),
            task_id: Set(task.id),
            status: Set(user_tasks::AssignmentStatus::Incomplete),
            completed_at: Set(None),
            remarks: Set(None),
            done_date: Set(None),
            assigned_at: Set(Utc::now().naive_utc()),
        }
        .insert(&db)
        .await
        .unwrap();

        let req = test::TestRequest::delete()
            .uri(&format!("/users/{}", carol_id))
            .insert_header(bearer(&config, &admin))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["removed_assignments"], 1);

        assert!(Users::find_by_id(carol_id).one(&db).await.unwrap().is_none());
    }

    #[actix_web::test]
    async fn test_coach_id_must_reference_a_coach() {
        let db = memory_db().await;
        let config = Config::for_tests();
        let admin = insert_user(&db, "admin@example.com", Role::Admin, None).await;
        let plain = insert_user(&db, "plain@example.com", Role::User, None).await;

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(db))
                .app_data(web::Data::new(config.clone()))
                .configure(users_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/users")
            .insert_header(bearer(&config, &admin))
            .set_json(json!({
                "name": "Dan",
                "email": "dan@example.com",
                "password": "longenough",
                "role": "USER",
                "coach_id": plain.id
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
