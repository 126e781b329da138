use actix_web::{get, web, HttpResponse};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::dto::CoachSummary;
use crate::models::leads::{self, Entity as Leads};
use crate::models::users::{Entity as Users, Column as UserColumn, Role};
use crate::routes::users::ensure_coach;

/// ADMIN, ou le coach lui-même
fn ensure_admin_or_self(auth_user: &AuthUser, coach_id: i32) -> Result<(), AppError> {
    auth_user.require_role(&[Role::Admin, Role::Coach])?;
    if !auth_user.is_admin() && auth_user.user_id != coach_id {
        return Err(AppError::Forbidden {
            required_roles: vec![Role::Admin],
            user_role: auth_user.role,
        });
    }
    Ok(())
}

/// GET /coaches - Liste des coachs avec leurs compteurs (ADMIN)
#[get("")]
pub async fn list_coaches(
    auth_user: AuthUser,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_role(&[Role::Admin])?;

    let coaches = Users::find()
        .filter(UserColumn::Role.eq(Role::Coach))
        .order_by_asc(UserColumn::Name)
        .all(db.get_ref())
        .await?;

    let mut response = Vec::with_capacity(coaches.len());
    for coach in coaches {
        let user_count = Users::find()
            .filter(UserColumn::CoachId.eq(coach.id))
            .count(db.get_ref())
            .await?;
        let lead_count = Leads::find()
            .filter(leads::Column::AssignedCoachId.eq(coach.id))
            .count(db.get_ref())
            .await?;

        response.push(CoachSummary {
            id: coach.id,
            name: coach.name,
            email: coach.email,
            user_count,
            lead_count,
        });
    }

    Ok(HttpResponse::Ok().json(response))
}

/// GET /coaches/{id}/users - Utilisateurs suivis par un coach
#[get("/{id}/users")]
pub async fn coach_users(
    auth_user: AuthUser,
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let coach_id = path.into_inner();
    ensure_admin_or_self(&auth_user, coach_id)?;
    ensure_coach(db.get_ref(), coach_id).await?;

    let users = Users::find()
        .filter(UserColumn::CoachId.eq(coach_id))
        .order_by_asc(UserColumn::Name)
        .all(db.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(users))
}

/// GET /coaches/{id}/leads - Leads assignés à un coach
#[get("/{id}/leads")]
pub async fn coach_leads(
    auth_user: AuthUser,
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let coach_id = path.into_inner();
    ensure_admin_or_self(&auth_user, coach_id)?;
    ensure_coach(db.get_ref(), coach_id).await?;

    let leads = Leads::find()
        .filter(leads::Column::AssignedCoachId.eq(coach_id))
        .order_by_asc(leads::Column::Name)
        .all(db.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(leads))
}

pub fn coaches_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/coaches")
            .service(list_coaches)
            .service(coach_users)
            .service(coach_leads)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::test_support::{insert_user, memory_db};
    use crate::utils::jwt;
    use actix_web::{http::StatusCode, test, App};

    #[actix_web::test]
    async fn test_list_coaches_with_counts() {
        let db = memory_db().await;
        let config = Config::for_tests();
        let admin = insert_user(&db, "admin@example.com", Role::Admin, None).await;
        let coach = insert_user(&db, "coach@example.com", Role::Coach, None).await;
        insert_user(&db, "u1@example.com", Role::User, Some(coach.id)).await;
        insert_user(&db, "u2@example.com", Role::User, Some(coach.id)).await;

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(db))
                .app_data(web::Data::new(config.clone()))
                .configure(coaches_routes),
        )
        .await;

        let token = jwt::generate_token(&config.jwt_secret, 1, admin.id, &admin.email, Role::Admin).unwrap();
        let req = test::TestRequest::get()
            .uri("/coaches")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body[0]["user_count"], 2);
        assert_eq!(body[0]["lead_count"], 0);
    }

    #[actix_web::test]
    async fn test_coach_cannot_read_other_coach() {
        let db = memory_db().await;
        let config = Config::for_tests();
        let coach = insert_user(&db, "c1@example.com", Role::Coach, None).await;
        let other = insert_user(&db, "c2@example.com", Role::Coach, None).await;

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(db))
                .app_data(web::Data::new(config.clone()))
                .configure(coaches_routes),
        )
        .await;

        let token = jwt::generate_token(&config.jwt_secret, 1, coach.id, &coach.email, Role::Coach).unwrap();
        let req = test::TestRequest::get()
            .uri(&format!("/coaches/{}/users", other.id))
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::get()
            .uri(&format!("/coaches/{}/leads", coach.id))
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
