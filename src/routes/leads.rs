use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Deserialize;
use validator::Validate;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::leads::{self, Entity as Leads};
use crate::models::users::{normalize_email, Role};
use crate::routes::users::ensure_coach;
use crate::services::assignment_service::AssignmentService;

#[derive(Deserialize, Validate)]
pub struct CreateLeadRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 6, max = 20))]
    pub phone_number: String,
    #[validate(email)]
    pub email: String,
    pub assigned_coach_id: Option<i32>,
}

#[derive(Deserialize, Validate)]
pub struct UpdateLeadRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(min = 6, max = 20))]
    pub phone_number: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
}

#[derive(Deserialize, Validate)]
pub struct AssignLeadsRequest {
    #[validate(length(min = 1, max = 500))]
    pub lead_ids: Vec<i32>,
    pub coach_id: i32,
}

/// GET /leads - ADMIN: tous, COACH: ses leads
#[get("")]
pub async fn list_leads(
    auth_user: AuthUser,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_role(&[Role::Admin, Role::Coach])?;

    let mut select = Leads::find().order_by_desc(leads::Column::CreatedAt);
    if !auth_user.is_admin() {
        select = select.filter(leads::Column::AssignedCoachId.eq(auth_user.user_id));
    }

    Ok(HttpResponse::Ok().json(select.all(db.get_ref()).await?))
}

/// POST /leads - Créer un lead (ADMIN)
#[post("")]
pub async fn create_lead(
    auth_user: AuthUser,
    body: web::Json<CreateLeadRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_role(&[Role::Admin])?;
    body.validate()?;

    if let Some(coach_id) = body.assigned_coach_id {
        ensure_coach(db.get_ref(), coach_id).await?;
    }

    let lead = leads::ActiveModel {
        name: Set(body.name.trim().to_string()),
        phone_number: Set(body.phone_number.trim().to_string()),
        email: Set(normalize_email(&body.email)),
        assigned_coach_id: Set(body.assigned_coach_id),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
        .insert(db.get_ref())
        .await?;

    Ok(HttpResponse::Created().json(lead))
}

/// PUT /leads/{id} - Modifier un lead (ADMIN)
#[put("/{id}")]
pub async fn update_lead(
    auth_user: AuthUser,
    path: web::Path<i32>,
    body: web::Json<UpdateLeadRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_role(&[Role::Admin])?;
    body.validate()?;
    let lead_id = path.into_inner();

    let lead = Leads::find_by_id(lead_id)
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::not_found("Lead", lead_id))?;

    let mut active: leads::ActiveModel = lead.into();
    if let Some(name) = &body.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(phone) = &body.phone_number {
        active.phone_number = Set(phone.trim().to_string());
    }
    if let Some(email) = &body.email {
        active.email = Set(normalize_email(email));
    }

    Ok(HttpResponse::Ok().json(active.update(db.get_ref()).await?))
}

/// DELETE /leads/{id} - Supprimer un lead (ADMIN)
#[delete("/{id}")]
pub async fn delete_lead(
    auth_user: AuthUser,
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_role(&[Role::Admin])?;
    let lead_id = path.into_inner();

    let result = Leads::delete_by_id(lead_id).exec(db.get_ref()).await?;
    if result.rows_affected == 0 {
        return Err(AppError::not_found("Lead", lead_id));
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

/// POST /leads/assign - Assigner des leads à un coach (ADMIN, succès partiel)
#[post("/assign")]
pub async fn assign_leads(
    auth_user: AuthUser,
    body: web::Json<AssignLeadsRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_role(&[Role::Admin])?;
    body.validate()?;

    let report = AssignmentService::assign_leads(db.get_ref(), body.coach_id, &body.lead_ids).await?;
    Ok(HttpResponse::Ok().json(report))
}

pub fn leads_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/leads")
            .service(list_leads)
            .service(create_lead)
            .service(assign_leads)
            .service(update_lead)
            .service(delete_lead)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::test_support::{insert_user, memory_db};
    use crate::utils::jwt;
    use actix_web::{http::StatusCode, test, App};
    use serde_json::json;

    #[actix_web::test]
    async fn test_create_assign_and_list_leads() {
        let db = memory_db().await;
        let config = Config::for_tests();
        let admin = insert_user(&db, "admin@example.com", Role::Admin, None).await;
        let coach = insert_user(&db, "coach@example.com", Role::Coach, None).await;

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(db))
                .app_data(web::Data::new(config.clone()))
                .configure(leads_routes),
        )
        .await;

        let admin_token = jwt::generate_token(&config.jwt_secret, 1, admin.id, &admin.email, Role::Admin).unwrap();
        let coach_token = jwt::generate_token(&config.jwt_secret, 1, coach.id, &coach.email, Role::Coach).unwrap();

        let req = test::TestRequest::post()
            .uri("/leads")
            .insert_header(("Authorization", format!("Bearer {}", admin_token)))
            .set_json(json!({"name": "Prospect", "phone_number": "+33600000000", "email": "P@Example.com"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let lead: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(lead["email"], "p@example.com");

        let req = test::TestRequest::post()
            .uri("/leads/assign")
            .insert_header(("Authorization", format!("Bearer {}", admin_token)))
            .set_json(json!({"lead_ids": [lead["id"], 404], "coach_id": coach.id}))
            .to_request();
        let report: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(report["newly_assigned"], json!([lead["id"]]));
        assert_eq!(report["failed"][0]["reason"], "not_found");

        let req = test::TestRequest::get()
            .uri("/leads")
            .insert_header(("Authorization", format!("Bearer {}", coach_token)))
            .to_request();
        let leads: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(leads.as_array().unwrap().len(), 1);

        // Un coach ne peut pas créer de lead
        let req = test::TestRequest::post()
            .uri("/leads")
            .insert_header(("Authorization", format!("Bearer {}", coach_token)))
            .set_json(json!({"name": "X", "phone_number": "+33600000001", "email": "x@example.com"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
