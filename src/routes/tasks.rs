use std::collections::HashMap;

use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::{NaiveDateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

use crate::config::Config;
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::dto::{AssignmentResponse, TaskResponse};
use crate::models::tasks::{self, Entity as Tasks};
use crate::models::user_tasks::{self, Entity as UserTasks};
use crate::models::users::{self, Role};
use crate::routes::documents;
use crate::routes::users::ensure_coach;
use crate::services::assignment_service::AssignmentService;
use crate::services::document_service::DocumentService;
use crate::services::task_status::{assignment_status, task_status};

#[derive(Deserialize, Validate)]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    pub coach_id: Option<i32>, // Ignoré pour un coach (c'est lui le propriétaire)
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
    pub deadline: NaiveDateTime,
}

#[derive(Deserialize, Validate)]
pub struct UpdateTaskRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    /// Absent : inchangée, null : effacée
    #[serde(default, deserialize_with = "present_or_null")]
    pub description: Option<Option<String>>,
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
    pub deadline: Option<NaiveDateTime>,
}

fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

const MAX_DESCRIPTION_LEN: usize = 5000;

#[derive(Deserialize, Validate)]
pub struct AssignTaskRequest {
    #[validate(length(min = 1, max = 1000))]
    pub user_ids: Vec<i32>,
}

#[derive(Deserialize, Validate)]
pub struct BulkDeleteRequest {
    #[validate(length(min = 1, max = 500))]
    pub task_ids: Vec<i32>,
}

#[derive(Serialize, Default)]
pub struct BulkDeleteResponse {
    pub deleted: Vec<i32>,
    pub not_found: Vec<i32>,
    pub removed_assignments: u64,
}

fn validate_dates(
    start_date: NaiveDateTime,
    end_date: NaiveDateTime,
    deadline: NaiveDateTime,
) -> Result<(), AppError> {
    if start_date > deadline {
        return Err(AppError::Validation("start_date must be before deadline".to_string()));
    }
    if start_date > end_date {
        return Err(AppError::Validation("start_date must be before end_date".to_string()));
    }
    Ok(())
}

/// Charge une tâche si l'appelant peut la gérer (ADMIN, ou COACH propriétaire)
pub async fn load_managed_task(
    db: &DatabaseConnection,
    auth_user: &AuthUser,
    task_id: i32,
) -> Result<tasks::Model, AppError> {
    auth_user.require_role(&[Role::Admin, Role::Coach])?;

    let task = Tasks::find_by_id(task_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found("Task", task_id))?;

    if !auth_user.is_admin() && task.coach_id != Some(auth_user.user_id) {
        return Err(AppError::Forbidden {
            required_roles: vec![Role::Admin],
            user_role: auth_user.role,
        });
    }

    Ok(task)
}

async fn assignments_by_task(
    db: &DatabaseConnection,
    task_ids: Vec<i32>,
) -> Result<HashMap<i32, Vec<user_tasks::Model>>, AppError> {
    let rows = UserTasks::find()
        .filter(user_tasks::Column::TaskId.is_in(task_ids))
        .all(db)
        .await?;

    let mut grouped: HashMap<i32, Vec<user_tasks::Model>> = HashMap::new();
    for row in rows {
        grouped.entry(row.task_id).or_default().push(row);
    }
    Ok(grouped)
}

fn to_response(task: tasks::Model, assignments: &[user_tasks::Model], now: NaiveDateTime) -> TaskResponse {
    TaskResponse {
        status: task_status(&task, assignments, now),
        assigned_count: assignments.len(),
        completed_count: assignments.iter().filter(|a| a.is_completed()).count(),
        id: task.id,
        title: task.title,
        description: task.description,
        coach_id: task.coach_id,
        start_date: task.start_date,
        end_date: task.end_date,
        deadline: task.deadline,
    }
}

/// GET /tasks - ADMIN: toutes, COACH: les siennes (statut calculé)
#[get("")]
pub async fn list_tasks(
    auth_user: AuthUser,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_role(&[Role::Admin, Role::Coach])?;

    let mut select = Tasks::find().order_by_asc(tasks::Column::Deadline);
    if !auth_user.is_admin() {
        select = select.filter(tasks::Column::CoachId.eq(auth_user.user_id));
    }
    let tasks = select.all(db.get_ref()).await?;

    let mut assignments = assignments_by_task(db.get_ref(), tasks.iter().map(|t| t.id).collect()).await?;

    // Un seul "now" pour toute la réponse
    let now = Utc::now().naive_utc();
    let response: Vec<TaskResponse> = tasks
        .into_iter()
        .map(|task| {
            let rows = assignments.remove(&task.id).unwrap_or_default();
            to_response(task, &rows, now)
        })
        .collect();

    Ok(HttpResponse::Ok().json(response))
}

/// POST /tasks - Créer une tâche (ADMIN, COACH)
#[post("")]
pub async fn create_task(
    auth_user: AuthUser,
    body: web::Json<CreateTaskRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_role(&[Role::Admin, Role::Coach])?;
    body.validate()?;
    validate_dates(body.start_date, body.end_date, body.deadline)?;

    let coach_id = if auth_user.is_admin() {
        if let Some(coach_id) = body.coach_id {
            ensure_coach(db.get_ref(), coach_id).await?;
        }
        body.coach_id
    } else {
        Some(auth_user.user_id)
    };

    let now = Utc::now().naive_utc();
    let task = tasks::ActiveModel {
        title: Set(body.title.trim().to_string()),
        description: Set(body.description.clone()),
        coach_id: Set(coach_id),
        start_date: Set(body.start_date),
        end_date: Set(body.end_date),
        deadline: Set(body.deadline),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
        .insert(db.get_ref())
        .await?;

    tracing::info!(task_id = task.id, created_by = auth_user.user_id, "Task created");

    Ok(HttpResponse::Created().json(to_response(task, &[], now)))
}

/// GET /tasks/{id}
#[get("/{id}")]
pub async fn get_task(
    auth_user: AuthUser,
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let task = load_managed_task(db.get_ref(), &auth_user, path.into_inner()).await?;

    let rows = UserTasks::find()
        .filter(user_tasks::Column::TaskId.eq(task.id))
        .all(db.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(to_response(task, &rows, Utc::now().naive_utc())))
}

/// PUT /tasks/{id}
#[put("/{id}")]
pub async fn update_task(
    auth_user: AuthUser,
    path: web::Path<i32>,
    body: web::Json<UpdateTaskRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;
    if let Some(Some(description)) = &body.description {
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(AppError::Validation(format!(
                "description must be at most {} characters",
                MAX_DESCRIPTION_LEN
            )));
        }
    }
    let task = load_managed_task(db.get_ref(), &auth_user, path.into_inner()).await?;

    let start_date = body.start_date.unwrap_or(task.start_date);
    let end_date = body.end_date.unwrap_or(task.end_date);
    let deadline = body.deadline.unwrap_or(task.deadline);
    validate_dates(start_date, end_date, deadline)?;

    let mut active: tasks::ActiveModel = task.into();
    if let Some(title) = &body.title {
        active.title = Set(title.trim().to_string());
    }
    if let Some(description) = &body.description {
        active.description = Set(description.clone());
    }
    active.start_date = Set(start_date);
    active.end_date = Set(end_date);
    active.deadline = Set(deadline);
    active.updated_at = Set(Utc::now().naive_utc());

    let task = active.update(db.get_ref()).await?;

    let rows = UserTasks::find()
        .filter(user_tasks::Column::TaskId.eq(task.id))
        .all(db.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(to_response(task, &rows, Utc::now().naive_utc())))
}

/// Supprime assignations, documents puis la tâche (même transaction), puis les fichiers
async fn delete_task_with_dependents(
    db: &DatabaseConnection,
    config: &Config,
    task_id: i32,
) -> Result<u64, AppError> {
    let txn = db.begin().await?;

    let assignments = UserTasks::delete_many()
        .filter(user_tasks::Column::TaskId.eq(task_id))
        .exec(&txn)
        .await?;
    let stored_names = DocumentService::delete_for_task(&txn, task_id).await?;
    Tasks::delete_by_id(task_id).exec(&txn).await?;

    txn.commit().await?;

    // Fichiers effacés seulement une fois la suppression validée
    DocumentService::remove_stored_files(config, &stored_names).await;
    Ok(assignments.rows_affected)
}

/// DELETE /tasks/{id}
#[delete("/{id}")]
pub async fn delete_task(
    auth_user: AuthUser,
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    let task = load_managed_task(db.get_ref(), &auth_user, path.into_inner()).await?;

    let removed = delete_task_with_dependents(db.get_ref(), &config, task.id).await?;
    tracing::info!(task_id = task.id, removed_assignments = removed, "Task deleted");

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "removed_assignments": removed,
    })))
}

/// POST /tasks/bulk-delete - Supprimer plusieurs tâches (ADMIN)
#[post("/bulk-delete")]
pub async fn bulk_delete_tasks(
    auth_user: AuthUser,
    body: web::Json<BulkDeleteRequest>,
    db: web::Data<DatabaseConnection>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_role(&[Role::Admin])?;
    body.validate()?;

    let mut response = BulkDeleteResponse::default();
    for &task_id in &body.task_ids {
        if response.deleted.contains(&task_id) || response.not_found.contains(&task_id) {
            continue;
        }
        if Tasks::find_by_id(task_id).one(db.get_ref()).await?.is_none() {
            response.not_found.push(task_id);
            continue;
        }
        response.removed_assignments += delete_task_with_dependents(db.get_ref(), &config, task_id).await?;
        response.deleted.push(task_id);
    }

    tracing::info!(deleted = response.deleted.len(), not_found = response.not_found.len(), "Bulk task delete");

    Ok(HttpResponse::Ok().json(response))
}

/// POST /tasks/{id}/assign - Assignation en masse (succès partiel)
#[post("/{id}/assign")]
pub async fn assign_task(
    auth_user: AuthUser,
    path: web::Path<i32>,
    body: web::Json<AssignTaskRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;
    let task = load_managed_task(db.get_ref(), &auth_user, path.into_inner()).await?;

    // Un coach n'assigne qu'à ses propres utilisateurs
    let cohort = if auth_user.is_admin() { None } else { Some(auth_user.user_id) };

    let report = AssignmentService::assign_task(
        db.get_ref(),
        task.id,
        &body.user_ids,
        cohort,
        Utc::now().naive_utc(),
    )
        .await?;

    Ok(HttpResponse::Ok().json(report))
}

/// GET /tasks/{id}/assignments - Assignations avec statut par utilisateur
#[get("/{id}/assignments")]
pub async fn list_assignments(
    auth_user: AuthUser,
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let task = load_managed_task(db.get_ref(), &auth_user, path.into_inner()).await?;

    let rows = UserTasks::find()
        .filter(user_tasks::Column::TaskId.eq(task.id))
        .find_also_related(users::Entity)
        .order_by_asc(user_tasks::Column::UserId)
        .all(db.get_ref())
        .await?;

    let now = Utc::now().naive_utc();
    let response: Vec<AssignmentResponse> = rows
        .into_iter()
        .filter_map(|(assignment, user)| {
            let user = user?;
            Some(AssignmentResponse {
                status: assignment_status(&task, &assignment, now),
                user_id: user.id,
                user_name: user.name,
                user_email: user.email,
                assignment_status: assignment.status,
                completed_at: assignment.completed_at,
                remarks: assignment.remarks,
                done_date: assignment.done_date,
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(response))
}

pub fn tasks_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/tasks")
            .service(list_tasks)
            .service(create_task)
            .service(bulk_delete_tasks)
            .service(get_task)
            .service(update_task)
            .service(delete_task)
            .service(assign_task)
            .service(list_assignments)
            .service(documents::upload_document)
            .service(documents::list_documents)
    );
}
