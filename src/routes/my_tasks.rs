use actix_web::{get, put, web, HttpResponse};
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use validator::Validate;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::dto::MyTaskResponse;
use crate::models::tasks::{self, Entity as Tasks};
use crate::models::user_tasks::{self, AssignmentStatus, Entity as UserTasks};
use crate::models::users::Role;
use crate::services::task_status::assignment_status;

#[derive(Deserialize, Validate, Default)]
pub struct CompleteTaskRequest {
    #[validate(length(max = 2000))]
    pub remarks: Option<String>,
    pub done_date: Option<NaiveDate>,
}

fn to_response(task: tasks::Model, assignment: user_tasks::Model, now: chrono::NaiveDateTime) -> MyTaskResponse {
    MyTaskResponse {
        status: assignment_status(&task, &assignment, now),
        task_id: task.id,
        title: task.title,
        description: task.description,
        start_date: task.start_date,
        end_date: task.end_date,
        deadline: task.deadline,
        assignment_status: assignment.status,
        completed_at: assignment.completed_at,
        remarks: assignment.remarks,
        done_date: assignment.done_date,
    }
}

async fn load_own_assignment(
    db: &DatabaseConnection,
    auth_user: &AuthUser,
    task_id: i32,
) -> Result<(user_tasks::Model, tasks::Model), AppError> {
    auth_user.require_role(&[Role::User])?;

    let (assignment, task) = UserTasks::find_by_id((auth_user.user_id, task_id))
        .find_also_related(Tasks)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No assignment for task {}", task_id)))?;

    let task = task.ok_or_else(|| AppError::not_found("Task", task_id))?;
    Ok((assignment, task))
}

/// GET /my-tasks - Tâches assignées à l'utilisateur connecté
#[get("")]
pub async fn list_my_tasks(
    auth_user: AuthUser,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_role(&[Role::User])?;

    let rows = UserTasks::find()
        .filter(user_tasks::Column::UserId.eq(auth_user.user_id))
        .find_also_related(Tasks)
        .order_by_asc(tasks::Column::Deadline)
        .all(db.get_ref())
        .await?;

    let now = Utc::now().naive_utc();
    let response: Vec<MyTaskResponse> = rows
        .into_iter()
        .filter_map(|(assignment, task)| Some(to_response(task?, assignment, now)))
        .collect();

    Ok(HttpResponse::Ok().json(response))
}

/// PUT /my-tasks/{task_id}/complete - Marquer son assignation comme terminée
#[put("/{task_id}/complete")]
pub async fn complete_task(
    auth_user: AuthUser,
    path: web::Path<i32>,
    body: Option<web::Json<CompleteTaskRequest>>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let body = body.map(|b| b.into_inner()).unwrap_or_default();
    body.validate()?;

    let (assignment, task) = load_own_assignment(db.get_ref(), &auth_user, path.into_inner()).await?;

    let now = Utc::now().naive_utc();
    let mut active: user_tasks::ActiveModel = assignment.into();
    active.status = Set(AssignmentStatus::Completed);
    active.completed_at = Set(Some(now));
    // done_date par défaut : jour de la complétion
    active.done_date = Set(Some(body.done_date.unwrap_or_else(|| now.date())));
    if body.remarks.is_some() {
        active.remarks = Set(body.remarks);
    }
    let assignment = active.update(db.get_ref()).await?;

    tracing::info!(task_id = task.id, user_id = auth_user.user_id, "Assignment completed");

    Ok(HttpResponse::Ok().json(to_response(task, assignment, now)))
}

/// PUT /my-tasks/{task_id}/reopen - Repasser en INCOMPLETE
#[put("/{task_id}/reopen")]
pub async fn reopen_task(
    auth_user: AuthUser,
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let (assignment, task) = load_own_assignment(db.get_ref(), &auth_user, path.into_inner()).await?;

    let mut active: user_tasks::ActiveModel = assignment.into();
    active.status = Set(AssignmentStatus::Incomplete);
    active.completed_at = Set(None);
    active.done_date = Set(None);
    let assignment = active.update(db.get_ref()).await?;

    Ok(HttpResponse::Ok().json(to_response(task, assignment, Utc::now().naive_utc())))
}

pub fn my_tasks_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/my-tasks")
            .service(list_my_tasks)
            .service(complete_task)
            .service(reopen_task)
    );
}
