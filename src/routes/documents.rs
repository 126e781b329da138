use actix_multipart::Multipart;
use actix_web::{get, post, web, HttpResponse};
use chrono::Utc;
use futures::TryStreamExt;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, QueryOrder};
use serde_json::json;

use crate::config::Config;
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::tasks::{self, Entity as Tasks};
use crate::models::users::Role;
use crate::models::{report_data, task_documents, user_tasks};
use crate::routes::tasks::load_managed_task;
use crate::services::document_service::{validate_file_type, DocumentService, Upload};

/// ADMIN, COACH propriétaire, ou USER assigné à la tâche
async fn load_task_for_documents(
    db: &DatabaseConnection,
    auth_user: &AuthUser,
    task_id: i32,
) -> Result<tasks::Model, AppError> {
    if auth_user.role != Role::User {
        return load_managed_task(db, auth_user, task_id).await;
    }

    let assignment = user_tasks::Entity::find_by_id((auth_user.user_id, task_id))
        .one(db)
        .await?;
    if assignment.is_none() {
        return Err(AppError::NotFound(format!("No assignment for task {}", task_id)));
    }

    Tasks::find_by_id(task_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found("Task", task_id))
}

/// Lit le champ "file" du formulaire, en refusant tout dépassement de taille
async fn read_upload(mut payload: Multipart, max_bytes: usize) -> Result<Upload, AppError> {
    let invalid = |e: actix_multipart::MultipartError| AppError::Validation(format!("Invalid multipart body: {}", e));

    while let Some(mut field) = payload.try_next().await.map_err(invalid)? {
        let disposition = field.content_disposition();
        if disposition.and_then(|cd| cd.get_name()) != Some("file") {
            continue;
        }

        let original_name = disposition
            .and_then(|cd| cd.get_filename())
            .map(|name| name.to_string())
            .ok_or_else(|| AppError::Validation("Missing file name".to_string()))?;
        let content_type = field.content_type().map(|mime| mime.to_string());

        let (extension, mime_type) = validate_file_type(&original_name, content_type.as_deref())?;

        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(invalid)? {
            if bytes.len() + chunk.len() > max_bytes {
                return Err(AppError::Validation(format!(
                    "File exceeds the maximum size of {} bytes",
                    max_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        if bytes.is_empty() {
            return Err(AppError::Validation("File is empty".to_string()));
        }

        return Ok(Upload { original_name, extension, mime_type, bytes });
    }

    Err(AppError::Validation("Missing 'file' field".to_string()))
}

/// POST /tasks/{id}/documents - Upload multipart (champ "file")
#[post("/{id}/documents")]
pub async fn upload_document(
    auth_user: AuthUser,
    path: web::Path<i32>,
    payload: Multipart,
    db: web::Data<DatabaseConnection>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    let task = load_task_for_documents(db.get_ref(), &auth_user, path.into_inner()).await?;
    let upload = read_upload(payload, config.max_upload_bytes).await?;

    let (document, report) = DocumentService::save(
        db.get_ref(),
        &config,
        task.id,
        auth_user.user_id,
        upload,
        Utc::now().naive_utc(),
    )
        .await?;

    Ok(HttpResponse::Created().json(json!({
        "document": document,
        "report_data": report,
    })))
}

/// GET /tasks/{id}/documents - Métadonnées des documents d'une tâche
#[get("/{id}/documents")]
pub async fn list_documents(
    auth_user: AuthUser,
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let task = load_task_for_documents(db.get_ref(), &auth_user, path.into_inner()).await?;

    let documents = task_documents::Entity::find()
        .filter(task_documents::Column::TaskId.eq(task.id))
        .order_by_desc(task_documents::Column::CreatedAt)
        .all(db.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(documents))
}

/// GET /documents/{id}/report-data - Données extraites (404 si aucune)
#[get("/{id}/report-data")]
pub async fn get_report_data(
    auth_user: AuthUser,
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let document_id = path.into_inner();

    let document = task_documents::Entity::find_by_id(document_id)
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::not_found("Document", document_id))?;

    load_task_for_documents(db.get_ref(), &auth_user, document.task_id).await?;

    let report = document
        .find_related(report_data::Entity)
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No report data for document {}", document_id)))?;

    Ok(HttpResponse::Ok().json(report))
}

pub fn documents_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/documents")
            .service(get_report_data)
    );
}
