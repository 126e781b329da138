// ============================================================================
// SERVICE : DOCUMENTS DE TÂCHES + EXTRACTION DE DONNÉES
// ============================================================================
//
// Description:
//   Validation des fichiers uploadés (extension + type MIME), stockage sur
//   disque sous un nom UUID, et extraction de champs structurés (CSV / TXT).
//
// Extraction:
//   - CSV 2 colonnes "clé,valeur"  -> {"clé": valeur, ...}
//   - CSV plus large (avec en-tête) -> {"columns": [...], "rows": [...], "row_count": n}
//   - TXT lignes "clé: valeur"      -> {"clé": valeur, ...}
//   - Autres formats : pas d'extraction
//
// ============================================================================

use std::path::Path;

use chrono::NaiveDateTime;
use sea_orm::*;
use serde_json::{Map, Value};

use crate::config::Config;
use crate::error::AppError;
use crate::models::{report_data, task_documents};

/// Extensions acceptées et leurs types MIME valides
const ALLOWED_TYPES: &[(&str, &[&str])] = &[
    ("pdf", &["application/pdf"]),
    ("png", &["image/png"]),
    ("jpg", &["image/jpeg"]),
    ("jpeg", &["image/jpeg"]),
    ("csv", &["text/csv", "application/csv", "application/vnd.ms-excel"]),
    ("txt", &["text/plain"]),
    ("xlsx", &["application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"]),
    ("docx", &["application/vnd.openxmlformats-officedocument.wordprocessingml.document"]),
];

/// Fichier reçu, déjà lu en mémoire et validé
#[derive(Debug)]
pub struct Upload {
    pub original_name: String,
    pub extension: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Vérifie la cohérence extension / type MIME, retourne (extension, mime)
pub fn validate_file_type(
    filename: &str,
    content_type: Option<&str>,
) -> Result<(String, String), AppError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .ok_or_else(|| AppError::Validation("File has no extension".to_string()))?;

    let allowed_mimes = ALLOWED_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mimes)| *mimes)
        .ok_or_else(|| {
            AppError::Validation(format!("File type .{} is not allowed", extension))
        })?;

    // "text/csv; charset=utf-8" -> "text/csv"
    let mime = content_type
        .map(|ct| ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .unwrap_or_default();

    if !allowed_mimes.contains(&mime.as_str()) {
        return Err(AppError::Validation(format!(
            "Content type '{}' does not match extension .{}",
            mime, extension
        )));
    }

    Ok((extension, mime))
}

/// Extrait des champs structurés selon le format, None si rien d'exploitable
pub fn extract_report_data(extension: &str, bytes: &[u8]) -> Option<Value> {
    let text = std::str::from_utf8(bytes).ok()?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    match extension {
        "csv" => extract_csv(text),
        "txt" => extract_key_values(text),
        _ => None,
    }
}

fn extract_csv(text: &str) -> Option<Value> {
    // Guillemets, virgules dans les cellules et CRLF gérés par le lecteur csv
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let rows: Vec<Vec<String>> = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .ok()?
        .into_iter()
        .map(|record| record.iter().map(str::to_string).collect::<Vec<_>>())
        .filter(|row| row.iter().any(|cell| !cell.is_empty()))
        .collect();

    if rows.is_empty() {
        return None;
    }

    if rows.iter().all(|row| row.len() == 2) {
        let mut fields = Map::new();
        for row in &rows {
            fields.insert(row[0].clone(), typed_value(&row[1]));
        }
        return Some(Value::Object(fields));
    }

    let (header, body) = rows.split_first()?;
    let records: Vec<Value> = body
        .iter()
        .map(|row| {
            let record: Map<String, Value> = header
                .iter()
                .enumerate()
                .map(|(i, column)| {
                    let cell = row.get(i).map(|c| typed_value(c)).unwrap_or(Value::Null);
                    (column.clone(), cell)
                })
                .collect();
            Value::Object(record)
        })
        .collect();

    Some(serde_json::json!({
        "columns": header,
        "row_count": records.len(),
        "rows": records,
    }))
}

fn extract_key_values(text: &str) -> Option<Value> {
    let fields: Map<String, Value> = text
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), typed_value(value.trim())))
        .filter(|(key, _)| !key.is_empty())
        .collect();

    if fields.is_empty() {
        None
    } else {
        Some(Value::Object(fields))
    }
}

fn typed_value(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() {
            return Value::from(f);
        }
    }
    Value::String(raw.to_string())
}

pub struct DocumentService;

impl DocumentService {
    /// Écrit le fichier, crée le document et, si possible, ses données extraites
    /// En cas d'échec, aucune ligne n'est gardée et le fichier est supprimé
    pub async fn save(
        db: &DatabaseConnection,
        config: &Config,
        task_id: i32,
        uploaded_by: i32,
        upload: Upload,
        now: NaiveDateTime,
    ) -> Result<(task_documents::Model, Option<report_data::Model>), AppError> {
        let stored_name = format!("{}.{}", uuid::Uuid::new_v4(), upload.extension);

        tokio::fs::create_dir_all(&config.upload_dir)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create upload dir: {}", e)))?;
        tokio::fs::write(Path::new(&config.upload_dir).join(&stored_name), &upload.bytes)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to store file: {}", e)))?;

        let (document, report) =
            match Self::insert_records(db, task_id, uploaded_by, &upload, &stored_name, now).await {
                Ok(records) => records,
                Err(e) => {
                    remove_stored_file(config, &stored_name).await;
                    return Err(e.into());
                }
            };

        tracing::info!(
            task_id,
            document_id = document.id,
            size = document.size_bytes,
            extracted = report.is_some(),
            "Document uploaded"
        );

        Ok((document, report))
    }

    // Document + données extraites : tout ou rien
    async fn insert_records(
        db: &DatabaseConnection,
        task_id: i32,
        uploaded_by: i32,
        upload: &Upload,
        stored_name: &str,
        now: NaiveDateTime,
    ) -> Result<(task_documents::Model, Option<report_data::Model>), DbErr> {
        let txn = db.begin().await?;

        let document = task_documents::ActiveModel {
            task_id: Set(task_id),
            uploaded_by: Set(uploaded_by),
            original_name: Set(upload.original_name.clone()),
            stored_name: Set(stored_name.to_string()),
            mime_type: Set(upload.mime_type.clone()),
            size_bytes: Set(upload.bytes.len() as i64),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let report = match extract_report_data(&upload.extension, &upload.bytes) {
            Some(fields) => Some(
                report_data::ActiveModel {
                    document_id: Set(document.id),
                    task_id: Set(task_id),
                    fields: Set(fields),
                    extracted_at: Set(now),
                    ..Default::default()
                }
                .insert(&txn)
                .await?,
            ),
            None => None,
        };

        txn.commit().await?;
        Ok((document, report))
    }

    /// Supprime les lignes des documents d'une tâche (données extraites comprises)
    /// Retourne les noms de fichiers, à effacer seulement après le commit
    pub async fn delete_for_task<C: ConnectionTrait>(
        db: &C,
        task_id: i32,
    ) -> Result<Vec<String>, DbErr> {
        let documents = task_documents::Entity::find()
            .filter(task_documents::Column::TaskId.eq(task_id))
            .all(db)
            .await?;

        report_data::Entity::delete_many()
            .filter(report_data::Column::TaskId.eq(task_id))
            .exec(db)
            .await?;
        task_documents::Entity::delete_many()
            .filter(task_documents::Column::TaskId.eq(task_id))
            .exec(db)
            .await?;

        Ok(documents.into_iter().map(|d| d.stored_name).collect())
    }

    pub async fn remove_stored_files(config: &Config, stored_names: &[String]) {
        for stored_name in stored_names {
            remove_stored_file(config, stored_name).await;
        }
    }
}

async fn remove_stored_file(config: &Config, stored_name: &str) {
    let path = Path::new(&config.upload_dir).join(stored_name);
    if let Err(e) = tokio::fs::remove_file(&path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove stored file");
        }
    }
}
