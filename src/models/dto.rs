//pour les réponses structurées
use chrono::NaiveDate;
use sea_orm::prelude::DateTime;
use serde::Serialize;

use crate::models::user_tasks::AssignmentStatus;
use crate::services::task_status::TaskStatus;

// 1 tâche avec son statut calculé
#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub coach_id: Option<i32>,
    pub start_date: DateTime,
    pub end_date: DateTime,
    pub deadline: DateTime,
    pub status: TaskStatus,
    pub assigned_count: usize,
    pub completed_count: usize,
}

// Assignation vue par un admin/coach
#[derive(Debug, Serialize)]
pub struct AssignmentResponse {
    pub user_id: i32,
    pub user_name: String,
    pub user_email: String,
    pub assignment_status: AssignmentStatus,
    pub status: TaskStatus,
    pub completed_at: Option<DateTime>,
    pub remarks: Option<String>,
    pub done_date: Option<NaiveDate>,
}

// Tâche vue par l'utilisateur assigné
#[derive(Debug, Serialize)]
pub struct MyTaskResponse {
    pub task_id: i32,
    pub title: String,
    pub description: Option<String>,
    pub start_date: DateTime,
    pub end_date: DateTime,
    pub deadline: DateTime,
    pub status: TaskStatus,
    pub assignment_status: AssignmentStatus,
    pub completed_at: Option<DateTime>,
    pub remarks: Option<String>,
    pub done_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct CoachSummary {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub user_count: u64,
    pub lead_count: u64,
}
