// ============================================================================
// SERVICE : ASSIGNATIONS EN MASSE
// ============================================================================
//
// Description:
//   Assigne une tâche à une liste d'utilisateurs (et des leads à un coach).
//
// Points d'attention:
//   - Pas de transaction globale : un id invalide ne bloque pas les autres,
//     la réponse liste les succès et les échecs
//   - Idempotent : INSERT ... ON CONFLICT (user_id, task_id) DO NOTHING,
//     une assignation existante n'est jamais modifiée
//   - Les ids en double dans la requête sont traités une seule fois
//
// ============================================================================

use std::collections::HashSet;

use chrono::NaiveDateTime;
use sea_orm::sea_query::OnConflict;
use sea_orm::*;
use serde::Serialize;

use crate::error::AppError;
use crate::models::user_tasks::{self, AssignmentStatus};
use crate::models::users::{self, Role};
use crate::models::{leads, tasks};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NotFound,
    NotAUser,
    NotInCohort,
    DatabaseError,
}

#[derive(Debug, Serialize)]
pub struct FailedAssignment {
    pub id: i32,
    pub reason: FailureReason,
}

/// Rapport de succès partiel renvoyé au frontend
#[derive(Debug, Default, Serialize)]
pub struct AssignmentReport {
    pub succeeded: Vec<i32>,        // newly_assigned + already_assigned
    pub newly_assigned: Vec<i32>,
    pub already_assigned: Vec<i32>,
    pub failed: Vec<FailedAssignment>,
}

impl AssignmentReport {
    fn record(&mut self, id: i32, outcome: Result<bool, FailureReason>) {
        match outcome {
            Ok(true) => {
                self.succeeded.push(id);
                self.newly_assigned.push(id);
            }
            Ok(false) => {
                self.succeeded.push(id);
                self.already_assigned.push(id);
            }
            Err(reason) => self.failed.push(FailedAssignment { id, reason }),
        }
    }
}

pub struct AssignmentService;

impl AssignmentService {
    /// Assigne une tâche à plusieurs utilisateurs
    /// `cohort` = Some(coach_id) limite aux utilisateurs de ce coach
    pub async fn assign_task(
        db: &DatabaseConnection,
        task_id: i32,
        user_ids: &[i32],
        cohort: Option<i32>,
        now: NaiveDateTime,
    ) -> Result<AssignmentReport, AppError> {
        tasks::Entity::find_by_id(task_id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::not_found("Task", task_id))?;

        let mut report = AssignmentReport::default();
        for user_id in dedup(user_ids) {
            let outcome = Self::assign_one(db, task_id, user_id, cohort, now).await;
            report.record(user_id, outcome);
        }

        tracing::info!(
            task_id,
            assigned = report.newly_assigned.len(),
            already = report.already_assigned.len(),
            failed = report.failed.len(),
            "Bulk task assignment"
        );

        Ok(report)
    }

    /// Ok(true) = nouvelle assignation, Ok(false) = existait déjà
    async fn assign_one(
        db: &DatabaseConnection,
        task_id: i32,
        user_id: i32,
        cohort: Option<i32>,
        now: NaiveDateTime,
    ) -> Result<bool, FailureReason> {
        let user = users::Entity::find_by_id(user_id)
            .one(db)
            .await
            .map_err(|e| log_db_failure(user_id, e))?
            .ok_or(FailureReason::NotFound)?;

        if user.role != Role::User {
            return Err(FailureReason::NotAUser);
        }

        if let Some(coach_id) = cohort {
            if user.coach_id != Some(coach_id) {
                return Err(FailureReason::NotInCohort);
            }
        }

        let assignment = user_tasks::ActiveModel {
            user_id: Set(user_id),
            task_id: Set(task_id),
            status: Set(AssignmentStatus::Incomplete),
            completed_at: Set(None),
            remarks: Set(None),
            done_date: Set(None),
            assigned_at: Set(now),
        };

        let inserted = user_tasks::Entity::insert(assignment)
            .on_conflict(
                OnConflict::columns([user_tasks::Column::UserId, user_tasks::Column::TaskId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(db)
            .await
            .map_err(|e| log_db_failure(user_id, e))?;

        Ok(inserted > 0)
    }

    /// Assigne plusieurs leads à un coach (même politique de succès partiel)
    pub async fn assign_leads(
        db: &DatabaseConnection,
        coach_id: i32,
        lead_ids: &[i32],
    ) -> Result<AssignmentReport, AppError> {
        let coach = users::Entity::find_by_id(coach_id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::not_found("Coach", coach_id))?;

        if coach.role != Role::Coach {
            return Err(AppError::Validation(format!(
                "User {} is not a coach",
                coach_id
            )));
        }

        let mut report = AssignmentReport::default();
        for lead_id in dedup(lead_ids) {
            let outcome = Self::assign_lead(db, coach_id, lead_id).await;
            report.record(lead_id, outcome);
        }

        tracing::info!(
            coach_id,
            assigned = report.newly_assigned.len(),
            failed = report.failed.len(),
            "Bulk lead assignment"
        );

        Ok(report)
    }

    async fn assign_lead(
        db: &DatabaseConnection,
        coach_id: i32,
        lead_id: i32,
    ) -> Result<bool, FailureReason> {
        let lead = leads::Entity::find_by_id(lead_id)
            .one(db)
            .await
            .map_err(|e| log_db_failure(lead_id, e))?
            .ok_or(FailureReason::NotFound)?;

        if lead.assigned_coach_id == Some(coach_id) {
            return Ok(false);
        }

        let mut active: leads::ActiveModel = lead.into();
        active.assigned_coach_id = Set(Some(coach_id));
        active
            .update(db)
            .await
            .map_err(|e| log_db_failure(lead_id, e))?;

        Ok(true)
    }
}

fn dedup(ids: &[i32]) -> Vec<i32> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

fn log_db_failure(id: i32, err: DbErr) -> FailureReason {
    tracing::error!(id, error = %err, "Assignment failed");
    FailureReason::DatabaseError
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{insert_task, insert_user, memory_db};
    use chrono::Utc;

    fn now() -> NaiveDateTime {
        Utc::now().naive_utc()
    }

    #[tokio::test]
    async fn test_bulk_assign_is_idempotent() {
        let db = memory_db().await;
        let task = insert_task(&db, None).await;
        let u1 = insert_user(&db, "u1@example.com", Role::User, None).await;
        let u2 = insert_user(&db, "u2@example.com", Role::User, None).await;
        let ids = [u1.id, u2.id];

        let first = AssignmentService::assign_task(&db, task.id, &ids, None, now())
            .await
            .unwrap();
        assert_eq!(first.newly_assigned, vec![u1.id, u2.id]);
        assert!(first.failed.is_empty());

        let second = AssignmentService::assign_task(&db, task.id, &ids, None, now())
            .await
            .unwrap();
        assert!(second.newly_assigned.is_empty());
        assert_eq!(second.already_assigned, vec![u1.id, u2.id]);
        assert_eq!(second.succeeded, vec![u1.id, u2.id]);

        let rows = user_tasks::Entity::find().all(&db).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_existing_assignment_left_untouched() {
        let db = memory_db().await;
        let task = insert_task(&db, None).await;
        let user = insert_user(&db, "u1@example.com", Role::User, None).await;

        AssignmentService::assign_task(&db, task.id, &[user.id], None, now())
            .await
            .unwrap();

        let existing = user_tasks::Entity::find_by_id((user.id, task.id))
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        let mut active: user_tasks::ActiveModel = existing.into();
        active.status = Set(AssignmentStatus::Completed);
        active.remarks = Set(Some("done early".to_string()));
        active.update(&db).await.unwrap();

        AssignmentService::assign_task(&db, task.id, &[user.id], None, now())
            .await
            .unwrap();

        let row = user_tasks::Entity::find_by_id((user.id, task.id))
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, AssignmentStatus::Completed);
        assert_eq!(row.remarks.as_deref(), Some("done early"));
    }

    #[tokio::test]
    async fn test_bad_ids_do_not_block_others() {
        let db = memory_db().await;
        let task = insert_task(&db, None).await;
        let coach = insert_user(&db, "coach@example.com", Role::Coach, None).await;
        let user = insert_user(&db, "u1@example.com", Role::User, None).await;

        let report = AssignmentService::assign_task(
            &db,
            task.id,
            &[9999, coach.id, user.id, user.id],
            None,
            now(),
        )
        .await
        .unwrap();

        assert_eq!(report.succeeded, vec![user.id]);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].id, 9999);
        assert_eq!(report.failed[0].reason, FailureReason::NotFound);
        assert_eq!(report.failed[1].id, coach.id);
        assert_eq!(report.failed[1].reason, FailureReason::NotAUser);
    }

    #[tokio::test]
    async fn test_coach_limited_to_own_cohort() {
        let db = memory_db().await;
        let coach = insert_user(&db, "coach@example.com", Role::Coach, None).await;
        let task = insert_task(&db, Some(coach.id)).await;
        let mine = insert_user(&db, "mine@example.com", Role::User, Some(coach.id)).await;
        let other = insert_user(&db, "other@example.com", Role::User, None).await;

        let report = AssignmentService::assign_task(
            &db,
            task.id,
            &[mine.id, other.id],
            Some(coach.id),
            now(),
        )
        .await
        .unwrap();

        assert_eq!(report.newly_assigned, vec![mine.id]);
        assert_eq!(report.failed[0].reason, FailureReason::NotInCohort);
    }

    #[tokio::test]
    async fn test_unknown_task_is_not_found() {
        let db = memory_db().await;
        let result = AssignmentService::assign_task(&db, 42, &[1], None, now()).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_assign_leads_partial_success() {
        let db = memory_db().await;
        let coach = insert_user(&db, "coach@example.com", Role::Coach, None).await;
        let lead = leads::ActiveModel {
            name: Set("Prospect".to_string()),
            phone_number: Set("+33600000000".to_string()),
            email: Set("prospect@example.com".to_string()),
            assigned_coach_id: Set(None),
            created_at: Set(now()),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();

        let report = AssignmentService::assign_leads(&db, coach.id, &[lead.id, 777])
            .await
            .unwrap();
        assert_eq!(report.newly_assigned, vec![lead.id]);
        assert_eq!(report.failed[0].reason, FailureReason::NotFound);

        let again = AssignmentService::assign_leads(&db, coach.id, &[lead.id])
            .await
            .unwrap();
        assert_eq!(again.already_assigned, vec![lead.id]);
    }

    #[tokio::test]
    async fn test_assign_leads_requires_coach() {
        let db = memory_db().await;
        let user = insert_user(&db, "u@example.com", Role::User, None).await;
        let result = AssignmentService::assign_leads(&db, user.id, &[1]).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
