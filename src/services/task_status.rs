// Statut d'une tâche : toujours recalculé à la lecture, jamais stocké.
// Une seule fonction pour tous les handlers (liste, détail, mes tâches).

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::models::{tasks, user_tasks};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Open,
    OnGoing,
    Pending,
    Completed,
}

/// COMPLETED l'emporte sur les dates ; sinon OPEN avant start_date,
/// ON_GOING jusqu'à la deadline incluse, PENDING après.
pub fn derive_status(
    now: NaiveDateTime,
    start_date: NaiveDateTime,
    deadline: NaiveDateTime,
    completed: bool,
) -> TaskStatus {
    if completed {
        TaskStatus::Completed
    } else if now < start_date {
        TaskStatus::Open
    } else if now <= deadline {
        TaskStatus::OnGoing
    } else {
        TaskStatus::Pending
    }
}

/// Statut vu par un utilisateur assigné
pub fn assignment_status(
    task: &tasks::Model,
    assignment: &user_tasks::Model,
    now: NaiveDateTime,
) -> TaskStatus {
    derive_status(now, task.start_date, task.deadline, assignment.is_completed())
}

/// Statut global : complétée seulement si au moins une assignation
/// et toutes les assignations sont complétées
pub fn task_status(
    task: &tasks::Model,
    assignments: &[user_tasks::Model],
    now: NaiveDateTime,
) -> TaskStatus {
    let completed = !assignments.is_empty() && assignments.iter().all(|a| a.is_completed());
    derive_status(now, task.start_date, task.deadline, completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user_tasks::AssignmentStatus;
    use chrono::{Duration, NaiveDate};

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn task() -> tasks::Model {
        tasks::Model {
            id: 1,
            title: "Report".to_string(),
            description: None,
            coach_id: None,
            start_date: at(10),
            end_date: at(15),
            deadline: at(20),
            created_at: at(1),
            updated_at: at(1),
        }
    }

    fn assignment(user_id: i32, status: AssignmentStatus) -> user_tasks::Model {
        user_tasks::Model {
            user_id,
            task_id: 1,
            status,
            completed_at: None,
            remarks: None,
            done_date: None,
            assigned_at: at(1),
        }
    }

    #[test]
    fn test_derive_status_by_date() {
        let (start, deadline) = (at(10), at(20));
        assert_eq!(derive_status(at(5), start, deadline, false), TaskStatus::Open);
        assert_eq!(derive_status(at(10), start, deadline, false), TaskStatus::OnGoing);
        assert_eq!(derive_status(at(20), start, deadline, false), TaskStatus::OnGoing);
        assert_eq!(
            derive_status(at(20) + Duration::seconds(1), start, deadline, false),
            TaskStatus::Pending
        );
    }

    #[test]
    fn test_completed_wins_regardless_of_date() {
        let (start, deadline) = (at(10), at(20));
        for day in [5, 15, 25] {
            assert_eq!(derive_status(at(day), start, deadline, true), TaskStatus::Completed);
        }
    }

    #[test]
    fn test_task_status_without_assignments_is_never_completed() {
        assert_eq!(task_status(&task(), &[], at(25)), TaskStatus::Pending);
    }

    #[test]
    fn test_task_status_requires_all_assignments_completed() {
        let partial = vec![
            assignment(1, AssignmentStatus::Completed),
            assignment(2, AssignmentStatus::Incomplete),
        ];
        assert_eq!(task_status(&task(), &partial, at(25)), TaskStatus::Pending);

        let done = vec![
            assignment(1, AssignmentStatus::Completed),
            assignment(2, AssignmentStatus::Completed),
        ];
        assert_eq!(task_status(&task(), &done, at(25)), TaskStatus::Completed);
    }

    #[test]
    fn test_assignment_status_is_per_user() {
        let t = task();
        let done = assignment(1, AssignmentStatus::Completed);
        let todo = assignment(2, AssignmentStatus::Incomplete);
        assert_eq!(assignment_status(&t, &done, at(12)), TaskStatus::Completed);
        assert_eq!(assignment_status(&t, &todo, at(12)), TaskStatus::OnGoing);
    }

    #[test]
    fn test_status_serializes_screaming_case() {
        assert_eq!(serde_json::to_value(TaskStatus::OnGoing).unwrap(), "ON_GOING");
    }
}
