use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::models::{Assignment, Question};
use crate::db::types::{AssignmentStatus, DifficultyLevel};

pub(crate) const COLUMNS: &str =
    "id, paper_id, student_id, status, deadline, assigned_at, updated_at";

/// Assignment joined with its paper and author, as shown to the student.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct StudentAssignmentRow {
    pub(crate) id: String,
    pub(crate) paper_id: String,
    pub(crate) status: AssignmentStatus,
    pub(crate) deadline: Option<PrimitiveDateTime>,
    pub(crate) assigned_at: PrimitiveDateTime,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) questions: Json<Vec<Question>>,
    pub(crate) teacher_username: String,
}

pub(crate) struct CreateAssignment<'a> {
    pub(crate) id: &'a str,
    pub(crate) paper_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) deadline: Option<PrimitiveDateTime>,
    pub(crate) assigned_at: PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateAssignment<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO assignments (id, paper_id, student_id, status, deadline, assigned_at, updated_at)
         VALUES ($1,$2,$3,$4,$5,$6,$6)",
    )
    .bind(params.id)
    .bind(params.paper_id)
    .bind(params.student_id)
    .bind(AssignmentStatus::Pending)
    .bind(params.deadline)
    .bind(params.assigned_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn find_for_student(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    student_id: &str,
) -> Result<Option<Assignment>, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(&format!(
        "SELECT {COLUMNS} FROM assignments WHERE id = $1 AND student_id = $2"
    ))
    .bind(id)
    .bind(student_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list_for_student(
    executor: impl sqlx::PgExecutor<'_>,
    student_id: &str,
) -> Result<Vec<StudentAssignmentRow>, sqlx::Error> {
    sqlx::query_as::<_, StudentAssignmentRow>(
        "SELECT a.id, a.paper_id, a.status, a.deadline, a.assigned_at,
                p.title, p.description, p.difficulty, p.questions,
                u.username AS teacher_username
         FROM assignments a
         JOIN question_papers p ON p.id = a.paper_id
         JOIN users u ON u.id = p.teacher_id
         WHERE a.student_id = $1
         ORDER BY a.assigned_at DESC, a.id",
    )
    .bind(student_id)
    .fetch_all(executor)
    .await
}

/// Sets the status. Callers only move forward (`Pending` is never a target).
pub(crate) async fn set_status(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    status: AssignmentStatus,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE assignments SET status = $1, updated_at = $2 WHERE id = $3")
        .bind(status)
        .bind(now)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}
