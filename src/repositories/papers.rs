use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::models::{Question, QuestionPaper};
use crate::db::types::DifficultyLevel;

pub(crate) const COLUMNS: &str =
    "id, teacher_id, title, description, questions, difficulty, deadline, created_at";

/// A paper plus assignment counts taken from one aggregate snapshot.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct PaperWithStats {
    #[sqlx(flatten)]
    pub(crate) paper: QuestionPaper,
    pub(crate) total_assigned: i64,
    pub(crate) pending: i64,
    pub(crate) submitted: i64,
    pub(crate) graded: i64,
}

pub(crate) struct CreatePaper<'a> {
    pub(crate) id: &'a str,
    pub(crate) teacher_id: &'a str,
    pub(crate) title: &'a str,
    pub(crate) description: Option<&'a str>,
    pub(crate) questions: &'a [Question],
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) deadline: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreatePaper<'_>,
) -> Result<QuestionPaper, sqlx::Error> {
    sqlx::query_as::<_, QuestionPaper>(&format!(
        "INSERT INTO question_papers (
            id, teacher_id, title, description, questions, difficulty, deadline, created_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.teacher_id)
    .bind(params.title)
    .bind(params.description)
    .bind(Json(params.questions))
    .bind(params.difficulty)
    .bind(params.deadline)
    .bind(params.created_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<QuestionPaper>, sqlx::Error> {
    sqlx::query_as::<_, QuestionPaper>(&format!(
        "SELECT {COLUMNS} FROM question_papers WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn find_owned(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    teacher_id: &str,
) -> Result<Option<QuestionPaper>, sqlx::Error> {
    sqlx::query_as::<_, QuestionPaper>(&format!(
        "SELECT {COLUMNS} FROM question_papers WHERE id = $1 AND teacher_id = $2"
    ))
    .bind(id)
    .bind(teacher_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list_with_stats(
    executor: impl sqlx::PgExecutor<'_>,
    teacher_id: &str,
) -> Result<Vec<PaperWithStats>, sqlx::Error> {
    sqlx::query_as::<_, PaperWithStats>(
        "SELECT p.id, p.teacher_id, p.title, p.description, p.questions, p.difficulty,
                p.deadline, p.created_at,
                COUNT(a.id) AS total_assigned,
                COUNT(a.id) FILTER (WHERE a.status = 'pending') AS pending,
                COUNT(a.id) FILTER (WHERE a.status = 'submitted') AS submitted,
                COUNT(a.id) FILTER (WHERE a.status = 'graded') AS graded
         FROM question_papers p
         LEFT JOIN assignments a ON a.paper_id = p.id
         WHERE p.teacher_id = $1
         GROUP BY p.id
         ORDER BY p.created_at DESC",
    )
    .bind(teacher_id)
    .fetch_all(executor)
    .await
}
