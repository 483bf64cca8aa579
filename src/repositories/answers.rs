use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::models::{Answer, AnswerPayload, Question};

pub(crate) const COLUMNS: &str = "\
    id, assignment_id, paper_id, student_id, kind, payload, extracted_text, \
    submitted_at, revision, graded, grade, feedback, graded_at, graded_by, \
    created_at, updated_at";

/// Answer listed for the paper's author.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct PaperSubmissionRow {
    #[sqlx(flatten)]
    pub(crate) answer: Answer,
    pub(crate) student_username: String,
}

/// Answer listed for its student, with the paper it answers.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct StudentSubmissionRow {
    #[sqlx(flatten)]
    pub(crate) answer: Answer,
    pub(crate) paper_title: String,
    pub(crate) questions: Json<Vec<Question>>,
}

pub(crate) struct UpsertAnswer<'a> {
    pub(crate) id: &'a str,
    pub(crate) assignment_id: &'a str,
    pub(crate) paper_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) payload: &'a AnswerPayload,
    pub(crate) submitted_at: PrimitiveDateTime,
}

/// Inserts or replaces the answer of an assignment. Replacing clears any grading
/// and bumps `revision`.
pub(crate) async fn upsert(
    executor: impl sqlx::PgExecutor<'_>,
    params: UpsertAnswer<'_>,
) -> Result<Answer, sqlx::Error> {
    sqlx::query_as::<_, Answer>(&format!(
        "INSERT INTO answers (
            id, assignment_id, paper_id, student_id, kind, payload, extracted_text,
            submitted_at, revision, graded, grade, feedback, graded_at, graded_by,
            created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,NULL,$7,1,FALSE,NULL,NULL,NULL,NULL,$7,$7)
        ON CONFLICT (assignment_id) DO UPDATE SET
            kind = EXCLUDED.kind,
            payload = EXCLUDED.payload,
            extracted_text = NULL,
            submitted_at = EXCLUDED.submitted_at,
            revision = answers.revision + 1,
            graded = FALSE,
            grade = NULL,
            feedback = NULL,
            graded_at = NULL,
            graded_by = NULL,
            updated_at = EXCLUDED.updated_at
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.assignment_id)
    .bind(params.paper_id)
    .bind(params.student_id)
    .bind(params.payload.kind())
    .bind(Json(params.payload))
    .bind(params.submitted_at)
    .fetch_one(executor)
    .await
}

/// Answer whose paper was authored by `teacher_id`.
pub(crate) async fn find_owned_by_teacher(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    teacher_id: &str,
) -> Result<Option<Answer>, sqlx::Error> {
    sqlx::query_as::<_, Answer>(&format!(
        "SELECT {COLUMNS} FROM answers
         WHERE id = $1
           AND paper_id IN (SELECT id FROM question_papers WHERE teacher_id = $2)"
    ))
    .bind(id)
    .bind(teacher_id)
    .fetch_optional(executor)
    .await
}

pub(crate) struct CommitGrade<'a> {
    pub(crate) answer_id: &'a str,
    /// `Some` restricts the commit to the revision that was graded.
    pub(crate) expected_revision: Option<i64>,
    pub(crate) grade: &'a str,
    pub(crate) feedback: Option<&'a str>,
    pub(crate) extracted_text: Option<&'a str>,
    pub(crate) graded_by: Option<&'a str>,
    pub(crate) graded_at: PrimitiveDateTime,
}

/// Marks the answer graded and returns its `assignment_id`, or `None` when no
/// row matched.
pub(crate) async fn commit_grade(
    executor: impl sqlx::PgExecutor<'_>,
    params: CommitGrade<'_>,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "UPDATE answers SET
            graded = TRUE,
            grade = $2,
            feedback = $3,
            extracted_text = COALESCE($4, extracted_text),
            graded_by = $5,
            graded_at = $6,
            updated_at = $6
         WHERE id = $1 AND ($7::BIGINT IS NULL OR revision = $7)
         RETURNING assignment_id",
    )
    .bind(params.answer_id)
    .bind(params.grade)
    .bind(params.feedback)
    .bind(params.extracted_text)
    .bind(params.graded_by)
    .bind(params.graded_at)
    .bind(params.expected_revision)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list_for_paper(
    executor: impl sqlx::PgExecutor<'_>,
    paper_id: &str,
) -> Result<Vec<PaperSubmissionRow>, sqlx::Error> {
    sqlx::query_as::<_, PaperSubmissionRow>(
        "SELECT a.id, a.assignment_id, a.paper_id, a.student_id, a.kind, a.payload,
                a.extracted_text, a.submitted_at, a.revision, a.graded, a.grade, a.feedback,
                a.graded_at, a.graded_by, a.created_at, a.updated_at,
                u.username AS student_username
         FROM answers a
         JOIN users u ON u.id = a.student_id
         WHERE a.paper_id = $1
         ORDER BY a.submitted_at DESC, a.id",
    )
    .bind(paper_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn list_for_student(
    executor: impl sqlx::PgExecutor<'_>,
    student_id: &str,
) -> Result<Vec<StudentSubmissionRow>, sqlx::Error> {
    sqlx::query_as::<_, StudentSubmissionRow>(
        "SELECT a.id, a.assignment_id, a.paper_id, a.student_id, a.kind, a.payload,
                a.extracted_text, a.submitted_at, a.revision, a.graded, a.grade, a.feedback,
                a.graded_at, a.graded_by, a.created_at, a.updated_at,
                p.title AS paper_title, p.questions
         FROM answers a
         JOIN question_papers p ON p.id = a.paper_id
         WHERE a.student_id = $1
         ORDER BY a.submitted_at DESC, a.id",
    )
    .bind(student_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn find_for_student(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    student_id: &str,
) -> Result<Option<StudentSubmissionRow>, sqlx::Error> {
    sqlx::query_as::<_, StudentSubmissionRow>(
        "SELECT a.id, a.assignment_id, a.paper_id, a.student_id, a.kind, a.payload,
                a.extracted_text, a.submitted_at, a.revision, a.graded, a.grade, a.feedback,
                a.graded_at, a.graded_by, a.created_at, a.updated_at,
                p.title AS paper_title, p.questions
         FROM answers a
         JOIN question_papers p ON p.id = a.paper_id
         WHERE a.id = $1 AND a.student_id = $2",
    )
    .bind(id)
    .bind(student_id)
    .fetch_optional(executor)
    .await
}
