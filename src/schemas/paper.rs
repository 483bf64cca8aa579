use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime,
    PrimitiveDateTime,
};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{Question, QuestionPaper};
use crate::db::types::{AnswerKind, DifficultyLevel};
use crate::repositories::answers::PaperSubmissionRow;
use crate::repositories::papers::PaperWithStats;

#[derive(Debug, Deserialize)]
pub(crate) struct CreatePaperRequest {
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
    pub(crate) questions: Vec<Question>,
    #[serde(default)]
    pub(crate) difficulty: DifficultyLevel,
    #[serde(default, deserialize_with = "deserialize_option_offset_datetime_flexible")]
    pub(crate) deadline: Option<OffsetDateTime>,
    #[serde(alias = "student_ids", alias = "students")]
    pub(crate) student_identifiers: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreatePaperResponse {
    pub(crate) paper_id: String,
    pub(crate) assignment_ids: Vec<String>,
    pub(crate) assigned_count: usize,
    pub(crate) skipped: Vec<String>,
    pub(crate) message: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct PaperSummaryResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) deadline: Option<String>,
    pub(crate) created_at: String,
    pub(crate) question_count: usize,
    pub(crate) total_assigned: i64,
    pub(crate) pending: i64,
    pub(crate) submitted: i64,
    pub(crate) graded: i64,
}

impl PaperSummaryResponse {
    pub(crate) fn from_db(row: PaperWithStats) -> Self {
        let paper = row.paper;
        Self {
            id: paper.id,
            title: paper.title,
            description: paper.description,
            difficulty: paper.difficulty,
            deadline: paper.deadline.map(format_primitive),
            created_at: format_primitive(paper.created_at),
            question_count: paper.questions.0.len(),
            total_assigned: row.total_assigned,
            pending: row.pending,
            submitted: row.submitted,
            graded: row.graded,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PaperResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) deadline: Option<String>,
    pub(crate) questions: Vec<Question>,
}

impl PaperResponse {
    pub(crate) fn from_db(paper: QuestionPaper) -> Self {
        Self {
            id: paper.id,
            title: paper.title,
            description: paper.description,
            difficulty: paper.difficulty,
            deadline: paper.deadline.map(format_primitive),
            questions: paper.questions.0,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PaperSubmissionResponse {
    pub(crate) answer_id: String,
    pub(crate) assignment_id: String,
    pub(crate) student_id: String,
    pub(crate) student_username: String,
    pub(crate) kind: AnswerKind,
    pub(crate) submitted_at: String,
    pub(crate) graded: bool,
    pub(crate) grade: Option<String>,
}

impl PaperSubmissionResponse {
    pub(crate) fn from_db(row: PaperSubmissionRow) -> Self {
        let answer = row.answer;
        Self {
            answer_id: answer.id,
            assignment_id: answer.assignment_id,
            student_id: answer.student_id,
            student_username: row.student_username,
            kind: answer.kind,
            submitted_at: format_primitive(answer.submitted_at),
            graded: answer.graded,
            grade: answer.grade,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ManualGradeRequest {
    pub(crate) grade: String,
    #[serde(default)]
    #[validate(length(max = 20000, message = "feedback is too long"))]
    pub(crate) feedback: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RegradeRequest {
    #[serde(default)]
    pub(crate) api_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct GradeResponse {
    pub(crate) answer_id: String,
    pub(crate) graded: bool,
    pub(crate) grade: String,
    pub(crate) feedback: Option<String>,
}

fn parse_offset_datetime_flexible(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(value);
    }

    // `datetime-local` inputs carry no offset; read them as UTC.
    if let Ok(value) =
        PrimitiveDateTime::parse(raw, &format_description!("[year]-[month]-[day]T[hour]:[minute]"))
    {
        return Some(value.assume_utc());
    }
    if let Ok(value) = PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    ) {
        return Some(value.assume_utc());
    }

    None
}

fn deserialize_option_offset_datetime_flexible<'de, D>(
    deserializer: D,
) -> Result<Option<OffsetDateTime>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        Some("") | None => Ok(None),
        Some(value) => parse_offset_datetime_flexible(value)
            .ok_or_else(|| D::Error::custom(format!("invalid datetime: {value}")))
            .map(Some),
    }
}
