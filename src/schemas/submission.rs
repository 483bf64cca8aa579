use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::time::format_primitive;
use crate::db::models::{Answer, AnswerPayload, Question};
use crate::db::types::{AnswerKind, AssignmentStatus, DifficultyLevel};
use crate::repositories::answers::StudentSubmissionRow;
use crate::repositories::assignments::StudentAssignmentRow;

#[derive(Debug, Serialize)]
pub(crate) struct StudentAssignmentResponse {
    pub(crate) id: String,
    pub(crate) paper_id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) teacher_username: String,
    pub(crate) questions: Vec<Question>,
    pub(crate) status: AssignmentStatus,
    pub(crate) deadline: Option<String>,
    pub(crate) assigned_at: String,
}

impl StudentAssignmentResponse {
    pub(crate) fn from_db(row: StudentAssignmentRow) -> Self {
        Self {
            id: row.id,
            paper_id: row.paper_id,
            title: row.title,
            description: row.description,
            difficulty: row.difficulty,
            teacher_username: row.teacher_username,
            questions: row.questions.0,
            status: row.status,
            deadline: row.deadline.map(format_primitive),
            assigned_at: format_primitive(row.assigned_at),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct StructuredAnswersRequest {
    pub(crate) answers: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct GradingSummary {
    pub(crate) grade: String,
    pub(crate) feedback: String,
}

/// Result of a submission. `grading` is present only when auto-grading committed.
#[derive(Debug, Serialize)]
pub(crate) struct SubmissionResponse {
    pub(crate) answer_id: String,
    pub(crate) assignment_id: String,
    pub(crate) kind: AnswerKind,
    pub(crate) status: AssignmentStatus,
    pub(crate) submitted_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) grading: Option<GradingSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) grading_error: Option<String>,
}

impl SubmissionResponse {
    pub(crate) fn submitted(answer: &Answer) -> Self {
        Self {
            answer_id: answer.id.clone(),
            assignment_id: answer.assignment_id.clone(),
            kind: answer.kind,
            status: AssignmentStatus::Submitted,
            submitted_at: format_primitive(answer.submitted_at),
            grading: None,
            grading_error: None,
        }
    }

    pub(crate) fn with_grading(mut self, grade: String, feedback: String) -> Self {
        self.status = AssignmentStatus::Graded;
        self.grading = Some(GradingSummary { grade, feedback });
        self
    }

    pub(crate) fn with_grading_error(mut self, error: String) -> Self {
        self.grading_error = Some(error);
        self
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StudentSubmissionResponse {
    pub(crate) id: String,
    pub(crate) assignment_id: String,
    pub(crate) paper_id: String,
    pub(crate) paper_title: String,
    pub(crate) kind: AnswerKind,
    pub(crate) payload: AnswerPayload,
    pub(crate) questions: Vec<Question>,
    pub(crate) submitted_at: String,
    pub(crate) graded: bool,
    pub(crate) grade: Option<String>,
    pub(crate) feedback: Option<String>,
    pub(crate) graded_at: Option<String>,
}

impl StudentSubmissionResponse {
    pub(crate) fn from_db(row: StudentSubmissionRow) -> Self {
        let answer = row.answer;
        Self {
            id: answer.id,
            assignment_id: answer.assignment_id,
            paper_id: answer.paper_id,
            paper_title: row.paper_title,
            kind: answer.kind,
            payload: answer.payload.0,
            questions: row.questions.0,
            submitted_at: format_primitive(answer.submitted_at),
            graded: answer.graded,
            grade: answer.grade,
            feedback: answer.feedback,
            graded_at: answer.graded_at.map(format_primitive),
        }
    }
}

/// Multipart field names accepted for the uploaded document.
pub(crate) const DOCUMENT_FIELDS: [&str; 2] = ["submission", "file"];
