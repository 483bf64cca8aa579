use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{AnswerKind, AssignmentStatus, DifficultyLevel, UserRole};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) username: String,
    pub(crate) email: String,
    pub(crate) hashed_password: String,
    pub(crate) role: UserRole,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) last_login_at: Option<PrimitiveDateTime>,
}

/// One question of a paper. Unknown keys are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Question {
    #[serde(default)]
    pub(crate) id: String,
    #[serde(alias = "question")]
    pub(crate) text: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub(crate) question_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) marks: Option<f64>,
    #[serde(flatten)]
    pub(crate) extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct QuestionPaper {
    pub(crate) id: String,
    pub(crate) teacher_id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) questions: Json<Vec<Question>>,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) deadline: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Assignment {
    pub(crate) id: String,
    pub(crate) paper_id: String,
    pub(crate) student_id: String,
    pub(crate) status: AssignmentStatus,
    pub(crate) deadline: Option<PrimitiveDateTime>,
    pub(crate) assigned_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// Reference to an uploaded document held by the file store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct DocumentRef {
    pub(crate) file_key: String,
    pub(crate) file_name: String,
    pub(crate) content_type: String,
    pub(crate) size_bytes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub(crate) enum AnswerPayload {
    Structured { answers: BTreeMap<String, serde_json::Value> },
    Document(DocumentRef),
}

impl AnswerPayload {
    pub(crate) fn kind(&self) -> AnswerKind {
        match self {
            AnswerPayload::Structured { .. } => AnswerKind::Structured,
            AnswerPayload::Document(_) => AnswerKind::Document,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Answer {
    pub(crate) id: String,
    pub(crate) assignment_id: String,
    pub(crate) paper_id: String,
    pub(crate) student_id: String,
    pub(crate) kind: AnswerKind,
    pub(crate) payload: Json<AnswerPayload>,
    pub(crate) extracted_text: Option<String>,
    pub(crate) submitted_at: PrimitiveDateTime,
    pub(crate) revision: i64,
    pub(crate) graded: bool,
    pub(crate) grade: Option<String>,
    pub(crate) feedback: Option<String>,
    pub(crate) graded_at: Option<PrimitiveDateTime>,
    pub(crate) graded_by: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn question_accepts_legacy_key_and_keeps_extras() {
        let question: Question = serde_json::from_value(json!({
            "question": "Define entropy",
            "type": "short",
            "hint": "thermodynamics"
        }))
        .unwrap();

        assert_eq!(question.text, "Define entropy");
        assert_eq!(question.id, "");
        assert_eq!(question.question_type.as_deref(), Some("short"));
        assert_eq!(question.extra.get("hint"), Some(&json!("thermodynamics")));

        let value = serde_json::to_value(&question).unwrap();
        assert_eq!(value["text"], "Define entropy");
        assert_eq!(value["hint"], "thermodynamics");
    }

    #[test]
    fn payload_is_tagged_by_kind() {
        let payload = AnswerPayload::Document(DocumentRef {
            file_key: "submissions/a1/1_work.pdf".into(),
            file_name: "work.pdf".into(),
            content_type: "application/pdf".into(),
            size_bytes: 42,
        });
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["kind"], "document");
        assert_eq!(value["file_name"], "work.pdf");
        assert_eq!(payload.kind(), AnswerKind::Document);

        let structured: AnswerPayload =
            serde_json::from_value(json!({"kind": "structured", "answers": {"q1": "42"}})).unwrap();
        assert_eq!(structured.kind(), AnswerKind::Structured);
    }
}
