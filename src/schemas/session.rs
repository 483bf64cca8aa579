use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::services::sessions::{TeacherSession, TeacherStats};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CreateInterviewRequest {
    #[serde(default)]
    pub(crate) interview_type: Option<String>,
    #[serde(default)]
    pub(crate) difficulty: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InterviewUpdateRequest {
    #[serde(default)]
    pub(crate) conversation_entry: Option<serde_json::Value>,
    #[serde(default)]
    pub(crate) stats: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnalyzeResponseRequest {
    pub(crate) response: String,
    #[serde(default)]
    pub(crate) context: String,
    #[serde(default)]
    pub(crate) api_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnalyzeResponseResponse {
    pub(crate) analysis: String,
    pub(crate) has_corrections: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct InterviewCreatedResponse {
    pub(crate) session_id: String,
    pub(crate) message: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct TeacherSessionCreatedResponse {
    pub(crate) session_id: String,
    pub(crate) has_syllabus: bool,
    pub(crate) has_pyq: bool,
    pub(crate) message: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct TeacherSessionSummary {
    pub(crate) session_id: String,
    pub(crate) created_at: String,
    pub(crate) has_syllabus: bool,
    pub(crate) has_pyq: bool,
    pub(crate) stats: TeacherStats,
    pub(crate) generated_papers: usize,
    pub(crate) graded_answers: usize,
}

impl TeacherSessionSummary {
    pub(crate) fn from_session(session: &TeacherSession) -> Self {
        Self {
            session_id: session.id.clone(),
            created_at: session.created_at.clone(),
            has_syllabus: !session.syllabus.is_empty(),
            has_pyq: !session.pyq.is_empty(),
            stats: session.stats.clone(),
            generated_papers: session.generated_papers.len(),
            graded_answers: session.graded_answers.len(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TeachRequest {
    pub(crate) question: String,
    #[serde(default)]
    pub(crate) api_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TeachResponse {
    pub(crate) answer: String,
    pub(crate) timestamp: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeneratePaperRequest {
    #[serde(default = "default_num_questions")]
    pub(crate) num_questions: u32,
    #[serde(default = "default_difficulty")]
    pub(crate) difficulty: String,
    #[serde(default = "default_question_types")]
    pub(crate) question_types: Vec<String>,
    #[serde(default)]
    pub(crate) api_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct GeneratePaperResponse {
    pub(crate) paper_id: String,
    pub(crate) paper_content: String,
    pub(crate) timestamp: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GradeAnswerRequest {
    pub(crate) question: String,
    #[serde(alias = "answer")]
    pub(crate) student_answer: String,
    #[serde(default)]
    pub(crate) expected_answer: Option<String>,
    #[serde(default = "default_student_name")]
    pub(crate) student_name: String,
    #[serde(default)]
    pub(crate) api_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct GradeAnswerResponse {
    pub(crate) grading_id: String,
    pub(crate) score: String,
    pub(crate) feedback: String,
    pub(crate) timestamp: String,
}

fn default_num_questions() -> u32 {
    10
}

fn default_difficulty() -> String {
    "medium".to_string()
}

fn default_question_types() -> Vec<String> {
    ["short", "long", "multiple"].into_iter().map(String::from).collect()
}

fn default_student_name() -> String {
    "Anonymous".to_string()
}
