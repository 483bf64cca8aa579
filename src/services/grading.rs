use std::time::{Duration, Instant};

use sqlx::PgPool;
use thiserror::Error;

use crate::core::config::Settings;
use crate::core::{metrics, state::AppState, time::primitive_now_utc};
use crate::db::models::{Answer, AnswerPayload, DocumentRef, Question};
use crate::db::types::AssignmentStatus;
use crate::repositories::{answers, assignments, papers};
use crate::services::extraction::TextExtractor;
use crate::services::generation::{GenerationError, GenerationRequest, TextGenerator};
use crate::services::prompts;
use crate::services::storage::FileStore;

/// Grade recorded when the response carries no score line.
pub(crate) const MISSING_SCORE: &str = "N/A";

pub(crate) const MAX_GRADE_CHARS: usize = 64;

#[derive(Debug, Error)]
pub(crate) enum GradingFailure {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("answer was resubmitted while grading was in progress")]
    Superseded,
    #[error("answer has no document to grade")]
    NotADocument,
    #[error("grading could not be stored: {0}")]
    Store(String),
}

impl GradingFailure {
    fn outcome_label(&self) -> &'static str {
        match self {
            GradingFailure::Generation(_) => "generation_failed",
            GradingFailure::Superseded => "superseded",
            GradingFailure::NotADocument | GradingFailure::Store(_) => "store_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GradingOutcome {
    pub(crate) grade: String,
    pub(crate) feedback: String,
    pub(crate) extracted_text: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct GradingParams {
    pub(crate) temperature: f64,
    pub(crate) max_output_tokens: u32,
    pub(crate) timeout: Duration,
    pub(crate) max_submission_chars: usize,
}

impl GradingParams {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        Self {
            temperature: settings.grading().temperature,
            max_output_tokens: settings.grading().max_output_tokens,
            timeout: Duration::from_secs(settings.ai().ai_request_timeout),
            max_submission_chars: settings.grading().max_submission_chars,
        }
    }
}

/// Decides whether a document submission is auto-graded and with which key.
/// `Some(None)` means grading with the server key.
pub(crate) fn grading_key(request_key: Option<&str>, settings: &Settings) -> Option<Option<String>> {
    if let Some(key) = request_key.map(str::trim).filter(|key| !key.is_empty()) {
        return Some(Some(key.to_string()));
    }
    let ai = settings.ai();
    (ai.auto_grade_default && !ai.openai_api_key.is_empty()).then_some(None)
}

/// Text after the first `marker` up to the line break, trimmed and capped at
/// `MAX_GRADE_CHARS` characters.
fn after_marker(text: &str, marker: &str) -> Option<String> {
    let start = text.find(marker)? + marker.len();
    let rest = &text[start..];
    let line = rest.split('\n').next().unwrap_or_default().trim();
    let grade = prompts::truncate_chars(line, MAX_GRADE_CHARS).trim_end();
    (!grade.is_empty()).then(|| grade.to_string())
}

/// Overall score of a submission grading response.
pub(crate) fn parse_overall_score(text: &str) -> String {
    if text.contains("OVERALL_SCORE:") {
        return after_marker(text, "OVERALL_SCORE:").unwrap_or_else(|| MISSING_SCORE.to_string());
    }
    parse_score(text)
}

/// Score of a single-answer grading response.
pub(crate) fn parse_score(text: &str) -> String {
    after_marker(text, "SCORE:").unwrap_or_else(|| MISSING_SCORE.to_string())
}

/// Extracts, prompts and parses. Touches no persistent state.
pub(crate) async fn evaluate_document(
    generator: &dyn TextGenerator,
    extractor: &dyn TextExtractor,
    questions: &[Question],
    document: &DocumentRef,
    bytes: &[u8],
    params: GradingParams,
    api_key: Option<String>,
) -> Result<GradingOutcome, GenerationError> {
    let extracted = match extractor
        .extract_text(bytes, &document.file_name, &document.content_type)
        .await
    {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => None,
        Err(err) => {
            tracing::warn!(error = %err, file = %document.file_key, "Text extraction failed");
            None
        }
    };

    let student_text = extracted.as_deref().unwrap_or(prompts::UNEXTRACTED_SUBMISSION);
    let prompt = prompts::submission_grading(questions, student_text, params.max_submission_chars);

    let response = generator
        .generate(GenerationRequest {
            prompt,
            temperature: params.temperature,
            max_output_tokens: params.max_output_tokens,
            timeout: params.timeout,
            api_key,
        })
        .await?;

    Ok(GradingOutcome {
        grade: parse_overall_score(&response),
        feedback: response,
        extracted_text: extracted,
    })
}

pub(crate) struct GradeCommit<'a> {
    pub(crate) answer_id: &'a str,
    pub(crate) expected_revision: Option<i64>,
    pub(crate) grade: &'a str,
    pub(crate) feedback: Option<&'a str>,
    pub(crate) extracted_text: Option<&'a str>,
    pub(crate) graded_by: Option<&'a str>,
}

/// Answer update then assignment status, in one transaction. Returns `false`
/// when the answer no longer matches (missing or resubmitted).
pub(crate) async fn commit_grade(pool: &PgPool, commit: GradeCommit<'_>) -> Result<bool, sqlx::Error> {
    let now = primitive_now_utc();
    let mut tx = pool.begin().await?;

    let assignment_id = answers::commit_grade(
        &mut *tx,
        answers::CommitGrade {
            answer_id: commit.answer_id,
            expected_revision: commit.expected_revision,
            grade: commit.grade,
            feedback: commit.feedback,
            extracted_text: commit.extracted_text,
            graded_by: commit.graded_by,
            graded_at: now,
        },
    )
    .await?;

    let Some(assignment_id) = assignment_id else {
        tx.rollback().await?;
        return Ok(false);
    };

    assignments::set_status(&mut *tx, &assignment_id, AssignmentStatus::Graded, now).await?;
    tx.commit().await?;

    Ok(true)
}

/// Full automatic grading of a stored document answer. Failures leave the
/// answer and its assignment as they were.
pub(crate) async fn auto_grade(
    state: &AppState,
    answer: &Answer,
    bytes: Option<Vec<u8>>,
    api_key: Option<String>,
) -> Result<GradingOutcome, GradingFailure> {
    let timer = Instant::now();
    let result = run_auto_grade(state, answer, bytes, api_key).await;

    match &result {
        Ok(outcome) => {
            metrics::record_grading_run("graded", timer.elapsed());
            tracing::info!(
                answer_id = %answer.id,
                assignment_id = %answer.assignment_id,
                grade = %outcome.grade,
                "Answer auto-graded"
            );
        }
        Err(err) => {
            metrics::record_grading_run(err.outcome_label(), timer.elapsed());
            tracing::warn!(
                answer_id = %answer.id,
                assignment_id = %answer.assignment_id,
                error = %err,
                "Auto-grading failed; submission kept ungraded"
            );
        }
    }

    result
}

async fn run_auto_grade(
    state: &AppState,
    answer: &Answer,
    bytes: Option<Vec<u8>>,
    api_key: Option<String>,
) -> Result<GradingOutcome, GradingFailure> {
    let AnswerPayload::Document(document) = &answer.payload.0 else {
        return Err(GradingFailure::NotADocument);
    };

    let paper = papers::find_by_id(state.db(), &answer.paper_id)
        .await
        .map_err(|err| GradingFailure::Store(err.to_string()))?
        .ok_or_else(|| GradingFailure::Store(format!("paper {} not found", answer.paper_id)))?;

    let bytes = match bytes {
        Some(bytes) => bytes,
        None => read_document(state.files(), document).await?,
    };

    let outcome = evaluate_document(
        state.generator(),
        state.extractor(),
        &paper.questions.0,
        document,
        &bytes,
        GradingParams::from_settings(state.settings()),
        api_key,
    )
    .await?;

    let committed = commit_grade(
        state.db(),
        GradeCommit {
            answer_id: &answer.id,
            expected_revision: Some(answer.revision),
            grade: &outcome.grade,
            feedback: Some(&outcome.feedback),
            extracted_text: outcome.extracted_text.as_deref(),
            graded_by: None,
        },
    )
    .await
    .map_err(|err| GradingFailure::Store(err.to_string()))?;

    if committed {
        Ok(outcome)
    } else {
        Err(GradingFailure::Superseded)
    }
}

async fn read_document(files: &dyn FileStore, document: &DocumentRef) -> Result<Vec<u8>, GradingFailure> {
    files
        .read(&document.file_key)
        .await
        .map_err(|err| GradingFailure::Store(format!("{err:#}")))
}

pub(crate) fn validate_grade(grade: &str) -> Result<&str, String> {
    let grade = grade.trim();
    let length = grade.chars().count();
    if length == 0 || length > MAX_GRADE_CHARS {
        return Err(format!("Grade must be between 1 and {MAX_GRADE_CHARS} characters"));
    }
    Ok(grade)
}
