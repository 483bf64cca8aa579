use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::core::config::Settings;
use crate::core::{metrics, state::AppState, time};
use crate::db::models::{Answer, AnswerPayload, Assignment, DocumentRef};
use crate::db::types::AssignmentStatus;
use crate::repositories::{answers, assignments, papers};

const MAX_FILE_NAME_CHARS: usize = 120;

#[derive(Debug, Error)]
pub(crate) enum SubmissionError {
    #[error("assignment not found")]
    NotFound,
    #[error("{0}")]
    Validation(String),
    #[error("failed to store document: {0:#}")]
    Storage(anyhow::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub(crate) struct DocumentUpload {
    pub(crate) bytes: Vec<u8>,
    pub(crate) file_name: String,
    pub(crate) content_type: String,
}

/// Keeps ASCII alphanumerics, `.`, `-` and `_`; everything else becomes `_`.
pub(crate) fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_matches('.');

    if cleaned.is_empty() {
        return "document".to_string();
    }

    let count = cleaned.chars().count();
    if count <= MAX_FILE_NAME_CHARS {
        return cleaned.to_string();
    }
    cleaned.chars().skip(count - MAX_FILE_NAME_CHARS).collect()
}

pub(crate) fn document_key(assignment_id: &str, unix_ts: i64, file_name: &str) -> String {
    format!("submissions/{assignment_id}/{unix_ts}_{}", sanitize_file_name(file_name))
}

pub(crate) fn validate_document(upload: &DocumentUpload, settings: &Settings) -> Result<(), String> {
    if upload.bytes.is_empty() {
        return Err("Uploaded document is empty".to_string());
    }

    let max_bytes = settings.storage().max_upload_size_mb.saturating_mul(1024 * 1024);
    if upload.bytes.len() as u64 > max_bytes {
        return Err(format!(
            "Document exceeds the {} MB upload limit",
            settings.storage().max_upload_size_mb
        ));
    }

    let extension = Path::new(&upload.file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .ok_or_else(|| "Document must have a file extension".to_string())?;

    if !settings.storage().allowed_document_extensions.iter().any(|allowed| allowed == &extension) {
        return Err(format!("File extension '.{extension}' is not allowed"));
    }

    Ok(())
}

async fn owned_assignment(
    pool: &PgPool,
    assignment_id: &str,
    student_id: &str,
) -> Result<Assignment, SubmissionError> {
    assignments::find_for_student(pool, assignment_id, student_id)
        .await?
        .ok_or(SubmissionError::NotFound)
}

/// Single upsert of the answer followed by the status update, in one transaction.
async fn ingest(
    pool: &PgPool,
    assignment: &Assignment,
    payload: &AnswerPayload,
) -> Result<Answer, SubmissionError> {
    let now = time::primitive_now_utc();
    let answer_id = Uuid::new_v4().to_string();

    let mut tx = pool.begin().await?;
    let answer = answers::upsert(
        &mut *tx,
        answers::UpsertAnswer {
            id: &answer_id,
            assignment_id: &assignment.id,
            paper_id: &assignment.paper_id,
            student_id: &assignment.student_id,
            payload,
            submitted_at: now,
        },
    )
    .await?;
    assignments::set_status(&mut *tx, &assignment.id, AssignmentStatus::Submitted, now).await?;
    tx.commit().await?;

    metrics::record_submission(payload.kind().as_str());
    tracing::info!(
        answer_id = %answer.id,
        assignment_id = %assignment.id,
        kind = payload.kind().as_str(),
        revision = answer.revision,
        "Submission recorded"
    );

    Ok(answer)
}

pub(crate) async fn submit_structured(
    pool: &PgPool,
    assignment_id: &str,
    student_id: &str,
    answer_map: BTreeMap<String, serde_json::Value>,
) -> Result<Answer, SubmissionError> {
    let assignment = owned_assignment(pool, assignment_id, student_id).await?;

    if answer_map.is_empty() {
        return Err(SubmissionError::Validation("At least one answer is required".to_string()));
    }

    let paper = papers::find_by_id(pool, &assignment.paper_id)
        .await?
        .ok_or(SubmissionError::NotFound)?;
    let known: HashSet<&str> = paper.questions.0.iter().map(|q| q.id.as_str()).collect();

    let unknown: Vec<&str> =
        answer_map.keys().map(String::as_str).filter(|key| !known.contains(key)).collect();
    if !unknown.is_empty() {
        return Err(SubmissionError::Validation(format!(
            "Unknown question id(s): {}",
            unknown.join(", ")
        )));
    }

    ingest(pool, &assignment, &AnswerPayload::Structured { answers: answer_map }).await
}

/// Stores the document, then records it. Grading is the caller's decision.
pub(crate) async fn submit_document(
    state: &AppState,
    assignment_id: &str,
    student_id: &str,
    upload: &DocumentUpload,
) -> Result<Answer, SubmissionError> {
    let assignment = owned_assignment(state.db(), assignment_id, student_id).await?;
    validate_document(upload, state.settings()).map_err(SubmissionError::Validation)?;

    let key = document_key(&assignment.id, time::unix_timestamp_now(), &upload.file_name);
    let stored = state
        .files()
        .store(&upload.bytes, &key, &upload.content_type)
        .await
        .map_err(SubmissionError::Storage)?;

    tracing::debug!(key = %stored.key, sha256 = %stored.sha256, "Document stored");

    let payload = AnswerPayload::Document(DocumentRef {
        file_key: stored.key,
        file_name: upload.file_name.clone(),
        content_type: upload.content_type.clone(),
        size_bytes: stored.size_bytes,
    });

    ingest(state.db(), &assignment, &payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn sanitize_strips_paths_and_odd_characters() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("my essay (final).pdf"), "my_essay__final_.pdf");
        assert_eq!(sanitize_file_name("..."), "document");
        assert_eq!(sanitize_file_name("работа.pdf"), "______.pdf");

        let long = format!("{}.pdf", "a".repeat(200));
        let cleaned = sanitize_file_name(&long);
        assert_eq!(cleaned.chars().count(), MAX_FILE_NAME_CHARS);
        assert!(cleaned.ends_with(".pdf"));
    }

    #[test]
    fn document_key_layout() {
        assert_eq!(
            document_key("a-1", 1_700_000_000, "Work 1.pdf"),
            "submissions/a-1/1700000000_Work_1.pdf"
        );
    }

    #[test]
    fn validate_document_checks_size_and_extension() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();
        std::env::set_var("MAX_UPLOAD_SIZE_MB", "1");
        let settings = Settings::load().expect("settings");
        std::env::remove_var("MAX_UPLOAD_SIZE_MB");

        let upload = |name: &str, size: usize| DocumentUpload {
            bytes: vec![b'a'; size],
            file_name: name.to_string(),
            content_type: "application/octet-stream".to_string(),
        };

        assert!(validate_document(&upload("work.PDF", 10), &settings).is_ok());
        assert!(validate_document(&upload("notes.md", 10), &settings).is_ok());
        assert!(validate_document(&upload("work.docx", 10), &settings).is_err());
        assert!(validate_document(&upload("work", 10), &settings).is_err());
        assert!(validate_document(&upload("work.txt", 0), &settings).is_err());
        assert!(validate_document(&upload("big.pdf", 1024 * 1024 + 1), &settings).is_err());
    }
}
