use std::collections::HashSet;

use sqlx::PgPool;
use thiserror::Error;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::models::Question;
use crate::db::types::DifficultyLevel;
use crate::repositories::{assignments, papers};
use crate::services::identifiers;

#[derive(Debug, Error)]
pub(crate) enum PaperError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub(crate) struct NewPaper {
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) questions: Vec<Question>,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) deadline: Option<PrimitiveDateTime>,
    pub(crate) student_identifiers: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct CreatedPaper {
    pub(crate) paper_id: String,
    pub(crate) assignment_ids: Vec<String>,
    pub(crate) skipped: Vec<String>,
    pub(crate) message: String,
}

/// Trims question text and fills missing ids with `q{n}`.
pub(crate) fn normalize_questions(questions: Vec<Question>) -> Result<Vec<Question>, PaperError> {
    if questions.is_empty() {
        return Err(PaperError::Validation("At least one question is required".to_string()));
    }

    let mut ids = HashSet::new();
    let mut normalized = Vec::with_capacity(questions.len());

    for (index, mut question) in questions.into_iter().enumerate() {
        let position = index + 1;
        question.text = question.text.trim().to_string();
        if question.text.is_empty() {
            return Err(PaperError::Validation(format!("Question {position} has no text")));
        }

        question.id = question.id.trim().to_string();
        if question.id.is_empty() {
            question.id = format!("q{position}");
        }
        if !ids.insert(question.id.clone()) {
            return Err(PaperError::Validation(format!(
                "Duplicate question id '{}'",
                question.id
            )));
        }

        normalized.push(question);
    }

    Ok(normalized)
}

fn summary(assigned: usize, skipped: usize) -> String {
    let mut message = format!("Paper created and assigned to {assigned} student(s)");
    if skipped > 0 {
        message.push_str(&format!("; {skipped} identifier(s) could not be resolved"));
    }
    message
}

/// Creates the paper and one pending assignment per resolved student in one
/// transaction. Unresolved identifiers are reported, never fatal.
pub(crate) async fn create_with_assignments(
    pool: &PgPool,
    teacher_id: &str,
    request: NewPaper,
) -> Result<CreatedPaper, PaperError> {
    let title = request.title.trim();
    if title.is_empty() {
        return Err(PaperError::Validation("Title is required".to_string()));
    }
    if request.student_identifiers.is_empty() {
        return Err(PaperError::Validation("At least one student identifier is required".to_string()));
    }
    let questions = normalize_questions(request.questions)?;
    let description =
        request.description.as_deref().map(str::trim).filter(|value| !value.is_empty());

    let now = primitive_now_utc();
    let paper_id = Uuid::new_v4().to_string();

    let mut tx = pool.begin().await?;
    let resolution = identifiers::resolve_students(&mut *tx, &request.student_identifiers).await?;

    papers::create(
        &mut *tx,
        papers::CreatePaper {
            id: &paper_id,
            teacher_id,
            title,
            description,
            questions: &questions,
            difficulty: request.difficulty,
            deadline: request.deadline,
            created_at: now,
        },
    )
    .await?;

    let mut assignment_ids = Vec::with_capacity(resolution.resolved.len());
    for student_id in &resolution.resolved {
        let assignment_id = Uuid::new_v4().to_string();
        assignments::create(
            &mut *tx,
            assignments::CreateAssignment {
                id: &assignment_id,
                paper_id: &paper_id,
                student_id,
                deadline: request.deadline,
                assigned_at: now,
            },
        )
        .await?;
        assignment_ids.push(assignment_id);
    }

    tx.commit().await?;

    tracing::info!(
        paper_id = %paper_id,
        teacher_id = %teacher_id,
        assigned = assignment_ids.len(),
        skipped = resolution.skipped.len(),
        "Question paper created"
    );

    Ok(CreatedPaper {
        message: summary(assignment_ids.len(), resolution.skipped.len()),
        paper_id,
        assignment_ids,
        skipped: resolution.skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn question(id: &str, text: &str) -> Question {
        Question {
            id: id.to_string(),
            text: text.to_string(),
            question_type: None,
            options: None,
            marks: None,
            extra: HashMap::new(),
        }
    }

    #[test]
    fn missing_ids_are_numbered_by_position() {
        let questions =
            normalize_questions(vec![question("", " First "), question("custom", "Second"), question("", "Third")])
                .expect("valid");
        let ids: Vec<&str> = questions.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["q1", "custom", "q3"]);
        assert_eq!(questions[0].text, "First");
    }

    #[test]
    fn empty_body_or_duplicate_id_is_rejected() {
        assert!(matches!(
            normalize_questions(vec![question("", "ok"), question("", "   ")]),
            Err(PaperError::Validation(message)) if message == "Question 2 has no text"
        ));
        assert!(normalize_questions(vec![question("q2", "a"), question("", "b")]).is_err());
        assert!(normalize_questions(Vec::new()).is_err());
    }

    #[test]
    fn summary_mentions_skips_only_when_present() {
        assert_eq!(summary(2, 0), "Paper created and assigned to 2 student(s)");
        assert_eq!(
            summary(0, 3),
            "Paper created and assigned to 0 student(s); 3 identifier(s) could not be resolved"
        );
    }
}
