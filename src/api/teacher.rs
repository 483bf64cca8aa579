use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::guards::{require_owned_answer, require_owned_paper, CurrentTeacher};
use crate::api::validation::validate_payload;
use crate::core::state::AppState;
use crate::core::time::to_primitive_utc;
use crate::db::models::AnswerPayload;
use crate::repositories;
use crate::schemas::paper::{
    CreatePaperRequest, CreatePaperResponse, GradeResponse, ManualGradeRequest,
    PaperSubmissionResponse, PaperSummaryResponse, RegradeRequest,
};
use crate::services::grading::{self, GradeCommit, GradingFailure};
use crate::services::papers::{self, NewPaper};
use crate::services::rendering;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/papers", post(create_paper).get(list_papers))
        .route("/papers/:paper_id/submissions", get(list_submissions))
        .route("/papers/:paper_id/pdf", get(download_paper))
        .route("/answers/:answer_id/grade", post(grade_answer))
        .route("/answers/:answer_id/regrade", post(regrade_answer))
}

async fn create_paper(
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<CreatePaperRequest>,
) -> Result<(StatusCode, Json<CreatePaperResponse>), ApiError> {
    let created = papers::create_with_assignments(
        state.db(),
        &teacher.id,
        NewPaper {
            title: payload.title,
            description: payload.description,
            questions: payload.questions,
            difficulty: payload.difficulty,
            deadline: payload.deadline.map(to_primitive_utc),
            student_identifiers: payload.student_identifiers,
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatePaperResponse {
            assigned_count: created.assignment_ids.len(),
            paper_id: created.paper_id,
            assignment_ids: created.assignment_ids,
            skipped: created.skipped,
            message: created.message,
        }),
    ))
}

async fn list_papers(
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<Json<Vec<PaperSummaryResponse>>, ApiError> {
    let rows = repositories::papers::list_with_stats(state.db(), &teacher.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list question papers"))?;

    Ok(Json(rows.into_iter().map(PaperSummaryResponse::from_db).collect()))
}

async fn list_submissions(
    Path(paper_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<Json<Vec<PaperSubmissionResponse>>, ApiError> {
    let paper = require_owned_paper(&state, &teacher, &paper_id).await?;

    let rows = repositories::answers::list_for_paper(state.db(), &paper.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list submissions"))?;

    Ok(Json(rows.into_iter().map(PaperSubmissionResponse::from_db).collect()))
}

async fn download_paper(
    Path(paper_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let paper = require_owned_paper(&state, &teacher, &paper_id).await?;
    pdf_response(&state, &paper.title, &rendering::paper_body(&paper.questions.0))
}

async fn grade_answer(
    Path(answer_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<ManualGradeRequest>,
) -> Result<Json<GradeResponse>, ApiError> {
    let answer = require_owned_answer(&state, &teacher, &answer_id).await?;
    validate_payload(&payload)?;
    let grade = grading::validate_grade(&payload.grade).map_err(ApiError::BadRequest)?;
    let feedback = payload.feedback.as_deref().map(str::trim).filter(|value| !value.is_empty());

    let committed = grading::commit_grade(
        state.db(),
        GradeCommit {
            answer_id: &answer.id,
            expected_revision: None,
            grade,
            feedback,
            extracted_text: None,
            graded_by: Some(&teacher.id),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to store grade"))?;

    if !committed {
        return Err(ApiError::Forbidden("Not authorized to grade this answer"));
    }

    tracing::info!(
        answer_id = %answer.id,
        assignment_id = %answer.assignment_id,
        teacher_id = %teacher.id,
        grade = %grade,
        "Answer graded manually"
    );

    Ok(Json(GradeResponse {
        answer_id: answer.id,
        graded: true,
        grade: grade.to_string(),
        feedback: feedback.map(str::to_string),
    }))
}

async fn regrade_answer(
    Path(answer_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    payload: Option<Json<RegradeRequest>>,
) -> Result<Json<GradeResponse>, ApiError> {
    let answer = require_owned_answer(&state, &teacher, &answer_id).await?;
    if !matches!(answer.payload.0, AnswerPayload::Document(_)) {
        return Err(ApiError::BadRequest("Only document answers can be auto-graded".to_string()));
    }

    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let api_key = request.api_key.map(|key| key.trim().to_string()).filter(|key| !key.is_empty());
    if api_key.is_none() && state.settings().ai().openai_api_key.is_empty() {
        return Err(ApiError::BadRequest("No generation API key available".to_string()));
    }

    let outcome = grading::auto_grade(&state, &answer, None, api_key).await.map_err(|err| match err {
        GradingFailure::Generation(err) => ApiError::BadGateway(err.to_string()),
        GradingFailure::Superseded => {
            ApiError::Conflict("Answer was resubmitted during grading".to_string())
        }
        GradingFailure::NotADocument => {
            ApiError::BadRequest("Only document answers can be auto-graded".to_string())
        }
        GradingFailure::Store(message) => ApiError::internal(message, "Failed to regrade answer"),
    })?;

    Ok(Json(GradeResponse {
        answer_id: answer.id,
        graded: true,
        grade: outcome.grade,
        feedback: Some(outcome.feedback),
    }))
}

/// Renders `body` under `title` and serves it as a PDF download.
pub(crate) fn pdf_response(state: &AppState, title: &str, body: &str) -> Result<Response, ApiError> {
    let bytes = state
        .renderer()
        .render(title, body)
        .map_err(|e| ApiError::internal(e, "Failed to render PDF"))?;

    let disposition = format!("attachment; filename=\"{}.pdf\"", attachment_name(title));
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

fn attachment_name(title: &str) -> String {
    let name: String = title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .take(80)
        .collect();
    if name.trim_matches('_').is_empty() {
        "paper".to_string()
    } else {
        name
    }
}
