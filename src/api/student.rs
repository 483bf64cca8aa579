use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::guards::{require_student_assignment, CurrentStudent};
use crate::api::teacher::pdf_response;
use crate::core::state::AppState;
use crate::repositories;
use crate::schemas::paper::PaperResponse;
use crate::schemas::submission::{
    StructuredAnswersRequest, StudentAssignmentResponse, StudentSubmissionResponse,
    SubmissionResponse, DOCUMENT_FIELDS,
};
use crate::services::grading;
use crate::services::rendering;
use crate::services::submissions::{self, DocumentUpload};

/// Room for multipart framing and the text fields around the document.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub(crate) fn router(max_upload_size_mb: u64) -> Router<AppState> {
    let body_limit = usize::try_from(max_upload_size_mb.saturating_mul(1024 * 1024))
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route("/assignments", get(list_assignments))
        .route("/assignments/:assignment_id/paper", get(view_paper))
        .route("/assignments/:assignment_id/pdf", get(download_paper))
        .route("/assignments/:assignment_id/answers", post(submit_answers))
        .route(
            "/assignments/:assignment_id/document",
            post(submit_document).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/submissions", get(list_submissions))
        .route("/submissions/:answer_id", get(view_submission))
}

async fn list_assignments(
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Json<Vec<StudentAssignmentResponse>>, ApiError> {
    let rows = repositories::assignments::list_for_student(state.db(), &student.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list assignments"))?;

    Ok(Json(rows.into_iter().map(StudentAssignmentResponse::from_db).collect()))
}

async fn view_paper(
    Path(assignment_id): Path<String>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Json<PaperResponse>, ApiError> {
    let assignment = require_student_assignment(&state, &student, &assignment_id).await?;
    let paper = load_paper(&state, &assignment.paper_id).await?;
    Ok(Json(PaperResponse::from_db(paper)))
}

async fn download_paper(
    Path(assignment_id): Path<String>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let assignment = require_student_assignment(&state, &student, &assignment_id).await?;
    let paper = load_paper(&state, &assignment.paper_id).await?;
    pdf_response(&state, &paper.title, &rendering::paper_body(&paper.questions.0))
}

async fn submit_answers(
    Path(assignment_id): Path<String>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
    Json(payload): Json<StructuredAnswersRequest>,
) -> Result<(StatusCode, Json<SubmissionResponse>), ApiError> {
    let answer =
        submissions::submit_structured(state.db(), &assignment_id, &student.id, payload.answers)
            .await?;

    Ok((StatusCode::CREATED, Json(SubmissionResponse::submitted(&answer))))
}

async fn submit_document(
    Path(assignment_id): Path<String>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SubmissionResponse>), ApiError> {
    require_student_assignment(&state, &student, &assignment_id).await?;

    let max_bytes = state.settings().storage().max_upload_size_mb.saturating_mul(1024 * 1024);
    let mut upload: Option<DocumentUpload> = None;
    let mut api_key: Option<String> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart data".to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        if DOCUMENT_FIELDS.contains(&name.as_str()) {
            let file_name = field.file_name().unwrap_or("document").to_string();
            let content_type =
                field.content_type().unwrap_or("application/octet-stream").to_string();
            let mut bytes = Vec::new();
            while let Some(chunk) = field
                .chunk()
                .await
                .map_err(|_| ApiError::BadRequest("Failed to read file".to_string()))?
            {
                if bytes.len() as u64 + chunk.len() as u64 > max_bytes {
                    return Err(ApiError::BadRequest(format!(
                        "Document exceeds the {} MB upload limit",
                        state.settings().storage().max_upload_size_mb
                    )));
                }
                bytes.extend_from_slice(&chunk);
            }
            upload = Some(DocumentUpload { bytes, file_name, content_type });
        } else if name == "api_key" {
            let text = field
                .text()
                .await
                .map_err(|_| ApiError::BadRequest("Invalid api_key field".to_string()))?;
            api_key = Some(text);
        }
    }

    let upload = upload.ok_or_else(|| ApiError::BadRequest("Document file is required".to_string()))?;
    let answer = submissions::submit_document(&state, &assignment_id, &student.id, &upload).await?;
    let response = SubmissionResponse::submitted(&answer);

    let Some(grading_key) = grading::grading_key(api_key.as_deref(), state.settings()) else {
        return Ok((StatusCode::CREATED, Json(response)));
    };

    let response = match grading::auto_grade(&state, &answer, Some(upload.bytes), grading_key).await {
        Ok(outcome) => response.with_grading(outcome.grade, outcome.feedback),
        Err(err) => response.with_grading_error(err.to_string()),
    };

    Ok((StatusCode::CREATED, Json(response)))
}

async fn list_submissions(
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Json<Vec<StudentSubmissionResponse>>, ApiError> {
    let rows = repositories::answers::list_for_student(state.db(), &student.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list submissions"))?;

    Ok(Json(rows.into_iter().map(StudentSubmissionResponse::from_db).collect()))
}

async fn view_submission(
    Path(answer_id): Path<String>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Json<StudentSubmissionResponse>, ApiError> {
    let row = repositories::answers::find_for_student(state.db(), &answer_id, &student.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load submission"))?
        .ok_or_else(|| ApiError::NotFound("Submission not found".to_string()))?;

    Ok(Json(StudentSubmissionResponse::from_db(row)))
}

async fn load_paper(
    state: &AppState,
    paper_id: &str,
) -> Result<crate::db::models::QuestionPaper, ApiError> {
    repositories::papers::find_by_id(state.db(), paper_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load question paper"))?
        .ok_or_else(|| ApiError::NotFound("Question paper not found".to_string()))
}
