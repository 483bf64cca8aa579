use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentTeacher, CurrentUser};
use crate::api::teacher::pdf_response;
use crate::core::state::AppState;
use crate::core::time::{format_primitive, primitive_now_utc};
use crate::db::models::User;
use crate::schemas::session::{
    AnalyzeResponseRequest, AnalyzeResponseResponse, CreateInterviewRequest, GeneratePaperRequest, GeneratePaperResponse,
    GradeAnswerRequest, GradeAnswerResponse, InterviewCreatedResponse, InterviewUpdateRequest,
    TeachRequest, TeachResponse, TeacherSessionCreatedResponse, TeacherSessionSummary,
};
use crate::services::generation::GenerationRequest;
use crate::services::grading;
use crate::services::prompts;
use crate::services::sessions::{
    interview_key, load_json, save_json, teacher_key, GeneratedPaper, GradedAnswer,
    InterviewSession, TeacherSession,
};

const PAPER_PDF_TITLE: &str = "QUESTION PAPER";
const MATERIAL_FIELDS: [&str; 2] = ["syllabus", "pyq"];

#[derive(Debug, Clone, Copy)]
struct Sampling {
    temperature: f64,
    max_output_tokens: u32,
}

const TEACH: Sampling = Sampling { temperature: 0.7, max_output_tokens: 2000 };
const PAPER: Sampling = Sampling { temperature: 0.8, max_output_tokens: 3000 };
const GRADE: Sampling = Sampling { temperature: 0.5, max_output_tokens: 1500 };
const ANALYZE: Sampling = Sampling { temperature: 0.7, max_output_tokens: 800 };

trait Owned {
    fn owner_id(&self) -> &str;
}

impl Owned for InterviewSession {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

impl Owned for TeacherSession {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

pub(crate) fn router(max_upload_size_mb: u64) -> Router<AppState> {
    // Two documents per request.
    let body_limit = usize::try_from(max_upload_size_mb.saturating_mul(2 * 1024 * 1024))
        .unwrap_or(usize::MAX)
        .saturating_add(64 * 1024);

    Router::new()
        .route("/interview", post(create_interview))
        .route("/interview/:session_id", get(get_interview))
        .route("/interview/:session_id/update", post(update_interview))
        .route("/interview/:session_id/analyze", post(analyze_response))
        .route(
            "/teacher",
            post(create_teacher_session).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/teacher/:session_id", get(get_teacher_session))
        .route("/teacher/:session_id/teach", post(teach))
        .route("/teacher/:session_id/papers", post(generate_paper))
        .route("/teacher/:session_id/papers/:paper_id/pdf", get(download_generated_paper))
        .route("/teacher/:session_id/grade-answer", post(grade_answer))
}

fn session_ttl(state: &AppState) -> Duration {
    Duration::from_secs(state.settings().sessions().ttl_hours.saturating_mul(3600))
}

fn now_string() -> String {
    format_primitive(primitive_now_utc())
}

/// Loads a session owned by `user`. Foreign sessions look absent.
async fn load_owned<T: DeserializeOwned + Owned>(
    state: &AppState,
    key: &str,
    user: &User,
) -> Result<T, ApiError> {
    let session: Option<T> = load_json(state.sessions(), key).await?;
    session
        .filter(|session| session.owner_id() == user.id)
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))
}

async fn store<T: Serialize>(state: &AppState, key: &str, session: &T) -> Result<(), ApiError> {
    save_json(state.sessions(), key, session, session_ttl(state)).await?;
    Ok(())
}

/// Runs one generation. A non-blank `api_key` from the request wins over the
/// server key.
async fn generate(
    state: &AppState,
    prompt: String,
    sampling: Sampling,
    api_key: Option<String>,
) -> Result<String, ApiError> {
    let api_key = api_key.map(|key| key.trim().to_string()).filter(|key| !key.is_empty());
    state
        .generator()
        .generate(GenerationRequest {
            prompt,
            temperature: sampling.temperature,
            max_output_tokens: sampling.max_output_tokens,
            timeout: Duration::from_secs(state.settings().ai().ai_request_timeout),
            api_key,
        })
        .await
        .map_err(|err| ApiError::BadGateway(err.to_string()))
}

async fn create_interview(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    payload: Option<Json<CreateInterviewRequest>>,
) -> Result<(StatusCode, Json<InterviewCreatedResponse>), ApiError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let session = InterviewSession::new(
        Uuid::new_v4().to_string(),
        user.id.clone(),
        now_string(),
        request.interview_type,
        request.difficulty,
    );

    store(&state, &interview_key(&session.id), &session).await?;
    tracing::info!(session_id = %session.id, user_id = %user.id, "Interview session created");

    Ok((
        StatusCode::CREATED,
        Json(InterviewCreatedResponse {
            session_id: session.id,
            message: "Interview session created".to_string(),
        }),
    ))
}

async fn get_interview(
    Path(session_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<InterviewSession>, ApiError> {
    let session: InterviewSession = load_owned(&state, &interview_key(&session_id), &user).await?;
    Ok(Json(session))
}

async fn update_interview(
    Path(session_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<InterviewUpdateRequest>,
) -> Result<Json<InterviewSession>, ApiError> {
    let key = interview_key(&session_id);
    let _lock = state.session_locks().acquire(&key).await;

    let mut session: InterviewSession = load_owned(&state, &key, &user).await?;
    session.apply_update(payload.conversation_entry, payload.stats);
    store(&state, &key, &session).await?;

    Ok(Json(session))
}

async fn analyze_response(
    Path(session_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<AnalyzeResponseRequest>,
) -> Result<Json<AnalyzeResponseResponse>, ApiError> {
    let response = payload.response.trim();
    if response.is_empty() {
        return Err(ApiError::BadRequest("Response is required".to_string()));
    }

    let key = interview_key(&session_id);
    let _lock = state.session_locks().acquire(&key).await;
    let mut session: InterviewSession = load_owned(&state, &key, &user).await?;

    let prompt = prompts::interview_analysis(payload.context.trim(), response);
    let analysis = generate(&state, prompt, ANALYZE, payload.api_key).await?;
    let has_corrections = prompts::has_corrections(&analysis);

    session.record_analysis(response, &analysis, has_corrections);
    store(&state, &key, &session).await?;
    tracing::debug!(session_id = %session.id, has_corrections, "Interview response analyzed");

    Ok(Json(AnalyzeResponseResponse { analysis, has_corrections }))
}

async fn create_teacher_session(
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<TeacherSessionCreatedResponse>), ApiError> {
    let mut syllabus = String::new();
    let mut pyq = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart data".to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        if !MATERIAL_FIELDS.contains(&name.as_str()) {
            continue;
        }
        let file_name = field.file_name().unwrap_or("document.txt").to_string();
        let content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|_| ApiError::BadRequest("Failed to read file".to_string()))?;

        let text = match state.extractor().extract_text(&bytes, &file_name, &content_type).await {
            Ok(text) => text.trim().to_string(),
            Err(err) => {
                tracing::warn!(error = %err, field = %name, file = %file_name, "Material extraction failed");
                String::new()
            }
        };

        if name == "syllabus" {
            syllabus = text;
        } else {
            pyq = text;
        }
    }

    let session = TeacherSession::new(
        Uuid::new_v4().to_string(),
        teacher.id.clone(),
        now_string(),
        syllabus,
        pyq,
    );
    store(&state, &teacher_key(&session.id), &session).await?;

    tracing::info!(
        session_id = %session.id,
        teacher_id = %teacher.id,
        has_material = session.has_material(),
        "Teacher session created"
    );

    Ok((
        StatusCode::CREATED,
        Json(TeacherSessionCreatedResponse {
            has_syllabus: !session.syllabus.is_empty(),
            has_pyq: !session.pyq.is_empty(),
            session_id: session.id,
            message: "Teacher session created".to_string(),
        }),
    ))
}

async fn get_teacher_session(
    Path(session_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<Json<TeacherSessionSummary>, ApiError> {
    let session = load_teacher_session(&state, &session_id, &teacher).await?;
    Ok(Json(TeacherSessionSummary::from_session(&session)))
}

async fn load_teacher_session(
    state: &AppState,
    session_id: &str,
    teacher: &User,
) -> Result<TeacherSession, ApiError> {
    load_owned(state, &teacher_key(session_id), teacher).await
}

fn require_material(session: &TeacherSession) -> Result<(), ApiError> {
    if session.has_material() {
        Ok(())
    } else {
        Err(ApiError::BadRequest("Upload a syllabus or previous year questions first".to_string()))
    }
}

async fn teach(
    Path(session_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<TeachRequest>,
) -> Result<Json<TeachResponse>, ApiError> {
    let question = payload.question.trim();
    if question.is_empty() {
        return Err(ApiError::BadRequest("Question is required".to_string()));
    }

    let key = teacher_key(&session_id);
    let _lock = state.session_locks().acquire(&key).await;
    let mut session = load_teacher_session(&state, &session_id, &teacher).await?;
    require_material(&session)?;

    let answer = generate(
        &state,
        prompts::teach(&session.reference_material(), question),
        TEACH,
        payload.api_key,
    )
    .await?;
    session.record_exchange(question, &answer);
    store(&state, &key, &session).await?;

    Ok(Json(TeachResponse { answer, timestamp: now_string() }))
}

async fn generate_paper(
    Path(session_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<GeneratePaperRequest>,
) -> Result<(StatusCode, Json<GeneratePaperResponse>), ApiError> {
    if payload.num_questions == 0 {
        return Err(ApiError::BadRequest("num_questions must be positive".to_string()));
    }

    let key = teacher_key(&session_id);
    let _lock = state.session_locks().acquire(&key).await;
    let mut session = load_teacher_session(&state, &session_id, &teacher).await?;
    require_material(&session)?;

    let prompt = prompts::question_paper(
        &session.reference_material(),
        payload.num_questions,
        &payload.difficulty,
        &payload.question_types,
    );
    let content = generate(&state, prompt, PAPER, payload.api_key).await?;

    let paper = GeneratedPaper {
        id: Uuid::new_v4().to_string(),
        created_at: now_string(),
        content,
        num_questions: payload.num_questions,
        difficulty: payload.difficulty,
    };
    let response = GeneratePaperResponse {
        paper_id: paper.id.clone(),
        paper_content: paper.content.clone(),
        timestamp: paper.created_at.clone(),
    };
    session.record_paper(paper);
    store(&state, &key, &session).await?;

    Ok((StatusCode::CREATED, Json(response)))
}

async fn download_generated_paper(
    Path((session_id, paper_id)): Path<(String, String)>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let session = load_teacher_session(&state, &session_id, &teacher).await?;
    let paper = session
        .find_paper(&paper_id)
        .ok_or_else(|| ApiError::NotFound("Paper not found".to_string()))?;

    pdf_response(&state, PAPER_PDF_TITLE, &paper.content)
}

async fn grade_answer(
    Path(session_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<GradeAnswerRequest>,
) -> Result<Json<GradeAnswerResponse>, ApiError> {
    if payload.question.trim().is_empty() || payload.student_answer.trim().is_empty() {
        return Err(ApiError::BadRequest("Question and answer are required".to_string()));
    }

    let key = teacher_key(&session_id);
    let _lock = state.session_locks().acquire(&key).await;
    let mut session = load_teacher_session(&state, &session_id, &teacher).await?;

    let prompt = prompts::answer_grading(
        &payload.question,
        payload.expected_answer.as_deref(),
        &payload.student_answer,
    );
    let feedback = generate(&state, prompt, GRADE, payload.api_key).await?;
    let score = grading::parse_score(&feedback);

    let graded = GradedAnswer {
        id: Uuid::new_v4().to_string(),
        student_name: payload.student_name,
        question: payload.question,
        answer: payload.student_answer,
        grading: feedback,
        score,
        created_at: now_string(),
    };
    let response = GradeAnswerResponse {
        grading_id: graded.id.clone(),
        score: graded.score.clone(),
        feedback: graded.grading.clone(),
        timestamp: graded.created_at.clone(),
    };
    session.record_grade(graded);
    store(&state, &key, &session).await?;

    Ok(Json(response))
}
