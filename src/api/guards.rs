use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::{header, request::Parts};

use crate::api::errors::ApiError;
use crate::core::{security, state::AppState};
use crate::db::models::{Answer, Assignment, QuestionPaper, User};
use crate::db::types::UserRole;
use crate::repositories;

pub(crate) struct CurrentUser(pub(crate) User);
pub(crate) struct CurrentTeacher(pub(crate) User);
pub(crate) struct CurrentStudent(pub(crate) User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let State(app_state) = State::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to access application state"))?;

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let claims = security::verify_token(token, app_state.settings())
            .map_err(|_| ApiError::Unauthorized("Invalid authentication credentials"))?;

        let user = repositories::users::find_by_id(app_state.db(), &claims.sub)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load user"))?;

        let Some(user) = user else {
            return Err(ApiError::Unauthorized("User not found"));
        };

        Ok(CurrentUser(user))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentTeacher {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;

        if user.role == UserRole::Teacher {
            Ok(CurrentTeacher(user))
        } else {
            Err(ApiError::Forbidden("Teacher access required"))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentStudent {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;

        if user.role == UserRole::Student {
            Ok(CurrentStudent(user))
        } else {
            Err(ApiError::Forbidden("Student access required"))
        }
    }
}

/// Paper authored by `teacher`. Absent and foreign papers are both refused.
pub(crate) async fn require_owned_paper(
    state: &AppState,
    teacher: &User,
    paper_id: &str,
) -> Result<QuestionPaper, ApiError> {
    repositories::papers::find_owned(state.db(), paper_id, &teacher.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load question paper"))?
        .ok_or(ApiError::Forbidden("Not authorized to access this paper"))
}

/// Answer to a paper authored by `teacher`. Absent and foreign answers are both refused.
pub(crate) async fn require_owned_answer(
    state: &AppState,
    teacher: &User,
    answer_id: &str,
) -> Result<Answer, ApiError> {
    repositories::answers::find_owned_by_teacher(state.db(), answer_id, &teacher.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load answer"))?
        .ok_or(ApiError::Forbidden("Not authorized to grade this answer"))
}

pub(crate) async fn require_student_assignment(
    state: &AppState,
    student: &User,
    assignment_id: &str,
) -> Result<Assignment, ApiError> {
    repositories::assignments::find_for_student(state.db(), assignment_id, &student.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load assignment"))?
        .ok_or_else(|| ApiError::NotFound("Assignment not found".to_string()))
}
