use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::api::validation::{validate_payload, validate_username};
use crate::core::security;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::User;
use crate::repositories;
use crate::schemas::auth::{LoginRequest, RegisterRequest, TokenResponse};
use crate::schemas::user::UserResponse;

/// Max attempts per window for auth endpoints (register/login).
const AUTH_RATE_LIMIT: u64 = 10;
/// Rate limit window in seconds.
const AUTH_RATE_WINDOW_SECONDS: u64 = 60;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
}

async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    let username = payload.username.trim();
    let email = payload.email.trim().to_ascii_lowercase();
    validate_username(username)?;
    validate_payload(&payload)?;

    enforce_rate_limit(&state, "register", username, "Too many registration attempts, try again later")
        .await?;

    let taken = repositories::users::exists_by_username_or_email(state.db(), username, &email)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check existing user"))?;
    if taken {
        return Err(ApiError::Conflict("Username or email already registered".to_string()));
    }

    let hashed_password = security::hash_password(&payload.password)
        .map_err(|e| ApiError::internal(e, "Failed to hash password"))?;

    let user = repositories::users::create(
        state.db(),
        repositories::users::CreateUser {
            id: &Uuid::new_v4().to_string(),
            username,
            email: &email,
            hashed_password,
            role: payload.role,
            created_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ApiError::Conflict("Username or email already registered".to_string())
        }
        _ => ApiError::internal(e, "Failed to create user"),
    })?;

    tracing::info!(user_id = %user.id, role = user.role.as_str(), "User registered");

    Ok((StatusCode::CREATED, Json(issue_token(&state, user)?)))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let login = payload.username.trim();
    if login.is_empty() {
        return Err(ApiError::BadRequest("Username is required".to_string()));
    }

    enforce_rate_limit(&state, "login", login, "Too many login attempts, try again later").await?;

    let user = repositories::users::find_by_login(state.db(), login)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load user"))?
        .ok_or(ApiError::Unauthorized("Incorrect username or password"))?;

    let verified = security::verify_password(&payload.password, &user.hashed_password)
        .map_err(|_| ApiError::Unauthorized("Incorrect username or password"))?;
    if !verified {
        return Err(ApiError::Unauthorized("Incorrect username or password"));
    }

    let now = primitive_now_utc();
    repositories::users::touch_last_login(state.db(), &user.id, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to record login"))?;
    let user = User { last_login_at: Some(now), ..user };

    Ok(Json(issue_token(&state, user)?))
}

async fn me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(UserResponse::from_db(user))
}

async fn enforce_rate_limit(
    state: &AppState,
    action: &str,
    subject: &str,
    message: &'static str,
) -> Result<(), ApiError> {
    let rate_key = format!("rl:{action}:{subject}");
    let allowed = state
        .redis()
        .rate_limit(&rate_key, AUTH_RATE_LIMIT, AUTH_RATE_WINDOW_SECONDS)
        .await
        .unwrap_or(true);
    if allowed {
        Ok(())
    } else {
        Err(ApiError::TooManyRequests(message))
    }
}

fn issue_token(state: &AppState, user: User) -> Result<TokenResponse, ApiError> {
    let token = security::create_access_token(&user.id, user.role.as_str(), state.settings(), None)
        .map_err(|e| ApiError::internal(e, "Failed to create access token"))?;

    Ok(TokenResponse {
        access_token: token,
        token_type: "bearer".to_string(),
        user: UserResponse::from_db(user),
    })
}
