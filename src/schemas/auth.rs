use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::types::UserRole;
use crate::schemas::user::UserResponse;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct RegisterRequest {
    pub(crate) username: String,
    #[validate(email(message = "Invalid email address"))]
    pub(crate) email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters long"))]
    pub(crate) password: String,
    pub(crate) role: UserRole,
}

/// `username` accepts either the username or the email address.
#[derive(Debug, Deserialize)]
pub(crate) struct LoginRequest {
    #[serde(alias = "email")]
    pub(crate) username: String,
    pub(crate) password: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: String,
    pub(crate) token_type: String,
    pub(crate) user: UserResponse,
}
