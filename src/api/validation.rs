use validator::Validate;

use crate::api::errors::ApiError;

pub(crate) const MAX_USERNAME_LEN: usize = 64;

pub(crate) fn validate_payload(payload: &impl Validate) -> Result<(), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))
}

pub(crate) fn validate_username(username: &str) -> Result<(), ApiError> {
    let length = username.chars().count();
    let valid = (1..=MAX_USERNAME_LEN).contains(&length)
        && username.chars().all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "Username must be 1-{MAX_USERNAME_LEN} letters, digits, '.', '-' or '_'"
        )))
    }
}
