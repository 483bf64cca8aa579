use serde::Serialize;

use crate::core::time::format_primitive;
use crate::db::models::User;
use crate::db::types::UserRole;

#[derive(Debug, Serialize)]
pub(crate) struct UserResponse {
    pub(crate) id: String,
    pub(crate) username: String,
    pub(crate) email: String,
    pub(crate) role: UserRole,
    pub(crate) created_at: String,
    pub(crate) last_login_at: Option<String>,
}

impl UserResponse {
    pub(crate) fn from_db(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            created_at: format_primitive(user.created_at),
            last_login_at: user.last_login_at.map(format_primitive),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn response_hides_password_hash() {
        let user = User {
            id: "u1".into(),
            username: "stu1".into(),
            email: "stu1@school.test".into(),
            hashed_password: "$argon2id$secret".into(),
            role: UserRole::Student,
            created_at: datetime!(2025-03-04 07:08:09),
            last_login_at: None,
        };

        let value = serde_json::to_value(UserResponse::from_db(user)).unwrap();
        assert_eq!(value["created_at"], "2025-03-04T07:08:09Z");
        assert_eq!(value["role"], "student");
        assert!(value.get("hashed_password").is_none());
        assert!(value["last_login_at"].is_null());
    }
}
