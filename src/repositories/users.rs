use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::models::User;
use crate::db::types::UserRole;

pub(crate) const COLUMNS: &str =
    "id, username, email, hashed_password, role, created_at, last_login_at";

/// Minimal projection used for student resolution.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub(crate) struct IdentityRow {
    pub(crate) id: String,
    pub(crate) username: String,
    pub(crate) email: String,
    pub(crate) role: UserRole,
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Looks a user up by username first, then by email.
pub(crate) async fn find_by_login(
    executor: impl sqlx::PgExecutor<'_>,
    login: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {COLUMNS} FROM users WHERE username = $1 OR email = $1 \
         ORDER BY (username = $1) DESC LIMIT 1"
    ))
    .bind(login)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn exists_by_username_or_email(
    executor: impl sqlx::PgExecutor<'_>,
    username: &str,
    email: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1 OR email = $2)",
    )
    .bind(username)
    .bind(email)
    .fetch_one(executor)
    .await
}

/// Every user whose id, username or email equals one of `identifiers`.
pub(crate) async fn find_identities(
    executor: impl sqlx::PgExecutor<'_>,
    identifiers: &[String],
) -> Result<Vec<IdentityRow>, sqlx::Error> {
    sqlx::query_as::<_, IdentityRow>(
        "SELECT id, username, email, role FROM users \
         WHERE id = ANY($1) OR username = ANY($1) OR email = ANY($1)",
    )
    .bind(identifiers)
    .fetch_all(executor)
    .await
}

pub(crate) struct CreateUser<'a> {
    pub(crate) id: &'a str,
    pub(crate) username: &'a str,
    pub(crate) email: &'a str,
    pub(crate) hashed_password: String,
    pub(crate) role: UserRole,
    pub(crate) created_at: PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateUser<'_>,
) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (id, username, email, hashed_password, role, created_at)
         VALUES ($1,$2,$3,$4,$5,$6)
         RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.username)
    .bind(params.email)
    .bind(params.hashed_password)
    .bind(params.role)
    .bind(params.created_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn touch_last_login(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    at: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET last_login_at = $1 WHERE id = $2")
        .bind(at)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}
