use sqlx::{FromRow, SqlitePool};
use tracing::instrument;

use crate::db::error::{StoreError, ValidationErrors};
use crate::db::models::User;

/// Stored login data. Only the credential store reads the hash.
#[derive(FromRow)]
pub struct Credential {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
}

impl From<Credential> for User {
    fn from(credential: Credential) -> Self {
        User {
            id: credential.id,
            username: credential.username,
        }
    }
}

#[instrument(skip(pool, password_hash))]
pub async fn create_user(
    pool: &SqlitePool,
    username: &str,
    password_hash: &str,
) -> Result<User, StoreError> {
    let username = username.trim();
    let mut errors = ValidationErrors::default();
    if username.is_empty() {
        errors.add("username", "this field is required");
    }
    errors.into_result()?;

    let id = sqlx::query(
        r#"
INSERT INTO users (username, password) VALUES (?1, ?2)
        "#,
    )
    .bind(username)
    .bind(password_hash)
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok(User {
        id,
        username: username.to_owned(),
    })
}

pub async fn get_credential(
    pool: &SqlitePool,
    username: &str,
) -> Result<Option<Credential>, StoreError> {
    let credential = sqlx::query_as(
        r#"
SELECT id, username, password AS password_hash FROM users WHERE users.username = ?1
        "#,
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;
    Ok(credential)
}

pub async fn get_users(pool: &SqlitePool) -> Result<Vec<User>, StoreError> {
    let users = sqlx::query_as(
        r#"
SELECT id, username FROM users ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(users)
}
