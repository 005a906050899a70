use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::db::error::StoreError;
use crate::db::models::{Session, User};

#[derive(FromRow)]
struct SessionRow {
    token: String,
    expiry: DateTime<Utc>,
    user_id: i64,
    username: String,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            token: row.token,
            user: User {
                id: row.user_id,
                username: row.username,
            },
            expiry: row.expiry,
        }
    }
}

pub async fn insert_session(pool: &SqlitePool, session: &Session) -> Result<(), StoreError> {
    sqlx::query(
        r#"
INSERT INTO sessions (token, user_id, expiry) VALUES (?1, ?2, ?3)
        "#,
    )
    .bind(&session.token)
    .bind(session.user.id)
    .bind(session.expiry)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_session(pool: &SqlitePool, token: &str) -> Result<Option<Session>, StoreError> {
    let row: Option<SessionRow> = sqlx::query_as(
        r#"
SELECT sessions.token, sessions.expiry, users.id AS user_id, users.username
FROM sessions
JOIN users ON sessions.user_id = users.id
WHERE sessions.token = ?1
        "#,
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Session::from))
}

pub async fn delete_session(pool: &SqlitePool, token: &str) -> Result<bool, StoreError> {
    let deleted = sqlx::query(
        r#"
DELETE FROM sessions WHERE sessions.token = ?1
        "#,
    )
    .bind(token)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(deleted > 0)
}

/// Removes every session that expired at or before `now`.
pub async fn delete_expired_sessions(
    pool: &SqlitePool,
    now: DateTime<Utc>,
) -> Result<u64, StoreError> {
    let deleted = sqlx::query(
        r#"
DELETE FROM sessions WHERE sessions.expiry <= ?1
        "#,
    )
    .bind(now)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(deleted)
}
