use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Field-level reasons for rejecting input before it reaches storage.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: BTreeMap<&'static str, Vec<String>>,
}

impl ValidationErrors {
    pub fn add(&mut self, field: &'static str, reason: impl Into<String>) {
        self.fields.entry(field).or_default().push(reason.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.fields.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &[String])> {
        self.fields.iter().map(|(f, r)| (*f, r.as_slice()))
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, reasons) in self.fields() {
            for reason in reasons {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {reason}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationErrors),
    #[error("this question already exists")]
    DuplicateQuestion,
    #[error("choices must be unique per question")]
    DuplicateChoice,
    #[error("this category already exists")]
    DuplicateCategory,
    #[error("this username is already taken")]
    DuplicateUser,
    #[error("session token is already in use")]
    TokenCollision,
    #[error("session expiry is out of range")]
    ExpiryOutOfRange,
    #[error(transparent)]
    Database(sqlx::Error),
}

// Constraint names never leave this module: the repositories only ever see
// the semantic variants above.
impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        classify(&error).unwrap_or(StoreError::Database(error))
    }
}

fn classify(error: &sqlx::Error) -> Option<StoreError> {
    match unique_violation_table(error)? {
        "questions" => Some(StoreError::DuplicateQuestion),
        "answers" => Some(StoreError::DuplicateChoice),
        "categories" => Some(StoreError::DuplicateCategory),
        "users" => Some(StoreError::DuplicateUser),
        "sessions" => Some(StoreError::TokenCollision),
        _ => None,
    }
}

/// SQLite reports `UNIQUE constraint failed: <table>.<column>[, ...]`.
fn unique_violation_table(error: &sqlx::Error) -> Option<&str> {
    let db_error = error.as_database_error()?;
    if !db_error.is_unique_violation() {
        return None;
    }
    let columns = db_error
        .message()
        .strip_prefix("UNIQUE constraint failed: ")?;
    columns.split_once('.').map(|(table, _)| table.trim())
}
