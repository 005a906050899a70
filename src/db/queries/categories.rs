use sqlx::SqlitePool;
use tracing::instrument;

use crate::db::error::{StoreError, ValidationErrors};
use crate::db::models::Category;

fn validate_name(name: &str) -> Result<&str, ValidationErrors> {
    let name = name.trim();
    let mut errors = ValidationErrors::default();
    if name.is_empty() {
        errors.add("name", "this field is required");
    }
    errors.into_result().map(|_| name)
}

#[instrument(skip(pool))]
pub async fn create_category(pool: &SqlitePool, name: &str) -> Result<Category, StoreError> {
    let name = validate_name(name)?;
    let id = sqlx::query(
        r#"
INSERT INTO categories (name) VALUES (?1)
        "#,
    )
    .bind(name)
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok(Category {
        id,
        name: name.to_owned(),
    })
}

pub async fn get_category(pool: &SqlitePool, id: i64) -> Result<Option<Category>, StoreError> {
    let category = sqlx::query_as(
        r#"
SELECT id, name FROM categories WHERE categories.id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(category)
}

pub async fn get_all_categories(pool: &SqlitePool) -> Result<Vec<Category>, StoreError> {
    let categories = sqlx::query_as(
        r#"
SELECT id, name
FROM categories
ORDER BY name
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(categories)
}

/// Category called `name`, created on first sight.
#[instrument(skip(pool))]
pub async fn get_or_create_category(pool: &SqlitePool, name: &str) -> Result<Category, StoreError> {
    let name = validate_name(name)?;
    sqlx::query(
        r#"
INSERT INTO categories (name) VALUES (?1) ON CONFLICT (name) DO NOTHING
        "#,
    )
    .bind(name)
    .execute(pool)
    .await?;

    let category = sqlx::query_as(
        r#"
SELECT id, name FROM categories WHERE categories.name = ?1
        "#,
    )
    .bind(name)
    .fetch_one(pool)
    .await?;
    Ok(category)
}
