use sqlx::SqlitePool;
use tracing::instrument;

use crate::db::StoreError;
use crate::telemetry::record_grade;

/// Whether `answer_id` is the correct answer to `question_id`.
///
/// `None` means the question does not exist, which is not the same as a wrong
/// answer. An answer id that belongs to another question is simply incorrect.
#[instrument(skip(pool))]
pub async fn grade(
    pool: &SqlitePool,
    question_id: i64,
    answer_id: i64,
) -> Result<Option<bool>, StoreError> {
    let correct_id: Option<i64> = sqlx::query_scalar(
        r#"
SELECT id FROM answers WHERE answers.question_id = ?1 AND answers.is_correct
        "#,
    )
    .bind(question_id)
    .fetch_optional(pool)
    .await?;

    let Some(correct_id) = correct_id else {
        return Ok(None);
    };
    let correct = correct_id == answer_id;
    record_grade(correct);
    Ok(Some(correct))
}
