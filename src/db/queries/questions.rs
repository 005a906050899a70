use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use tracing::instrument;

use crate::db::error::StoreError;
use crate::db::models::{Answer, Category, Difficulty, NewQuestion, Question};
use crate::db::ordered_map::OrderedMap;

/// One row of the questions/answers join.
#[derive(FromRow)]
struct QuestionAnswerRow {
    question_id: i64,
    question_text: String,
    #[sqlx(try_from = "String")]
    difficulty: Difficulty,
    answer_id: i64,
    answer_text: String,
    is_correct: bool,
}

#[derive(FromRow)]
struct CategorizationRow {
    question_id: i64,
    id: i64,
    name: String,
}

/// Validates and stores a question with its choices and categories.
///
/// Everything is written in one transaction: a failure at any step (a
/// duplicate choice on the last answer, an unknown category id) leaves no
/// trace of the question.
#[instrument(skip(pool, question), fields(question = %question.text))]
pub async fn create_question(
    pool: &SqlitePool,
    question: NewQuestion,
) -> Result<Question, StoreError> {
    let question = question.validate()?;
    // dropped without commit on every early return, which rolls back
    let mut tx = pool.begin().await?;

    let id = sqlx::query(
        r#"
INSERT INTO questions (text, difficulty) VALUES (?1, ?2)
        "#,
    )
    .bind(&question.text)
    .bind(question.difficulty.as_str())
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    for category_id in &question.category_ids {
        sqlx::query(
            r#"
INSERT INTO categorization (question_id, category_id) VALUES (?1, ?2)
            "#,
        )
        .bind(id)
        .bind(*category_id)
        .execute(&mut *tx)
        .await?;
    }

    let mut answers = Vec::with_capacity(question.choices.len());
    for choice in question.choices {
        let answer_id = sqlx::query(
            r#"
INSERT INTO answers (text, is_correct, question_id) VALUES (?1, ?2, ?3)
            "#,
        )
        .bind(&choice.text)
        .bind(choice.is_correct)
        .bind(id)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        answers.push(Answer {
            id: answer_id,
            question_id: id,
            text: choice.text,
            is_correct: choice.is_correct,
        });
    }

    let categories = if question.category_ids.is_empty() {
        vec![]
    } else {
        get_question_categories(&mut *tx, id).await?
    };

    tx.commit().await?;
    tracing::info!(id, answers = answers.len(), "Question created");

    Ok(Question {
        id,
        text: question.text,
        difficulty: question.difficulty,
        answers,
        categories,
    })
}

/// Question with its answers in insertion order, or `None` when no answers
/// exist for `id`.
#[instrument(skip(pool))]
pub async fn get_question(pool: &SqlitePool, id: i64) -> Result<Option<Question>, StoreError> {
    let rows: Vec<QuestionAnswerRow> = sqlx::query_as(
        r#"
SELECT questions.id AS question_id, questions.text AS question_text, questions.difficulty,
       answers.id AS answer_id, answers.text AS answer_text, answers.is_correct
FROM questions
JOIN answers ON answers.question_id = questions.id
WHERE questions.id = ?1
ORDER BY answers.id
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let Some(mut question) = group_rows(rows).into_values().pop() else {
        return Ok(None);
    };
    question.categories = get_question_categories(pool, id).await?;
    Ok(Some(question))
}

/// Every question with its answers and categories, in id order.
///
/// Two queries regardless of the size of the bank: the question/answer join
/// and the categorization join.
#[instrument(skip(pool))]
pub async fn get_all_questions(pool: &SqlitePool) -> Result<Vec<Question>, StoreError> {
    let rows: Vec<QuestionAnswerRow> = sqlx::query_as(
        r#"
SELECT questions.id AS question_id, questions.text AS question_text, questions.difficulty,
       answers.id AS answer_id, answers.text AS answer_text, answers.is_correct
FROM questions
JOIN answers ON answers.question_id = questions.id
ORDER BY questions.id, answers.id
        "#,
    )
    .fetch_all(pool)
    .await?;
    let mut questions = group_rows(rows);

    let categorization: Vec<CategorizationRow> = sqlx::query_as(
        r#"
SELECT categorization.question_id, categories.id, categories.name
FROM categorization
JOIN categories ON categories.id = categorization.category_id
ORDER BY categories.name
        "#,
    )
    .fetch_all(pool)
    .await?;
    for row in categorization {
        if let Some(question) = questions.get_mut(&row.question_id) {
            question.categories.push(Category {
                id: row.id,
                name: row.name,
            });
        }
    }

    Ok(questions.into_values())
}

pub async fn get_question_id_by_text(
    pool: &SqlitePool,
    text: &str,
) -> Result<Option<i64>, StoreError> {
    let id = sqlx::query_scalar(
        r#"
SELECT id FROM questions WHERE text = ?1
        "#,
    )
    .bind(text.trim())
    .fetch_optional(pool)
    .await?;
    Ok(id)
}

/// Deletes a question; its answers and categorization rows go with it.
#[instrument(skip(pool))]
pub async fn delete_question(pool: &SqlitePool, id: i64) -> Result<bool, StoreError> {
    let deleted = sqlx::query(
        r#"
DELETE FROM questions WHERE questions.id = ?1
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(deleted > 0)
}

async fn get_question_categories<'e, E>(executor: E, id: i64) -> Result<Vec<Category>, StoreError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let categories = sqlx::query_as(
        r#"
SELECT categories.id, categories.name
FROM categories
JOIN categorization ON categorization.category_id = categories.id
WHERE categorization.question_id = ?1
ORDER BY categories.name
        "#,
    )
    .bind(id)
    .fetch_all(executor)
    .await?;
    Ok(categories)
}

/// Folds join rows into questions keyed by id, keeping the order in which
/// each question first appears.
fn group_rows(rows: Vec<QuestionAnswerRow>) -> OrderedMap<i64, Question> {
    let mut questions: OrderedMap<i64, Question> = OrderedMap::new();
    for row in rows {
        let answer = Answer {
            id: row.answer_id,
            question_id: row.question_id,
            text: row.answer_text,
            is_correct: row.is_correct,
        };
        match questions.get_mut(&row.question_id) {
            Some(question) => question.answers.push(answer),
            None => {
                questions.insert(
                    row.question_id,
                    Question {
                        id: row.question_id,
                        text: row.question_text,
                        difficulty: row.difficulty,
                        answers: vec![answer],
                        categories: vec![],
                    },
                );
            }
        }
    }
    questions
}
