use itertools::Itertools;
use serde::Deserialize;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use tracing::instrument;

use crate::db::{Answer, Difficulty, OrderedMap, Question, StoreError, ValidationErrors};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct QuizFilters {
    pub count: u32,
    #[serde(default)]
    pub category: Option<i64>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
}

impl Default for QuizFilters {
    fn default() -> Self {
        Self::new(Self::DEFAULT_COUNT)
    }
}

impl QuizFilters {
    pub const DEFAULT_COUNT: u32 = 10;

    pub fn new(count: u32) -> Self {
        Self {
            count,
            category: None,
            difficulty: None,
        }
    }

    pub fn with_category(mut self, category: i64) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = Some(difficulty);
        self
    }

    /// Filters in their query-string form, where category `0` and an empty
    /// difficulty mean "any".
    pub fn from_raw(count: u32, category: i64, difficulty: &str) -> Result<Self, ValidationErrors> {
        let mut filters = Self::new(count);
        let mut errors = ValidationErrors::default();
        if category < 0 {
            errors.add("category", "invalid category");
        } else if category != 0 {
            filters.category = Some(category);
        }
        match difficulty.trim() {
            "" => {}
            raw => match raw.parse() {
                Ok(d) => filters.difficulty = Some(d),
                Err(e) => errors.add("difficulty", format!("{e}")),
            },
        }
        errors.into_result().map(|_| filters)
    }
}

#[derive(FromRow)]
struct CandidateRow {
    id: i64,
    text: String,
    #[sqlx(try_from = "String")]
    difficulty: Difficulty,
}

/// Draws up to `filters.count` matching questions in random order and
/// attaches their answers.
///
/// The database does the shuffling; the result keeps the draw order. Answers
/// are fetched in one batch and routed to their question by id. Categories
/// are not loaded.
#[instrument(skip(pool))]
pub async fn sample_questions(
    pool: &SqlitePool,
    filters: &QuizFilters,
) -> Result<Vec<Question>, StoreError> {
    if filters.count == 0 {
        return Ok(vec![]);
    }

    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT questions.id, questions.text, questions.difficulty FROM questions");
    if let Some(category) = filters.category {
        query
            .push(" JOIN categorization ON categorization.question_id = questions.id")
            .push(" WHERE categorization.category_id = ")
            .push_bind(category);
    }
    if let Some(difficulty) = filters.difficulty {
        query
            .push(if filters.category.is_some() { " AND " } else { " WHERE " })
            .push("questions.difficulty = ")
            .push_bind(difficulty.as_str());
    }
    query
        .push(" ORDER BY RANDOM() LIMIT ")
        .push_bind(i64::from(filters.count));

    let candidates: Vec<CandidateRow> = query.build_query_as().fetch_all(pool).await?;
    let mut questions = OrderedMap::with_capacity(candidates.len());
    for row in candidates {
        questions.insert(
            row.id,
            Question {
                id: row.id,
                text: row.text,
                difficulty: row.difficulty,
                answers: vec![],
                categories: vec![],
            },
        );
    }
    if questions.is_empty() {
        return Ok(vec![]);
    }

    // one JSON array parameter, so large draws stay under SQLite's bound
    // variable limit
    let ids = format!("[{}]", questions.keys().iter().join(","));
    let answers: Vec<Answer> = sqlx::query_as(
        r#"
SELECT id, question_id, text, is_correct
FROM answers
WHERE question_id IN (SELECT value FROM json_each(?1))
ORDER BY id
        "#,
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;
    for answer in answers {
        if let Some(question) = questions.get_mut(&answer.question_id) {
            question.answers.push(answer);
        }
    }

    Ok(questions.into_values())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::db::queries::categories::create_category;
    use crate::db::queries::questions::create_question;
    use crate::db::{testing, NewQuestion};

    async fn seed(pool: &SqlitePool, category: i64) -> Vec<i64> {
        let mut ids = vec![];
        for n in 0..12 {
            let difficulty = if n % 2 == 0 { "easy" } else { "hard" };
            let mut question = NewQuestion::new(format!("{n} + {n} = ?"), difficulty)
                .with_choice((n * 2).to_string(), true)
                .with_choice((n * 2 + 1).to_string(), false)
                .with_choice((n * 2 + 2).to_string(), false);
            if n < 6 {
                question = question.with_categories([category]);
            }
            ids.push(create_question(pool, question).await.unwrap().id);
        }
        ids
    }

    #[tokio::test]
    async fn answers_follow_their_own_question() {
        let pool = testing::pool().await;
        let maths = create_category(&pool, "Maths").await.unwrap();
        seed(&pool, maths.id).await;

        let quiz = sample_questions(&pool, &QuizFilters::new(5)).await.unwrap();
        assert_eq!(quiz.len(), 5);
        let distinct: HashSet<i64> = quiz.iter().map(|q| q.id).collect();
        assert_eq!(distinct.len(), 5);
        for question in &quiz {
            assert_eq!(question.answers.len(), 3);
            assert!(question.answers.iter().all(|a| a.question_id == question.id));
            assert_eq!(question.answers.iter().filter(|a| a.is_correct).count(), 1);
        }
    }

    #[tokio::test]
    async fn draw_order_is_kept() {
        let pool = testing::pool().await;
        let maths = create_category(&pool, "Maths").await.unwrap();
        let inserted = seed(&pool, maths.id).await;

        // twenty draws of the whole bank all coming back in insertion order
        // would mean the sampler re-sorted
        let mut orders = HashSet::new();
        for _ in 0..20 {
            let quiz = sample_questions(&pool, &QuizFilters::new(12)).await.unwrap();
            orders.insert(quiz.iter().map(|q| q.id).collect::<Vec<_>>());
        }
        assert!(orders.len() > 1);
        assert!(orders.iter().any(|order| *order != inserted));
    }

    #[tokio::test]
    async fn filters_narrow_the_population() {
        let pool = testing::pool().await;
        let maths = create_category(&pool, "Maths").await.unwrap();
        let ids = seed(&pool, maths.id).await;
        let in_category: HashSet<i64> = ids[..6].iter().copied().collect();

        let quiz = sample_questions(&pool, &QuizFilters::new(50).with_category(maths.id))
            .await
            .unwrap();
        assert_eq!(quiz.iter().map(|q| q.id).collect::<HashSet<_>>(), in_category);

        let quiz = sample_questions(
            &pool,
            &QuizFilters::new(50)
                .with_category(maths.id)
                .with_difficulty(Difficulty::Hard),
        )
        .await
        .unwrap();
        assert_eq!(quiz.len(), 3);
        assert!(quiz.iter().all(|q| q.difficulty == Difficulty::Hard));

        let quiz = sample_questions(&pool, &QuizFilters::new(50).with_difficulty(Difficulty::Easy))
            .await
            .unwrap();
        assert_eq!(quiz.len(), 6);
    }

    #[tokio::test]
    async fn short_or_empty_populations_are_not_errors() {
        let pool = testing::pool().await;
        assert!(sample_questions(&pool, &QuizFilters::new(5)).await.unwrap().is_empty());

        let maths = create_category(&pool, "Maths").await.unwrap();
        seed(&pool, maths.id).await;
        let quiz = sample_questions(&pool, &QuizFilters::new(5).with_difficulty(Difficulty::Medium))
            .await
            .unwrap();
        assert!(quiz.is_empty());
        assert!(sample_questions(&pool, &QuizFilters::new(0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn draws_beyond_the_bound_variable_limit() {
        let pool = testing::pool().await;
        sqlx::query(
            r#"
WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 33000)
INSERT INTO questions (text) SELECT 'question ' || i FROM n
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            r#"
INSERT INTO answers (text, is_correct, question_id) SELECT 'answer', TRUE, id FROM questions
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let quiz = sample_questions(&pool, &QuizFilters::new(40_000)).await.unwrap();
        assert_eq!(quiz.len(), 33_000);
        assert!(quiz
            .iter()
            .all(|q| q.answers.len() == 1 && q.answers[0].question_id == q.id));
    }

    #[test]
    fn raw_filters_treat_zero_and_empty_as_unconstrained() {
        assert_eq!(QuizFilters::from_raw(10, 0, "").unwrap(), QuizFilters::new(10));
        assert_eq!(
            QuizFilters::from_raw(3, 4, "hard").unwrap(),
            QuizFilters::new(3)
                .with_category(4)
                .with_difficulty(Difficulty::Hard)
        );
        let errors = QuizFilters::from_raw(3, -1, "brutal").unwrap_err();
        assert!(errors.get("category").is_some());
        assert!(errors.get("difficulty").is_some());
    }
}
