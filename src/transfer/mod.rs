//! CSV import and export of the question bank.
//!
//! One row per question:
//! `category,difficulty,question,correct_answer,incorrect_answers`, where
//! `incorrect_answers` is a JSON array. Only the first category of a question
//! is exported.

mod deserializers;

use std::fs::{create_dir_all, File};
use std::io;
use std::path::Path;

use itertools::Itertools;
use rand::seq::SliceRandom;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::db::queries::categories::get_or_create_category;
use crate::db::queries::questions::{create_question, get_all_questions, get_question_id_by_text};
use crate::db::{NewChoice, NewQuestion, Question, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub difficulty: String,
    pub question: String,
    pub correct_answer: String,
    #[serde(default, with = "deserializers::json_list")]
    pub incorrect_answers: Vec<String>,
}

impl From<&Question> for QuestionRecord {
    fn from(question: &Question) -> Self {
        QuestionRecord {
            category: question
                .categories
                .first()
                .map(|c| c.name.clone())
                .unwrap_or_default(),
            difficulty: question.difficulty.to_string(),
            question: question.text.clone(),
            correct_answer: question
                .correct_answer()
                .map(|a| a.text.clone())
                .unwrap_or_default(),
            incorrect_answers: question
                .answers
                .iter()
                .filter(|a| !a.is_correct)
                .map(|a| a.text.clone())
                .collect(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("cannot access file: {0}")]
    Io(#[from] io::Error),
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub fn write_to<W: io::Write, T: Serialize>(
    writer: W,
    data: impl IntoIterator<Item = T>,
) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    for line in data {
        wtr.serialize(line)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn read_from<T: DeserializeOwned, R: io::Read>(reader: R) -> Result<Vec<T>, csv::Error> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut out = Vec::new();
    for record in rdr.deserialize() {
        let record: T = record?;
        out.push(record);
    }
    Ok(out)
}

/// Writes every question to `path`, returning how many were written.
pub async fn export_questions(pool: &SqlitePool, path: &Path) -> Result<usize, TransferError> {
    let questions = get_all_questions(pool).await?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            create_dir_all(dir)?;
        }
    }
    write_to(File::create(path)?, questions.iter().map(QuestionRecord::from))?;
    tracing::info!(count = questions.len(), path = %path.display(), "Questions exported");
    Ok(questions.len())
}

pub async fn import_file(pool: &SqlitePool, path: &Path) -> Result<ImportSummary, TransferError> {
    let records: Vec<QuestionRecord> = read_from(File::open(path)?)?;
    Ok(import_questions(pool, records).await?)
}

/// Stores each record as a question.
///
/// Records whose text is already in the bank, or that are rejected as invalid
/// or conflicting, are skipped; storage failures abort the import. Unseen
/// category names are created once a record has passed validation. The correct answer lands at a
/// random position among the choices.
pub async fn import_questions(
    pool: &SqlitePool,
    records: Vec<QuestionRecord>,
) -> Result<ImportSummary, StoreError> {
    let mut summary = ImportSummary::default();
    for record in records {
        if get_question_id_by_text(pool, &record.question).await?.is_some() {
            tracing::debug!(question = %record.question, "Already in the bank");
            summary.skipped += 1;
            continue;
        }

        let mut choices: Vec<NewChoice> = record
            .incorrect_answers
            .into_iter()
            .map(|text| NewChoice::new(text, false))
            .collect();
        choices.push(NewChoice::new(record.correct_answer, true));
        choices.shuffle(&mut rand::rng());

        let mut question = NewQuestion {
            text: record.question,
            difficulty: record.difficulty,
            category_ids: vec![],
            choices,
        };
        // a rejected row must not leave a new, empty category behind
        let rejection = match question.validate() {
            Err(errors) => Some(StoreError::Validation(errors)),
            Ok(valid) if !valid.choices.iter().map(|c| &c.text).all_unique() => {
                Some(StoreError::DuplicateChoice)
            }
            Ok(_) => None,
        };
        if let Some(e) = rejection {
            tracing::warn!("Skipping record: {e}");
            summary.skipped += 1;
            continue;
        }
        let category = record.category.trim();
        if !category.is_empty() {
            question.category_ids = vec![get_or_create_category(pool, category).await?.id];
        }
        match create_question(pool, question).await {
            Ok(_) => summary.imported += 1,
            Err(
                e @ (StoreError::Validation(_)
                | StoreError::DuplicateQuestion
                | StoreError::DuplicateChoice),
            ) => {
                tracing::warn!("Skipping record: {e}");
                summary.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    tracing::info!(
        imported = summary.imported,
        skipped = summary.skipped,
        "Import finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::queries::categories::get_all_categories;
    use crate::db::testing;

    fn record(category: &str, question: &str, correct: &str, incorrect: &[&str]) -> QuestionRecord {
        QuestionRecord {
            category: category.to_owned(),
            difficulty: "medium".to_owned(),
            question: question.to_owned(),
            correct_answer: correct.to_owned(),
            incorrect_answers: incorrect.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn unseen_categories_are_created_once() {
        let pool = testing::pool().await;
        let summary = import_questions(
            &pool,
            vec![
                record("Science", "Largest planet?", "Jupiter", &["Mars", "Venus"]),
                record("Science", "H2O is?", "Water", &["Salt"]),
                record("", "Uncategorized?", "Yes", &["No"]),
            ],
        )
        .await
        .unwrap();
        assert_eq!(summary, ImportSummary { imported: 3, skipped: 0 });

        let categories = get_all_categories(&pool).await.unwrap();
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].name, "Science");

        let questions = get_all_questions(&pool).await.unwrap();
        assert_eq!(questions[0].answers.len(), 3);
        assert_eq!(questions[0].correct_answer().unwrap().text, "Jupiter");
        assert_eq!(questions[0].categories, categories);
        assert!(questions[2].categories.is_empty());
    }

    #[tokio::test]
    async fn existing_and_broken_records_are_skipped() {
        let pool = testing::pool().await;
        import_questions(&pool, vec![record("Art", "Mona Lisa?", "Leonardo", &["Raphael"])])
            .await
            .unwrap();

        let mut bad_difficulty = record("Art", "Starry Night?", "Van Gogh", &["Monet"]);
        bad_difficulty.difficulty = "legendary".to_owned();
        let summary = import_questions(
            &pool,
            vec![
                record("Art", "Mona Lisa?", "Leonardo", &["Raphael"]),
                record("Art", "Sunflowers?", "Van Gogh", &["Van Gogh"]),
                bad_difficulty,
                record("Art", "The Scream?", "Munch", &["Klimt"]),
            ],
        )
        .await
        .unwrap();
        assert_eq!(summary, ImportSummary { imported: 1, skipped: 3 });
        assert_eq!(get_all_questions(&pool).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn invalid_rows_create_no_categories() {
        let pool = testing::pool().await;
        let mut bad_difficulty = record("Sculpture", "The Thinker?", "Rodin", &["Bernini"]);
        bad_difficulty.difficulty = "legendary".to_owned();
        let summary = import_questions(
            &pool,
            vec![
                bad_difficulty,
                record("Opera", "Carmen?", "Bizet", &["Bizet"]),
                record("Poetry", "", "Homer", &["Virgil"]),
            ],
        )
        .await
        .unwrap();

        assert_eq!(summary, ImportSummary { imported: 0, skipped: 3 });
        assert!(get_all_categories(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn export_then_import_reproduces_the_bank() {
        let source = testing::pool().await;
        import_questions(
            &source,
            vec![
                record("Geography", "Capital of Peru?", "Lima", &["Cusco", "Quito, \"city\""]),
                record("", "Odd one out?", "7", &["2", "4"]),
            ],
        )
        .await
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export").join("questions.csv");
        assert_eq!(export_questions(&source, &path).await.unwrap(), 2);

        let target = testing::pool().await;
        let summary = import_file(&target, &path).await.unwrap();
        assert_eq!(summary, ImportSummary { imported: 2, skipped: 0 });

        let exported: Vec<QuestionRecord> = get_all_questions(&source)
            .await
            .unwrap()
            .iter()
            .map(QuestionRecord::from)
            .collect();
        let imported: Vec<QuestionRecord> = get_all_questions(&target)
            .await
            .unwrap()
            .iter()
            .map(QuestionRecord::from)
            .collect();
        assert_eq!(exported.len(), imported.len());
        for (before, after) in exported.iter().zip(&imported) {
            assert_eq!(before.question, after.question);
            assert_eq!(before.category, after.category);
            assert_eq!(before.correct_answer, after.correct_answer);
            let mut a = before.incorrect_answers.clone();
            let mut b = after.incorrect_answers.clone();
            a.sort();
            b.sort();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn blank_incorrect_answers_cell_reads_as_empty() {
        let csv = "category,difficulty,question,correct_answer,incorrect_answers\n\
                   ,easy,Only one?,Yes,\n";
        let records: Vec<QuestionRecord> = read_from(csv.as_bytes()).unwrap();
        assert_eq!(records, vec![QuestionRecord {
            category: String::new(),
            difficulty: "easy".to_owned(),
            question: "Only one?".to_owned(),
            correct_answer: "Yes".to_owned(),
            incorrect_answers: vec![],
        }]);
    }
}
