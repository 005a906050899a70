use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

use super::error::ValidationErrors;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

#[derive(Debug, Error)]
#[error("difficulty must be easy, medium, or hard")]
pub struct UnknownDifficulty;

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = UnknownDifficulty;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Difficulty::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or(UnknownDifficulty)
    }
}

impl TryFrom<String> for Difficulty {
    type Error = UnknownDifficulty;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Answer {
    pub id: i64,
    pub question_id: i64,
    pub text: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
    pub id: i64,
    pub text: String,
    pub difficulty: Difficulty,
    pub answers: Vec<Answer>,
    pub categories: Vec<Category>,
}

impl Question {
    pub fn correct_answer(&self) -> Option<&Answer> {
        self.answers.iter().find(|a| a.is_correct)
    }
}

/// Public view of an account. The password hash never leaves the credential
/// store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
}

/// Authenticated admin session. Owned by the session manager; `user` is a
/// read-only back-reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user: User,
    pub expiry: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewChoice {
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

impl NewChoice {
    pub fn new(text: impl Into<String>, is_correct: bool) -> Self {
        Self {
            text: text.into(),
            is_correct,
        }
    }
}

/// Question as submitted by an author, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewQuestion {
    pub text: String,
    /// Empty means medium.
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub category_ids: Vec<i64>,
    pub choices: Vec<NewChoice>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ValidQuestion {
    pub text: String,
    pub difficulty: Difficulty,
    pub category_ids: Vec<i64>,
    pub choices: Vec<NewChoice>,
}

impl NewQuestion {
    pub fn new(text: impl Into<String>, difficulty: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            difficulty: difficulty.into(),
            ..Default::default()
        }
    }

    pub fn with_categories(mut self, category_ids: impl IntoIterator<Item = i64>) -> Self {
        self.category_ids.extend(category_ids);
        self
    }

    pub fn with_choice(mut self, text: impl Into<String>, is_correct: bool) -> Self {
        self.choices.push(NewChoice::new(text, is_correct));
        self
    }

    pub(crate) fn validate(&self) -> Result<ValidQuestion, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let text = self.text.trim();
        if text.is_empty() {
            errors.add("question", "this field is required");
        }

        let difficulty = match self.difficulty.trim() {
            "" => Difficulty::default(),
            raw => raw.parse().unwrap_or_else(|e: UnknownDifficulty| {
                errors.add("difficulty", e.to_string());
                Difficulty::default()
            }),
        };

        let choices: Vec<NewChoice> = self
            .choices
            .iter()
            .map(|c| NewChoice::new(c.text.trim(), c.is_correct))
            .filter(|c| !c.text.is_empty())
            .collect();
        if choices.is_empty() {
            errors.add("choices", "at least one choice is required");
        } else if choices.iter().filter(|c| c.is_correct).count() != 1 {
            errors.add("choices", "exactly one correct choice is required");
        }

        errors.into_result()?;
        Ok(ValidQuestion {
            text: text.to_owned(),
            difficulty,
            category_ids: self.category_ids.iter().copied().unique().collect(),
            choices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arithmetic() -> NewQuestion {
        NewQuestion::new("  2+2=?  ", "")
            .with_choice("3", false)
            .with_choice(" 4 ", true)
            .with_choice("   ", false)
    }

    #[test]
    fn trims_text_and_defaults_difficulty() {
        let valid = arithmetic().with_categories([3, 1, 3]).validate().unwrap();
        assert_eq!(valid.text, "2+2=?");
        assert_eq!(valid.difficulty, Difficulty::Medium);
        assert_eq!(valid.category_ids, vec![3, 1]);
        assert_eq!(
            valid.choices,
            vec![NewChoice::new("3", false), NewChoice::new("4", true)]
        );
    }

    #[test]
    fn rejects_zero_or_many_correct_choices() {
        let none = NewQuestion::new("Capital of France?", "easy")
            .with_choice("Paris", false)
            .with_choice("Lyon", false);
        let errors = none.validate().unwrap_err();
        assert_eq!(
            errors.get("choices").unwrap(),
            ["exactly one correct choice is required"]
        );

        let two = NewQuestion::new("Capital of France?", "easy")
            .with_choice("Paris", true)
            .with_choice("Lyon", true);
        assert!(two.validate().unwrap_err().get("choices").is_some());
    }

    #[test]
    fn reports_every_invalid_field() {
        let errors = NewQuestion::new(" ", "impossible")
            .with_choice("", true)
            .validate()
            .unwrap_err();
        assert_eq!(errors.get("question").unwrap(), ["this field is required"]);
        assert_eq!(
            errors.get("difficulty").unwrap(),
            ["difficulty must be easy, medium, or hard"]
        );
        assert_eq!(
            errors.get("choices").unwrap(),
            ["at least one choice is required"]
        );
    }

    #[test]
    fn difficulty_round_trips_through_text() {
        for difficulty in Difficulty::ALL {
            assert_eq!(difficulty.as_str().parse::<Difficulty>().unwrap(), difficulty);
        }
        assert!("Hard".parse::<Difficulty>().is_err());
    }

    #[test]
    fn correct_answer_is_the_flagged_one() {
        let question = Question {
            id: 1,
            text: "2+2=?".to_owned(),
            difficulty: Difficulty::Easy,
            answers: vec![
                Answer {
                    id: 10,
                    question_id: 1,
                    text: "3".to_owned(),
                    is_correct: false,
                },
                Answer {
                    id: 11,
                    question_id: 1,
                    text: "4".to_owned(),
                    is_correct: true,
                },
            ],
            categories: vec![],
        };
        assert_eq!(question.correct_answer().map(|a| a.id), Some(11));
    }
}
