//! Question model: kinds, per-question constraints and config-time checks.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::answer::AnswerKind;
use crate::error::{SurveyError, SurveyResult};

/// Declared kind of a question. Decides which [`AnswerKind`] a submission
/// decodes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    ShortText,
    LongText,
    Date,
    Rating,
    Ranking,
    YesNo,
    Email,
    File,
}

impl QuestionType {
    pub const ALL: [QuestionType; 10] = [
        QuestionType::SingleChoice,
        QuestionType::MultipleChoice,
        QuestionType::ShortText,
        QuestionType::LongText,
        QuestionType::Date,
        QuestionType::Rating,
        QuestionType::Ranking,
        QuestionType::YesNo,
        QuestionType::Email,
        QuestionType::File,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "single-choice",
            QuestionType::MultipleChoice => "multiple-choice",
            QuestionType::ShortText => "short-text",
            QuestionType::LongText => "long-text",
            QuestionType::Date => "date",
            QuestionType::Rating => "rating",
            QuestionType::Ranking => "ranking",
            QuestionType::YesNo => "yes-no",
            QuestionType::Email => "email",
            QuestionType::File => "file",
        }
    }

    /// Types whose answers must be picked from `options`.
    pub fn requires_options(&self) -> bool {
        matches!(
            self,
            QuestionType::SingleChoice | QuestionType::MultipleChoice | QuestionType::Ranking
        )
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QuestionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("questions[].type is invalid: {}", s))
    }
}

impl TryFrom<String> for QuestionType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<QuestionType> for String {
    fn from(value: QuestionType) -> Self {
        value.as_str().to_string()
    }
}

/// `questions.yaml` document root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Questions {
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(rename = "type")]
    pub kind: QuestionType,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options_from_variable: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    /// Persisted identity, assigned by the store. Never authored in YAML.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<QuestionValidation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionValidation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    /// Multiplication expression such as `"2*1024*1024"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size_bytes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formats: Option<Vec<String>>,
}

impl Question {
    pub fn new(kind: QuestionType, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            id: String::new(),
            description: String::new(),
            min: None,
            max: None,
            options_from_variable: None,
            options: Vec::new(),
            uuid: String::new(),
            validation: None,
        }
    }

    /// Maps the question kind to the answer variant it accepts.
    pub fn answer_type(&self) -> AnswerKind {
        AnswerKind::for_question_type(self.kind)
    }

    /// SHA-256 over the canonical JSON encoding of the question, hex encoded.
    /// Used to derive an ID for questions that do not declare one.
    pub fn generate_hash(&self) -> String {
        let encoded = serde_json::to_vec(self).unwrap_or_default();
        format!("{:x}", Sha256::digest(&encoded))
    }

    pub fn validate_options(&self) -> SurveyResult<()> {
        let mut unique = HashSet::new();
        for option in &self.options {
            if option.is_empty() {
                return Err(SurveyError::validation(
                    "questions[].options must not be empty",
                ));
            }
            if !unique.insert(option.as_str()) {
                return Err(SurveyError::validation(
                    "questions[].options must be unique",
                ));
            }
        }
        if unique.is_empty() {
            return Err(SurveyError::validation(
                "questions[].options must have at least one option",
            ));
        }
        Ok(())
    }

    pub fn validate_min_max(&self) -> SurveyResult<()> {
        let min = self
            .min
            .ok_or_else(|| SurveyError::validation("questions[].min is required"))?;
        let max = self
            .max
            .ok_or_else(|| SurveyError::validation("questions[].max is required"))?;
        if min < 0 {
            return Err(SurveyError::validation(
                "questions[].min must be greater than or equal to 0",
            ));
        }
        if max < 0 {
            return Err(SurveyError::validation(
                "questions[].max must be greater than or equal to 0",
            ));
        }
        if min > max {
            return Err(SurveyError::validation(
                "questions[].min must be less than or equal to questions[].max",
            ));
        }
        Ok(())
    }
}

impl QuestionValidation {
    pub fn validate(&self) -> SurveyResult<()> {
        if matches!(self.min, Some(min) if min < 0) {
            return Err(SurveyError::validation(
                "questions[].validation.min must be greater than or equal to 0",
            ));
        }
        if matches!(self.max, Some(max) if max < 0) {
            return Err(SurveyError::validation(
                "questions[].validation.max must be greater than or equal to 0",
            ));
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(SurveyError::validation(
                    "questions[].validation.min must be less than or equal to questions[].validation.max",
                ));
            }
        }
        if let Some(expr) = &self.max_size_bytes {
            eval_multiplication(expr).map_err(|e| {
                SurveyError::validation(format!(
                    "questions[].validation.maxSizeBytes is invalid: {}",
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Evaluated `max_size_bytes`, if declared and well formed.
    pub fn max_size(&self) -> Option<Result<i64, String>> {
        self.max_size_bytes.as_deref().map(eval_multiplication)
    }
}

impl Questions {
    pub fn validate(&self) -> SurveyResult<()> {
        if self.questions.is_empty() {
            return Err(SurveyError::validation(
                "at least one question is required",
            ));
        }

        let mut unique_ids = HashSet::new();
        for q in &self.questions {
            if q.label.is_empty() {
                return Err(SurveyError::validation("questions[].label is required"));
            }
            if !q.id.is_empty() && !unique_ids.insert(q.id.as_str()) {
                return Err(SurveyError::validation("questions[].id must be unique"));
            }
            if let Some(validation) = &q.validation {
                validation.validate()?;
            }
            if q.kind.requires_options() {
                q.validate_options()?;
            }
            if q.kind == QuestionType::Rating {
                q.validate_min_max()?;
            }
        }

        Ok(())
    }
}

/// Evaluates an integer product such as `"2 * 1024*1024"`.
///
/// Only non-negative integer factors joined by `*` are accepted.
pub fn eval_multiplication(expr: &str) -> Result<i64, String> {
    let mut product: i64 = 1;
    for factor in expr.split('*') {
        let factor = factor.trim();
        if factor.is_empty() {
            return Err(format!("malformed expression '{}'", expr));
        }
        let value: i64 = factor
            .parse()
            .map_err(|_| format!("'{}' is not an integer", factor))?;
        if value < 0 {
            return Err(format!("'{}' must not be negative", factor));
        }
        product = product
            .checked_mul(value)
            .ok_or_else(|| format!("expression '{}' overflows", expr))?;
    }
    Ok(product)
}
