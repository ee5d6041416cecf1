//! Answer type system.
//!
//! The variant set is closed: every [`QuestionType`] maps to exactly one
//! [`AnswerKind`], and a submission is decoded by matching on that kind.
//! Each variant serializes as `{"value": ...}` (files additionally carry
//! `file_size` and `file_format`), which is also the payload persisted by the
//! store and decoded again at read time.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{SurveyError, SurveyResult};
use crate::question::{Question, QuestionType};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Discriminant of [`Answer`], resolved from a question's type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnswerKind {
    SingleOption,
    MultiOption,
    Text,
    Date,
    Number,
    Bool,
    Email,
    File,
}

impl AnswerKind {
    pub fn for_question_type(kind: QuestionType) -> Self {
        match kind {
            QuestionType::SingleChoice => AnswerKind::SingleOption,
            QuestionType::MultipleChoice | QuestionType::Ranking => AnswerKind::MultiOption,
            QuestionType::ShortText | QuestionType::LongText => AnswerKind::Text,
            QuestionType::Date => AnswerKind::Date,
            QuestionType::Rating => AnswerKind::Number,
            QuestionType::YesNo => AnswerKind::Bool,
            QuestionType::Email => AnswerKind::Email,
            QuestionType::File => AnswerKind::File,
        }
    }

    /// Zero value of the variant.
    pub fn empty(&self) -> Answer {
        match self {
            AnswerKind::SingleOption => Answer::SingleOption(SingleOptionAnswer::default()),
            AnswerKind::MultiOption => Answer::MultiOption(MultiOptionAnswer::default()),
            AnswerKind::Text => Answer::Text(TextAnswer::default()),
            AnswerKind::Date => Answer::Date(DateAnswer::default()),
            AnswerKind::Number => Answer::Number(NumberAnswer::default()),
            AnswerKind::Bool => Answer::Bool(BoolAnswer::default()),
            AnswerKind::Email => Answer::Email(EmailAnswer::default()),
            AnswerKind::File => Answer::File(FileAnswer::default()),
        }
    }

    /// Decodes a raw JSON payload into this variant.
    pub fn decode(&self, raw: &[u8]) -> Result<Answer, serde_json::Error> {
        Ok(match self {
            AnswerKind::SingleOption => Answer::SingleOption(serde_json::from_slice(raw)?),
            AnswerKind::MultiOption => Answer::MultiOption(serde_json::from_slice(raw)?),
            AnswerKind::Text => Answer::Text(serde_json::from_slice(raw)?),
            AnswerKind::Date => Answer::Date(serde_json::from_slice(raw)?),
            AnswerKind::Number => Answer::Number(serde_json::from_slice(raw)?),
            AnswerKind::Bool => Answer::Bool(serde_json::from_slice(raw)?),
            AnswerKind::Email => Answer::Email(serde_json::from_slice(raw)?),
            AnswerKind::File => Answer::File(serde_json::from_slice(raw)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Answer {
    SingleOption(SingleOptionAnswer),
    MultiOption(MultiOptionAnswer),
    Text(TextAnswer),
    Date(DateAnswer),
    Number(NumberAnswer),
    Bool(BoolAnswer),
    Email(EmailAnswer),
    File(FileAnswer),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SingleOptionAnswer {
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiOptionAnswer {
    pub value: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextAnswer {
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateAnswer {
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumberAnswer {
    pub value: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoolAnswer {
    pub value: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailAnswer {
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileAnswer {
    pub value: String,
    #[serde(default)]
    pub file_size: i64,
    #[serde(default)]
    pub file_format: String,
}

impl Answer {
    pub fn kind(&self) -> AnswerKind {
        match self {
            Answer::SingleOption(_) => AnswerKind::SingleOption,
            Answer::MultiOption(_) => AnswerKind::MultiOption,
            Answer::Text(_) => AnswerKind::Text,
            Answer::Date(_) => AnswerKind::Date,
            Answer::Number(_) => AnswerKind::Number,
            Answer::Bool(_) => AnswerKind::Bool,
            Answer::Email(_) => AnswerKind::Email,
            Answer::File(_) => AnswerKind::File,
        }
    }

    /// Canonical byte encoding stored by the persistence layer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Checks the answer against the owning question's constraints. The
    /// returned message is user facing.
    pub fn validate(&self, question: &Question) -> SurveyResult<()> {
        match self {
            Answer::SingleOption(a) => a.validate(question),
            Answer::MultiOption(a) => a.validate(question),
            Answer::Text(a) => a.validate(question),
            Answer::Date(a) => a.validate(),
            Answer::Number(a) => a.validate(question),
            Answer::Bool(_) => Ok(()),
            Answer::Email(a) => a.validate(),
            Answer::File(a) => a.validate(question),
        }
    }
}

fn invalid(message: impl Into<String>) -> SurveyError {
    SurveyError::validation(message)
}

impl SingleOptionAnswer {
    fn validate(&self, question: &Question) -> SurveyResult<()> {
        if self.value.is_empty() || !question.options.contains(&self.value) {
            return Err(invalid("invalid option selected"));
        }
        Ok(())
    }
}

impl MultiOptionAnswer {
    fn validate(&self, question: &Question) -> SurveyResult<()> {
        let mut seen = HashSet::new();
        for option in &self.value {
            if option.is_empty() || !question.options.contains(option) {
                return Err(invalid("invalid option selected"));
            }
            if !seen.insert(option.as_str()) {
                return Err(invalid("duplicate option selected"));
            }
        }

        let count = self.value.len() as i64;
        if let Some(rules) = &question.validation {
            if let Some(min) = rules.min {
                if count < min {
                    return Err(invalid(format!("select at least {} options", min)));
                }
            }
            if let Some(max) = rules.max {
                if count > max {
                    return Err(invalid(format!("select at most {} options", max)));
                }
            }
        }
        Ok(())
    }
}

impl TextAnswer {
    fn validate(&self, question: &Question) -> SurveyResult<()> {
        let length = self.value.chars().count() as i64;
        if let Some(rules) = &question.validation {
            if let Some(min) = rules.min {
                if length < min {
                    return Err(invalid(format!(
                        "please write at least {} characters",
                        min
                    )));
                }
            }
            if let Some(max) = rules.max {
                if length > max {
                    return Err(invalid(format!("please write at most {} characters", max)));
                }
            }
        }
        Ok(())
    }
}

impl DateAnswer {
    fn validate(&self) -> SurveyResult<()> {
        NaiveDate::parse_from_str(&self.value, DATE_FORMAT)
            .map(|_| ())
            .map_err(|_| invalid("invalid date format, expected YYYY-MM-DD"))
    }
}

impl NumberAnswer {
    fn validate(&self, question: &Question) -> SurveyResult<()> {
        if question.kind != QuestionType::Rating {
            return Ok(());
        }
        if let Some(min) = question.min {
            if self.value < min {
                return Err(invalid(format!("value must be at least {}", min)));
            }
        }
        if let Some(max) = question.max {
            if self.value > max {
                return Err(invalid(format!("value must be at most {}", max)));
            }
        }
        Ok(())
    }
}

impl EmailAnswer {
    fn validate(&self) -> SurveyResult<()> {
        if is_valid_email(&self.value) {
            Ok(())
        } else {
            Err(invalid("invalid email address"))
        }
    }
}

impl FileAnswer {
    fn validate(&self, question: &Question) -> SurveyResult<()> {
        let rules = question
            .validation
            .as_ref()
            .ok_or_else(|| invalid("validation.maxSizeBytes is required"))?;
        let max_size = match rules.max_size() {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => return Err(invalid(format!("validation.maxSizeBytes is invalid: {}", e))),
            None => return Err(invalid("validation.maxSizeBytes is required")),
        };

        if self.file_size > max_size {
            return Err(invalid(format!(
                "file size exceeds the maximum size of {} bytes",
                max_size
            )));
        }

        if let Some(formats) = &rules.formats {
            let allowed = formats
                .iter()
                .any(|f| f.eq_ignore_ascii_case(&self.file_format));
            if !allowed {
                return Err(invalid(format!(
                    "file format is invalid: {}. Allowed formats: {}",
                    self.file_format,
                    formats.join(", ")
                )));
            }
        }
        Ok(())
    }
}

fn is_valid_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|l| !l.is_empty())
}
