//! Error taxonomy shared by the core engines.
//!
//! Every fallible core operation returns [`SurveyError`]. The HTTP layer maps
//! each variant onto a status code; the sync engine collects [`SurveyError::Parse`]
//! per survey instead of propagating it.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SurveyError {
    /// Bad input shape or values. `details` carries the reason when the
    /// primary message is deliberately generic (e.g. "invalid answer").
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<String>,
    },

    #[error("{0}")]
    NotFound(String),

    /// Duplicate-protection violation.
    #[error("{0}")]
    Conflict(String),

    /// Storage failure. The message is generic; the cause is logged where it
    /// happened.
    #[error("{0}")]
    Persistence(String),

    #[error("{name}: {message}")]
    Parse { name: String, message: String },
}

impl SurveyError {
    pub fn validation(message: impl Into<String>) -> Self {
        SurveyError::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        SurveyError::Validation {
            message: message.into(),
            details: Some(details.into()),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        SurveyError::NotFound(message.into())
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        SurveyError::Persistence(message.into())
    }

    pub fn details(&self) -> Option<&str> {
        match self {
            SurveyError::Validation { details, .. } => details.as_deref(),
            _ => None,
        }
    }
}

pub type SurveyResult<T> = std::result::Result<T, SurveyError>;
