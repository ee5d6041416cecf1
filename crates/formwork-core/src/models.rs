//! Core records that flow between the parser, the reconciliation engine,
//! the session engine and the store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::answer::Answer;
use crate::error::{SurveyError, SurveyResult};
use crate::survey_config::SurveyConfig;

pub const URL_SLUG_LENGTH: usize = 12;
const URL_SLUG_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz1234567890";

/// Generates a random URL slug of [`URL_SLUG_LENGTH`] characters drawn from
/// `[a-z0-9]`.
pub fn generate_url_slug() -> String {
    let mut bytes = Vec::with_capacity(32);
    bytes.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
    bytes.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
    bytes
        .iter()
        .take(URL_SLUG_LENGTH)
        .map(|b| URL_SLUG_ALPHABET[*b as usize % URL_SLUG_ALPHABET.len()] as char)
        .collect()
}

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = SurveyError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(SurveyError::validation(format!(
                        "{} is invalid: {}",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseStatus {
    Success,
    Error,
    Deleted,
}

string_enum!(ParseStatus {
    Success => "success",
    Error => "error",
    Deleted => "deleted",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Launched,
    Stopped,
}

string_enum!(DeliveryStatus {
    Launched => "launched",
    Stopped => "stopped",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
}

string_enum!(SessionStatus {
    InProgress => "in_progress",
    Completed => "completed",
});

/// A survey as persisted: identity, lifecycle state and the last good config.
///
/// `name` is the directory name and the reconciliation key; `uuid` is only
/// assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Survey {
    pub uuid: String,
    pub created_at: DateTime<Utc>,
    pub parse_status: ParseStatus,
    pub delivery_status: DeliveryStatus,
    pub error_log: String,
    pub name: String,
    pub url_slug: String,
    pub config: Option<SurveyConfig>,
    #[serde(default)]
    pub stats: SurveyStats,
}

impl Survey {
    pub fn new(name: impl Into<String>, config: Option<SurveyConfig>) -> Self {
        Self {
            uuid: String::new(),
            created_at: Utc::now(),
            parse_status: ParseStatus::Success,
            delivery_status: DeliveryStatus::Launched,
            error_log: String::new(),
            name: name.into(),
            url_slug: String::new(),
            config,
            stats: SurveyStats::default(),
        }
    }

    /// Respondent-facing endpoints only serve surveys that parsed and are
    /// launched.
    pub fn is_live(&self) -> bool {
        self.parse_status == ParseStatus::Success
            && self.delivery_status == DeliveryStatus::Launched
            && self.config.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyStats {
    pub sessions_count_in_progress: i64,
    pub sessions_count_completed: i64,
    pub completion_rate: i64,
}

impl SurveyStats {
    pub fn new(in_progress: i64, completed: i64) -> Self {
        let total = in_progress + completed;
        let completion_rate = if total > 0 { completed * 100 / total } else { 0 };
        Self {
            sessions_count_in_progress: in_progress,
            sessions_count_completed: completed,
            completion_rate,
        }
    }
}

/// Column a survey can be looked up by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurveyField {
    Uuid,
    UrlSlug,
    Name,
}

impl SurveyField {
    pub fn column(&self) -> &'static str {
        match self {
            SurveyField::Uuid => "uuid",
            SurveyField::UrlSlug => "url_slug",
            SurveyField::Name => "name",
        }
    }

    pub fn matches(&self, survey: &Survey, value: &str) -> bool {
        match self {
            SurveyField::Uuid => survey.uuid == value,
            SurveyField::UrlSlug => survey.url_slug == value,
            SurveyField::Name => survey.name == value,
        }
    }
}

/// A config question's persisted identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedQuestion {
    pub id: String,
    pub uuid: String,
}

/// A successfully parsed survey directory, not yet reconciled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedSurvey {
    pub name: String,
    pub config: SurveyConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SurveyParseError {
    pub name: String,
    pub error: String,
}

/// Output of one parser pass over the surveys root. Both lists are sorted by
/// name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SurveysSyncResult {
    pub surveys: Vec<ParsedSurvey>,
    pub errors: Vec<SurveyParseError>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionAnswer {
    pub question_id: String,
    pub question_uuid: String,
    #[serde(skip)]
    pub answer_bytes: Vec<u8>,
    /// Decoded lazily against the owning question's type.
    pub answer: Option<Answer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookData {
    pub status_code: u16,
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurveySession {
    pub uuid: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub survey_uuid: String,
    pub ip_addr: Option<String>,
    pub question_answers: Vec<QuestionAnswer>,
    pub webhook_data: Option<WebhookData>,
}

impl SurveySession {
    pub fn new(survey_uuid: impl Into<String>, ip_addr: Option<String>) -> Self {
        Self {
            uuid: String::new(),
            created_at: Utc::now(),
            completed_at: None,
            status: SessionStatus::InProgress,
            survey_uuid: survey_uuid.into(),
            ip_addr,
            question_answers: Vec::new(),
            webhook_data: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSortBy {
    Uuid,
    CreatedAt,
    CompletedAt,
    Status,
}

string_enum!(SessionSortBy {
    Uuid => "uuid",
    CreatedAt => "created_at",
    CompletedAt => "completed_at",
    Status => "status",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

string_enum!(SortOrder {
    Asc => "asc",
    Desc => "desc",
});

/// Raw listing parameters as they arrive from a query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SurveySessionsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
}

/// Validated session listing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurveySessionsFilter {
    pub limit: i64,
    pub offset: i64,
    pub sort_by: SessionSortBy,
    pub order: SortOrder,
}

impl Default for SurveySessionsFilter {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
            sort_by: SessionSortBy::CreatedAt,
            order: SortOrder::Desc,
        }
    }
}

impl SurveySessionsFilter {
    pub fn from_query(query: &SurveySessionsQuery) -> SurveyResult<Self> {
        let defaults = Self::default();
        let limit = match query.limit {
            None | Some(0) => defaults.limit,
            Some(l) if l < 0 => {
                return Err(SurveyError::validation(format!("limit is invalid: {}", l)))
            }
            Some(l) => l,
        };
        let offset = query.offset.unwrap_or(0).max(0);
        let sort_by = match query.sort_by.as_deref() {
            None | Some("") => defaults.sort_by,
            Some(s) => s
                .parse()
                .map_err(|_| SurveyError::validation(format!("sort_by is invalid: {}", s)))?,
        };
        let order = match query.order.as_deref() {
            None | Some("") => defaults.order,
            Some(o) => o
                .parse()
                .map_err(|_| SurveyError::validation(format!("order is invalid: {}", o)))?,
        };
        Ok(Self {
            limit,
            offset,
            sort_by,
            order,
        })
    }

    pub fn pages_count(&self, total: i64) -> i64 {
        if total <= 0 {
            0
        } else {
            (total + self.limit - 1) / self.limit
        }
    }
}
