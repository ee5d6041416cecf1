//! Storage abstraction for formwork.
//!
//! The [`Store`] trait is the single persistence port the sync and session
//! engines talk to. Adapters (SQLite, in-memory) are chosen once at startup;
//! the engines never branch on which one they hold.
//!
//! "Not found" is `Ok(None)`, never an error. Implementations must be
//! `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    DeliveryStatus, PersistedQuestion, QuestionAnswer, SessionStatus, Survey, SurveyField,
    SurveySession, SurveySessionsFilter,
};
use crate::question::Question;

/// Abstract storage backend for formwork.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create_survey`](Store::create_survey) | Insert a survey, assigning its UUID |
/// | [`update_survey`](Store::update_survey) | Overwrite a survey's parsed state |
/// | [`update_survey_delivery_status`](Store::update_survey_delivery_status) | Launch or stop a survey |
/// | [`get_surveys`](Store::get_surveys) | All surveys with session stats |
/// | [`get_survey_by_field`](Store::get_survey_by_field) | Lookup by uuid, slug or name |
/// | [`upsert_survey_questions`](Store::upsert_survey_questions) | Sync the question table to a config |
/// | [`get_survey_questions`](Store::get_survey_questions) | Persisted question identities |
/// | [`create_survey_session`](Store::create_survey_session) | Insert a session, assigning its UUID |
/// | [`update_survey_session_status`](Store::update_survey_session_status) | Move a session to a status, once |
/// | [`get_survey_session_by_ip_address`](Store::get_survey_session_by_ip_address) | Duplicate-protection lookup |
/// | [`get_survey_session`](Store::get_survey_session) | One session with its answers |
/// | [`get_survey_sessions_with_answers`](Store::get_survey_sessions_with_answers) | Filtered page plus total |
/// | [`get_survey_session_answers`](Store::get_survey_session_answers) | Raw answers of one session |
/// | [`upsert_survey_question_answer`](Store::upsert_survey_question_answer) | Insert or overwrite an answer |
/// | [`store_webhook_response`](Store::store_webhook_response) | Audit a webhook delivery |
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a survey. The store assigns `uuid` and returns the stored row.
    async fn create_survey(&self, survey: &Survey) -> Result<Survey>;

    /// Overwrite parse status, error log and config of the survey
    /// identified by `survey.uuid`. Delivery status is left alone.
    async fn update_survey(&self, survey: &Survey) -> Result<()>;

    /// Sets only the delivery status. `Ok(false)` when no such survey.
    async fn update_survey_delivery_status(
        &self,
        survey_uuid: &str,
        status: DeliveryStatus,
    ) -> Result<bool>;

    /// All surveys, newest first, with `stats` populated.
    async fn get_surveys(&self) -> Result<Vec<Survey>>;

    async fn get_survey_by_field(&self, field: SurveyField, value: &str)
        -> Result<Option<Survey>>;

    /// Insert rows for question IDs not yet persisted and delete rows whose
    /// ID is no longer in `questions`. Existing rows keep their UUID.
    async fn upsert_survey_questions(&self, survey_uuid: &str, questions: &[Question])
        -> Result<()>;

    async fn get_survey_questions(&self, survey_uuid: &str) -> Result<Vec<PersistedQuestion>>;

    /// Insert a session. The store assigns `uuid` and returns the stored row.
    async fn create_survey_session(&self, session: &SurveySession) -> Result<SurveySession>;

    /// Sets the status; moving to `completed` stamps `completed_at`.
    ///
    /// Returns `true` only for the caller that changed the status. A session
    /// already at `status` is left untouched and yields `false`.
    async fn update_survey_session_status(
        &self,
        session_uuid: &str,
        status: SessionStatus,
    ) -> Result<bool>;

    async fn get_survey_session_by_ip_address(
        &self,
        survey_uuid: &str,
        ip_addr: &str,
    ) -> Result<Option<SurveySession>>;

    /// Session with raw answers (undecoded) and latest webhook response.
    async fn get_survey_session(
        &self,
        survey_uuid: &str,
        session_uuid: &str,
    ) -> Result<Option<SurveySession>>;

    /// One page of sessions with raw answers, plus the total session count
    /// for the survey.
    async fn get_survey_sessions_with_answers(
        &self,
        survey_uuid: &str,
        filter: &SurveySessionsFilter,
    ) -> Result<(Vec<SurveySession>, i64)>;

    async fn get_survey_session_answers(
        &self,
        session_uuid: &str,
    ) -> Result<Vec<QuestionAnswer>>;

    /// Keyed by (session, question): a second write overwrites the first.
    async fn upsert_survey_question_answer(
        &self,
        session_uuid: &str,
        question_uuid: &str,
        answer_bytes: &[u8],
    ) -> Result<()>;

    async fn store_webhook_response(
        &self,
        session_uuid: &str,
        status_code: u16,
        response: &str,
    ) -> Result<()>;
}
