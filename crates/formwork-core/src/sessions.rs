//! Respondent sessions and answer submission.
//!
//! A session moves `in_progress -> completed` exactly once. The flip happens
//! inside [`SessionEngine::submit_answer`] when every question of the
//! survey's current config has an answer; later edits never revert it.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::Span;

use crate::error::{SurveyError, SurveyResult};
use crate::models::{
    DeliveryStatus, QuestionAnswer, SessionStatus, Survey, SurveyField, SurveySession,
    SurveySessionsFilter, SurveySessionsQuery, URL_SLUG_LENGTH,
};
use crate::store::Store;
use crate::survey_config::{DuplicateProtection, SurveyConfig};

/// A page of sessions for the admin listing.
#[derive(Debug, Clone, Serialize)]
pub struct SessionsPage {
    pub data: Vec<SurveySession>,
    pub total_count: i64,
    pub pages_count: i64,
}

/// Result of a successful answer submission.
#[derive(Debug, Clone)]
pub struct SubmittedAnswer {
    pub session: SurveySession,
    /// `true` only on the submission that completed the session.
    pub completed_now: bool,
}

pub struct SessionEngine {
    store: Arc<dyn Store>,
    span: Span,
}

impl SessionEngine {
    pub fn new(store: Arc<dyn Store>, span: Span) -> Self {
        Self { store, span }
    }

    pub async fn list_surveys(&self) -> SurveyResult<Vec<Survey>> {
        self.store.get_surveys().await.map_err(|e| {
            tracing::error!(parent: &self.span, error = %e, "unable to get surveys");
            SurveyError::persistence("unable to get surveys")
        })
    }

    /// Loads a survey and attaches persisted UUIDs to its config questions.
    /// Config questions without a persisted row are dropped.
    pub async fn get_survey(&self, field: SurveyField, value: &str) -> SurveyResult<Survey> {
        let mut survey = self
            .store
            .get_survey_by_field(field, value)
            .await
            .map_err(|e| {
                tracing::error!(parent: &self.span, field = field.column(), value, error = %e, "unable to get survey");
                SurveyError::persistence("unable to get survey")
            })?
            .ok_or_else(|| SurveyError::not_found("survey not found"))?;

        let persisted = self
            .store
            .get_survey_questions(&survey.uuid)
            .await
            .map_err(|e| {
                tracing::error!(parent: &self.span, survey_uuid = %survey.uuid, error = %e, "unable to get survey questions");
                SurveyError::persistence("unable to get survey questions")
            })?;

        if let Some(questions) = survey.config.as_mut().and_then(|c| c.questions.as_mut()) {
            questions.questions.retain_mut(|q| {
                match persisted.iter().find(|p| p.id == q.id) {
                    Some(p) => {
                        q.uuid = p.uuid.clone();
                        true
                    }
                    None => false,
                }
            });
        }
        Ok(survey)
    }

    /// A survey respondents may interact with: launched and parsed.
    pub async fn get_live_survey(&self, url_slug: &str) -> SurveyResult<Survey> {
        if url_slug.len() != URL_SLUG_LENGTH {
            return Err(SurveyError::validation("url slug is invalid"));
        }
        let survey = self.get_survey(SurveyField::UrlSlug, url_slug).await?;
        if !survey.is_live() {
            return Err(SurveyError::not_found("survey not found"));
        }
        Ok(survey)
    }

    /// Launches or stops a survey. Only the delivery status is written, so
    /// a resync running at the same time keeps its config.
    pub async fn update_delivery_status(
        &self,
        survey_uuid: &str,
        status: DeliveryStatus,
    ) -> SurveyResult<Survey> {
        let updated = self
            .store
            .update_survey_delivery_status(survey_uuid, status)
            .await
            .map_err(|e| {
                tracing::error!(parent: &self.span, survey_uuid, error = %e, "unable to update survey");
                SurveyError::persistence("unable to update survey")
            })?;
        if !updated {
            return Err(SurveyError::not_found("survey not found"));
        }
        tracing::info!(parent: &self.span, survey_uuid, delivery_status = %status, "delivery status updated");
        self.get_survey(SurveyField::Uuid, survey_uuid).await
    }

    /// Starts a session. With IP duplicate protection, a second session from
    /// the same address is rejected.
    pub async fn create_session(
        &self,
        survey: &Survey,
        ip_addr: Option<&str>,
    ) -> SurveyResult<SurveySession> {
        let protection = survey
            .config
            .as_ref()
            .map(SurveyConfig::duplicate_protection)
            .unwrap_or_default();

        if let (DuplicateProtection::Ip, Some(ip)) = (protection, ip_addr) {
            let existing = self
                .store
                .get_survey_session_by_ip_address(&survey.uuid, ip)
                .await
                .map_err(|e| {
                    tracing::error!(parent: &self.span, survey_uuid = %survey.uuid, error = %e, "unable to get session by ip address");
                    SurveyError::persistence("unable to create session")
                })?;
            if existing.is_some() {
                return Err(SurveyError::Conflict(
                    "duplicate session for ip address".to_string(),
                ));
            }
        }

        let session = SurveySession::new(&survey.uuid, ip_addr.map(str::to_string));
        let stored = self
            .store
            .create_survey_session(&session)
            .await
            .map_err(|e| {
                tracing::error!(parent: &self.span, survey_uuid = %survey.uuid, error = %e, "unable to create session");
                SurveyError::persistence("unable to create session")
            })?;
        tracing::info!(parent: &self.span, survey_uuid = %survey.uuid, session_uuid = %stored.uuid, "session created");
        Ok(stored)
    }

    /// Session with answers decoded against `survey`'s questions.
    pub async fn get_session(
        &self,
        survey: &Survey,
        session_uuid: &str,
    ) -> SurveyResult<SurveySession> {
        let session = self
            .store
            .get_survey_session(&survey.uuid, session_uuid)
            .await
            .map_err(|e| {
                tracing::error!(parent: &self.span, session_uuid, error = %e, "unable to get session");
                SurveyError::persistence("unable to get session")
            })?
            .ok_or_else(|| SurveyError::not_found("session not found"))?;
        Ok(self.decode_answers(survey, session))
    }

    pub async fn get_sessions(
        &self,
        survey: &Survey,
        query: &SurveySessionsQuery,
    ) -> SurveyResult<SessionsPage> {
        let filter = SurveySessionsFilter::from_query(query)?;
        let (sessions, total) = self
            .store
            .get_survey_sessions_with_answers(&survey.uuid, &filter)
            .await
            .map_err(|e| {
                tracing::error!(parent: &self.span, survey_uuid = %survey.uuid, error = %e, "unable to get sessions");
                SurveyError::persistence("unable to get sessions")
            })?;
        Ok(SessionsPage {
            data: sessions
                .into_iter()
                .map(|s| self.decode_answers(survey, s))
                .collect(),
            total_count: total,
            pages_count: filter.pages_count(total),
        })
    }

    /// Decodes, validates and stores one answer, completing the session when
    /// every question is answered.
    pub async fn submit_answer(
        &self,
        survey: &Survey,
        session_uuid: &str,
        question_uuid: &str,
        raw: &[u8],
    ) -> SurveyResult<SubmittedAnswer> {
        let session = self.get_session(survey, session_uuid).await?;
        if session.status != SessionStatus::InProgress {
            return Err(SurveyError::validation("session is already completed"));
        }

        let config = survey
            .config
            .as_ref()
            .ok_or_else(|| SurveyError::not_found("survey not found"))?;
        let question = config.find_question_by_uuid(question_uuid)?;

        let answer = question
            .answer_type()
            .decode(raw)
            .map_err(|_| SurveyError::validation("invalid request format"))?;
        answer
            .validate(question)
            .map_err(|e| SurveyError::validation_with_details("invalid answer", e.to_string()))?;

        let bytes = answer.to_bytes().map_err(|e| {
            tracing::error!(parent: &self.span, question_uuid, error = %e, "unable to encode answer");
            SurveyError::persistence("unable to insert answer")
        })?;
        self.store
            .upsert_survey_question_answer(session_uuid, question_uuid, &bytes)
            .await
            .map_err(|e| {
                tracing::error!(parent: &self.span, session_uuid, question_uuid, error = %e, "unable to insert answer");
                SurveyError::persistence("unable to insert answer")
            })?;

        // Answers written concurrently for other questions are only visible
        // after our own write.
        let answers = self
            .store
            .get_survey_session_answers(session_uuid)
            .await
            .map_err(|e| {
                tracing::error!(parent: &self.span, session_uuid, error = %e, "unable to get answers");
                SurveyError::persistence("unable to update session status")
            })?;

        let mut completed_now = false;
        if is_session_completed(config, &answers, question_uuid) {
            completed_now = self
                .store
                .update_survey_session_status(session_uuid, SessionStatus::Completed)
                .await
                .map_err(|e| {
                    tracing::error!(parent: &self.span, session_uuid, error = %e, "unable to update session status");
                    SurveyError::persistence("unable to update session status")
                })?;
            if completed_now {
                tracing::info!(parent: &self.span, survey_uuid = %survey.uuid, session_uuid, "session completed");
            }
        }

        let session = self.get_session(survey, session_uuid).await?;
        Ok(SubmittedAnswer {
            session,
            completed_now,
        })
    }

    fn decode_answers(&self, survey: &Survey, mut session: SurveySession) -> SurveySession {
        let questions = survey.config.as_ref().map(SurveyConfig::questions).unwrap_or_default();
        for qa in session.question_answers.iter_mut() {
            let Some(question) = questions.iter().find(|q| q.uuid == qa.question_uuid) else {
                continue;
            };
            match question.answer_type().decode(&qa.answer_bytes) {
                Ok(answer) => qa.answer = Some(answer),
                Err(e) => {
                    tracing::warn!(parent: &self.span, session_uuid = %session.uuid, question_uuid = %qa.question_uuid, error = %e, "unable to decode stored answer");
                }
            }
        }
        session
    }
}

/// Every config question is either the one just answered or among the
/// stored answers.
fn is_session_completed(
    config: &SurveyConfig,
    answers: &[QuestionAnswer],
    answered_uuid: &str,
) -> bool {
    let answered: HashSet<&str> = answers
        .iter()
        .map(|qa| qa.question_uuid.as_str())
        .chain(std::iter::once(answered_uuid))
        .collect();
    config
        .questions()
        .iter()
        .all(|q| answered.contains(q.uuid.as_str()))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

    use async_trait::async_trait;
    use tokio::sync::Barrier;

    use super::*;
    use crate::answer::{Answer, TextAnswer};
    use crate::models::{ParsedSurvey, PersistedQuestion, SurveysSyncResult};
    use crate::question::{Question, QuestionType, Questions};
    use crate::store::memory::InMemoryStore;
    use crate::survey_config::Security;
    use crate::sync::SyncEngine;

    fn text_question(id: &str) -> Question {
        let mut q = Question::new(QuestionType::ShortText, id);
        q.id = id.to_string();
        q
    }

    async fn seeded(protection: DuplicateProtection) -> (SessionEngine, Survey) {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let mut rating = Question::new(QuestionType::Rating, "How much?");
        rating.id = "q3".to_string();
        rating.min = Some(1);
        rating.max = Some(5);
        let config = SurveyConfig {
            title: "Feedback".to_string(),
            questions: Some(Questions {
                questions: vec![text_question("q1"), text_question("q2"), rating],
            }),
            security: Some(Security {
                duplicate_protection: protection,
            }),
            ..Default::default()
        };
        SyncEngine::new(store.clone(), Span::none())
            .sync(&SurveysSyncResult {
                surveys: vec![ParsedSurvey {
                    name: "feedback".to_string(),
                    config,
                }],
                errors: vec![],
            })
            .await
            .unwrap();

        let engine = SessionEngine::new(store, Span::none());
        let survey = engine
            .get_survey(SurveyField::Name, "feedback")
            .await
            .unwrap();
        (engine, survey)
    }

    fn uuid_of<'a>(survey: &'a Survey, id: &str) -> &'a str {
        survey
            .config
            .as_ref()
            .unwrap()
            .questions()
            .iter()
            .find(|q| q.id == id)
            .unwrap()
            .uuid
            .as_str()
    }

    #[tokio::test]
    async fn test_get_survey_attaches_question_uuids() {
        let (engine, survey) = seeded(DuplicateProtection::Cookie).await;
        let questions = survey.config.as_ref().unwrap().questions();
        assert_eq!(questions.len(), 3);
        assert!(questions.iter().all(|q| !q.uuid.is_empty()));

        let live = engine.get_live_survey(&survey.url_slug).await.unwrap();
        assert_eq!(live.uuid, survey.uuid);
        assert!(matches!(
            engine.get_live_survey("short").await,
            Err(SurveyError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_completion_is_irreversible() {
        let (engine, survey) = seeded(DuplicateProtection::Cookie).await;
        let session = engine.create_session(&survey, None).await.unwrap();

        let r = engine
            .submit_answer(&survey, &session.uuid, uuid_of(&survey, "q1"), br#"{"value":"a"}"#)
            .await
            .unwrap();
        assert_eq!(r.session.status, SessionStatus::InProgress);
        let r = engine
            .submit_answer(&survey, &session.uuid, uuid_of(&survey, "q2"), br#"{"value":"b"}"#)
            .await
            .unwrap();
        assert_eq!(r.session.status, SessionStatus::InProgress);
        assert!(!r.completed_now);

        let r = engine
            .submit_answer(&survey, &session.uuid, uuid_of(&survey, "q3"), br#"{"value":4}"#)
            .await
            .unwrap();
        assert!(r.completed_now);
        assert_eq!(r.session.status, SessionStatus::Completed);
        assert!(r.session.completed_at.is_some());
        assert_eq!(r.session.question_answers.len(), 3);

        let err = engine
            .submit_answer(&survey, &session.uuid, uuid_of(&survey, "q1"), br#"{"value":"edit"}"#)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "session is already completed");
        let reloaded = engine.get_session(&survey, &session.uuid).await.unwrap();
        assert_eq!(reloaded.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_resubmission_overwrites_and_decodes() {
        let (engine, survey) = seeded(DuplicateProtection::Cookie).await;
        let session = engine.create_session(&survey, None).await.unwrap();
        let q1 = uuid_of(&survey, "q1");

        engine
            .submit_answer(&survey, &session.uuid, q1, br#"{"value":"first"}"#)
            .await
            .unwrap();
        let r = engine
            .submit_answer(&survey, &session.uuid, q1, br#"{"value":"second"}"#)
            .await
            .unwrap();

        assert_eq!(r.session.question_answers.len(), 1);
        assert_eq!(
            r.session.question_answers[0].answer,
            Some(Answer::Text(TextAnswer {
                value: "second".to_string()
            }))
        );
    }

    #[tokio::test]
    async fn test_invalid_submissions() {
        let (engine, survey) = seeded(DuplicateProtection::Cookie).await;
        let session = engine.create_session(&survey, None).await.unwrap();

        let err = engine
            .submit_answer(&survey, &session.uuid, uuid_of(&survey, "q3"), b"not json")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid request format");

        let err = engine
            .submit_answer(&survey, &session.uuid, uuid_of(&survey, "q3"), br#"{"value":9}"#)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid answer");
        assert_eq!(err.details(), Some("value must be at most 5"));

        let err = engine
            .submit_answer(&survey, &session.uuid, "missing", br#"{"value":"x"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, SurveyError::NotFound(_)));

        let err = engine
            .submit_answer(&survey, "no-session", uuid_of(&survey, "q1"), br#"{"value":"x"}"#)
            .await
            .unwrap_err();
        assert_eq!(err, SurveyError::not_found("session not found"));
    }

    #[tokio::test]
    async fn test_ip_duplicate_protection() {
        let (engine, survey) = seeded(DuplicateProtection::Ip).await;
        engine
            .create_session(&survey, Some("10.0.0.1"))
            .await
            .unwrap();

        let err = engine
            .create_session(&survey, Some("10.0.0.1"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SurveyError::Conflict("duplicate session for ip address".to_string())
        );
        assert!(engine.create_session(&survey, Some("10.0.0.2")).await.is_ok());
    }

    #[tokio::test]
    async fn test_same_ip_allowed_without_protection() {
        let (engine, survey) = seeded(DuplicateProtection::Cookie).await;
        engine.create_session(&survey, Some("10.0.0.1")).await.unwrap();
        assert!(engine.create_session(&survey, Some("10.0.0.1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_stopped_survey_is_not_live() {
        let (engine, survey) = seeded(DuplicateProtection::Cookie).await;
        engine
            .update_delivery_status(&survey.uuid, DeliveryStatus::Stopped)
            .await
            .unwrap();
        let err = engine.get_live_survey(&survey.url_slug).await.unwrap_err();
        assert_eq!(err, SurveyError::not_found("survey not found"));
    }

    #[tokio::test]
    async fn test_sessions_page() {
        let (engine, survey) = seeded(DuplicateProtection::Cookie).await;
        for _ in 0..3 {
            engine.create_session(&survey, None).await.unwrap();
        }
        let page = engine
            .get_sessions(
                &survey,
                &SurveySessionsQuery {
                    limit: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.total_count, 3);
        assert_eq!(page.pages_count, 2);
        let surveys = engine.list_surveys().await.unwrap();
        assert_eq!(surveys[0].stats.sessions_count_in_progress, 3);
    }

    /// Delegates to an [`InMemoryStore`]; once armed, answer writes wait
    /// until two of them are in flight.
    struct GatedStore {
        inner: InMemoryStore,
        armed: AtomicBool,
        gate: Barrier,
    }

    #[async_trait]
    impl Store for GatedStore {
        async fn create_survey(&self, survey: &Survey) -> anyhow::Result<Survey> {
            self.inner.create_survey(survey).await
        }
        async fn update_survey(&self, survey: &Survey) -> anyhow::Result<()> {
            self.inner.update_survey(survey).await
        }
        async fn update_survey_delivery_status(
            &self,
            survey_uuid: &str,
            status: DeliveryStatus,
        ) -> anyhow::Result<bool> {
            self.inner.update_survey_delivery_status(survey_uuid, status).await
        }
        async fn get_surveys(&self) -> anyhow::Result<Vec<Survey>> {
            self.inner.get_surveys().await
        }
        async fn get_survey_by_field(
            &self,
            field: SurveyField,
            value: &str,
        ) -> anyhow::Result<Option<Survey>> {
            self.inner.get_survey_by_field(field, value).await
        }
        async fn upsert_survey_questions(
            &self,
            survey_uuid: &str,
            questions: &[Question],
        ) -> anyhow::Result<()> {
            self.inner.upsert_survey_questions(survey_uuid, questions).await
        }
        async fn get_survey_questions(
            &self,
            survey_uuid: &str,
        ) -> anyhow::Result<Vec<PersistedQuestion>> {
            self.inner.get_survey_questions(survey_uuid).await
        }
        async fn create_survey_session(
            &self,
            session: &SurveySession,
        ) -> anyhow::Result<SurveySession> {
            self.inner.create_survey_session(session).await
        }
        async fn update_survey_session_status(
            &self,
            session_uuid: &str,
            status: SessionStatus,
        ) -> anyhow::Result<bool> {
            self.inner.update_survey_session_status(session_uuid, status).await
        }
        async fn get_survey_session_by_ip_address(
            &self,
            survey_uuid: &str,
            ip_addr: &str,
        ) -> anyhow::Result<Option<SurveySession>> {
            self.inner
                .get_survey_session_by_ip_address(survey_uuid, ip_addr)
                .await
        }
        async fn get_survey_session(
            &self,
            survey_uuid: &str,
            session_uuid: &str,
        ) -> anyhow::Result<Option<SurveySession>> {
            self.inner.get_survey_session(survey_uuid, session_uuid).await
        }
        async fn get_survey_sessions_with_answers(
            &self,
            survey_uuid: &str,
            filter: &SurveySessionsFilter,
        ) -> anyhow::Result<(Vec<SurveySession>, i64)> {
            self.inner
                .get_survey_sessions_with_answers(survey_uuid, filter)
                .await
        }
        async fn get_survey_session_answers(
            &self,
            session_uuid: &str,
        ) -> anyhow::Result<Vec<QuestionAnswer>> {
            self.inner.get_survey_session_answers(session_uuid).await
        }
        async fn upsert_survey_question_answer(
            &self,
            session_uuid: &str,
            question_uuid: &str,
            answer_bytes: &[u8],
        ) -> anyhow::Result<()> {
            if self.armed.load(AtomicOrdering::SeqCst) {
                self.gate.wait().await;
            }
            self.inner
                .upsert_survey_question_answer(session_uuid, question_uuid, answer_bytes)
                .await
        }
        async fn store_webhook_response(
            &self,
            session_uuid: &str,
            status_code: u16,
            response: &str,
        ) -> anyhow::Result<()> {
            self.inner
                .store_webhook_response(session_uuid, status_code, response)
                .await
        }
    }

    #[tokio::test]
    async fn test_concurrent_last_answers_complete_once() {
        let store = Arc::new(GatedStore {
            inner: InMemoryStore::new(),
            armed: AtomicBool::new(false),
            gate: Barrier::new(2),
        });
        let config = SurveyConfig {
            title: "Race".to_string(),
            questions: Some(Questions {
                questions: vec![text_question("q1"), text_question("q2"), text_question("q3")],
            }),
            ..Default::default()
        };
        SyncEngine::new(store.clone(), Span::none())
            .sync(&SurveysSyncResult {
                surveys: vec![ParsedSurvey {
                    name: "race".to_string(),
                    config,
                }],
                errors: vec![],
            })
            .await
            .unwrap();

        let engine = SessionEngine::new(store.clone(), Span::none());
        let survey = engine.get_survey(SurveyField::Name, "race").await.unwrap();
        let session = engine.create_session(&survey, None).await.unwrap();
        engine
            .submit_answer(&survey, &session.uuid, uuid_of(&survey, "q1"), br#"{"value":"a"}"#)
            .await
            .unwrap();

        store.armed.store(true, AtomicOrdering::SeqCst);
        let (second, third) = tokio::join!(
            engine.submit_answer(&survey, &session.uuid, uuid_of(&survey, "q2"), br#"{"value":"b"}"#),
            engine.submit_answer(&survey, &session.uuid, uuid_of(&survey, "q3"), br#"{"value":"c"}"#),
        );
        let (second, third) = (second.unwrap(), third.unwrap());

        assert_eq!(
            [second.completed_now, third.completed_now]
                .iter()
                .filter(|c| **c)
                .count(),
            1
        );
        let stored = engine.get_session(&survey, &session.uuid).await.unwrap();
        assert_eq!(stored.question_answers.len(), 3);
        assert_eq!(stored.status, SessionStatus::Completed);
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_delivery_status_survives_concurrent_resync() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let sync = SyncEngine::new(store.clone(), Span::none());
        let batch = |ids: &[&str]| SurveysSyncResult {
            surveys: vec![ParsedSurvey {
                name: "evolving".to_string(),
                config: SurveyConfig {
                    title: "Evolving".to_string(),
                    questions: Some(Questions {
                        questions: ids.iter().map(|id| text_question(id)).collect(),
                    }),
                    ..Default::default()
                },
            }],
            errors: vec![],
        };
        sync.sync(&batch(&["a"])).await.unwrap();

        let engine = SessionEngine::new(store.clone(), Span::none());
        let before = engine.get_survey(SurveyField::Name, "evolving").await.unwrap();

        // The resync lands between the admin loading the survey and patching it.
        sync.sync(&batch(&["a", "b"])).await.unwrap();
        let patched = engine
            .update_delivery_status(&before.uuid, DeliveryStatus::Stopped)
            .await
            .unwrap();

        assert_eq!(patched.delivery_status, DeliveryStatus::Stopped);
        let ids: Vec<&str> = patched
            .config
            .as_ref()
            .unwrap()
            .questions()
            .iter()
            .map(|q| q.id.as_str())
            .collect();
        assert_eq!(ids, ["a", "b"]);

        sync.sync(&batch(&["a", "b"])).await.unwrap();
        let after = engine.get_survey(SurveyField::Uuid, &before.uuid).await.unwrap();
        assert_eq!(after.delivery_status, DeliveryStatus::Stopped);

        let err = engine
            .update_delivery_status("missing", DeliveryStatus::Launched)
            .await
            .unwrap_err();
        assert_eq!(err, SurveyError::not_found("survey not found"));
    }
}
