//! In-memory [`Store`] implementation for tests and `backend = "memory"`.
//!
//! Plain `Vec`s behind `std::sync::RwLock`. Rows keep insertion order, which
//! stands in for `created_at` ordering.

use std::cmp::Ordering;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::models::{
    DeliveryStatus, PersistedQuestion, QuestionAnswer, SessionSortBy, SessionStatus, SortOrder, Survey,
    SurveyField, SurveySession, SurveySessionsFilter, SurveyStats, WebhookData,
};
use crate::question::Question;

use super::Store;

struct StoredQuestion {
    survey_uuid: String,
    question: PersistedQuestion,
}

struct StoredAnswer {
    session_uuid: String,
    question_uuid: String,
    bytes: Vec<u8>,
}

struct StoredWebhookResponse {
    session_uuid: String,
    data: WebhookData,
}

/// In-memory store. Everything is lost when it is dropped.
pub struct InMemoryStore {
    surveys: RwLock<Vec<Survey>>,
    questions: RwLock<Vec<StoredQuestion>>,
    sessions: RwLock<Vec<SurveySession>>,
    answers: RwLock<Vec<StoredAnswer>>,
    webhook_responses: RwLock<Vec<StoredWebhookResponse>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            surveys: RwLock::new(Vec::new()),
            questions: RwLock::new(Vec::new()),
            sessions: RwLock::new(Vec::new()),
            answers: RwLock::new(Vec::new()),
            webhook_responses: RwLock::new(Vec::new()),
        }
    }

    /// Attaches raw answers and the latest webhook response to a bare session.
    fn hydrate(&self, mut session: SurveySession) -> Result<SurveySession> {
        session.question_answers = self.answers_for(&session.uuid)?;
        session.webhook_data = read(&self.webhook_responses)?
            .iter()
            .rev()
            .find(|w| w.session_uuid == session.uuid)
            .map(|w| w.data.clone());
        Ok(session)
    }

    fn answers_for(&self, session_uuid: &str) -> Result<Vec<QuestionAnswer>> {
        let questions = read(&self.questions)?;
        let answers = read(&self.answers)?;
        Ok(answers
            .iter()
            .filter(|a| a.session_uuid == session_uuid)
            .filter_map(|a| {
                questions
                    .iter()
                    .find(|q| q.question.uuid == a.question_uuid)
                    .map(|q| QuestionAnswer {
                        question_id: q.question.id.clone(),
                        question_uuid: a.question_uuid.clone(),
                        answer_bytes: a.bytes.clone(),
                        answer: None,
                    })
            })
            .collect())
    }

    fn stats_for(&self, survey_uuid: &str) -> Result<SurveyStats> {
        let sessions = read(&self.sessions)?;
        let (mut in_progress, mut completed) = (0, 0);
        for s in sessions.iter().filter(|s| s.survey_uuid == survey_uuid) {
            match s.status {
                SessionStatus::InProgress => in_progress += 1,
                SessionStatus::Completed => completed += 1,
            }
        }
        Ok(SurveyStats::new(in_progress, completed))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn compare_sessions(a: &SurveySession, b: &SurveySession, sort_by: SessionSortBy) -> Ordering {
    match sort_by {
        SessionSortBy::Uuid => a.uuid.cmp(&b.uuid),
        SessionSortBy::CreatedAt => a.created_at.cmp(&b.created_at),
        SessionSortBy::CompletedAt => a.completed_at.cmp(&b.completed_at),
        SessionSortBy::Status => a.status.as_str().cmp(b.status.as_str()),
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_survey(&self, survey: &Survey) -> Result<Survey> {
        let mut surveys = write(&self.surveys)?;
        if surveys.iter().any(|s| s.name == survey.name) {
            bail!("survey with name {} already exists", survey.name);
        }
        let mut stored = survey.clone();
        stored.uuid = uuid::Uuid::new_v4().to_string();
        stored.stats = SurveyStats::default();
        surveys.push(stored.clone());
        Ok(stored)
    }

    async fn update_survey(&self, survey: &Survey) -> Result<()> {
        let mut surveys = write(&self.surveys)?;
        let stored = surveys
            .iter_mut()
            .find(|s| s.uuid == survey.uuid)
            .ok_or_else(|| anyhow!("survey {} does not exist", survey.uuid))?;
        stored.parse_status = survey.parse_status;
        stored.error_log = survey.error_log.clone();
        stored.config = survey.config.clone();
        Ok(())
    }

    async fn update_survey_delivery_status(
        &self,
        survey_uuid: &str,
        status: DeliveryStatus,
    ) -> Result<bool> {
        let mut surveys = write(&self.surveys)?;
        match surveys.iter_mut().find(|s| s.uuid == survey_uuid) {
            Some(stored) => {
                stored.delivery_status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_surveys(&self) -> Result<Vec<Survey>> {
        let mut surveys: Vec<Survey> = read(&self.surveys)?.iter().rev().cloned().collect();
        for survey in surveys.iter_mut() {
            survey.stats = self.stats_for(&survey.uuid)?;
        }
        Ok(surveys)
    }

    async fn get_survey_by_field(
        &self,
        field: SurveyField,
        value: &str,
    ) -> Result<Option<Survey>> {
        Ok(read(&self.surveys)?
            .iter()
            .find(|s| field.matches(s, value))
            .cloned())
    }

    async fn upsert_survey_questions(
        &self,
        survey_uuid: &str,
        questions: &[Question],
    ) -> Result<()> {
        let mut stored = write(&self.questions)?;
        for q in questions {
            let exists = stored
                .iter()
                .any(|s| s.survey_uuid == survey_uuid && s.question.id == q.id);
            if !exists {
                stored.push(StoredQuestion {
                    survey_uuid: survey_uuid.to_string(),
                    question: PersistedQuestion {
                        id: q.id.clone(),
                        uuid: uuid::Uuid::new_v4().to_string(),
                    },
                });
            }
        }
        stored.retain(|s| {
            s.survey_uuid != survey_uuid || questions.iter().any(|q| q.id == s.question.id)
        });
        Ok(())
    }

    async fn get_survey_questions(&self, survey_uuid: &str) -> Result<Vec<PersistedQuestion>> {
        Ok(read(&self.questions)?
            .iter()
            .filter(|s| s.survey_uuid == survey_uuid)
            .map(|s| s.question.clone())
            .collect())
    }

    async fn create_survey_session(&self, session: &SurveySession) -> Result<SurveySession> {
        let mut stored = session.clone();
        stored.uuid = uuid::Uuid::new_v4().to_string();
        stored.question_answers.clear();
        stored.webhook_data = None;
        write(&self.sessions)?.push(stored.clone());
        Ok(stored)
    }

    async fn update_survey_session_status(
        &self,
        session_uuid: &str,
        status: SessionStatus,
    ) -> Result<bool> {
        let mut sessions = write(&self.sessions)?;
        let session = sessions
            .iter_mut()
            .find(|s| s.uuid == session_uuid)
            .ok_or_else(|| anyhow!("session {} does not exist", session_uuid))?;
        if session.status == status {
            return Ok(false);
        }
        session.status = status;
        if status == SessionStatus::Completed {
            session.completed_at = Some(Utc::now());
        }
        Ok(true)
    }

    async fn get_survey_session_by_ip_address(
        &self,
        survey_uuid: &str,
        ip_addr: &str,
    ) -> Result<Option<SurveySession>> {
        let found = read(&self.sessions)?
            .iter()
            .find(|s| s.survey_uuid == survey_uuid && s.ip_addr.as_deref() == Some(ip_addr))
            .cloned();
        found.map(|s| self.hydrate(s)).transpose()
    }

    async fn get_survey_session(
        &self,
        survey_uuid: &str,
        session_uuid: &str,
    ) -> Result<Option<SurveySession>> {
        let found = read(&self.sessions)?
            .iter()
            .find(|s| s.survey_uuid == survey_uuid && s.uuid == session_uuid)
            .cloned();
        found.map(|s| self.hydrate(s)).transpose()
    }

    async fn get_survey_sessions_with_answers(
        &self,
        survey_uuid: &str,
        filter: &SurveySessionsFilter,
    ) -> Result<(Vec<SurveySession>, i64)> {
        let mut matching: Vec<SurveySession> = read(&self.sessions)?
            .iter()
            .filter(|s| s.survey_uuid == survey_uuid)
            .cloned()
            .collect();
        let total = matching.len() as i64;

        matching.sort_by(|a, b| {
            let ord = compare_sessions(a, b, filter.sort_by);
            match filter.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        let page = matching
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .map(|s| self.hydrate(s))
            .collect::<Result<Vec<_>>>()?;
        Ok((page, total))
    }

    async fn get_survey_session_answers(&self, session_uuid: &str) -> Result<Vec<QuestionAnswer>> {
        self.answers_for(session_uuid)
    }

    async fn upsert_survey_question_answer(
        &self,
        session_uuid: &str,
        question_uuid: &str,
        answer_bytes: &[u8],
    ) -> Result<()> {
        let mut answers = write(&self.answers)?;
        match answers
            .iter_mut()
            .find(|a| a.session_uuid == session_uuid && a.question_uuid == question_uuid)
        {
            Some(existing) => existing.bytes = answer_bytes.to_vec(),
            None => answers.push(StoredAnswer {
                session_uuid: session_uuid.to_string(),
                question_uuid: question_uuid.to_string(),
                bytes: answer_bytes.to_vec(),
            }),
        }
        Ok(())
    }

    async fn store_webhook_response(
        &self,
        session_uuid: &str,
        status_code: u16,
        response: &str,
    ) -> Result<()> {
        write(&self.webhook_responses)?.push(StoredWebhookResponse {
            session_uuid: session_uuid.to_string(),
            data: WebhookData {
                status_code,
                response: response.to_string(),
            },
        });
        Ok(())
    }
}
