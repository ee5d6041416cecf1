//! SQLite-backed [`Store`] implementation.
//!
//! Configs are stored as JSON text, answers as the canonical JSON bytes the
//! core produces, timestamps as RFC 3339 text (fixed precision, so they sort
//! lexically). Question and answer upserts lean on the unique constraints
//! created in [`migrate`](crate::migrate).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use formwork_core::models::{
    DeliveryStatus, PersistedQuestion, QuestionAnswer, SessionStatus, Survey, SurveyField,
    SurveySession, SurveySessionsFilter, SurveyStats, WebhookData,
};
use formwork_core::question::Question;
use formwork_core::store::Store;
use formwork_core::survey_config::SurveyConfig;

const SURVEY_COLUMNS: &str = "s.uuid, s.name, s.url_slug, s.parse_status, s.delivery_status, \
     s.error_log, s.config, s.created_at";

const SESSION_COLUMNS: &str = "uuid, survey_uuid, status, ip_addr, created_at, completed_at";

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn hydrate(&self, mut session: SurveySession) -> Result<SurveySession> {
        session.question_answers = self.get_survey_session_answers(&session.uuid).await?;

        let webhook = sqlx::query(
            "SELECT response_status, response FROM surveys_webhook_responses \
             WHERE session_uuid = ? ORDER BY rowid DESC LIMIT 1",
        )
        .bind(&session.uuid)
        .fetch_optional(&self.pool)
        .await?;
        session.webhook_data = match webhook {
            Some(row) => Some(WebhookData {
                status_code: u16::try_from(row.try_get::<i64, _>("response_status")?)
                    .context("stored webhook status out of range")?,
                response: row.try_get("response")?,
            }),
            None => None,
        };
        Ok(session)
    }
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid stored timestamp: {}", raw))?
        .with_timezone(&Utc))
}

fn survey_from_row(row: &SqliteRow) -> Result<Survey> {
    let config: Option<String> = row.try_get("config")?;
    let config = config
        .map(|c| serde_json::from_str::<SurveyConfig>(&c))
        .transpose()
        .context("invalid stored survey config")?;
    let parse_status: String = row.try_get("parse_status")?;
    let delivery_status: String = row.try_get("delivery_status")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Survey {
        uuid: row.try_get("uuid")?,
        created_at: parse_ts(&created_at)?,
        parse_status: parse_status.parse()?,
        delivery_status: delivery_status.parse()?,
        error_log: row.try_get("error_log")?,
        name: row.try_get("name")?,
        url_slug: row.try_get("url_slug")?,
        config,
        stats: SurveyStats::default(),
    })
}

fn session_from_row(row: &SqliteRow) -> Result<SurveySession> {
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;

    Ok(SurveySession {
        uuid: row.try_get("uuid")?,
        created_at: parse_ts(&created_at)?,
        completed_at: completed_at.as_deref().map(parse_ts).transpose()?,
        status: status.parse()?,
        survey_uuid: row.try_get("survey_uuid")?,
        ip_addr: row.try_get("ip_addr")?,
        question_answers: Vec::new(),
        webhook_data: None,
    })
}

fn encode_config(survey: &Survey) -> Result<Option<String>> {
    survey
        .config
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .context("unable to encode survey config")
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_survey(&self, survey: &Survey) -> Result<Survey> {
        let mut stored = survey.clone();
        stored.uuid = uuid::Uuid::new_v4().to_string();
        stored.stats = SurveyStats::default();

        sqlx::query(
            r#"
            INSERT INTO surveys (uuid, name, url_slug, parse_status, delivery_status,
                                 error_log, config, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&stored.uuid)
        .bind(&stored.name)
        .bind(&stored.url_slug)
        .bind(stored.parse_status.as_str())
        .bind(stored.delivery_status.as_str())
        .bind(&stored.error_log)
        .bind(encode_config(&stored)?)
        .bind(format_ts(&stored.created_at))
        .execute(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn update_survey(&self, survey: &Survey) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE surveys
            SET parse_status = ?, error_log = ?, config = ?
            WHERE uuid = ?
            "#,
        )
        .bind(survey.parse_status.as_str())
        .bind(&survey.error_log)
        .bind(encode_config(survey)?)
        .bind(&survey.uuid)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("survey {} does not exist", survey.uuid);
        }
        Ok(())
    }

    async fn update_survey_delivery_status(
        &self,
        survey_uuid: &str,
        status: DeliveryStatus,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE surveys SET delivery_status = ? WHERE uuid = ?")
            .bind(status.as_str())
            .bind(survey_uuid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_surveys(&self) -> Result<Vec<Survey>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {SURVEY_COLUMNS},
                (SELECT COUNT(*) FROM surveys_sessions ss
                 WHERE ss.survey_uuid = s.uuid AND ss.status = 'in_progress') AS in_progress,
                (SELECT COUNT(*) FROM surveys_sessions ss
                 WHERE ss.survey_uuid = s.uuid AND ss.status = 'completed') AS completed
            FROM surveys s
            ORDER BY s.created_at DESC, s.rowid DESC
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let mut survey = survey_from_row(row)?;
                survey.stats =
                    SurveyStats::new(row.try_get("in_progress")?, row.try_get("completed")?);
                Ok(survey)
            })
            .collect()
    }

    async fn get_survey_by_field(
        &self,
        field: SurveyField,
        value: &str,
    ) -> Result<Option<Survey>> {
        let row = sqlx::query(&format!(
            "SELECT {SURVEY_COLUMNS} FROM surveys s WHERE s.{} = ?",
            field.column()
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(survey_from_row).transpose()
    }

    async fn upsert_survey_questions(
        &self,
        survey_uuid: &str,
        questions: &[Question],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = format_ts(&Utc::now());

        for q in questions {
            sqlx::query(
                r#"
                INSERT INTO surveys_questions (uuid, survey_uuid, question_id, created_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(survey_uuid, question_id) DO NOTHING
                "#,
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(survey_uuid)
            .bind(&q.id)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        let placeholders = vec!["?"; questions.len()].join(", ");
        let sql = if questions.is_empty() {
            "DELETE FROM surveys_questions WHERE survey_uuid = ?".to_string()
        } else {
            format!(
                "DELETE FROM surveys_questions WHERE survey_uuid = ? AND question_id NOT IN ({})",
                placeholders
            )
        };
        let mut delete = sqlx::query(&sql).bind(survey_uuid);
        for q in questions {
            delete = delete.bind(&q.id);
        }
        delete.execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_survey_questions(&self, survey_uuid: &str) -> Result<Vec<PersistedQuestion>> {
        let rows = sqlx::query(
            "SELECT uuid, question_id FROM surveys_questions WHERE survey_uuid = ? ORDER BY rowid",
        )
        .bind(survey_uuid)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(PersistedQuestion {
                    id: row.try_get("question_id")?,
                    uuid: row.try_get("uuid")?,
                })
            })
            .collect()
    }

    async fn create_survey_session(&self, session: &SurveySession) -> Result<SurveySession> {
        let mut stored = session.clone();
        stored.uuid = uuid::Uuid::new_v4().to_string();
        stored.question_answers.clear();
        stored.webhook_data = None;

        sqlx::query(
            r#"
            INSERT INTO surveys_sessions (uuid, survey_uuid, status, ip_addr, created_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&stored.uuid)
        .bind(&stored.survey_uuid)
        .bind(stored.status.as_str())
        .bind(&stored.ip_addr)
        .bind(format_ts(&stored.created_at))
        .bind(stored.completed_at.as_ref().map(format_ts))
        .execute(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn update_survey_session_status(
        &self,
        session_uuid: &str,
        status: SessionStatus,
    ) -> Result<bool> {
        let completed_at = match status {
            SessionStatus::Completed => Some(format_ts(&Utc::now())),
            SessionStatus::InProgress => None,
        };
        // Only the caller whose UPDATE moves the row sees `true`.
        let result = sqlx::query(
            r#"
            UPDATE surveys_sessions
            SET status = ?, completed_at = COALESCE(?, completed_at)
            WHERE uuid = ? AND status <> ?
            "#,
        )
        .bind(status.as_str())
        .bind(completed_at)
        .bind(session_uuid)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        let exists = sqlx::query("SELECT 1 FROM surveys_sessions WHERE uuid = ?")
            .bind(session_uuid)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            anyhow::bail!("session {} does not exist", session_uuid);
        }
        Ok(false)
    }

    async fn get_survey_session_by_ip_address(
        &self,
        survey_uuid: &str,
        ip_addr: &str,
    ) -> Result<Option<SurveySession>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM surveys_sessions \
             WHERE survey_uuid = ? AND ip_addr = ? ORDER BY rowid LIMIT 1"
        ))
        .bind(survey_uuid)
        .bind(ip_addr)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(session_from_row(&row)?).await?)),
            None => Ok(None),
        }
    }

    async fn get_survey_session(
        &self,
        survey_uuid: &str,
        session_uuid: &str,
    ) -> Result<Option<SurveySession>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM surveys_sessions WHERE survey_uuid = ? AND uuid = ?"
        ))
        .bind(survey_uuid)
        .bind(session_uuid)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(session_from_row(&row)?).await?)),
            None => Ok(None),
        }
    }

    async fn get_survey_sessions_with_answers(
        &self,
        survey_uuid: &str,
        filter: &SurveySessionsFilter,
    ) -> Result<(Vec<SurveySession>, i64)> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM surveys_sessions WHERE survey_uuid = ?")
                .bind(survey_uuid)
                .fetch_one(&self.pool)
                .await?;

        // Column and direction come from closed enums, never from user text.
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM surveys_sessions WHERE survey_uuid = ? \
             ORDER BY {} {}, rowid {} LIMIT ? OFFSET ?",
            filter.sort_by.as_str(),
            filter.order.as_str(),
            filter.order.as_str(),
        );
        let rows = sqlx::query(&sql)
            .bind(survey_uuid)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .await?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            sessions.push(self.hydrate(session_from_row(row)?).await?);
        }
        Ok((sessions, total))
    }

    async fn get_survey_session_answers(&self, session_uuid: &str) -> Result<Vec<QuestionAnswer>> {
        let rows = sqlx::query(
            r#"
            SELECT a.question_uuid, q.question_id, a.answer
            FROM surveys_answers a
            JOIN surveys_questions q ON q.uuid = a.question_uuid
            WHERE a.session_uuid = ?
            ORDER BY a.rowid
            "#,
        )
        .bind(session_uuid)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(QuestionAnswer {
                    question_id: row.try_get("question_id")?,
                    question_uuid: row.try_get("question_uuid")?,
                    answer_bytes: row.try_get("answer")?,
                    answer: None,
                })
            })
            .collect()
    }

    async fn upsert_survey_question_answer(
        &self,
        session_uuid: &str,
        question_uuid: &str,
        answer_bytes: &[u8],
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO surveys_answers (uuid, session_uuid, question_uuid, answer, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(session_uuid, question_uuid) DO UPDATE SET
                answer = excluded.answer
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(session_uuid)
        .bind(question_uuid)
        .bind(answer_bytes)
        .bind(format_ts(&Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn store_webhook_response(
        &self,
        session_uuid: &str,
        status_code: u16,
        response: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO surveys_webhook_responses (uuid, session_uuid, response_status, response, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(session_uuid)
        .bind(i64::from(status_code))
        .bind(response)
        .bind(format_ts(&Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
