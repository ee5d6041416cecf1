use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Creates every table and index. Safe to run repeatedly.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Surveys: one row per survey directory name
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS surveys (
            uuid TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            url_slug TEXT NOT NULL UNIQUE,
            parse_status TEXT NOT NULL,
            delivery_status TEXT NOT NULL,
            error_log TEXT NOT NULL DEFAULT '',
            config TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Persisted question identities
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS surveys_questions (
            uuid TEXT PRIMARY KEY,
            survey_uuid TEXT NOT NULL,
            question_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(survey_uuid, question_id),
            FOREIGN KEY (survey_uuid) REFERENCES surveys(uuid)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS surveys_sessions (
            uuid TEXT PRIMARY KEY,
            survey_uuid TEXT NOT NULL,
            status TEXT NOT NULL,
            ip_addr TEXT,
            created_at TEXT NOT NULL,
            completed_at TEXT,
            FOREIGN KEY (survey_uuid) REFERENCES surveys(uuid)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_surveys_sessions_survey ON surveys_sessions(survey_uuid, ip_addr)",
    )
    .execute(pool)
    .await?;

    // Answers: one row per (session, question)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS surveys_answers (
            uuid TEXT PRIMARY KEY,
            session_uuid TEXT NOT NULL,
            question_uuid TEXT NOT NULL,
            answer BLOB NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(session_uuid, question_uuid),
            FOREIGN KEY (session_uuid) REFERENCES surveys_sessions(uuid) ON DELETE CASCADE,
            FOREIGN KEY (question_uuid) REFERENCES surveys_questions(uuid) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS surveys_webhook_responses (
            uuid TEXT PRIMARY KEY,
            session_uuid TEXT NOT NULL,
            response_status INTEGER NOT NULL,
            response TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (session_uuid) REFERENCES surveys_sessions(uuid) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
