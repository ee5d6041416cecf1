//! Reconciliation of parsed survey directories against stored surveys.
//!
//! Surveys are matched by `name` (the directory name), never by UUID. Every
//! run recomputes the full plan from scratch:
//!
//! | Stored? | Parse result | Operation |
//! |---------|--------------|-----------|
//! | yes | parsed | update: new config, `success`, empty error log |
//! | yes | error | update: keep config, `error`, error log = message |
//! | yes | absent | update: `deleted`, empty error log |
//! | no | parsed | create: `success`, `launched` |
//! | no | error | create: `error`, `stopped`, no config |
//!
//! Each create/update then syncs the survey's question table so question
//! UUIDs stay stable while question IDs do.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::Span;

use crate::models::{
    generate_url_slug, DeliveryStatus, ParseStatus, Survey, SurveyParseError, SurveysSyncResult,
};
use crate::store::Store;

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOperation {
    Create(Survey),
    Update(Survey),
}

impl SyncOperation {
    pub fn survey(&self) -> &Survey {
        match self {
            SyncOperation::Create(s) | SyncOperation::Update(s) => s,
        }
    }
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Per-directory parse failures carried over from the parser.
    pub parse_errors: Vec<SurveyParseError>,
    /// Surveys whose create/update did not reach the store.
    pub failed: Vec<SurveyParseError>,
}

/// Computes the operations that bring `existing` in line with `result`.
/// Output is sorted by survey name.
pub fn plan(existing: &[Survey], result: &SurveysSyncResult) -> Vec<SyncOperation> {
    let parsed: HashMap<&str, _> = result
        .surveys
        .iter()
        .map(|p| (p.name.as_str(), &p.config))
        .collect();
    let failed: HashMap<&str, &str> = result
        .errors
        .iter()
        .map(|e| (e.name.as_str(), e.error.as_str()))
        .collect();

    let mut ops = Vec::new();

    for survey in existing {
        let mut updated = survey.clone();
        if let Some(config) = parsed.get(survey.name.as_str()) {
            updated.config = Some((*config).clone());
            updated.parse_status = ParseStatus::Success;
            updated.error_log.clear();
        } else if let Some(error) = failed.get(survey.name.as_str()) {
            updated.parse_status = ParseStatus::Error;
            updated.error_log = error.to_string();
        } else {
            updated.parse_status = ParseStatus::Deleted;
            updated.error_log.clear();
        }
        ops.push(SyncOperation::Update(updated));
    }

    let is_known = |name: &str| existing.iter().any(|s| s.name == name);

    for p in result.surveys.iter().filter(|p| !is_known(&p.name)) {
        let mut survey = Survey::new(&p.name, Some(p.config.clone()));
        survey.url_slug = generate_url_slug();
        ops.push(SyncOperation::Create(survey));
    }

    for e in result.errors.iter().filter(|e| !is_known(&e.name)) {
        let mut survey = Survey::new(&e.name, None);
        survey.url_slug = generate_url_slug();
        survey.parse_status = ParseStatus::Error;
        survey.delivery_status = DeliveryStatus::Stopped;
        survey.error_log = e.error.clone();
        ops.push(SyncOperation::Create(survey));
    }

    ops.sort_by(|a, b| a.survey().name.cmp(&b.survey().name));
    ops
}

/// Applies reconciliation plans through a [`Store`].
pub struct SyncEngine {
    store: Arc<dyn Store>,
    span: Span,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn Store>, span: Span) -> Self {
        Self { store, span }
    }

    /// Reconciles `result` against the store. A failure to read the current
    /// surveys aborts the run; failures on individual surveys are collected
    /// into the report.
    pub async fn sync(&self, result: &SurveysSyncResult) -> anyhow::Result<SyncReport> {
        let existing = self.store.get_surveys().await?;
        let ops = plan(&existing, result);

        let mut report = SyncReport {
            parse_errors: result.errors.clone(),
            ..Default::default()
        };

        for op in ops {
            let name = op.survey().name.clone();
            match self.apply(op).await {
                Ok(applied) => match applied {
                    Applied::Created => report.created += 1,
                    Applied::Updated(ParseStatus::Deleted) => report.deleted += 1,
                    Applied::Updated(_) => report.updated += 1,
                },
                Err(e) => {
                    tracing::error!(parent: &self.span, survey = %name, error = %e, "unable to persist survey");
                    report.failed.push(SurveyParseError {
                        name,
                        error: e.to_string(),
                    });
                }
            }
        }

        for e in &report.parse_errors {
            tracing::warn!(parent: &self.span, survey = %e.name, error = %e.error, "survey failed to parse");
        }
        tracing::info!(
            parent: &self.span,
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            parse_errors = report.parse_errors.len(),
            failed = report.failed.len(),
            "surveys synced"
        );
        Ok(report)
    }

    async fn apply(&self, op: SyncOperation) -> anyhow::Result<Applied> {
        let (survey, applied) = match op {
            SyncOperation::Create(survey) => {
                let stored = self.store.create_survey(&survey).await?;
                (stored, Applied::Created)
            }
            SyncOperation::Update(survey) => {
                self.store.update_survey(&survey).await?;
                let status = survey.parse_status;
                (survey, Applied::Updated(status))
            }
        };

        if survey.parse_status == ParseStatus::Success {
            if let Some(config) = &survey.config {
                self.store
                    .upsert_survey_questions(&survey.uuid, config.questions())
                    .await?;
            }
        }
        Ok(applied)
    }
}

enum Applied {
    Created,
    Updated(ParseStatus),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ParsedSurvey, SurveyField};
    use crate::question::{Question, QuestionType, Questions};
    use crate::store::memory::InMemoryStore;
    use crate::survey_config::SurveyConfig;

    fn config(title: &str, ids: &[&str]) -> SurveyConfig {
        let questions = ids
            .iter()
            .map(|id| {
                let mut q = Question::new(QuestionType::ShortText, *id);
                q.id = id.to_string();
                q
            })
            .collect();
        SurveyConfig {
            title: title.to_string(),
            questions: Some(Questions { questions }),
            ..Default::default()
        }
    }

    fn parsed(name: &str, cfg: SurveyConfig) -> ParsedSurvey {
        ParsedSurvey {
            name: name.to_string(),
            config: cfg,
        }
    }

    fn error(name: &str, msg: &str) -> SurveyParseError {
        SurveyParseError {
            name: name.to_string(),
            error: msg.to_string(),
        }
    }

    fn engine() -> (Arc<InMemoryStore>, SyncEngine) {
        let store = Arc::new(InMemoryStore::new());
        let engine = SyncEngine::new(store.clone(), Span::none());
        (store, engine)
    }

    async fn by_name(store: &InMemoryStore, name: &str) -> Survey {
        store
            .get_survey_by_field(SurveyField::Name, name)
            .await
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_plan_creates_with_initial_statuses() {
        let result = SurveysSyncResult {
            surveys: vec![parsed("good", config("Good", &["a"]))],
            errors: vec![error("bad", "required file 'questions.yaml' not found")],
        };
        let ops = plan(&[], &result);
        assert_eq!(ops.len(), 2);

        let bad = ops[0].survey();
        assert!(matches!(ops[0], SyncOperation::Create(_)));
        assert_eq!(bad.name, "bad");
        assert_eq!(bad.parse_status, ParseStatus::Error);
        assert_eq!(bad.delivery_status, DeliveryStatus::Stopped);
        assert!(bad.config.is_none());

        let good = ops[1].survey();
        assert_eq!(good.parse_status, ParseStatus::Success);
        assert_eq!(good.delivery_status, DeliveryStatus::Launched);
        assert_eq!(good.url_slug.len(), 12);
    }

    #[tokio::test]
    async fn test_deleted_directory_is_marked_not_removed() {
        let (store, engine) = engine();
        let first = SurveysSyncResult {
            surveys: vec![parsed("alpha", config("A", &["q1"]))],
            errors: vec![],
        };
        let report = engine.sync(&first).await.unwrap();
        assert_eq!(report.created, 1);

        let report = engine.sync(&SurveysSyncResult::default()).await.unwrap();
        assert_eq!(report.deleted, 1);

        let alpha = by_name(&store, "alpha").await;
        assert_eq!(alpha.parse_status, ParseStatus::Deleted);
        assert!(alpha.error_log.is_empty());
        assert_eq!(alpha.config.unwrap().title, "A");
        assert_eq!(store.get_surveys().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_parse_error_keeps_previous_config() {
        let (store, engine) = engine();
        engine
            .sync(&SurveysSyncResult {
                surveys: vec![parsed("alpha", config("A", &["q1"]))],
                errors: vec![],
            })
            .await
            .unwrap();
        let slug = by_name(&store, "alpha").await.url_slug;

        engine
            .sync(&SurveysSyncResult {
                surveys: vec![],
                errors: vec![error("alpha", "title is required")],
            })
            .await
            .unwrap();

        let alpha = by_name(&store, "alpha").await;
        assert_eq!(alpha.parse_status, ParseStatus::Error);
        assert_eq!(alpha.error_log, "title is required");
        assert_eq!(alpha.config.unwrap().title, "A");
        assert_eq!(alpha.url_slug, slug);
    }

    #[tokio::test]
    async fn test_reappearing_survey_recovers_and_keeps_question_uuids() {
        let (store, engine) = engine();
        engine
            .sync(&SurveysSyncResult {
                surveys: vec![parsed("alpha", config("A", &["q1", "q2"]))],
                errors: vec![],
            })
            .await
            .unwrap();
        let uuid = by_name(&store, "alpha").await.uuid;
        let before = store.get_survey_questions(&uuid).await.unwrap();

        engine.sync(&SurveysSyncResult::default()).await.unwrap();
        let report = engine
            .sync(&SurveysSyncResult {
                surveys: vec![parsed("alpha", config("A2", &["q2", "q3"]))],
                errors: vec![],
            })
            .await
            .unwrap();
        assert_eq!(report.updated, 1);

        let alpha = by_name(&store, "alpha").await;
        assert_eq!(alpha.parse_status, ParseStatus::Success);
        assert_eq!(alpha.config.unwrap().title, "A2");

        let after = store.get_survey_questions(&uuid).await.unwrap();
        let ids: Vec<&str> = after.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["q2", "q3"]);
        let q2 = |list: &[crate::models::PersistedQuestion]| {
            list.iter().find(|q| q.id == "q2").unwrap().uuid.clone()
        };
        assert_eq!(q2(&before), q2(&after));
    }
}
