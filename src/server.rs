//! HTTP server for survey administration and respondents.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Health check (returns version) |
//! | `GET` | `/app/surveys` | All surveys with session stats |
//! | `PATCH` | `/app/surveys/{survey_uuid}` | Set delivery status |
//! | `GET` | `/app/surveys/{survey_uuid}/sessions` | Paged sessions with answers |
//! | `POST` | `/app/surveys/sync` | Resync surveys from disk |
//! | `GET` | `/surveys/{url_slug}` | Live survey with question UUIDs |
//! | `GET` | `/surveys/{url_slug}/css` | Survey theme stylesheet |
//! | `PUT` | `/surveys/{url_slug}/sessions` | Start a session |
//! | `GET` | `/surveys/{url_slug}/sessions/{session_uuid}` | Session with answers |
//! | `POST` | `/surveys/{url_slug}/sessions/{session_uuid}/questions/{question_uuid}/answers` | Submit an answer |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid answer", "details": "value must be at most 5" } }
//! ```
//!
//! Error codes: `bad_request` (400), `forbidden` (403), `not_found` (404),
//! `internal` (500). `details` is present only when there is a reason
//! behind a deliberately generic message.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, ConnectInfo, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::Span;

use formwork_core::models::{DeliveryStatus, Survey, SurveyField, SurveySession, SurveySessionsQuery};
use formwork_core::sessions::{SessionEngine, SessionsPage};
use formwork_core::store::Store;
use formwork_core::sync::SyncReport;
use formwork_core::SurveyError;

use crate::backend;
use crate::config::Config;
use crate::resync::{self, Resyncer};
use crate::webhook::WebhookSender;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    sessions: Arc<SessionEngine>,
    resyncer: Arc<Resyncer>,
    webhooks: Arc<WebhookSender>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        resyncer: Arc<Resyncer>,
        webhook_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let root = Span::current();
        Ok(Self {
            sessions: Arc::new(SessionEngine::new(
                store.clone(),
                tracing::info_span!(parent: &root, "sessions"),
            )),
            resyncer,
            webhooks: Arc::new(WebhookSender::new(
                store,
                webhook_timeout,
                tracing::info_span!(parent: &root, "webhook"),
            )?),
        })
    }
}

/// Starts the HTTP server.
///
/// Opens the configured store, runs an initial resync, starts the watcher
/// when `[surveys].watch` is set, then serves on `[server].bind` until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = backend::open_store(config).await?;
    let resyncer = Arc::new(Resyncer::new(
        &config.surveys.root,
        store.clone(),
        tracing::info_span!("resync"),
    ));

    let report = resyncer.resync().await?;
    tracing::info!(
        created = report.created,
        updated = report.updated,
        deleted = report.deleted,
        parse_errors = report.parse_errors.len(),
        "initial survey sync done"
    );

    let _watcher = if config.surveys.watch {
        Some(resync::watch(
            resyncer.clone(),
            Duration::from_millis(config.surveys.debounce_ms),
        )?)
    } else {
        None
    };

    let state = AppState::new(
        store,
        resyncer,
        Duration::from_secs(config.webhook.timeout_secs),
    )?;

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "formwork listening");
    serve(listener, state).await
}

/// Serves [`router`] on an already-bound listener, with peer addresses
/// available to handlers.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_health))
        .route("/app/surveys", get(handle_list_surveys))
        .route("/app/surveys/sync", post(handle_sync))
        .route("/app/surveys/{survey_uuid}", patch(handle_update_survey))
        .route("/app/surveys/{survey_uuid}/sessions", get(handle_list_sessions))
        .route("/surveys/{url_slug}", get(handle_get_survey))
        .route("/surveys/{url_slug}/css", get(handle_get_css))
        .route("/surveys/{url_slug}/sessions", put(handle_create_session))
        .route(
            "/surveys/{url_slug}/sessions/{session_uuid}",
            get(handle_get_session),
        )
        .route(
            "/surveys/{url_slug}/sessions/{session_uuid}/questions/{question_uuid}/answers",
            post(handle_submit_answer),
        )
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

/// Internal error type that converts into an Axum HTTP response.
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
                details: self.details,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
        details: None,
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
        details: None,
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
        details: None,
    }
}

impl From<SurveyError> for AppError {
    fn from(err: SurveyError) -> Self {
        match err {
            SurveyError::Validation { message, details } => AppError {
                details,
                ..bad_request(message)
            },
            SurveyError::Parse { .. } => bad_request(err.to_string()),
            SurveyError::NotFound(message) => not_found(message),
            SurveyError::Conflict(message) => AppError {
                status: StatusCode::FORBIDDEN,
                code: "forbidden".to_string(),
                message,
                details: None,
            },
            SurveyError::Persistence(message) => internal(message),
        }
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|_| bad_request("invalid request format"))
}

/// First `X-Forwarded-For` hop when present, otherwise the peer address.
fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| peer.ip().to_string())
}

// ============ GET / ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Admin ============

async fn handle_list_surveys(State(state): State<AppState>) -> Result<Json<Vec<Survey>>, AppError> {
    Ok(Json(state.sessions.list_surveys().await?))
}

#[derive(Deserialize)]
struct UpdateSurveyRequest {
    delivery_status: DeliveryStatus,
}

async fn handle_update_survey(
    State(state): State<AppState>,
    Path(survey_uuid): Path<String>,
    body: Bytes,
) -> Result<Json<Survey>, AppError> {
    let request: UpdateSurveyRequest = parse_body(&body)?;
    let survey = state
        .sessions
        .update_delivery_status(&survey_uuid, request.delivery_status)
        .await?;
    Ok(Json(survey))
}

async fn handle_list_sessions(
    State(state): State<AppState>,
    Path(survey_uuid): Path<String>,
    query: Result<Query<SurveySessionsQuery>, QueryRejection>,
) -> Result<Json<SessionsPage>, AppError> {
    let Query(query) = query.map_err(|e| bad_request(e.body_text()))?;
    let survey = state
        .sessions
        .get_survey(SurveyField::Uuid, &survey_uuid)
        .await?;
    Ok(Json(state.sessions.get_sessions(&survey, &query).await?))
}

async fn handle_sync(State(state): State<AppState>) -> Result<Json<SyncReport>, AppError> {
    let report = state.resyncer.resync().await.map_err(|e| {
        tracing::error!(error = %format!("{:#}", e), "on-demand resync failed");
        internal("unable to sync surveys")
    })?;
    Ok(Json(report))
}

// ============ Respondent ============

async fn handle_get_survey(
    State(state): State<AppState>,
    Path(url_slug): Path<String>,
) -> Result<Json<Survey>, AppError> {
    Ok(Json(state.sessions.get_live_survey(&url_slug).await?))
}

async fn handle_get_css(
    State(state): State<AppState>,
    Path(url_slug): Path<String>,
) -> Result<Response, AppError> {
    let survey = state.sessions.get_live_survey(&url_slug).await?;
    let css = survey
        .config
        .and_then(|c| c.theme_css)
        .ok_or_else(|| not_found("theme not found"))?;
    Ok(([(header::CONTENT_TYPE, "text/css; charset=utf-8")], css).into_response())
}

async fn handle_create_session(
    State(state): State<AppState>,
    Path(url_slug): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<SurveySession>), AppError> {
    let survey = state.sessions.get_live_survey(&url_slug).await?;
    let ip = client_ip(&headers, peer);
    let session = state.sessions.create_session(&survey, Some(&ip)).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn handle_get_session(
    State(state): State<AppState>,
    Path((url_slug, session_uuid)): Path<(String, String)>,
) -> Result<Json<SurveySession>, AppError> {
    let survey = state.sessions.get_live_survey(&url_slug).await?;
    Ok(Json(state.sessions.get_session(&survey, &session_uuid).await?))
}

async fn handle_submit_answer(
    State(state): State<AppState>,
    Path((url_slug, session_uuid, question_uuid)): Path<(String, String, String)>,
    body: Bytes,
) -> Result<Json<SurveySession>, AppError> {
    let survey = state.sessions.get_live_survey(&url_slug).await?;
    let submitted = state
        .sessions
        .submit_answer(&survey, &session_uuid, &question_uuid, &body)
        .await?;

    if submitted.completed_now {
        if let Some(webhook) = survey.config.as_ref().and_then(|c| c.webhook.clone()) {
            state.webhooks.spawn(webhook, submitted.session.clone());
        }
    }
    Ok(Json(submitted.session))
}
