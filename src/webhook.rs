//! Outbound webhook delivery for completed sessions.
//!
//! The session payload is POSTed as JSON with a hard client timeout. The
//! response status and body are stored for audit. Delivery runs in its own
//! task, so the answer response never waits on it and never sees its errors.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::Span;

use formwork_core::models::{SurveySession, WebhookData};
use formwork_core::store::Store;
use formwork_core::survey_config::WebhookConfig;

pub struct WebhookSender {
    client: reqwest::Client,
    store: Arc<dyn Store>,
    span: Span,
}

impl WebhookSender {
    pub fn new(store: Arc<dyn Store>, timeout: Duration, span: Span) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build webhook HTTP client")?;
        Ok(Self {
            client,
            store,
            span,
        })
    }

    /// Sends one delivery and records the response.
    pub async fn deliver(
        &self,
        webhook: &WebhookConfig,
        session: &SurveySession,
    ) -> Result<WebhookData> {
        let response = self
            .client
            .post(&webhook.url)
            .json(session)
            .send()
            .await
            .with_context(|| format!("webhook request to {} failed", webhook.url))?;

        let status_code = response.status().as_u16();
        let body = response
            .text()
            .await
            .context("unable to read webhook response body")?;

        self.store
            .store_webhook_response(&session.uuid, status_code, &body)
            .await
            .context("unable to store webhook response")?;

        tracing::info!(
            parent: &self.span,
            session_uuid = %session.uuid,
            url = %webhook.url,
            status_code,
            "webhook delivered"
        );
        Ok(WebhookData {
            status_code,
            response: body,
        })
    }

    /// Fire-and-forget [`deliver`](Self::deliver). Failures are logged.
    pub fn spawn(self: &Arc<Self>, webhook: WebhookConfig, session: SurveySession) {
        let sender = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = sender.deliver(&webhook, &session).await {
                tracing::warn!(
                    parent: &sender.span,
                    session_uuid = %session.uuid,
                    url = %webhook.url,
                    error = %format!("{:#}", e),
                    "webhook delivery failed"
                );
            }
        });
    }
}
