//! Webhook delivery of transaction events.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ledger_types::domain::TransactionEvent;
use ledger_types::ports::{CollaboratorError, EventSink};
use tracing::{debug, instrument};

use crate::security::{SIGNATURE_HEADER, TIMESTAMP_HEADER, sign_webhook};

/// Posts each event as JSON to a fixed URL, signed when a secret is set.
pub struct WebhookSink {
    client: reqwest::Client,
    target_url: String,
    secret: Option<String>,
}

impl WebhookSink {
    pub fn new(target_url: impl Into<String>, secret: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            target_url: target_url.into(),
            secret,
        }
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }
}

pub(crate) fn map_http_err(e: reqwest::Error) -> CollaboratorError {
    if e.is_timeout() {
        CollaboratorError::Timeout
    } else {
        CollaboratorError::Unavailable(e.to_string())
    }
}

#[async_trait]
impl EventSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    #[instrument(skip(self, event), fields(receipt_code = %event.receipt_code, event_type = %event.event_type))]
    async fn deliver(&self, event: &TransactionEvent) -> Result<(), CollaboratorError> {
        let body = serde_json::to_vec(event)
            .map_err(|e| CollaboratorError::Rejected(format!("unserializable event: {}", e)))?;

        let mut request = self
            .client
            .post(&self.target_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");

        if let Some(secret) = &self.secret {
            let timestamp = Utc::now().timestamp();
            let signature = sign_webhook(&body, timestamp, secret)
                .map_err(|e| CollaboratorError::Rejected(e.to_string()))?;
            request = request
                .header(TIMESTAMP_HEADER, timestamp.to_string())
                .header(SIGNATURE_HEADER, signature);
        }

        let resp = request.body(body).send().await.map_err(map_http_err)?;
        let status = resp.status();

        if status.is_success() {
            debug!(%status, "webhook delivered");
            Ok(())
        } else if status.is_client_error() {
            Err(CollaboratorError::Rejected(format!("HTTP {}", status)))
        } else {
            Err(CollaboratorError::Unavailable(format!("HTTP {}", status)))
        }
    }
}
