//! HTTP clients for the receipt service and the owner directory.

use std::time::Duration;

use async_trait::async_trait;
use ledger_types::domain::{OwnerType, ReceiptDraft};
use ledger_types::ports::{CollaboratorError, OwnerDirectory, OwnerRef, ReceiptService};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::instrument;

use crate::webhooks::map_http_err;

fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

async fn handle_response<T: DeserializeOwned>(resp: Response) -> Result<T, CollaboratorError> {
    let status = resp.status();
    if status.is_success() {
        resp.json()
            .await
            .map_err(|e| CollaboratorError::Rejected(format!("bad response body: {}", e)))
    } else {
        let message = resp.text().await.unwrap_or_default();
        if status.is_client_error() {
            Err(CollaboratorError::Rejected(format!("{} - {}", status, message)))
        } else {
            Err(CollaboratorError::Unavailable(format!("{} - {}", status, message)))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Receipt service
// ─────────────────────────────────────────────────────────────────────────────

/// Receipt service reached over HTTP. Drafts are `PUT` by receipt code so a
/// retried submission updates instead of duplicating.
pub struct HttpReceiptService {
    base_url: String,
    http: Client,
}

#[derive(Deserialize)]
struct ReceiptAck {
    id: String,
}

impl HttpReceiptService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: http_client(timeout),
        }
    }
}

#[async_trait]
impl ReceiptService for HttpReceiptService {
    #[instrument(skip(self, draft), fields(receipt_code = %draft.receipt_code, status = ?draft.status))]
    async fn submit(&self, draft: &ReceiptDraft) -> Result<String, CollaboratorError> {
        let resp = self
            .http
            .put(format!("{}/receipts/{}", self.base_url, draft.receipt_code))
            .json(draft)
            .send()
            .await
            .map_err(map_http_err)?;
        let ack: ReceiptAck = handle_response(resp).await?;
        Ok(ack.id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Owner directory
// ─────────────────────────────────────────────────────────────────────────────

/// Owner directory reached over HTTP: `GET /owners?type=&offset=&limit=`.
pub struct HttpOwnerDirectory {
    base_url: String,
    http: Client,
}

#[derive(Deserialize)]
struct OwnerPage {
    owners: Vec<OwnerRow>,
}

#[derive(Deserialize)]
struct OwnerRow {
    id: String,
}

impl HttpOwnerDirectory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: http_client(timeout),
        }
    }
}

#[async_trait]
impl OwnerDirectory for HttpOwnerDirectory {
    #[instrument(skip(self))]
    async fn list_owners(
        &self,
        owner_type: OwnerType,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<OwnerRef>, CollaboratorError> {
        let resp = self
            .http
            .get(format!("{}/owners", self.base_url))
            .query(&[
                ("type", owner_type.as_str().to_string()),
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .map_err(map_http_err)?;
        let page: OwnerPage = handle_response(resp).await?;

        Ok(page
            .owners
            .into_iter()
            .map(|row| OwnerRef {
                owner_id: row.id,
                owner_type,
            })
            .collect())
    }
}
