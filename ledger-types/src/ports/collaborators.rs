//! Ports for the services the ledger talks to but does not own.

use crate::domain::{OwnerType, ReceiptDraft, TransactionEvent};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("Collaborator timed out")]
    Timeout,

    #[error("Collaborator rejected the request: {0}")]
    Rejected(String),
}

/// An owner known to the identity services.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OwnerRef {
    pub owner_id: String,
    pub owner_type: OwnerType,
}

/// Source of users and partners for seeding.
#[async_trait::async_trait]
pub trait OwnerDirectory: Send + Sync {
    /// One page of owners of the given type. An empty page ends the listing.
    async fn list_owners(
        &self,
        owner_type: OwnerType,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<OwnerRef>, CollaboratorError>;
}

/// Receipt persistence owned by another service.
#[async_trait::async_trait]
pub trait ReceiptService: Send + Sync {
    /// Submits or updates the receipt for `draft.receipt_code`; returns the
    /// service's own receipt reference.
    async fn submit(&self, draft: &ReceiptDraft) -> Result<String, CollaboratorError>;
}

/// Downstream consumer of transaction events.
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, event: &TransactionEvent) -> Result<(), CollaboratorError>;
}
