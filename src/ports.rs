//! Ports the webhook pipeline depends on.
//! Stores and the notification collaborator are injected as trait objects so the
//! pipeline runs unchanged against Postgres or the in-memory fakes.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Transaction, TransactionUpdate, WebhookDelivery, WebhookLogUpdate};

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("More than one transaction matches {0}")]
    Ambiguous(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn find_by_external_reference(&self, reference: &str) -> RepositoryResult<Option<Transaction>>;

    async fn find_by_gateway_payment_id(&self, payment_id: &str) -> RepositoryResult<Option<Transaction>>;

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Transaction>;

    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction>;

    /// Single-row unconditional set scoped by primary key.
    async fn update(&self, id: Uuid, update: &TransactionUpdate) -> RepositoryResult<Transaction>;

    async fn ping(&self) -> RepositoryResult<()>;
}

#[async_trait]
pub trait WebhookLogStore: Send + Sync {
    async fn insert_log(&self, delivery: &WebhookDelivery) -> RepositoryResult<WebhookDelivery>;

    async fn update_log(&self, id: Uuid, update: &WebhookLogUpdate) -> RepositoryResult<()>;

    /// Oldest first. Skips bodies that were never parseable and rows carrying a terminal note.
    async fn list_unprocessed(&self, limit: i64) -> RepositoryResult<Vec<WebhookDelivery>>;
}

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Notification rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

/// The payment notification collaborator, invoked by transaction id.
#[async_trait]
pub trait PaymentNotifier: Send + Sync {
    async fn notify_payment(&self, transaction_id: Uuid) -> Result<(), NotificationError>;
}

/// Fire-and-forget hand-off used on the webhook path. Never blocks, never fails the caller.
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, transaction_id: Uuid);
}
