use axum::{
    body::Bytes,
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{Transaction, TransactionStatus};
use crate::error::AppError;
use crate::ports::RepositoryError;
use crate::use_cases::process_webhook::WebhookOutcome;
use crate::services::reconciler::ReconcileOutcome;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TransactionStatus>,
}

impl From<WebhookOutcome> for WebhookResponse {
    fn from(outcome: WebhookOutcome) -> Self {
        let message = match &outcome {
            WebhookOutcome::Reconciled { outcome: ReconcileOutcome::Updated { .. }, .. } => {
                "Webhook processed"
            }
            WebhookOutcome::Reconciled { outcome: ReconcileOutcome::TransactionNotFound { .. }, .. } => {
                "Transaction not found for payment"
            }
            WebhookOutcome::Reconciled { outcome: ReconcileOutcome::Superseded { .. }, .. } => {
                "Superseded by a later update"
            }
            WebhookOutcome::Ignored { .. } => "Webhook received",
        };

        WebhookResponse {
            message,
            event: outcome.event().map(str::to_string),
            status: outcome.status(),
        }
    }
}

/// Gateway payment webhook. Authentication runs in `webhook_auth` before this.
///
/// Anything that does not need a gateway retry is acknowledged with 200; only
/// persistence failures surface as 500 so the gateway redelivers.
pub async fn asaas_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state
        .process_webhook
        .execute(&body)
        .await
        .map_err(AppError::Persistence)?;
    Ok(Json(WebhookResponse::from(outcome)))
}

/// Public status view of a transaction. Payer details are never exposed here.
#[derive(Debug, Serialize)]
pub struct TransactionStatusView {
    pub id: Uuid,
    pub external_reference: String,
    pub status: TransactionStatus,
    pub payment_method: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionStatusView {
    fn from(tx: Transaction) -> Self {
        Self {
            id: tx.id,
            external_reference: tx.external_reference,
            status: tx.status,
            payment_method: tx.payment_method,
            paid_at: tx.paid_at,
            updated_at: tx.updated_at,
        }
    }
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state.transactions.get_by_id(id).await.map_err(|e| match e {
        RepositoryError::NotFound(_) => {
            AppError::NotFound(format!("Transaction {} not found", id))
        }
        other => AppError::Persistence(other),
    })?;

    Ok(Json(TransactionStatusView::from(tx)))
}
