use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    DeliveryNote, GatewayPayment, LookupKey, Transaction, TransactionStatus, TransactionUpdate,
    WebhookDelivery, WebhookLogUpdate,
};
use crate::ports::{NotificationDispatcher, RepositoryResult, TransactionStore, WebhookLogStore};
use crate::services::status_mapper::StatusMapper;

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Updated {
        transaction_id: Uuid,
        status: TransactionStatus,
    },
    TransactionNotFound {
        status: TransactionStatus,
    },
    /// Replayed delivery older than the transaction's last change; nothing written.
    Superseded {
        transaction_id: Uuid,
        status: TransactionStatus,
    },
}

impl ReconcileOutcome {
    pub fn status(&self) -> TransactionStatus {
        match self {
            ReconcileOutcome::Updated { status, .. } => *status,
            ReconcileOutcome::TransactionNotFound { status } => *status,
            ReconcileOutcome::Superseded { status, .. } => *status,
        }
    }
}

/// Applies gateway payment events to local transactions.
///
/// Owns the write path to transaction status, method and settlement timestamp.
/// Every update is an unconditional set of computed values, so redelivering the
/// same event leaves the row as it was after the first delivery.
pub struct Reconciler {
    transactions: Arc<dyn TransactionStore>,
    webhook_logs: Arc<dyn WebhookLogStore>,
    mapper: StatusMapper,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl Reconciler {
    pub fn new(
        transactions: Arc<dyn TransactionStore>,
        webhook_logs: Arc<dyn WebhookLogStore>,
        mapper: StatusMapper,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            transactions,
            webhook_logs,
            mapper,
            notifier,
        }
    }

    pub async fn reconcile(
        &self,
        payment: &GatewayPayment,
        delivery_id: Uuid,
    ) -> RepositoryResult<ReconcileOutcome> {
        self.apply(payment, delivery_id, None).await
    }

    /// Reconciles a stored delivery. Unlike a live arrival, it must not roll
    /// back a transaction that moved to a different status after it was received.
    pub async fn reconcile_replay(
        &self,
        payment: &GatewayPayment,
        delivery: &WebhookDelivery,
    ) -> RepositoryResult<ReconcileOutcome> {
        self.apply(payment, delivery.id, Some(delivery.created_at)).await
    }

    async fn apply(
        &self,
        payment: &GatewayPayment,
        delivery_id: Uuid,
        received_at: Option<DateTime<Utc>>,
    ) -> RepositoryResult<ReconcileOutcome> {
        let status = self.mapper.map(&payment.status);

        let Some(existing) = self.lookup(payment).await? else {
            info!(
                payment_id = %payment.id,
                external_reference = ?payment.external_reference,
                gateway_status = %payment.status,
                "Transaction not found for payment"
            );
            self.webhook_logs
                .update_log(delivery_id, &WebhookLogUpdate::unprocessed(DeliveryNote::TransactionNotFound))
                .await?;
            return Ok(ReconcileOutcome::TransactionNotFound { status });
        };

        if let Some(received_at) = received_at {
            if is_superseded(&existing, status, received_at) {
                warn!(
                    transaction_id = %existing.id,
                    payment_id = %payment.id,
                    current = %existing.status,
                    replayed = %status,
                    "Replayed delivery is older than the transaction's last change, skipping"
                );
                self.webhook_logs
                    .update_log(delivery_id, &WebhookLogUpdate::unprocessed(DeliveryNote::Superseded))
                    .await?;
                return Ok(ReconcileOutcome::Superseded {
                    transaction_id: existing.id,
                    status,
                });
            }
        }

        let update = build_update(payment, status);
        let updated = self.transactions.update(existing.id, &update).await?;

        info!(
            transaction_id = %updated.id,
            payment_id = %payment.id,
            from = %existing.status,
            to = %updated.status,
            "Transaction reconciled"
        );

        self.webhook_logs
            .update_log(delivery_id, &WebhookLogUpdate::processed())
            .await?;

        if status == TransactionStatus::Paid {
            self.notifier.dispatch(updated.id);
        }

        Ok(ReconcileOutcome::Updated {
            transaction_id: updated.id,
            status,
        })
    }

    async fn lookup(&self, payment: &GatewayPayment) -> RepositoryResult<Option<Transaction>> {
        match payment.lookup_key() {
            LookupKey::ExternalReference(reference) => {
                self.transactions.find_by_external_reference(reference).await
            }
            LookupKey::GatewayPaymentId(payment_id) => {
                self.transactions.find_by_gateway_payment_id(payment_id).await
            }
        }
    }
}

/// A replay that would land the same status is still applied, so a delivery whose
/// log update failed after the transaction write can finish and notify.
fn is_superseded(existing: &Transaction, status: TransactionStatus, received_at: DateTime<Utc>) -> bool {
    existing.status != status
        && existing.updated_at > existing.created_at
        && existing.updated_at > received_at
}

fn build_update(payment: &GatewayPayment, status: TransactionStatus) -> TransactionUpdate {
    let paid_at = if status == TransactionStatus::Paid {
        payment.settlement_date()
    } else {
        None
    };

    if status == TransactionStatus::Paid && paid_at.is_none() {
        warn!(payment_id = %payment.id, "Paid event without a usable settlement date");
    }

    TransactionUpdate {
        status,
        gateway_payment_id: payment.id.clone(),
        payment_method: payment.payment_method(),
        invoice_url: payment.invoice_url.clone(),
        paid_at,
        updated_at: Utc::now(),
    }
}
