//! Process webhook use case.
//! Pipeline entry point: records the delivery, then hands payment events to the reconciler.

use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::{
    DeliveryNote, GatewayWebhook, TransactionStatus, WebhookDelivery, WebhookLogUpdate,
};
use crate::ports::{RepositoryResult, WebhookLogStore};
use crate::services::reconciler::{ReconcileOutcome, Reconciler};

/// Result of one webhook delivery. Every variant is acknowledged to the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    Reconciled {
        event: String,
        outcome: ReconcileOutcome,
    },
    /// Nothing to act on: no payment object, or the body was not JSON.
    Ignored {
        event: Option<String>,
        reason: DeliveryNote,
    },
}

impl WebhookOutcome {
    pub fn event(&self) -> Option<&str> {
        match self {
            WebhookOutcome::Reconciled { event, .. } => Some(event),
            WebhookOutcome::Ignored { event, .. } => event.as_deref(),
        }
    }

    pub fn status(&self) -> Option<TransactionStatus> {
        match self {
            WebhookOutcome::Reconciled { outcome, .. } => Some(outcome.status()),
            WebhookOutcome::Ignored { .. } => None,
        }
    }
}

pub struct ProcessWebhook {
    webhook_logs: Arc<dyn WebhookLogStore>,
    reconciler: Arc<Reconciler>,
}

impl ProcessWebhook {
    pub fn new(webhook_logs: Arc<dyn WebhookLogStore>, reconciler: Arc<Reconciler>) -> Self {
        Self {
            webhook_logs,
            reconciler,
        }
    }

    /// Handles an authenticated raw body. The delivery is logged before any
    /// reconciliation so a crash midway leaves the payload behind.
    pub async fn execute(&self, raw_body: &[u8]) -> RepositoryResult<WebhookOutcome> {
        let payload: serde_json::Value = match serde_json::from_slice(raw_body) {
            Ok(value) => value,
            Err(e) => return self.record_unparseable(raw_body, &e).await,
        };

        let webhook: GatewayWebhook = match serde_json::from_value(payload.clone()) {
            Ok(webhook) => webhook,
            Err(e) => return self.record_unparseable(raw_body, &e).await,
        };

        let delivery = self
            .webhook_logs
            .insert_log(&WebhookDelivery::received(&webhook, payload))
            .await?;

        info!(
            delivery_id = %delivery.id,
            event = %webhook.event,
            idempotency_key = %delivery.idempotency_key,
            "Webhook received"
        );

        self.process(webhook, &delivery, false).await
    }

    /// Reprocesses a stored delivery from its verbatim payload without logging it again.
    pub async fn replay(&self, delivery: &WebhookDelivery) -> RepositoryResult<WebhookOutcome> {
        match serde_json::from_value::<GatewayWebhook>(delivery.payload.clone()) {
            Ok(webhook) => self.process(webhook, delivery, true).await,
            Err(e) => {
                warn!(delivery_id = %delivery.id, error = %e, "Stored payload is not a gateway webhook");
                self.webhook_logs
                    .update_log(delivery.id, &WebhookLogUpdate::unprocessed(DeliveryNote::UnparseablePayload))
                    .await?;
                Ok(WebhookOutcome::Ignored {
                    event: Some(delivery.event_type.clone()),
                    reason: DeliveryNote::UnparseablePayload,
                })
            }
        }
    }

    async fn process(
        &self,
        webhook: GatewayWebhook,
        delivery: &WebhookDelivery,
        replayed: bool,
    ) -> RepositoryResult<WebhookOutcome> {
        let Some(payment) = webhook.payment.as_ref() else {
            info!(delivery_id = %delivery.id, event = %webhook.event, "Webhook without payment data, ignoring");
            self.webhook_logs
                .update_log(delivery.id, &WebhookLogUpdate::unprocessed(DeliveryNote::NoPayment))
                .await?;
            return Ok(WebhookOutcome::Ignored {
                event: Some(webhook.event),
                reason: DeliveryNote::NoPayment,
            });
        };

        let outcome = if replayed {
            self.reconciler.reconcile_replay(payment, delivery).await?
        } else {
            self.reconciler.reconcile(payment, delivery.id).await?
        };

        Ok(WebhookOutcome::Reconciled {
            event: webhook.event,
            outcome,
        })
    }

    async fn record_unparseable(
        &self,
        raw_body: &[u8],
        error: &serde_json::Error,
    ) -> RepositoryResult<WebhookOutcome> {
        let raw = String::from_utf8_lossy(raw_body);
        warn!(error = %error, body_size = raw_body.len(), "Malformed webhook payload, acknowledging without action");

        self.webhook_logs
            .insert_log(&WebhookDelivery::unparseable(&raw))
            .await?;

        Ok(WebhookOutcome::Ignored {
            event: None,
            reason: DeliveryNote::UnparseablePayload,
        })
    }
}
