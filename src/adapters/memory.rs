//! In-memory stores and a recording notifier.
//! Used by the test suite and for running the pipeline without a database.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::webhook::UNPARSEABLE_EVENT;
use crate::domain::{DeliveryNote, Transaction, TransactionUpdate, WebhookDelivery, WebhookLogUpdate};
use crate::ports::{
    NotificationDispatcher, RepositoryError, RepositoryResult, TransactionStore, WebhookLogStore,
};

fn unavailable(store: &str) -> RepositoryError {
    RepositoryError::Unavailable(format!("{store} is failing (injected)"))
}

#[derive(Default)]
pub struct InMemoryTransactionStore {
    rows: RwLock<HashMap<Uuid, Transaction>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, tx: Transaction) {
        self.rows.write().await.insert(tx.id, tx);
    }

    /// Inserts and updates performed through the port, excluding `seed`.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub async fn snapshot(&self) -> Vec<Transaction> {
        self.rows.read().await.values().cloned().collect()
    }

    async fn find_by<F>(&self, predicate: F) -> RepositoryResult<Option<Transaction>>
    where
        F: Fn(&Transaction) -> bool,
    {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(unavailable("transaction store"));
        }
        Ok(self.rows.read().await.values().find(|tx| predicate(tx)).cloned())
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn find_by_external_reference(&self, reference: &str) -> RepositoryResult<Option<Transaction>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(unavailable("transaction store"));
        }
        let rows = self.rows.read().await;
        let mut matches = rows.values().filter(|tx| tx.external_reference == reference);
        let first = matches.next().cloned();
        if matches.next().is_some() {
            return Err(RepositoryError::Ambiguous(format!("external_reference = {reference}")));
        }
        Ok(first)
    }

    async fn find_by_gateway_payment_id(&self, payment_id: &str) -> RepositoryResult<Option<Transaction>> {
        self.find_by(|tx| tx.gateway_payment_id.as_deref() == Some(payment_id))
            .await
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Transaction> {
        self.find_by(|tx| tx.id == id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(unavailable("transaction store"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.rows.write().await.insert(tx.id, tx.clone());
        Ok(tx.clone())
    }

    async fn update(&self, id: Uuid, update: &TransactionUpdate) -> RepositoryResult<Transaction> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(unavailable("transaction store"));
        }
        let mut rows = self.rows.write().await;
        let tx = rows
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        tx.apply(update);
        Ok(tx.clone())
    }

    async fn ping(&self) -> RepositoryResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(unavailable("transaction store"));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryWebhookLogStore {
    entries: RwLock<Vec<WebhookDelivery>>,
    writes: AtomicUsize,
    fail_inserts: AtomicBool,
    fail_updates: AtomicBool,
}

impl InMemoryWebhookLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub async fn entries(&self) -> Vec<WebhookDelivery> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl WebhookLogStore for InMemoryWebhookLogStore {
    async fn insert_log(&self, delivery: &WebhookDelivery) -> RepositoryResult<WebhookDelivery> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(unavailable("webhook log store"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.entries.write().await.push(delivery.clone());
        Ok(delivery.clone())
    }

    async fn update_log(&self, id: Uuid, update: &WebhookLogUpdate) -> RepositoryResult<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(unavailable("webhook log store"));
        }
        let mut entries = self.entries.write().await;
        let entry = entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;

        self.writes.fetch_add(1, Ordering::SeqCst);
        entry.processed = update.processed;
        entry.note = update.note.map(|n| n.as_str().to_string());
        if update.processed {
            entry.processed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn list_unprocessed(&self, limit: i64) -> RepositoryResult<Vec<WebhookDelivery>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|entry| !entry.processed && entry.event_type != UNPARSEABLE_EVENT)
            .filter(|entry| {
                !DeliveryNote::TERMINAL
                    .iter()
                    .any(|note| entry.note.as_deref() == Some(note.as_str()))
            })
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Dispatcher that records every transaction id handed to it.
#[derive(Default)]
pub struct RecordingNotifier {
    dispatched: Mutex<Vec<Uuid>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatched(&self) -> Vec<Uuid> {
        self.dispatched
            .lock()
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }
}

impl NotificationDispatcher for RecordingNotifier {
    fn dispatch(&self, transaction_id: Uuid) {
        if let Ok(mut ids) = self.dispatched.lock() {
            ids.push(transaction_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TransactionStatus;

    #[tokio::test]
    async fn test_lookup_by_both_keys() {
        let store = InMemoryTransactionStore::new();
        let tx = Transaction::new_pending(Uuid::new_v4(), "svc-9", 500).with_gateway_payment_id("pay_9");
        store.seed(tx.clone()).await;

        let by_ref = store.find_by_external_reference("svc-9").await.unwrap();
        let by_pay = store.find_by_gateway_payment_id("pay_9").await.unwrap();
        assert_eq!(by_ref.map(|t| t.id), Some(tx.id));
        assert_eq!(by_pay.map(|t| t.id), Some(tx.id));
        assert!(store.find_by_external_reference("svc-0").await.unwrap().is_none());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_update_missing_row_is_not_found() {
        let store = InMemoryTransactionStore::new();
        let update = TransactionUpdate {
            status: TransactionStatus::Paid,
            gateway_payment_id: "pay_1".to_string(),
            payment_method: None,
            invoice_url: None,
            paid_at: None,
            updated_at: Utc::now(),
        };
        let result = store.update(Uuid::new_v4(), &update).await;
        assert!(matches!(result, Err(RepositoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let logs = InMemoryWebhookLogStore::new();
        logs.fail_inserts(true);
        let delivery = WebhookDelivery::unparseable("{");
        assert!(matches!(
            logs.insert_log(&delivery).await,
            Err(RepositoryError::Unavailable(_))
        ));
        assert!(logs.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_list_unprocessed_skips_unparseable() {
        let logs = InMemoryWebhookLogStore::new();
        logs.insert_log(&WebhookDelivery::unparseable("nope")).await.unwrap();
        assert!(logs.list_unprocessed(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shared_reference_is_ambiguous() {
        let store = InMemoryTransactionStore::new();
        store.seed(Transaction::new_pending(Uuid::new_v4(), "svc-dup", 500)).await;
        store.seed(Transaction::new_pending(Uuid::new_v4(), "svc-dup", 700)).await;

        assert!(matches!(
            store.find_by_external_reference("svc-dup").await,
            Err(RepositoryError::Ambiguous(_))
        ));
    }

    #[tokio::test]
    async fn test_list_unprocessed_skips_terminal_notes() {
        let logs = InMemoryWebhookLogStore::new();
        let webhook: crate::domain::GatewayWebhook =
            serde_json::from_value(serde_json::json!({"event": "ACCOUNT_STATUS_UPDATED"})).unwrap();

        let mut ids = Vec::new();
        for _ in 0..3 {
            let delivery = WebhookDelivery::received(&webhook, serde_json::json!({}));
            ids.push(logs.insert_log(&delivery).await.unwrap().id);
        }
        logs.update_log(ids[0], &WebhookLogUpdate::unprocessed(DeliveryNote::NoPayment)).await.unwrap();
        logs.update_log(ids[1], &WebhookLogUpdate::unprocessed(DeliveryNote::Superseded)).await.unwrap();
        logs.update_log(ids[2], &WebhookLogUpdate::unprocessed(DeliveryNote::TransactionNotFound))
            .await
            .unwrap();

        let pending = logs.list_unprocessed(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, ids[2]);
    }
}
