//! Postgres implementation of WebhookLogStore.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::webhook::UNPARSEABLE_EVENT;
use crate::domain::{DeliveryNote, WebhookDelivery, WebhookLogUpdate};
use crate::ports::{RepositoryError, RepositoryResult, WebhookLogStore};

#[derive(Clone)]
pub struct PostgresWebhookLogStore {
    pool: PgPool,
}

impl PostgresWebhookLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookLogStore for PostgresWebhookLogStore {
    async fn insert_log(&self, delivery: &WebhookDelivery) -> RepositoryResult<WebhookDelivery> {
        let row = sqlx::query_as::<_, WebhookLogRow>(
            r#"
            INSERT INTO webhook_logs (
                id, event_type, payload, idempotency_key, processed, note, created_at, processed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(delivery.id)
        .bind(&delivery.event_type)
        .bind(&delivery.payload)
        .bind(&delivery.idempotency_key)
        .bind(delivery.processed)
        .bind(&delivery.note)
        .bind(delivery.created_at)
        .bind(delivery.processed_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_domain())
    }

    async fn update_log(&self, id: Uuid, update: &WebhookLogUpdate) -> RepositoryResult<()> {
        let processed_at = update.processed.then(Utc::now);
        let result = sqlx::query(
            r#"
            UPDATE webhook_logs
            SET processed = $2, note = $3, processed_at = COALESCE($4, processed_at)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(update.processed)
        .bind(update.note.map(|n| n.as_str()))
        .bind(processed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_unprocessed(&self, limit: i64) -> RepositoryResult<Vec<WebhookDelivery>> {
        let rows = sqlx::query_as::<_, WebhookLogRow>(
            r#"
            SELECT * FROM webhook_logs
            WHERE processed = FALSE
              AND event_type <> $1
              AND (note IS NULL OR NOT (note = ANY($2)))
            ORDER BY created_at ASC
            LIMIT $3
            "#,
        )
        .bind(UNPARSEABLE_EVENT)
        .bind(DeliveryNote::TERMINAL.iter().map(DeliveryNote::as_str).collect::<Vec<_>>())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(WebhookLogRow::into_domain).collect())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WebhookLogRow {
    id: Uuid,
    event_type: String,
    payload: serde_json::Value,
    idempotency_key: String,
    processed: bool,
    note: Option<String>,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl WebhookLogRow {
    fn into_domain(self) -> WebhookDelivery {
        WebhookDelivery {
            id: self.id,
            event_type: self.event_type,
            payload: self.payload,
            idempotency_key: self.idempotency_key,
            processed: self.processed,
            note: self.note,
            created_at: self.created_at,
            processed_at: self.processed_at,
        }
    }
}
