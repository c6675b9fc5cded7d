//! Postgres implementation of TransactionStore.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{Transaction, TransactionStatus, TransactionUpdate};
use crate::ports::{RepositoryError, RepositoryResult, TransactionStore};

const TRANSACTION_COLUMNS: &str = r#"
    id, user_id, service_id, external_reference, gateway_payment_id,
    amount_cents, fee_cents, net_cents, status, payment_method, invoice_url,
    payer_name, payer_email, paid_at, created_at, updated_at
"#;

/// Postgres-backed transaction repository.
#[derive(Clone)]
pub struct PostgresTransactionStore {
    pool: PgPool,
}

impl PostgresTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// At most one row may match; a second one is an error rather than an arbitrary pick.
    async fn find_one(&self, column: &str, value: &str) -> RepositoryResult<Option<Transaction>> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE {column} = $1 LIMIT 2");
        let mut rows = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(value)
            .fetch_all(&self.pool)
            .await?;

        if rows.len() > 1 {
            return Err(RepositoryError::Ambiguous(format!("{column} = {value}")));
        }
        rows.pop().map(TransactionRow::into_domain).transpose()
    }
}

#[async_trait]
impl TransactionStore for PostgresTransactionStore {
    async fn find_by_external_reference(&self, reference: &str) -> RepositoryResult<Option<Transaction>> {
        self.find_one("external_reference", reference).await
    }

    async fn find_by_gateway_payment_id(&self, payment_id: &str) -> RepositoryResult<Option<Transaction>> {
        self.find_one("gateway_payment_id", payment_id).await
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Transaction> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1");
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| RepositoryError::NotFound(id.to_string()))?
            .into_domain()
    }

    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let sql = format!(
            r#"
            INSERT INTO transactions (
                id, user_id, service_id, external_reference, gateway_payment_id,
                amount_cents, fee_cents, net_cents, status, payment_method, invoice_url,
                payer_name, payer_email, paid_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING {TRANSACTION_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(tx.id)
            .bind(tx.user_id)
            .bind(tx.service_id)
            .bind(&tx.external_reference)
            .bind(&tx.gateway_payment_id)
            .bind(tx.amount_cents)
            .bind(tx.fee_cents)
            .bind(tx.net_cents)
            .bind(tx.status.as_str())
            .bind(&tx.payment_method)
            .bind(&tx.invoice_url)
            .bind(&tx.payer_name)
            .bind(&tx.payer_email)
            .bind(tx.paid_at)
            .bind(tx.created_at)
            .bind(tx.updated_at)
            .fetch_one(&self.pool)
            .await?;

        row.into_domain()
    }

    async fn update(&self, id: Uuid, update: &TransactionUpdate) -> RepositoryResult<Transaction> {
        // Amount columns are never touched; paid_at is never cleared.
        let sql = format!(
            r#"
            UPDATE transactions SET
                status = $2,
                gateway_payment_id = $3,
                payment_method = COALESCE($4, payment_method),
                invoice_url = COALESCE($5, invoice_url),
                paid_at = COALESCE($6, paid_at),
                updated_at = $7
            WHERE id = $1
            RETURNING {TRANSACTION_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(id)
            .bind(update.status.as_str())
            .bind(&update.gateway_payment_id)
            .bind(&update.payment_method)
            .bind(&update.invoice_url)
            .bind(update.paid_at)
            .bind(update.updated_at)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| RepositoryError::NotFound(id.to_string()))?
            .into_domain()
    }

    async fn ping(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    user_id: Uuid,
    service_id: Option<Uuid>,
    external_reference: String,
    gateway_payment_id: Option<String>,
    amount_cents: i64,
    fee_cents: i64,
    net_cents: i64,
    status: String,
    payment_method: Option<String>,
    invoice_url: Option<String>,
    payer_name: Option<String>,
    payer_email: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> RepositoryResult<Transaction> {
        let status = self
            .status
            .parse::<TransactionStatus>()
            .map_err(|e| RepositoryError::Database(sqlx::Error::Decode(Box::new(e))))?;

        Ok(Transaction {
            id: self.id,
            user_id: self.user_id,
            service_id: self.service_id,
            external_reference: self.external_reference,
            gateway_payment_id: self.gateway_payment_id,
            amount_cents: self.amount_cents,
            fee_cents: self.fee_cents,
            net_cents: self.net_cents,
            status,
            payment_method: self.payment_method,
            invoice_url: self.invoice_url,
            payer_name: self.payer_name,
            payer_email: self.payer_email,
            paid_at: self.paid_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
