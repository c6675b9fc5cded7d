pub mod memory;
pub mod postgres_transaction_repository;
pub mod postgres_webhook_log_repository;

pub use postgres_transaction_repository::PostgresTransactionStore;
pub use postgres_webhook_log_repository::PostgresWebhookLogStore;
