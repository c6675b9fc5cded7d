use anyhow::{Context, Result};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::adapters::{PostgresTransactionStore, PostgresWebhookLogStore};
use crate::config::{Config, LogFormat};
use crate::middleware::request_logger::RequestLogConfig;
use crate::services::notification::{NotificationQueue, PlatformFunctionNotifier};
use crate::services::status_mapper::StatusMapper;
use crate::AppState;

pub fn init_tracing(format: &LogFormat) {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

pub async fn create_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    let migrator = Migrator::new(Path::join(Path::new(env!("CARGO_MANIFEST_DIR")), "migrations"))
        .await
        .context("Failed to load migrations")?;
    migrator.run(pool).await.context("Failed to run migrations")?;
    tracing::info!("Database migrations completed");
    Ok(())
}

/// Builds the application state over Postgres and spawns the notification worker.
pub fn build_state(config: &Config, pool: PgPool) -> Result<(AppState, JoinHandle<()>)> {
    let mapper = StatusMapper::load(config.status_map_path.as_deref())
        .context("Failed to load status map")?;
    tracing::info!(entries = mapper.len(), "Status map loaded");

    let notifier = Arc::new(PlatformFunctionNotifier::new(
        config.platform_url.clone(),
        config.platform_service_key.clone(),
        config.notification_function.clone(),
    ));
    let (queue, worker) = NotificationQueue::spawn(notifier, config.notification_queue_capacity);

    let authenticator = config.webhook_authenticator();
    if !authenticator.is_enforcing() {
        tracing::warn!("No webhook token or signature secret configured, webhook authentication is disabled");
    }

    let state = AppState::new(
        Arc::new(PostgresTransactionStore::new(pool.clone())),
        Arc::new(PostgresWebhookLogStore::new(pool)),
        mapper,
        Arc::new(queue),
        authenticator,
    )
    .with_request_log(RequestLogConfig {
        log_body: config.log_request_body,
    });

    Ok((state, worker))
}

pub fn validate_config(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.platform_service_key.is_empty() {
        anyhow::bail!("SUPABASE_SERVICE_ROLE_KEY is empty");
    }
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if config.notification_queue_capacity == 0 {
        anyhow::bail!("NOTIFICATION_QUEUE_CAPACITY must be greater than 0");
    }

    url::Url::parse(&config.platform_url).context("SUPABASE_URL is not a valid URL")?;

    StatusMapper::load(config.status_map_path.as_deref()).context("STATUS_MAP_PATH is invalid")?;

    Ok(())
}

pub async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}
