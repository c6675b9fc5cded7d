use clap::Parser;
use std::net::SocketAddr;
use tokio::net::TcpListener;

use viveo_core::adapters::PostgresTransactionStore;
use viveo_core::cli::{self, Cli, Commands, DbCommands, TxCommands, WebhookCommands};
use viveo_core::config::Config;
use viveo_core::{create_app, startup};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env()?;
    startup::init_tracing(&config.log_format);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Config => {
            cli::handle_config_validate(&config)?;
            let pool = startup::create_pool(&config).await?;
            startup::validate_database(&pool).await?;
            println!("✓ Database reachable and migrated");
            Ok(())
        }
        Commands::Db(DbCommands::Migrate) => {
            let pool = startup::create_pool(&config).await?;
            cli::handle_db_migrate(&pool).await
        }
        Commands::Tx(TxCommands::Show { tx_id }) => {
            let pool = startup::create_pool(&config).await?;
            cli::handle_tx_show(&PostgresTransactionStore::new(pool), tx_id).await
        }
        Commands::Webhooks(WebhookCommands::Replay { limit }) => {
            let pool = startup::create_pool(&config).await?;
            let (state, worker) = startup::build_state(&config, pool.clone())?;
            cli::handle_webhooks_replay(state.webhook_logs.as_ref(), &state.process_webhook, limit)
                .await?;

            // Let queued notifications drain before exiting.
            drop(state);
            worker.await?;
            Ok(())
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = startup::create_pool(&config).await?;
    startup::run_migrations(&pool).await?;

    let (state, _worker) = startup::build_state(&config, pool)?;
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
