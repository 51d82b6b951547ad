/// Flower Shop Backend Application
///
/// This is the main entry point for the flower shop order service.
/// The application accepts orders from the Telegram mini-app, stores them
/// atomically and notifies the shop's admin chat.
///
/// # Commands
///
/// - `serve` (default) - run the HTTP API until SIGINT/SIGTERM
/// - `seed` - fill an empty product catalog with the starter assortment
///
/// # Architecture
///
/// - Store layer (`repository` over PostgreSQL, or `memory-store`)
/// - Service layer for validation and the submission pipeline
/// - Notifier for the Telegram Bot API
/// - HTTP layer with metrics
mod seed;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use app_config::{AppConfig, StoreBackend};
use memory_store::MemoryStore;
use notifier::{NotificationDispatcher, TelegramNotifier};
use repository::{CatalogStore, OrderStore, PgCatalogStore, PgOrderStore};
use server::Server;
use service::{OrderPolicy, OrderServiceImpl};

#[derive(Debug, Parser)]
#[command(name = "flowershop", version, about = "Flower shop order service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve {
        /// Seed the catalog before serving if it is empty.
        #[arg(long)]
        seed: bool,
    },
    /// Insert the starter catalog if no products exist yet.
    Seed,
}

/// Initialize the tracing subscriber for logging
fn init_logger() {
    tracing_subscriber::fmt::init();
}

/// Builds the order and catalog stores for the configured backend.
async fn build_stores(config: &AppConfig) -> Result<(Arc<dyn OrderStore>, Arc<dyn CatalogStore>)> {
    match config.store_backend {
        StoreBackend::Postgres => {
            let db_pool = db::init_db_pool(config)
                .await
                .context("Failed to initialize database")?;
            info!("Database initialized successfully");
            let orders: Arc<dyn OrderStore> = Arc::new(PgOrderStore::new(db_pool.clone()));
            let catalog: Arc<dyn CatalogStore> = Arc::new(PgCatalogStore::new(db_pool));
            Ok((orders, catalog))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store, data will be lost on restart");
            let store = Arc::new(MemoryStore::new());
            let orders: Arc<dyn OrderStore> = store.clone();
            let catalog: Arc<dyn CatalogStore> = store;
            Ok((orders, catalog))
        }
    }
}

async fn seed_catalog(catalog: &dyn CatalogStore) -> Result<()> {
    let inserted = catalog
        .seed_products(&seed::products())
        .await
        .context("Failed to seed catalog")?;
    if inserted == 0 {
        info!("Catalog already has products, nothing seeded");
    } else {
        info!("Seeded {} products", inserted);
    }
    Ok(())
}

async fn serve(config: AppConfig, order_store: Arc<dyn OrderStore>, catalog: Arc<dyn CatalogStore>) -> Result<()> {
    let dispatcher = match TelegramNotifier::from_config(&config).context("Invalid Telegram settings")? {
        Some(telegram) => {
            info!("Telegram notifications enabled for chat {:?}", config.admin_chat_id);
            NotificationDispatcher::new(Arc::new(telegram))
        }
        None => {
            warn!("BOT_TOKEN or ADMIN_CHAT_ID not set, order notifications are disabled");
            NotificationDispatcher::disabled()
        }
    };

    let order_service = Arc::new(OrderServiceImpl::new(
        order_store,
        dispatcher,
        OrderPolicy {
            enforce_status_transitions: config.enforce_status_transitions,
            verify_totals: config.verify_totals,
        },
    ));

    let http_server = Server::new(
        config.http_port,
        order_service,
        catalog,
        config.admin_password.clone(),
    )?;

    let shutdown = Arc::new(Notify::new());
    let mut tasks = JoinSet::new();

    let server_shutdown = shutdown.clone();
    tasks.spawn(async move { http_server.start(server_shutdown).await });

    tokio::select! {
        _ = server::shutdown_signal() => {
            shutdown.notify_one();
        }
        Some(res) = tasks.join_next() => {
            // The server stopped without being asked to, e.g. the port is taken.
            return match res {
                Ok(result) => result,
                Err(err) => Err(anyhow::anyhow!("HTTP server task failed: {err}")),
            };
        }
    }

    let drain = async {
        while let Some(res) = tasks.join_next().await {
            match res {
                Ok(Err(err)) => error!("HTTP server error: {}", err),
                Err(err) => error!("Task error: {}", err),
                Ok(Ok(())) => {}
            }
        }
    };
    if tokio::time::timeout(config.shutdown_timeout, drain).await.is_err() {
        warn!(
            "Shutdown timeout of {:?} elapsed, aborting remaining tasks",
            config.shutdown_timeout
        );
        tasks.abort_all();
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();
    let cli = Cli::parse();

    info!("Flower shop backend starting...");

    let config = AppConfig::load().context("Failed to load configuration")?;
    let (order_store, catalog) = build_stores(&config).await?;

    match cli.command.unwrap_or(Command::Serve { seed: false }) {
        Command::Seed => seed_catalog(catalog.as_ref()).await?,
        Command::Serve { seed } => {
            if seed {
                seed_catalog(catalog.as_ref()).await?;
            }
            serve(config, order_store, catalog).await?;
        }
    }

    info!("Application stopped");
    Ok(())
}
