//! Campaign view service entry point.
//!
//! Opens the user directory, selects a ledger backend, builds the view cache
//! and serves the REST API until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::info;
use tracing_subscriber::EnvFilter;

use campaigns::api::{self, ApiState};
use campaigns::cache::{CacheStore, MemoryCache};
use campaigns::config::{Config, LedgerBackend};
use campaigns::directory::{self, SqliteDirectory};
use campaigns::keystore::FileKeystore;
use campaigns::ledger::{Ledger, MemoryLedger, RpcLedger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    let pool = directory::init_pool(&config.database_url, 5).await?;
    let directory = Arc::new(SqliteDirectory::new(pool));

    let ledger: Arc<dyn Ledger> = match &config.ledger {
        LedgerBackend::Rpc(url) => {
            let client = Client::builder()
                .timeout(Duration::from_secs(config.ledger_timeout_secs))
                .build()?;
            info!("Using ledger gateway at {url}");
            Arc::new(RpcLedger::new(client, url.clone()))
        }
        LedgerBackend::Memory => {
            info!("Using in-memory ledger; state is lost on restart");
            Arc::new(MemoryLedger::new())
        }
    };

    let cache_store: Arc<dyn CacheStore> =
        Arc::new(MemoryCache::with_capacity(config.cache_max_entries));

    // ─── REST API ─────────────────────────────────────────
    let state = Arc::new(ApiState::new(
        ledger,
        directory,
        Arc::new(FileKeystore::new(&config.keystore_dir)),
        cache_store,
        Duration::from_secs(config.cache_ttl_secs),
    ));
    let app = api::build_router(state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}
