//! Staking API entry point.
//!
//! Serves the investment REST API over SQLite and runs a background
//! sweeper that completes matured investments and activates scheduled
//! upgrades.

mod accrual;
mod api;
mod clock;
mod config;
mod db;
mod errors;
mod lifecycle;
mod models;
mod notify;
mod packages;
mod referral;
mod sweeper;
mod validation;

use std::sync::Arc;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use clock::Clock;
use config::Config;
use notify::Notifier;
use sweeper::SweeperState;

const MAX_DB_CONNECTIONS: u32 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url, MAX_DB_CONNECTIONS).await?;

    // HTTP client for webhook notifications.
    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;
    let notifier = Notifier::new(client, config.notify_webhook_url.clone());
    if !notifier.is_enabled() {
        info!("NOTIFY_WEBHOOK_URL not set, notifications disabled");
    }
    if config.allow_simulation {
        info!("Date simulation endpoint enabled");
    }

    let shutdown = CancellationToken::new();

    // ─── Background sweeper ───────────────────────────────
    let sweeper_state = Arc::new(SweeperState {
        pool: pool.clone(),
        clock: Clock::System,
        interval_secs: config.sweep_interval_secs,
    });
    let sweeper = tokio::spawn(sweeper::run(sweeper_state, shutdown.clone()));

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(api::ApiState {
        pool,
        config: config.clone(),
        clock: Clock::System,
        notifier,
    });
    let app = api::router(api_state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            token.cancel();
        })
        .await?;

    shutdown.cancel();
    sweeper.await?;
    Ok(())
}
