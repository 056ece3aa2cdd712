//! scanpay-server
//!
//! HTTP service for the scan-to-pay flow.

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scanpay_server::auth::TokenIssuer;
use scanpay_server::clock::{Clock, SystemClock};
use scanpay_server::config::{Command, Config, StoreKind};
use scanpay_server::store::{MemoryStore, PgStore, StoreRef};
use scanpay_server::{create_router, db, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scanpay_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let signing_key = match config.signing_seed.as_deref() {
        Some(seed) => scanpay_crypto::signing_key_from_hex(seed).context("Invalid --signing-seed")?,
        None => {
            tracing::warn!("No signing seed configured; using an ephemeral key");
            scanpay_crypto::generate_keypair().0
        }
    };
    let tokens = TokenIssuer::new(signing_key, config.link_token_ttl_secs);

    if let Some(Command::IssueToken { account, ttl_secs }) = &config.command {
        if config.signing_seed.is_none() {
            anyhow::bail!("issue-token needs --signing-seed to match the running server");
        }
        let token = tokens.issue_access_token(*account, clock.now(), *ttl_secs)?;
        println!("{}", token);
        return Ok(());
    }

    let store: StoreRef = match config.store {
        StoreKind::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres store")?;
            let pool = db::create_pool(url, config.max_connections)
                .await
                .context("Failed to connect to database")?;
            db::run_migrations(&pool)
                .await
                .context("Failed to run migrations")?;
            tracing::info!("Database ready");
            Arc::new(PgStore::new(pool))
        }
        StoreKind::Memory => {
            tracing::warn!("Using in-memory store; state is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let state = AppState::new(store, clock, tokens, config.topup_policy()?);

    let sweep = config
        .expiry_sweep_period()
        .map(|period| state.payments.clone().spawn_expiry_sweep(period));

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    tracing::info!("Scan-to-pay service listening on {}", config.bind);

    axum::serve(listener, create_router(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(sweep) = sweep {
        sweep.abort();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
