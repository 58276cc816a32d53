//! ipnets Server
//!
//! Keeps a refreshed list of IPv4 networks and answers whether a client
//! address belongs to one of them.

mod handlers;

use anyhow::{Context, Result};
use ipnets_core::{Config, HttpFetcher, NetworkSet, QueryService, Refresher};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::handlers::{router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ipnets_server=info,ipnets_core=info,tower_http=info".into()),
        )
        .init();

    // Invalid overrides stop the process here
    let config = Config::from_env()
        .inspect_err(|e| tracing::error!("{}", e))
        .context("invalid configuration")?;

    tracing::info!("Update interval is set to: {:?}", config.update_interval);

    let networks = Arc::new(NetworkSet::new());

    // First refresh completes before the listener opens
    let refresher = Refresher::new(
        Arc::clone(&networks),
        HttpFetcher::new(config.fetcher_config()),
        config.update_ipv4_url.clone(),
    );
    tracing::info!("Update IPv4 URL is set to: {}", refresher.source_url());
    let _refresh_task = refresher.start(config.update_interval).await;

    let state = Arc::new(AppState {
        query: QueryService::new(networks),
    });
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!("Starting server on: http://{}", config.listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
